use image::imageops::FilterType;
use image::DynamicImage;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::SimilarityConfig;
use crate::error::FeatureError;
use crate::models::{CandidateProduct, MatchResult};
use crate::recognition::preprocessing::{self, GrayStats, HsvImage};
use crate::search::ImageFetcher;

/// Fixed-size numeric summary used to compare two photos
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualDescriptor {
    /// Hue × saturation histogram, row-major by hue, L2-normalized
    pub color_histogram: Vec<f32>,
    pub edge_density: f32,
    pub texture: GrayStats,
}

pub fn extract_descriptor(
    img: &DynamicImage,
    config: &SimilarityConfig,
) -> Result<VisualDescriptor, FeatureError> {
    if img.width() == 0 || img.height() == 0 {
        return Err(FeatureError::EmptyImage {
            width: img.width(),
            height: img.height(),
        });
    }

    let size = config.canonical_size;
    let resized = img.resize_exact(size, size, FilterType::Triangle);

    let hsv = HsvImage::from_rgb(&resized.to_rgb8());
    let color_histogram = hue_saturation_histogram(&hsv, config.hue_bins, config.saturation_bins);

    let gray = preprocessing::to_grayscale(&resized);
    let edges = preprocessing::detect_edges(&gray, config.canny_low, config.canny_high);

    Ok(VisualDescriptor {
        color_histogram,
        edge_density: preprocessing::edge_density(&edges),
        texture: preprocessing::gray_stats(&gray),
    })
}

/// 2D histogram over hue [0, 180) and saturation [0, 256), L2-normalized
fn hue_saturation_histogram(hsv: &HsvImage, hue_bins: usize, saturation_bins: usize) -> Vec<f32> {
    let mut hist = vec![0f32; hue_bins * saturation_bins];
    for &[h, s, _] in &hsv.pixels {
        let hb = (h as usize * hue_bins / 180).min(hue_bins - 1);
        let sb = (s as usize * saturation_bins / 256).min(saturation_bins - 1);
        hist[hb * saturation_bins + sb] += 1.0;
    }

    let norm = hist.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        hist.iter_mut().for_each(|v| *v /= norm);
    }
    hist
}

/// Pearson correlation of two histograms, like `HISTCMP_CORREL`.
/// Two flat histograms correlate perfectly.
pub fn correlation(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    let mean_a = a[..n].iter().map(|&v| v as f64).sum::<f64>() / n as f64;
    let mean_b = b[..n].iter().map(|&v| v as f64).sum::<f64>() / n as f64;

    let (mut cov, mut var_a, mut var_b) = (0f64, 0f64, 0f64);
    for (&x, &y) in a[..n].iter().zip(&b[..n]) {
        let dx = x as f64 - mean_a;
        let dy = y as f64 - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    let denom = (var_a * var_b).sqrt();
    if denom.abs() < f64::EPSILON {
        1.0
    } else {
        (cov / denom) as f32
    }
}

pub fn similarity(a: &VisualDescriptor, b: &VisualDescriptor, config: &SimilarityConfig) -> f32 {
    let color = correlation(&a.color_histogram, &b.color_histogram).max(0.0);
    let edge = (1.0 - (a.edge_density - b.edge_density).abs()).max(0.0);
    let texture_diff = ((a.texture.mean - b.texture.mean).abs()
        + (a.texture.stddev - b.texture.stddev).abs()
        + (a.texture.variance - b.texture.variance).abs())
        / 3.0;
    let texture = (1.0 - texture_diff / 255.0).max(0.0);

    let total =
        config.color_weight * color + config.edge_weight * edge + config.texture_weight * texture;
    total.clamp(0.0, 1.0)
}

/// Best scored candidate at or above `threshold`; earliest index wins ties
pub fn pick_best(scored: &[(usize, f32)], threshold: f32) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for &(idx, score) in scored {
        best = match best {
            Some((bi, bs)) if bs > score || (bs == score && bi < idx) => Some((bi, bs)),
            _ => Some((idx, score)),
        };
    }
    best.filter(|&(_, score)| score >= threshold)
}

/// Ranks candidate products against the query photo
pub struct SimilarityMatcher {
    config: SimilarityConfig,
    fetcher: Arc<dyn ImageFetcher>,
}

impl SimilarityMatcher {
    pub fn new(config: SimilarityConfig, fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self { config, fetcher }
    }

    pub fn config(&self) -> &SimilarityConfig {
        &self.config
    }

    pub fn extract_descriptor(&self, img: &DynamicImage) -> Result<VisualDescriptor, FeatureError> {
        extract_descriptor(img, &self.config)
    }

    pub fn similarity(&self, a: &VisualDescriptor, b: &VisualDescriptor) -> f32 {
        similarity(a, b, &self.config)
    }

    /// Fetch, decode and score every candidate concurrently.
    ///
    /// Candidates that fail to download or decode are skipped. Returns the
    /// best match only if it reaches the similarity threshold.
    pub async fn rank(
        &self,
        query: &VisualDescriptor,
        candidates: &[CandidateProduct],
    ) -> Option<MatchResult> {
        if candidates.is_empty() {
            return None;
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_fetches.max(1)));
        let query = Arc::new(query.clone());
        let mut tasks = JoinSet::new();

        for (idx, candidate) in candidates.iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let fetcher = Arc::clone(&self.fetcher);
            let query = Arc::clone(&query);
            let config = self.config.clone();
            let url = candidate.image_url.clone();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                let bytes = match fetcher.fetch(&url).await {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        warn!(url = %url, error = %err, "candidate image fetch failed");
                        return None;
                    }
                };

                let scored = tokio::task::spawn_blocking(move || {
                    let img = image::load_from_memory(&bytes)?;
                    let descriptor = extract_descriptor(&img, &config)?;
                    anyhow::Ok(similarity(&query, &descriptor, &config))
                })
                .await;

                match scored {
                    Ok(Ok(score)) => {
                        debug!(url = %url, similarity = score, "candidate scored");
                        Some((idx, score))
                    }
                    Ok(Err(err)) => {
                        warn!(url = %url, error = %err, "candidate image unusable");
                        None
                    }
                    Err(err) => {
                        warn!(url = %url, error = %err, "candidate scoring task failed");
                        None
                    }
                }
            });
        }

        let mut scored = Vec::with_capacity(candidates.len());
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(Some(entry)) => scored.push(entry),
                Ok(None) => {}
                Err(err) => {
                    if !err.is_cancelled() {
                        warn!(error = %err, "candidate task join error");
                    }
                }
            }
        }

        let best = pick_best(&scored, self.config.threshold);
        match best {
            Some((idx, score)) => {
                info!(title = %candidates[idx].title, similarity = score, "visual match found");
                Some(MatchResult {
                    product: candidates[idx].clone(),
                    similarity: score,
                })
            }
            None => {
                info!(
                    scored = scored.len(),
                    total = candidates.len(),
                    "no candidate reached the similarity threshold"
                );
                None
            }
        }
    }
}

use applens::recognition::TextRecognizer;
use applens::search::{CandidateSearch, ImageFetcher, SearchQuery};
use applens::{CandidateProduct, ExtractedText, RecognitionPipeline, TextExtractor};
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::NamedTempFile;

/// White product shot with a large blue water tank in the middle
pub fn blue_tank_image() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(160, 200, |x, y| {
        if (30..130).contains(&x) && (40..180).contains(&y) {
            Rgb([30, 80, 200])
        } else {
            Rgb([250, 250, 250])
        }
    }))
}

/// Busy green checkerboard, nothing like the tank shot
pub fn green_pattern_image() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(160, 200, |x, y| {
        if (x / 4 + y / 4) % 2 == 0 {
            Rgb([20, 150, 40])
        } else {
            Rgb([120, 70, 20])
        }
    }))
}

pub fn png_bytes(img: &DynamicImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)
        .expect("Failed to encode test image");
    buf.into_inner()
}

/// Saves `img` as a temporary PNG; the file is removed when dropped
pub fn save_temp_png(img: &DynamicImage) -> NamedTempFile {
    let file = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .expect("Failed to create temp image file");
    img.save_with_format(file.path(), ImageFormat::Png)
        .expect("Failed to save test image");
    file
}

/// OCR backend that "reads" a fixed set of lines from every image
pub struct ScriptedOcr {
    lines: Vec<(String, f32)>,
}

impl ScriptedOcr {
    pub fn reading(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|l| (l.to_string(), 0.95)).collect(),
        }
    }
}

impl TextRecognizer for ScriptedOcr {
    fn recognize(&self, _img: &DynamicImage) -> anyhow::Result<Vec<ExtractedText>> {
        Ok(self
            .lines
            .iter()
            .map(|(text, confidence)| ExtractedText::new(text.clone(), *confidence))
            .collect())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// OCR backend that blocks for `delay` before reading nothing
pub struct SlowOcr {
    pub delay: Duration,
}

impl TextRecognizer for SlowOcr {
    fn recognize(&self, _img: &DynamicImage) -> anyhow::Result<Vec<ExtractedText>> {
        std::thread::sleep(self.delay);
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "slow"
    }
}

pub fn extractor_reading(lines: &[&str]) -> TextExtractor {
    TextExtractor::with_recognizer(Arc::new(ScriptedOcr::reading(lines)), 0.5)
}

/// Default pipeline whose OCR reads `lines`
pub fn pipeline_reading(lines: &[&str]) -> RecognitionPipeline {
    RecognitionPipeline::with_defaults().with_text_extractor(extractor_reading(lines))
}

/// Candidate search returning a fixed list and remembering the queries it saw
#[derive(Default)]
pub struct StaticSearch {
    pub candidates: Vec<CandidateProduct>,
    pub queries: Mutex<Vec<SearchQuery>>,
}

impl StaticSearch {
    pub fn new(candidates: Vec<CandidateProduct>) -> Self {
        Self {
            candidates,
            queries: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CandidateSearch for StaticSearch {
    async fn search(&self, query: &SearchQuery) -> anyhow::Result<Vec<CandidateProduct>> {
        self.queries.lock().unwrap().push(query.clone());
        Ok(self.candidates.clone())
    }
}

pub struct FailingSearch;

#[async_trait]
impl CandidateSearch for FailingSearch {
    async fn search(&self, _query: &SearchQuery) -> anyhow::Result<Vec<CandidateProduct>> {
        anyhow::bail!("search service unavailable")
    }
}

/// Search that takes far longer than any test deadline
pub struct SlowSearch;

#[async_trait]
impl CandidateSearch for SlowSearch {
    async fn search(&self, _query: &SearchQuery) -> anyhow::Result<Vec<CandidateProduct>> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(Vec::new())
    }
}

/// Serves image bytes from memory by URL
#[derive(Default)]
pub struct MemoryFetcher {
    images: HashMap<String, Vec<u8>>,
}

impl MemoryFetcher {
    pub fn with(mut self, url: &str, img: &DynamicImage) -> Self {
        self.images.insert(url.to_string(), png_bytes(img));
        self
    }
}

#[async_trait]
impl ImageFetcher for MemoryFetcher {
    async fn fetch(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        self.images
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("HTTP 404 for {url}"))
    }
}

pub fn make_candidate(title: &str, model: &str, image_url: &str) -> CandidateProduct {
    CandidateProduct {
        title: title.to_string(),
        model: model.to_string(),
        image_url: image_url.to_string(),
        source: "test-shop".to_string(),
    }
}

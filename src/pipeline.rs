use anyhow::Result;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::{FeatureError, ImageLoadError};
use crate::models::{
    ApplianceVerdict, ClassificationResult, ExtractedText, MatchResult, Outcome, NOT_APPLIANCE,
    NO_BRAND,
};
use crate::recognition::features::StageImages;
use crate::recognition::{
    ApplianceGate, CategoryClassifier, ImageFeatureAnalyzer, ImageFeatures, Lexicon, TextExtractor,
};
use crate::search::{CandidateSearch, ImageFetcher, SearchQuery};
use crate::similarity::SimilarityMatcher;

/// Debug configuration for pipeline execution
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
    /// Whether debug mode is enabled
    pub enabled: bool,
}

/// Everything computed from the photo before any network access
struct Analysis {
    image: Arc<DynamicImage>,
    texts: Vec<ExtractedText>,
    features: Result<ImageFeatures, FeatureError>,
    verdict: ApplianceVerdict,
}

/// The classification engine: text extraction, appliance gate, category
/// classification and optional visual matching against candidate products.
///
/// Shared read-only state (OCR handle, keyword tables) lives behind `Arc`s,
/// so one pipeline can serve concurrent calls.
pub struct RecognitionPipeline {
    lexicon: Arc<Lexicon>,
    extractor: Arc<TextExtractor>,
    analyzer: Arc<ImageFeatureAnalyzer>,
    gate: Arc<ApplianceGate>,
    classifier: Arc<CategoryClassifier>,
    search: Option<Arc<dyn CandidateSearch>>,
    matcher: Option<Arc<SimilarityMatcher>>,
    config: EngineConfig,
    deadline: Duration,
    search_timeout: Duration,
    debug: Option<DebugConfig>,
}

impl RecognitionPipeline {
    pub fn new(config: EngineConfig, lexicon: Arc<Lexicon>) -> Self {
        Self {
            extractor: Arc::new(TextExtractor::from_config(&config.ocr)),
            analyzer: Arc::new(ImageFeatureAnalyzer::new(config.features.clone())),
            gate: Arc::new(ApplianceGate::new(config.gate.clone(), Arc::clone(&lexicon))),
            classifier: Arc::new(CategoryClassifier::new(
                config.classifier.clone(),
                Arc::clone(&lexicon),
            )),
            search: None,
            matcher: None,
            deadline: Duration::from_secs(config.pipeline.deadline_secs),
            search_timeout: Duration::from_secs(config.similarity.search_timeout_secs),
            config,
            lexicon,
            debug: None,
        }
    }

    /// Pipeline with built-in keyword tables and default thresholds
    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default(), Lexicon::builtin())
    }

    pub fn with_text_extractor(mut self, extractor: TextExtractor) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }

    /// Enable visual matching against products supplied by `search`
    pub fn with_candidates(
        mut self,
        search: Arc<dyn CandidateSearch>,
        fetcher: Arc<dyn ImageFetcher>,
    ) -> Self {
        self.search = Some(search);
        self.matcher = Some(Arc::new(SimilarityMatcher::new(
            self.config.similarity.clone(),
            fetcher,
        )));
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Upper bound on candidate search plus ranking. The remaining deadline
    /// may cut it shorter.
    pub fn with_search_timeout(mut self, timeout: Duration) -> Self {
        self.search_timeout = timeout;
        self
    }

    /// Enable debug mode with output directory
    /// The directory must be empty or non-existent
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                return Err(anyhow::anyhow!(
                    "Debug directory is not empty: {}",
                    output_dir.display()
                ));
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        self.debug = Some(DebugConfig {
            output_dir,
            enabled: true,
        });

        Ok(self)
    }

    pub fn lexicon(&self) -> &Arc<Lexicon> {
        &self.lexicon
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Classify the image stored at `path`. Never fails; problems are
    /// reported through `success`, `outcome` and `message`.
    pub async fn classify_path(&self, path: &Path) -> ClassificationResult {
        self.with_timeout(|started| async move {
            let bytes = match tokio::fs::read(path).await {
                Ok(bytes) => bytes,
                Err(source) => {
                    let err = ImageLoadError::Open {
                        path: path.display().to_string(),
                        source,
                    };
                    warn!(error = %err, "image could not be read");
                    return unreadable(&err);
                }
            };
            self.run(bytes, Some(path.to_path_buf()), started).await
        })
        .await
    }

    /// Classify an encoded image held in memory
    pub async fn classify_bytes(&self, bytes: Vec<u8>) -> ClassificationResult {
        self.with_timeout(|started| self.run(bytes, None, started))
            .await
    }

    async fn with_timeout<F, Fut>(&self, work: F) -> ClassificationResult
    where
        F: FnOnce(Instant) -> Fut,
        Fut: std::future::Future<Output = ClassificationResult>,
    {
        let started = Instant::now();
        match tokio::time::timeout(self.deadline, work(started)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(deadline = ?self.deadline, "classification deadline exceeded");
                ClassificationResult::failure(
                    Outcome::TimedOut,
                    format!(
                        "Classification did not finish within {} seconds.",
                        self.deadline.as_secs_f32()
                    ),
                )
            }
        }
    }

    async fn run(
        &self,
        bytes: Vec<u8>,
        image_path: Option<PathBuf>,
        started: Instant,
    ) -> ClassificationResult {
        let decoded = tokio::task::spawn_blocking(move || decode(&bytes)).await;
        let image = match decoded {
            Ok(Ok(image)) => Arc::new(image),
            Ok(Err(err)) => {
                warn!(error = %err, "image could not be decoded");
                return unreadable(&err);
            }
            Err(err) => return internal_failure(&err),
        };
        info!(width = image.width(), height = image.height(), "image decoded");

        let analysis = match self.analyze(image).await {
            Ok(analysis) => analysis,
            Err(err) => return internal_failure(&err),
        };
        let Analysis {
            image,
            texts,
            features,
            verdict,
        } = analysis;
        let extracted: Vec<String> = texts.iter().map(|t| t.text.clone()).collect();

        if !verdict.is_appliance {
            info!(reason = %verdict.reason, "not an appliance");
            return ClassificationResult {
                success: false,
                outcome: Outcome::NotAppliance,
                category: NOT_APPLIANCE.to_string(),
                brand: NO_BRAND.to_string(),
                model: NO_BRAND.to_string(),
                confidence: verdict.confidence,
                message: "This does not look like a home appliance. \
                          Upload a photo of an appliance such as an air purifier or humidifier."
                    .to_string(),
                extracted_texts: extracted,
                verdict: Some(verdict),
                ..ClassificationResult::failure(Outcome::NotAppliance, "")
            };
        }

        let brand = self.lexicon.detect_brand(&texts);
        let mut result = self
            .classifier
            .classify(features.as_ref().ok(), brand, &texts);
        result.verdict = Some(verdict);
        if let Some(model) = self.lexicon.detect_model_number(&texts) {
            result.model = model;
        }

        if result.outcome != Outcome::Classified {
            return result;
        }

        if let (Some(search), Some(matcher)) = (&self.search, &self.matcher) {
            let query = SearchQuery {
                brand: result.brand.clone(),
                category: result.category.clone(),
                image_path,
                brand_keyword: self.lexicon.brand_keyword(&result.brand),
            };
            let budget = self.search_budget(started);
            let ranked = tokio::time::timeout(
                budget,
                self.find_match(search.as_ref(), matcher, &query, image),
            )
            .await;
            match ranked {
                Ok(Ok(Some(found))) => self.merge_match(&mut result, found),
                Ok(Ok(None)) => result.notes.push("no visual match found".to_string()),
                Err(_) => {
                    warn!(budget = ?budget, "candidate search timed out");
                    result
                        .notes
                        .push("similarity ranking skipped: timed out".to_string());
                }
                Ok(Err(err)) => {
                    warn!(error = %err, "similarity ranking skipped");
                    result
                        .notes
                        .push(format!("similarity ranking skipped: {err}"));
                }
            }
        }

        result
    }

    /// Time left for search and ranking. A slice of the deadline stays
    /// reserved so the finished classification is still returned.
    fn search_budget(&self, started: Instant) -> Duration {
        let reserve = self.deadline / 10;
        let remaining = self
            .deadline
            .saturating_sub(started.elapsed())
            .saturating_sub(reserve);
        remaining.min(self.search_timeout)
    }

    /// OCR, image features and the appliance gate, off the async runtime
    async fn analyze(&self, image: Arc<DynamicImage>) -> Result<Analysis, tokio::task::JoinError> {
        let extractor = Arc::clone(&self.extractor);
        let analyzer = Arc::clone(&self.analyzer);
        let gate = Arc::clone(&self.gate);
        let debug = self.debug.clone();

        tokio::task::spawn_blocking(move || {
            let texts = extractor.extract_text(&image);
            let features = match debug.as_ref().filter(|d| d.enabled) {
                Some(debug) => {
                    let (features, stages) = match analyzer.analyze_with_stages(&image) {
                        Ok((features, stages)) => (Ok(features), Some(stages)),
                        Err(err) => (Err(err), None),
                    };
                    if let Err(err) = save_debug_images(debug, &image, stages) {
                        warn!(error = %err, "failed to write debug images");
                    }
                    features
                }
                None => analyzer.analyze(&image),
            };
            let verdict = gate.evaluate(&texts, features.as_ref());
            debug!(state = ?verdict.state, confidence = verdict.confidence, "appliance gate");

            Analysis {
                image,
                texts,
                features,
                verdict,
            }
        })
        .await
    }

    async fn find_match(
        &self,
        search: &dyn CandidateSearch,
        matcher: &Arc<SimilarityMatcher>,
        query: &SearchQuery,
        image: Arc<DynamicImage>,
    ) -> Result<Option<MatchResult>> {
        let candidates = search.search(query).await?;
        if candidates.is_empty() {
            info!(keywords = %query.keywords(), "search returned no candidates");
            return Ok(None);
        }

        let descriptor_matcher = Arc::clone(matcher);
        let descriptor =
            tokio::task::spawn_blocking(move || descriptor_matcher.extract_descriptor(&image))
                .await??;

        Ok(matcher.rank(&descriptor, &candidates).await)
    }

    fn merge_match(&self, result: &mut ClassificationResult, found: MatchResult) {
        let MatchResult {
            product,
            similarity,
        } = found;

        let model = if product.model.is_empty() {
            self.lexicon.model_from_title(&product.title)
        } else {
            Some(product.model.clone())
        };
        if let Some(model) = model {
            result.model = model;
        }

        result.outcome = Outcome::Matched;
        result.confidence = match_confidence(similarity, &self.config);
        result.similarity = Some(similarity);
        result.product_title = Some(product.title);
        result.source = (!product.source.is_empty()).then_some(product.source);
        result.message = "Product identified and matched to a listing.".to_string();
    }
}

/// Boosted similarity, never below the classification threshold a
/// successful result must meet
fn match_confidence(similarity: f32, config: &EngineConfig) -> f32 {
    let boosted = (similarity * config.similarity.match_confidence_boost).min(1.0);
    boosted.max(config.classifier.threshold)
}

fn decode(bytes: &[u8]) -> Result<DynamicImage, ImageLoadError> {
    if bytes.is_empty() {
        return Err(ImageLoadError::Empty);
    }
    let image = image::load_from_memory(bytes)?;
    if image.width() == 0 || image.height() == 0 {
        return Err(ImageLoadError::Empty);
    }
    Ok(image)
}

fn unreadable(err: &ImageLoadError) -> ClassificationResult {
    ClassificationResult::failure(
        Outcome::Unreadable,
        format!("The image could not be read ({err}). Upload a valid photo."),
    )
}

fn internal_failure(err: &tokio::task::JoinError) -> ClassificationResult {
    error!(error = %err, "internal error during classification");
    ClassificationResult::failure(
        Outcome::Failed,
        "An internal error occurred while classifying the image.",
    )
}

/// Write the input and each intermediate image into numbered stage directories
fn save_debug_images(
    debug: &DebugConfig,
    image: &DynamicImage,
    stages: Option<StageImages>,
) -> Result<()> {
    let input_dir = debug.output_dir.join("00_input");
    std::fs::create_dir_all(&input_dir)?;
    image
        .save(input_dir.join("01.png"))
        .map_err(|e| anyhow::anyhow!("Failed to save debug input: {}", e))?;

    let stage_images = stages.map(StageImages::into_debug_images).unwrap_or_default();
    for (idx, (stage, stage_image)) in stage_images.into_iter().enumerate() {
        let step_dir_name = format!("{:02}_{}", idx + 1, stage);
        let step_dir = debug.output_dir.join(&step_dir_name);
        std::fs::create_dir_all(&step_dir)?;
        stage_image
            .save(step_dir.join("01.png"))
            .map_err(|e| anyhow::anyhow!("Failed to save debug image: {}", e))?;
        debug!("Debug: saved {}/01.png", step_dir_name);
    }
    Ok(())
}

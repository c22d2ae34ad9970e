use image::DynamicImage;
use ocrs::{ImageSource, OcrEngine, OcrEngineParams, TextItem};
use rten::Model;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

use crate::config::{OcrBackend, OcrConfig};
use crate::models::{BoundingBox, ExtractedText};

/// Backend that turns pixels into text regions
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, img: &DynamicImage) -> anyhow::Result<Vec<ExtractedText>>;

    /// Human-readable backend name (used in log output)
    fn name(&self) -> &str;
}

/// Default model location used by ocrs-cli
pub fn default_model_dir() -> anyhow::Result<PathBuf> {
    let home_dir = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE"))?;
    Ok(Path::new(&home_dir).join(".cache/ocrs"))
}

/// Paths of `names` inside `model_dir`, or an error listing the expected locations
pub fn require_model_files<const N: usize>(
    model_dir: &Path,
    names: [&str; N],
) -> anyhow::Result<[PathBuf; N]> {
    let paths = names.map(|name| model_dir.join(name));
    if paths.iter().any(|p| !p.exists()) {
        let expected: Vec<String> = paths.iter().map(|p| format!("  - {}", p.display())).collect();
        anyhow::bail!(
            "OCR models not found. Please run: ocrs-cli --help (or download models manually)\n\
             Expected locations:\n{}",
            expected.join("\n")
        );
    }
    Ok(paths)
}

/// Initialize OCR engine with models from `model_dir`
pub fn init_ocr_engine(model_dir: &Path) -> anyhow::Result<OcrEngine> {
    let [detection_model_path, recognition_model_path] =
        require_model_files(model_dir, ["text-detection.rten", "text-recognition.rten"])?;

    let detection_model = Model::load_file(&detection_model_path)?;
    let recognition_model = Model::load_file(&recognition_model_path)?;

    let engine = OcrEngine::new(OcrEngineParams {
        detection_model: Some(detection_model),
        recognition_model: Some(recognition_model),
        ..Default::default()
    })?;

    Ok(engine)
}

/// Line-level recognizer on top of the ocrs engine.
///
/// The published ocrs recognition model covers Latin script only, so Hangul
/// surface forms never come out of this backend.
pub struct OcrsRecognizer {
    engine: OcrEngine,
    /// ocrs reports no per-line confidence
    line_confidence: f32,
}

impl OcrsRecognizer {
    pub fn load(model_dir: &Path, line_confidence: f32) -> anyhow::Result<Self> {
        Ok(Self {
            engine: init_ocr_engine(model_dir)?,
            line_confidence,
        })
    }
}

impl TextRecognizer for OcrsRecognizer {
    fn recognize(&self, img: &DynamicImage) -> anyhow::Result<Vec<ExtractedText>> {
        let rgb = img.to_rgb8();
        let source = ImageSource::from_bytes(rgb.as_raw(), rgb.dimensions())?;
        let input = self.engine.prepare_input(source)?;

        let word_rects = self.engine.detect_words(&input)?;
        let line_rects = self.engine.find_text_lines(&input, &word_rects);
        let lines = self.engine.recognize_text(&input, &line_rects)?;

        Ok(lines
            .iter()
            .flatten()
            .map(|line| {
                let rect = line.bounding_rect();
                ExtractedText::new(line.to_string(), self.line_confidence).with_bbox(BoundingBox {
                    x: rect.left(),
                    y: rect.top(),
                    width: (rect.right() - rect.left()).max(0) as u32,
                    height: (rect.bottom() - rect.top()).max(0) as u32,
                })
            })
            .collect())
    }

    fn name(&self) -> &str {
        "ocrs"
    }
}

#[cfg(feature = "korean-ocr")]
fn load_oar(model_dir: Option<&Path>) -> anyhow::Result<Arc<dyn TextRecognizer>> {
    let Some(dir) = model_dir else {
        anyhow::bail!("ocr.model_dir must point at the oar-ocr models");
    };
    let recognizer = crate::recognition::oar::OarRecognizer::load(dir)?;
    Ok(Arc::new(recognizer) as Arc<dyn TextRecognizer>)
}

#[cfg(not(feature = "korean-ocr"))]
fn load_oar(_model_dir: Option<&Path>) -> anyhow::Result<Arc<dyn TextRecognizer>> {
    anyhow::bail!("the oar OCR backend needs a build with the korean-ocr feature")
}

pub type Loader = Box<dyn Fn() -> anyhow::Result<Arc<dyn TextRecognizer>> + Send + Sync>;

/// Runs OCR over a photo and keeps confident, non-empty regions.
///
/// The backend is loaded on first use. A failed load is remembered and the
/// extractor returns no text for the rest of the process lifetime.
pub struct TextExtractor {
    backend: OnceLock<Option<Arc<dyn TextRecognizer>>>,
    loader: Loader,
    min_confidence: f32,
}

impl TextExtractor {
    /// Extractor backed by the configured engine, or a disabled one when
    /// `config.enabled` is false
    pub fn from_config(config: &OcrConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }
        let model_dir = config.model_dir.clone();
        let line_confidence = config.assumed_confidence;
        let loader: Loader = match config.backend {
            OcrBackend::Ocrs => Box::new(move || {
                let dir = match &model_dir {
                    Some(dir) => dir.clone(),
                    None => default_model_dir()?,
                };
                let recognizer = OcrsRecognizer::load(&dir, line_confidence)?;
                Ok(Arc::new(recognizer) as Arc<dyn TextRecognizer>)
            }),
            OcrBackend::Oar => Box::new(move || load_oar(model_dir.as_deref())),
        };
        Self::with_loader(loader, config.min_confidence)
    }

    pub fn with_loader(loader: Loader, min_confidence: f32) -> Self {
        Self {
            backend: OnceLock::new(),
            loader,
            min_confidence,
        }
    }

    pub fn with_recognizer(recognizer: Arc<dyn TextRecognizer>, min_confidence: f32) -> Self {
        let backend = OnceLock::new();
        let _ = backend.set(Some(recognizer));
        Self {
            backend,
            loader: Box::new(|| anyhow::bail!("recognizer already installed")),
            min_confidence,
        }
    }

    /// Extractor that never finds text
    pub fn disabled() -> Self {
        let backend = OnceLock::new();
        let _ = backend.set(None);
        Self {
            backend,
            loader: Box::new(|| anyhow::bail!("OCR disabled")),
            min_confidence: 0.0,
        }
    }

    /// Whether a backend is loaded (forces the lazy load)
    pub fn is_available(&self) -> bool {
        self.backend().is_some()
    }

    fn backend(&self) -> Option<&Arc<dyn TextRecognizer>> {
        self.backend
            .get_or_init(|| {
                info!("Initializing OCR engine...");
                match (self.loader)() {
                    Ok(backend) => {
                        info!(backend = backend.name(), "OCR engine initialized");
                        Some(backend)
                    }
                    Err(err) => {
                        warn!(error = %err, "OCR unavailable, continuing without text");
                        None
                    }
                }
            })
            .as_ref()
    }

    pub fn extract_text(&self, img: &DynamicImage) -> Vec<ExtractedText> {
        let Some(backend) = self.backend() else {
            return Vec::new();
        };
        if img.width() == 0 || img.height() == 0 {
            warn!("empty image passed to OCR");
            return Vec::new();
        }

        let regions = match backend.recognize(img) {
            Ok(regions) => regions,
            Err(err) => {
                warn!(error = %err, backend = backend.name(), "OCR failed");
                return Vec::new();
            }
        };

        let texts: Vec<ExtractedText> = regions
            .into_iter()
            .filter(|r| r.confidence >= self.min_confidence)
            .filter_map(|mut r| {
                r.text = r.text.trim().to_string();
                (!r.text.is_empty()).then_some(r)
            })
            .collect();

        debug!(texts = ?texts.iter().map(|t| t.text.as_str()).collect::<Vec<_>>(), "extracted text");
        texts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedRecognizer(Vec<ExtractedText>);

    impl TextRecognizer for FixedRecognizer {
        fn recognize(&self, _img: &DynamicImage) -> anyhow::Result<Vec<ExtractedText>> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct FailingRecognizer;

    impl TextRecognizer for FailingRecognizer {
        fn recognize(&self, _img: &DynamicImage) -> anyhow::Result<Vec<ExtractedText>> {
            anyhow::bail!("corrupt input")
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn photo() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::new(8, 8))
    }

    #[test]
    fn drops_low_confidence_and_blank_regions() {
        let extractor = TextExtractor::with_recognizer(
            Arc::new(FixedRecognizer(vec![
                ExtractedText::new(" LG ", 0.95),
                ExtractedText::new("blurry", 0.49),
                ExtractedText::new("edge", 0.5),
                ExtractedText::new("   ", 0.9),
            ])),
            0.5,
        );
        let texts: Vec<_> = extractor
            .extract_text(&photo())
            .into_iter()
            .map(|t| t.text)
            .collect();
        assert_eq!(texts, vec!["LG".to_string(), "edge".to_string()]);
    }

    #[test]
    fn recognizer_errors_yield_no_text() {
        let extractor = TextExtractor::with_recognizer(Arc::new(FailingRecognizer), 0.5);
        assert!(extractor.extract_text(&photo()).is_empty());
    }

    #[test]
    fn failed_init_is_attempted_once() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let extractor = TextExtractor::with_loader(
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("models missing")
            }),
            0.5,
        );

        assert!(extractor.extract_text(&photo()).is_empty());
        assert!(extractor.extract_text(&photo()).is_empty());
        assert!(!extractor.is_available());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disabled_extractor_is_unavailable() {
        let extractor = TextExtractor::disabled();
        assert!(!extractor.is_available());
        assert!(extractor.extract_text(&photo()).is_empty());
    }

    #[test]
    fn oar_backend_without_models_degrades_to_no_text() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = OcrConfig {
            backend: OcrBackend::Oar,
            model_dir: Some(dir.path().to_path_buf()),
            ..OcrConfig::default()
        };
        let extractor = TextExtractor::from_config(&config);
        assert!(!extractor.is_available());
        assert!(extractor.extract_text(&photo()).is_empty());
    }

    #[test]
    fn missing_model_files_are_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = init_ocr_engine(dir.path()).err().unwrap();
        let msg = err.to_string();
        assert!(msg.contains("OCR models not found"));
        assert!(msg.contains("text-recognition.rten"));
    }
}

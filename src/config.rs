use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::recognition::category::Category;

/// Tunable policy constants for every stage of the engine.
///
/// Defaults reproduce the empirically tuned values the engine shipped with;
/// override them from a TOML file instead of editing code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ocr: OcrConfig,
    pub features: FeatureConfig,
    pub gate: GateConfig,
    pub classifier: ClassifierConfig,
    pub similarity: SimilarityConfig,
    pub pipeline: PipelineConfig,
}

impl EngineConfig {
    /// Load a config file, falling back to defaults for anything it omits
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: EngineConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit = [
            ("ocr.min_confidence", self.ocr.min_confidence),
            ("ocr.assumed_confidence", self.ocr.assumed_confidence),
            ("gate.brand_confidence", self.gate.brand_confidence),
            ("gate.keyword_confidence", self.gate.keyword_confidence),
            ("gate.denial_confidence", self.gate.denial_confidence),
            ("gate.error_confidence", self.gate.error_confidence),
            ("gate.min_appliance_score", self.gate.min_appliance_score),
            ("classifier.threshold", self.classifier.threshold),
            ("classifier.base_floor", self.classifier.base_floor),
            ("classifier.off_brand_factor", self.classifier.off_brand_factor),
            ("classifier.default_confidence", self.classifier.default_confidence),
            ("similarity.threshold", self.similarity.threshold),
        ];
        for (field, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("{value} is outside [0, 1]"),
                });
            }
        }

        let non_negative = [
            ("features.shape_bonus", self.features.shape_bonus),
            ("features.neutral_bonus", self.features.neutral_bonus),
            ("features.smooth_bonus", self.features.smooth_bonus),
            ("features.natural_bonus", self.features.natural_bonus),
            ("features.complex_bonus", self.features.complex_bonus),
            ("features.round_bonus", self.features.round_bonus),
            ("features.organic_bonus", self.features.organic_bonus),
            ("features.contrast_bonus", self.features.contrast_bonus),
            ("features.humidifier_blue_weight", self.features.humidifier_blue_weight),
            ("features.air_fryer_black_weight", self.features.air_fryer_black_weight),
            ("features.purifier_tall_bonus", self.features.purifier_tall_bonus),
            ("features.purifier_white_weight", self.features.purifier_white_weight),
            ("classifier.keyword_weight", self.classifier.keyword_weight),
            ("similarity.color_weight", self.similarity.color_weight),
            ("similarity.edge_weight", self.similarity.edge_weight),
            ("similarity.texture_weight", self.similarity.texture_weight),
            ("similarity.match_confidence_boost", self.similarity.match_confidence_boost),
        ];
        for (field, value) in non_negative {
            if value.is_nan() || value < 0.0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("{value} must not be negative"),
                });
            }
        }

        // the Gaussian filter rejects a zero or negative sigma
        let sigma = self.features.contrast_blur_sigma;
        if sigma.is_nan() || sigma <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "features.contrast_blur_sigma",
                reason: format!("{sigma} must be greater than 0"),
            });
        }

        if self.features.canny_low > self.features.canny_high {
            return Err(ConfigError::Invalid {
                field: "features.canny_low",
                reason: "must not exceed features.canny_high".to_string(),
            });
        }
        if self.similarity.canny_low > self.similarity.canny_high {
            return Err(ConfigError::Invalid {
                field: "similarity.canny_low",
                reason: "must not exceed similarity.canny_high".to_string(),
            });
        }
        if self.similarity.canonical_size == 0
            || self.similarity.hue_bins == 0
            || self.similarity.saturation_bins == 0
        {
            return Err(ConfigError::Invalid {
                field: "similarity",
                reason: "canonical size and histogram bins must be positive".to_string(),
            });
        }
        if self.similarity.max_concurrent_fetches == 0 {
            return Err(ConfigError::Invalid {
                field: "similarity.max_concurrent_fetches",
                reason: "must be at least 1".to_string(),
            });
        }

        // a match is reported as a success, so its confidence has to clear
        // the classification threshold
        let weakest_match = self.similarity.threshold * self.similarity.match_confidence_boost;
        if weakest_match < self.classifier.threshold {
            return Err(ConfigError::Invalid {
                field: "similarity.threshold",
                reason: format!(
                    "{} x boost {} = {weakest_match} is below classifier.threshold {}",
                    self.similarity.threshold,
                    self.similarity.match_confidence_boost,
                    self.classifier.threshold
                ),
            });
        }

        let durations = [
            ("similarity.fetch_timeout_secs", self.similarity.fetch_timeout_secs),
            ("similarity.search_timeout_secs", self.similarity.search_timeout_secs),
            ("pipeline.deadline_secs", self.pipeline.deadline_secs),
        ];
        for (field, secs) in durations {
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be at least 1 second".to_string(),
                });
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub enabled: bool,
    pub backend: OcrBackend,
    /// Directory holding the backend's model files. `None` means
    /// `$HOME/.cache/ocrs` for ocrs; the oar backend needs it set.
    pub model_dir: Option<PathBuf>,
    /// Regions recognized below this confidence are discarded
    pub min_confidence: f32,
    /// ocrs does not report per-line confidence, so recognized lines get this value
    pub assumed_confidence: f32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: OcrBackend::default(),
            model_dir: None,
            min_confidence: 0.5,
            assumed_confidence: 0.9,
        }
    }
}

/// Text recognition engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrBackend {
    /// ocrs with `.rten` models; the stock recognition model reads Latin script only
    #[default]
    Ocrs,
    /// PaddleOCR ONNX models via oar-ocr (needs the `korean-ocr` feature)
    Oar,
}

/// Thresholds and weights of the appliance / non-appliance image heuristics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub canny_low: f32,
    pub canny_high: f32,

    pub shape_min_area_fraction: f32,
    pub shape_min_aspect: f32,
    pub shape_max_aspect: f32,
    pub shape_bonus: f32,

    pub neutral_min_ratio: f32,
    pub neutral_bonus: f32,

    pub smooth_max_edge_density: f32,
    pub smooth_bonus: f32,

    pub natural_min_ratio: f32,
    pub natural_bonus: f32,

    pub complex_min_edge_density: f32,
    pub complex_bonus: f32,

    pub round_min_area_fraction: f32,
    pub round_min_circularity: f32,
    pub round_bonus: f32,

    pub organic_min_ratio: f32,
    pub organic_bonus: f32,

    pub contrast_blur_sigma: f32,
    pub contrast_min_stddev: f32,
    pub contrast_bonus: f32,

    pub humidifier_blue_weight: f32,
    pub air_fryer_black_weight: f32,
    pub purifier_tall_ratio: f32,
    pub purifier_tall_bonus: f32,
    pub purifier_white_weight: f32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            canny_low: 50.0,
            canny_high: 150.0,
            shape_min_area_fraction: 0.1,
            shape_min_aspect: 0.5,
            shape_max_aspect: 2.0,
            shape_bonus: 0.3,
            neutral_min_ratio: 0.3,
            neutral_bonus: 0.4,
            smooth_max_edge_density: 0.1,
            smooth_bonus: 0.2,
            natural_min_ratio: 0.15,
            natural_bonus: 0.4,
            complex_min_edge_density: 0.12,
            complex_bonus: 0.4,
            round_min_area_fraction: 0.03,
            round_min_circularity: 0.6,
            round_bonus: 0.3,
            organic_min_ratio: 0.15,
            organic_bonus: 0.6,
            // 5x5 kernel with automatic sigma
            contrast_blur_sigma: 1.1,
            contrast_min_stddev: 30.0,
            contrast_bonus: 0.3,
            humidifier_blue_weight: 2.0,
            air_fryer_black_weight: 1.5,
            purifier_tall_ratio: 1.2,
            purifier_tall_bonus: 0.5,
            purifier_white_weight: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub brand_confidence: f32,
    pub keyword_confidence: f32,
    pub denial_confidence: f32,
    /// Fixed confidence of the fail-open verdict
    pub error_confidence: f32,
    /// applianceScore - nonApplianceScore must exceed this
    pub min_score_gap: f32,
    pub min_appliance_score: f32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            brand_confidence: 0.9,
            keyword_confidence: 0.8,
            denial_confidence: 0.9,
            error_confidence: 0.5,
            min_score_gap: 0.3,
            min_appliance_score: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub threshold: f32,
    pub base_floor: f32,
    pub keyword_weight: f32,
    /// Multiplier for categories outside the detected brand's line-up
    pub off_brand_factor: f32,
    pub default_category: Category,
    pub default_confidence: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            base_floor: 0.1,
            keyword_weight: 0.3,
            off_brand_factor: 0.3,
            default_category: Category::AirPurifier,
            default_confidence: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    pub threshold: f32,
    pub canonical_size: u32,
    pub hue_bins: usize,
    pub saturation_bins: usize,
    pub canny_low: f32,
    pub canny_high: f32,
    pub color_weight: f32,
    pub edge_weight: f32,
    pub texture_weight: f32,
    pub max_concurrent_fetches: usize,
    pub fetch_timeout_secs: u64,
    /// Bound on search plus ranking; a timeout means no candidates
    pub search_timeout_secs: u64,
    /// Applied to the best similarity when it becomes the record's confidence
    pub match_confidence_boost: f32,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            canonical_size: 224,
            hue_bins: 50,
            saturation_bins: 60,
            canny_low: 50.0,
            canny_high: 150.0,
            color_weight: 0.5,
            edge_weight: 0.3,
            texture_weight: 0.2,
            max_concurrent_fetches: 4,
            fetch_timeout_secs: 10,
            search_timeout_secs: 15,
            match_confidence_boost: 1.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub deadline_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { deadline_secs: 30 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [classifier]
            threshold = 0.8

            [similarity]
            max_concurrent_fetches = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.classifier.threshold, 0.8);
        assert_eq!(config.classifier.base_floor, 0.1);
        assert_eq!(config.similarity.max_concurrent_fetches, 2);
        assert_eq!(config.similarity.threshold, 0.7);
        assert_eq!(config.gate.error_confidence, 0.5);
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut config = EngineConfig::default();
        config.similarity.threshold = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("similarity.threshold"));
    }

    #[test]
    fn rejects_blur_sigma_the_filter_cannot_use() {
        let mut config = EngineConfig::default();
        config.features.contrast_blur_sigma = 0.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("features.contrast_blur_sigma"));
    }

    #[test]
    fn rejects_negative_bonus() {
        let mut config = EngineConfig::default();
        config.features.organic_bonus = -0.2;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("features.organic_bonus"));
    }

    #[test]
    fn rejects_match_threshold_below_classifier_threshold() {
        let mut config = EngineConfig::default();
        // 0.5 x 1.2 = 0.6 < 0.7
        config.similarity.threshold = 0.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("similarity.threshold"));

        config.similarity.match_confidence_boost = 1.5;
        config.validate().unwrap();
    }

    #[test]
    fn rejects_zero_search_timeout() {
        let mut config = EngineConfig::default();
        config.similarity.search_timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("similarity.search_timeout_secs"));
    }

    #[test]
    fn ocr_backend_is_selected_by_name() {
        let config: EngineConfig =
            toml::from_str("[ocr]\nbackend = \"oar\"\nmodel_dir = \"/models\"\n").unwrap();
        assert_eq!(config.ocr.backend, OcrBackend::Oar);
        assert_eq!(EngineConfig::default().ocr.backend, OcrBackend::Ocrs);
    }

    #[test]
    fn load_reads_toml_file() -> anyhow::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "[gate]\nmin_score_gap = 0.25\n")?;

        let config = EngineConfig::load(&path)?;
        assert_eq!(config.gate.min_score_gap, 0.25);
        Ok(())
    }
}

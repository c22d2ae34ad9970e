use std::sync::Arc;
use tracing::{info, warn};

use crate::config::GateConfig;
use crate::error::FeatureError;
use crate::models::{ApplianceVerdict, Evidence, ExtractedText, GateState};
use crate::recognition::features::ImageFeatures;
use crate::recognition::lexicon::Lexicon;

/// Decides whether a photo shows a home appliance at all.
///
/// States are tried in order and the first that applies wins:
/// brand detected, appliance keyword, non-appliance keyword, then the
/// image-feature fallback. A failed feature computation lets the image
/// through with a fixed low confidence.
pub struct ApplianceGate {
    config: GateConfig,
    lexicon: Arc<Lexicon>,
}

impl ApplianceGate {
    pub fn new(config: GateConfig, lexicon: Arc<Lexicon>) -> Self {
        Self { config, lexicon }
    }

    pub fn evaluate(
        &self,
        texts: &[ExtractedText],
        features: Result<&ImageFeatures, &FeatureError>,
    ) -> ApplianceVerdict {
        if let Some(brand) = self.lexicon.detect_brand(texts) {
            info!(brand = %brand.id, "appliance by brand");
            return ApplianceVerdict {
                state: GateState::BrandDetected,
                is_appliance: true,
                confidence: self.config.brand_confidence,
                reason: format!("brand '{}' detected", brand.id),
                evidence: Some(Evidence::Brand {
                    brand: brand.id.clone(),
                }),
            };
        }

        let affirming = self.lexicon.detect_appliance_keywords(texts);
        if !affirming.is_empty() {
            info!(keywords = ?affirming, "appliance by keyword");
            return ApplianceVerdict {
                state: GateState::KeywordAffirmed,
                is_appliance: true,
                confidence: self.config.keyword_confidence,
                reason: format!("appliance keyword(s) detected: {}", affirming.join(", ")),
                evidence: Some(Evidence::Keywords { keywords: affirming }),
            };
        }

        let denying = self.lexicon.detect_non_appliance_keywords(texts);
        if !denying.is_empty() {
            info!(keywords = ?denying, "non-appliance by keyword");
            return ApplianceVerdict {
                state: GateState::KeywordDenied,
                is_appliance: false,
                confidence: self.config.denial_confidence,
                reason: format!("non-appliance keyword(s) detected: {}", denying.join(", ")),
                evidence: Some(Evidence::Keywords { keywords: denying }),
            };
        }

        match features {
            Ok(features) => self.feature_verdict(features),
            Err(err) => {
                warn!(error = %err, "feature analysis failed, letting image through");
                ApplianceVerdict {
                    state: GateState::ErrorFallback,
                    is_appliance: true,
                    confidence: self.config.error_confidence,
                    reason: "error fallback".to_string(),
                    evidence: None,
                }
            }
        }
    }

    fn feature_verdict(&self, features: &ImageFeatures) -> ApplianceVerdict {
        let gap = features.appliance_score - features.non_appliance_score;
        let is_appliance = gap > self.config.min_score_gap
            && features.appliance_score > self.config.min_appliance_score;

        let (confidence, reason) = if is_appliance {
            (features.appliance_score, "feature-analysis: appliance")
        } else {
            (features.non_appliance_score, "feature-analysis: non-appliance")
        };
        info!(
            is_appliance,
            appliance = features.appliance_score,
            non_appliance = features.non_appliance_score,
            "appliance decided by image features"
        );

        ApplianceVerdict {
            state: GateState::FeatureFallback,
            is_appliance,
            confidence: confidence.clamp(0.0, 1.0),
            reason: reason.to_string(),
            evidence: Some(Evidence::Features {
                features: features.clone(),
            }),
        }
    }
}

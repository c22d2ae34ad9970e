use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{ClassifierConfig, FeatureConfig};
use crate::models::{ClassificationResult, ExtractedText, Outcome, UNCLASSIFIABLE, UNKNOWN_BRAND};
use crate::recognition::features::{ImageFeatures, Measurements};
use crate::recognition::lexicon::{Brand, Lexicon};

/// Appliance categories the classifier can decide between.
/// Declaration order is the evaluation and tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Humidifier,
    AirPurifier,
    AirFryer,
    Microwave,
    RiceCooker,
    WashingMachine,
    Refrigerator,
    VacuumCleaner,
    Fan,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Humidifier,
        Category::AirPurifier,
        Category::AirFryer,
        Category::Microwave,
        Category::RiceCooker,
        Category::WashingMachine,
        Category::Refrigerator,
        Category::VacuumCleaner,
        Category::Fan,
    ];

    /// Name used in results and search queries
    pub fn label(self) -> &'static str {
        match self {
            Category::Humidifier => "가습기",
            Category::AirPurifier => "공기청정기",
            Category::AirFryer => "에어프라이어",
            Category::Microwave => "전자레인지",
            Category::RiceCooker => "밥솥",
            Category::WashingMachine => "세탁기",
            Category::Refrigerator => "냉장고",
            Category::VacuumCleaner => "청소기",
            Category::Fan => "선풍기",
        }
    }

    pub fn from_label(label: &str) -> Option<Category> {
        Category::ALL.into_iter().find(|c| c.label() == label)
    }

    pub fn english(self) -> &'static str {
        match self {
            Category::Humidifier => "humidifier",
            Category::AirPurifier => "air purifier",
            Category::AirFryer => "air fryer",
            Category::Microwave => "microwave",
            Category::RiceCooker => "rice cooker",
            Category::WashingMachine => "washing machine",
            Category::Refrigerator => "refrigerator",
            Category::VacuumCleaner => "vacuum cleaner",
            Category::Fan => "fan",
        }
    }

    /// Category-specific score contributed by image statistics alone
    pub fn image_bonus(self, m: &Measurements, cfg: &FeatureConfig) -> f32 {
        match self {
            Category::Humidifier => m.tank_blue_ratio * cfg.humidifier_blue_weight,
            Category::AirFryer => m.black_ratio * cfg.air_fryer_black_weight,
            Category::AirPurifier => {
                let tall = m.height as f32 > m.width as f32 * cfg.purifier_tall_ratio;
                let form = if tall { cfg.purifier_tall_bonus } else { 0.0 };
                form + m.white_ratio * cfg.purifier_white_weight
            }
            _ => 0.0,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CategoryScore {
    pub category: Category,
    pub score: f32,
}

/// Scores every known category and applies the confidence threshold
pub struct CategoryClassifier {
    config: ClassifierConfig,
    lexicon: Arc<Lexicon>,
}

impl CategoryClassifier {
    pub fn new(config: ClassifierConfig, lexicon: Arc<Lexicon>) -> Self {
        Self { config, lexicon }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Score all categories in declaration order.
    /// `features` is `None` when image statistics could not be computed.
    pub fn score_all(
        &self,
        features: Option<&ImageFeatures>,
        brand: Option<&Brand>,
        texts: &[ExtractedText],
    ) -> Vec<CategoryScore> {
        let keywords = self.lexicon.detect_category_keywords(texts);

        Category::ALL
            .iter()
            .map(|&category| {
                let hits = keywords.iter().filter(|k| k.category == category).count();
                let lexical = hits as f32 * self.config.keyword_weight;
                let visual = features.map(|f| f.category_score(category)).unwrap_or(0.0);
                let mut score = (lexical + visual).max(self.config.base_floor);

                if let Some(brand) = brand {
                    if !brand.categories.is_empty() && !brand.sells(category) {
                        score *= self.config.off_brand_factor;
                    }
                }

                CategoryScore { category, score }
            })
            .collect()
    }

    pub fn classify(
        &self,
        features: Option<&ImageFeatures>,
        brand: Option<&Brand>,
        texts: &[ExtractedText],
    ) -> ClassificationResult {
        let extracted: Vec<String> = texts.iter().map(|t| t.text.clone()).collect();

        let Some(brand) = brand else {
            let category = self.config.default_category;
            info!(category = %category, "no brand detected, applying default category");
            return ClassificationResult {
                success: false,
                outcome: Outcome::BrandUndetermined,
                category: category.label().to_string(),
                brand: UNKNOWN_BRAND.to_string(),
                confidence: self.config.default_confidence,
                message: "Brand undetermined; a default category was applied. \
                          Retake the photo with the brand name visible."
                    .to_string(),
                extracted_texts: extracted,
                ..ClassificationResult::failure(Outcome::BrandUndetermined, "")
            };
        };

        let scores = self.score_all(features, Some(brand), texts);
        debug!(brand = %brand.id, scores = ?scores, "category scores");

        let best = best_score(&scores);
        let confidence = best.map(|b| b.score).unwrap_or(0.0).clamp(0.0, 1.0);

        match best {
            Some(best) if best.score >= self.config.threshold => {
                info!(category = %best.category, confidence, "category classified");
                ClassificationResult {
                    success: true,
                    outcome: Outcome::Classified,
                    category: best.category.label().to_string(),
                    brand: brand.id.clone(),
                    confidence,
                    message: "Product classified successfully.".to_string(),
                    extracted_texts: extracted,
                    ..ClassificationResult::failure(Outcome::Classified, "")
                }
            }
            _ => {
                info!(confidence, threshold = self.config.threshold, "category below threshold");
                ClassificationResult {
                    success: false,
                    outcome: Outcome::Unclassifiable,
                    category: UNCLASSIFIABLE.to_string(),
                    brand: brand.id.clone(),
                    confidence,
                    message: "Low confidence. Retake the photo so the brand and model \
                              name are clearly visible."
                        .to_string(),
                    extracted_texts: extracted,
                    ..ClassificationResult::failure(Outcome::Unclassifiable, "")
                }
            }
        }
    }
}

/// Highest score; the earliest category wins ties
fn best_score(scores: &[CategoryScore]) -> Option<CategoryScore> {
    scores.iter().copied().fold(None, |best, s| match best {
        Some(b) if b.score >= s.score => Some(b),
        _ => Some(s),
    })
}

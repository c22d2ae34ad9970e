//! Brand, category and appliance keyword tables, and the matching rules over
//! recognized text.
//!
//! Every table is an ordered list. Matching walks the tables in declaration
//! order and the first hit wins, so results do not depend on hashing.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, LazyLock};
use tracing::debug;

use crate::error::ConfigError;
use crate::models::ExtractedText;
use crate::recognition::category::Category;

/// Serializable form of the keyword tables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexiconSpec {
    pub brands: Vec<BrandSpec>,
    pub categories: Vec<CategoryKeywordsSpec>,
    pub appliance_keywords: Vec<String>,
    pub non_appliance_keywords: Vec<String>,
    #[serde(default)]
    pub model_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandSpec {
    pub id: String,
    /// Case-insensitive regular expressions matched against the joined text
    pub patterns: Vec<String>,
    /// Categories the brand is known to sell
    #[serde(default)]
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryKeywordsSpec {
    pub category: Category,
    pub keywords: Vec<String>,
}

#[derive(Debug)]
pub struct Brand {
    pub id: String,
    patterns: Vec<Regex>,
    pub categories: Vec<Category>,
}

impl Brand {
    pub fn sells(&self, category: Category) -> bool {
        self.categories.contains(&category)
    }

    fn matching_pattern(&self, text: &str) -> Option<&Regex> {
        self.patterns.iter().find(|p| p.is_match(text))
    }
}

/// A category keyword found in the text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryKeyword {
    pub category: Category,
    pub keyword: String,
}

/// Compiled, immutable keyword tables
#[derive(Debug)]
pub struct Lexicon {
    brands: Vec<Brand>,
    categories: Vec<(Category, Vec<String>)>,
    appliance_keywords: Vec<String>,
    non_appliance_keywords: Vec<String>,
    model_patterns: Vec<Regex>,
}

static BUILTIN: LazyLock<Arc<Lexicon>> = LazyLock::new(|| {
    Arc::new(Lexicon::compile(LexiconSpec::builtin()).expect("built-in lexicon must compile"))
});

impl Lexicon {
    /// Process-wide built-in tables, compiled on first use
    pub fn builtin() -> Arc<Lexicon> {
        BUILTIN.clone()
    }

    /// Load replacement tables from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let spec: LexiconSpec = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        Self::compile(spec)
    }

    pub fn compile(spec: LexiconSpec) -> Result<Self, ConfigError> {
        let mut brands = Vec::with_capacity(spec.brands.len());
        for brand in spec.brands {
            let mut patterns = Vec::with_capacity(brand.patterns.len());
            for pattern in &brand.patterns {
                let regex = Regex::new(&format!("(?i){pattern}")).map_err(|source| {
                    ConfigError::InvalidPattern {
                        brand: brand.id.clone(),
                        pattern: pattern.clone(),
                        source,
                    }
                })?;
                patterns.push(regex);
            }
            brands.push(Brand {
                id: brand.id.to_lowercase(),
                patterns,
                categories: brand.categories,
            });
        }

        let mut model_patterns = Vec::with_capacity(spec.model_patterns.len());
        for pattern in &spec.model_patterns {
            let regex = Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                brand: "<model>".to_string(),
                pattern: pattern.clone(),
                source,
            })?;
            model_patterns.push(regex);
        }

        Ok(Self {
            brands,
            categories: spec
                .categories
                .into_iter()
                .map(|c| (c.category, lowercase_all(c.keywords)))
                .collect(),
            appliance_keywords: lowercase_all(spec.appliance_keywords),
            non_appliance_keywords: lowercase_all(spec.non_appliance_keywords),
            model_patterns,
        })
    }

    /// All recognized text, lower-cased and joined with spaces
    pub fn joined_text(texts: &[ExtractedText]) -> String {
        texts
            .iter()
            .map(|t| t.text.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn brand(&self, id: &str) -> Option<&Brand> {
        self.brands.iter().find(|b| b.id == id)
    }

    /// First brand (in table order) with a surface form present in the text
    pub fn detect_brand(&self, texts: &[ExtractedText]) -> Option<&Brand> {
        let text = Self::joined_text(texts);
        for brand in &self.brands {
            if let Some(pattern) = brand.matching_pattern(&text) {
                debug!(brand = %brand.id, pattern = %pattern.as_str(), "brand detected");
                return Some(brand);
            }
        }
        None
    }

    pub fn detect_category_keywords(&self, texts: &[ExtractedText]) -> Vec<CategoryKeyword> {
        let text = Self::joined_text(texts);
        let mut found = Vec::new();
        for (category, keywords) in &self.categories {
            for keyword in keywords {
                if text.contains(keyword.as_str()) {
                    found.push(CategoryKeyword {
                        category: *category,
                        keyword: keyword.clone(),
                    });
                }
            }
        }
        found
    }

    pub fn detect_appliance_keywords(&self, texts: &[ExtractedText]) -> Vec<String> {
        matching_keywords(&self.appliance_keywords, &Self::joined_text(texts))
    }

    pub fn detect_non_appliance_keywords(&self, texts: &[ExtractedText]) -> Vec<String> {
        matching_keywords(&self.non_appliance_keywords, &Self::joined_text(texts))
    }

    /// First model code found, scanning texts in order and patterns in table order
    pub fn detect_model_number(&self, texts: &[ExtractedText]) -> Option<String> {
        texts.iter().find_map(|t| self.model_code(&t.text))
    }

    /// Model code embedded in a product listing title
    pub fn model_from_title(&self, title: &str) -> Option<String> {
        self.model_code(title).or_else(|| {
            static DIGITS: LazyLock<Regex> =
                LazyLock::new(|| Regex::new(r"\d{3,4}").expect("static regex"));
            DIGITS.find(title).map(|m| m.as_str().to_string())
        })
    }

    fn model_code(&self, text: &str) -> Option<String> {
        let upper = text.to_uppercase();
        self.model_patterns
            .iter()
            .find_map(|p| p.find(&upper))
            .map(|m| m.as_str().to_string())
    }

    /// Search keywords for a brand: its surface forms without regex syntax
    pub fn brand_keyword(&self, id: &str) -> Option<String> {
        self.brand(id)?
            .patterns
            .iter()
            .map(|p| p.as_str().trim_start_matches("(?i)").to_string())
            .find(|p| p.chars().all(|c| c.is_alphanumeric()))
    }
}

fn lowercase_all(words: Vec<String>) -> Vec<String> {
    words.into_iter().map(|w| w.to_lowercase()).collect()
}

fn matching_keywords(keywords: &[String], text: &str) -> Vec<String> {
    keywords
        .iter()
        .filter(|k| text.contains(k.as_str()))
        .cloned()
        .collect()
}

fn strings(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

impl LexiconSpec {
    /// The tables the engine ships with
    pub fn builtin() -> Self {
        use Category::*;

        let brand = |id: &str, patterns: &[&str], categories: &[Category]| BrandSpec {
            id: id.to_string(),
            patterns: strings(patterns),
            categories: categories.to_vec(),
        };
        let keywords = |category: Category, words: &[&str]| CategoryKeywordsSpec {
            category,
            keywords: strings(words),
        };

        Self {
            brands: vec![
                brand(
                    "samsung",
                    &["samsung", "삼성", "galaxy", "갤럭시", "snmsung", r"\bsm\b"],
                    &[
                        Humidifier,
                        AirPurifier,
                        AirFryer,
                        Microwave,
                        RiceCooker,
                        WashingMachine,
                        Refrigerator,
                    ],
                ),
                brand(
                    "lg",
                    &["lg", "엘지", r"life'?s?\s*good"],
                    &[
                        Humidifier,
                        AirPurifier,
                        AirFryer,
                        Microwave,
                        RiceCooker,
                        WashingMachine,
                        Refrigerator,
                    ],
                ),
                brand("philips", &["philips", "필립스", "飛利浦"], &[AirFryer, AirPurifier]),
                brand("cuckoo", &["cuckoo", "쿠쿠", "뻐꾸기"], &[RiceCooker, AirPurifier]),
                brand("winix", &["winix", "위닉스"], &[AirPurifier, Humidifier]),
                brand(
                    "xiaomi",
                    &["xiaomi", "샤오미", r"\bmi\b", "小米"],
                    &[AirPurifier, Humidifier],
                ),
                brand(
                    "dyson",
                    &["dyson", "다이슨"],
                    &[VacuumCleaner, AirPurifier, Fan],
                ),
                brand(
                    "sharp",
                    &["sharp", "샤프", "シャープ"],
                    &[AirPurifier, Humidifier, Microwave],
                ),
                brand(
                    "panasonic",
                    &["panasonic", "파나소닉", "パナソニック"],
                    &[Microwave, RiceCooker],
                ),
            ],
            categories: vec![
                keywords(
                    Humidifier,
                    &["humidifier", "mist", "water", "tank", "물탱크", "가습", "습도"],
                ),
                keywords(
                    AirPurifier,
                    &["air purifier", "hepa", "filter", "공기", "정화", "필터"],
                ),
                keywords(AirFryer, &["air fryer", "basket", "바스켓", "튀김", "오일프리"]),
                keywords(Microwave, &["microwave", "micro", "전자레인지", "데우기"]),
                keywords(RiceCooker, &["rice cooker", "pressure", "밥솥", "취사", "압력"]),
                keywords(WashingMachine, &["washing machine", "wash", "세탁", "드럼"]),
                keywords(Refrigerator, &["refrigerator", "fridge", "냉장", "냉동"]),
                keywords(VacuumCleaner, &["vacuum", "cleaner", "청소", "먼지"]),
                keywords(Fan, &["fan", "선풍기", "바람"]),
            ],
            appliance_keywords: strings(&[
                "humidifier", "air purifier", "microwave", "refrigerator", "washing machine",
                "vacuum", "fan", "rice cooker", "blender", "toaster", "coffee maker",
                "가습기", "공기청정기", "전자레인지", "냉장고", "세탁기", "청소기", "선풍기", "밥솥",
            ]),
            non_appliance_keywords: strings(&[
                "cat", "dog", "animal", "pet", "person", "human", "face", "head", "body",
                "food", "fruit", "vegetable", "cake", "bread", "meat", "fish", "chicken",
                "car", "bike", "motorcycle", "bus", "truck", "vehicle", "transport",
                "tree", "flower", "grass", "mountain", "sea", "nature", "landscape",
                "house", "building", "office", "store", "school", "architecture",
                "chair", "table", "bed", "sofa", "desk", "furniture",
                "shirt", "pants", "dress", "shoes", "hat", "clothing", "fashion",
                "book", "magazine", "newspaper", "document", "paper",
                "고양이", "강아지", "동물", "사람", "얼굴", "머리", "몸",
                "음식", "과일", "채소", "케이크", "빵", "고기", "생선", "닭고기",
                "자동차", "자전거", "오토바이", "버스", "트럭", "교통수단",
                "나무", "꽃", "풀", "산", "바다", "자연", "풍경",
                "집", "건물", "사무실", "상점", "학교", "건축",
                "의자", "테이블", "침대", "소파", "책상", "가구",
                "셔츠", "바지", "드레스", "신발", "모자", "옷", "패션",
                "책", "잡지", "신문", "문서", "종이",
                "feline", "canine", "mammal", "creature", "beast",
                "고양이과", "개과", "포유류", "생물", "짐승",
            ]),
            model_patterns: strings(&[
                r"[A-Z]{2,3}-\d{4}[A-Z]?",
                r"[A-Z]{2,3}\d{4}[A-Z]?",
                r"[A-Z]{2,3}-\d{3}[A-Z]?",
                r"[A-Z]{2,3}\d{3}[A-Z]?",
                r"\d{4}[A-Z]{2,3}",
                r"[A-Z]{2,3}-\d{2}[A-Z]?",
            ]),
        }
    }
}

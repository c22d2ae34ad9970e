pub mod category;
pub mod contours;
pub mod features;
pub mod gate;
pub mod lexicon;
#[cfg(feature = "korean-ocr")]
pub mod oar;
pub mod ocr;
pub mod preprocessing;

pub use category::{Category, CategoryClassifier, CategoryScore};
pub use features::{ImageFeatureAnalyzer, ImageFeatures, Measurements, Signal};
pub use gate::ApplianceGate;
pub use lexicon::{Brand, CategoryKeyword, Lexicon, LexiconSpec};
pub use ocr::{OcrsRecognizer, TextExtractor, TextRecognizer};

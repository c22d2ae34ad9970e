pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod recognition;
pub mod search;
pub mod similarity;

pub use config::EngineConfig;
pub use error::{ConfigError, FeatureError, ImageLoadError};
pub use models::{
    ApplianceVerdict, BoundingBox, CandidateProduct, ClassificationResult, Contour, Evidence,
    ExtractedText, GateState, MatchResult, Outcome,
};
pub use pipeline::{DebugConfig, RecognitionPipeline};
pub use recognition::{Category, Lexicon, TextExtractor};
pub use search::{CandidateSearch, HttpImageFetcher, ImageFetcher, JsonCandidateSearch, SearchQuery};
pub use similarity::{SimilarityMatcher, VisualDescriptor};

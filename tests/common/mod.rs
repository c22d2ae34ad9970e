mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from applens for tests
pub use applens::{
    CandidateProduct, ClassificationResult, EngineConfig, ExtractedText, GateState, Lexicon,
    Outcome, RecognitionPipeline, TextExtractor,
};

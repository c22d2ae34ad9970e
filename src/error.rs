use thiserror::Error;

/// Configuration and keyword-table loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Invalid pattern '{pattern}' for brand '{brand}': {source}")]
    InvalidPattern {
        brand: String,
        pattern: String,
        source: regex::Error,
    },
}

/// Image statistics could not be computed
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("Image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("Feature analysis aborted: {0}")]
    Aborted(String),
}

/// The supplied image could not be turned into pixels
#[derive(Debug, Error)]
pub enum ImageLoadError {
    #[error("Failed to open image {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Image is empty")]
    Empty,
}

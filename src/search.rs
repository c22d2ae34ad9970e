//! Collaborators that supply candidate products and their images.

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::models::CandidateProduct;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// What the engine asks the candidate search for
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchQuery {
    /// Brand id, e.g. "lg"
    pub brand: String,
    /// Category label, e.g. "가습기"
    pub category: String,
    pub image_path: Option<PathBuf>,
    /// First plain surface form of the brand, if any
    pub brand_keyword: Option<String>,
}

impl SearchQuery {
    /// Free-text terms for collaborators that search by keyword
    pub fn keywords(&self) -> String {
        let brand = self.brand_keyword.as_deref().unwrap_or(&self.brand);
        format!("{} {}", brand, self.category).trim().to_string()
    }
}

#[async_trait]
pub trait CandidateSearch: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> anyhow::Result<Vec<CandidateProduct>>;
}

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> anyhow::Result<Vec<u8>>;
}

/// Search that never returns candidates
pub struct NoCandidateSearch;

#[async_trait]
impl CandidateSearch for NoCandidateSearch {
    async fn search(&self, _query: &SearchQuery) -> anyhow::Result<Vec<CandidateProduct>> {
        Ok(Vec::new())
    }
}

/// Candidates read from a JSON array of products on disk.
///
/// The file is re-read on every search so it can be edited between runs.
pub struct JsonCandidateSearch {
    path: PathBuf,
}

impl JsonCandidateSearch {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CandidateSearch for JsonCandidateSearch {
    async fn search(&self, query: &SearchQuery) -> anyhow::Result<Vec<CandidateProduct>> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read candidates {}", self.path.display()))?;
        let candidates: Vec<CandidateProduct> = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid candidate list {}", self.path.display()))?;
        info!(
            keywords = %query.keywords(),
            count = candidates.len(),
            path = %self.path.display(),
            "loaded candidate products"
        );
        Ok(candidates)
    }
}

/// Downloads candidate images over HTTP; `file://` URLs and bare paths are read from disk
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        if url.starts_with("http://") || url.starts_with("https://") {
            debug!(url = %url, "downloading candidate image");
            let response = self.client.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                anyhow::bail!("HTTP {} for {}", status.as_u16(), url);
            }
            return Ok(response.bytes().await?.to_vec());
        }

        let path = Path::new(url.strip_prefix("file://").unwrap_or(url));
        tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
    }
}

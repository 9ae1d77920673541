//! The catalog fetcher contract.
//!
//! A [`CatalogFetcher`] retrieves exactly one page of the external catalog
//! per call. Implementations make a single attempt: no retries and no
//! caching. Failures are classified by [`FetchError`] so dispatchers can log
//! or propagate them uniformly.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::CatalogPage;

/// Why a page fetch failed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The transport call could not complete (timeout, refused, DNS).
    #[error("catalog request failed: {0}")]
    Network(String),

    /// The service answered with a non-success status.
    #[error("catalog API error {code}: {body}")]
    BadStatus { code: u16, body: String },

    /// The response body did not match the expected page shape.
    #[error("failed to decode catalog response: {0}")]
    Decode(String),
}

impl FetchError {
    /// Short machine-readable kind, used in logs and failure reports.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Network(_) => "network",
            FetchError::BadStatus { .. } => "bad_status",
            FetchError::Decode(_) => "decode",
        }
    }
}

/// Fetches one page of catalog data.
///
/// Called concurrently from dispatcher workers; implementations must not
/// hold per-call mutable state.
#[async_trait]
pub trait CatalogFetcher: Send + Sync {
    /// Fetch page `page` (1-based) with `limit` items per page.
    async fn fetch_page(&self, page: u32, limit: usize) -> Result<CatalogPage, FetchError>;
}

//! HTTP client for the external product catalog.
//!
//! [`HttpCatalogClient`] implements [`CatalogFetcher`] against
//! `GET {base_url}?page={page}&limit={limit}`. Each call is a single
//! attempt: there is no retry, backoff, or caching. Failures map onto
//! [`FetchError`]:
//!
//! - transport errors and timeouts → [`FetchError::Network`]
//! - any non-2xx status → [`FetchError::BadStatus`] with the response body
//! - a body that is not a catalog page → [`FetchError::Decode`]

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use catalog_reconcile_core::fetch::{CatalogFetcher, FetchError};
use catalog_reconcile_core::models::CatalogPage;
use reqwest::Url;
use tracing::debug;

use crate::config::CatalogConfig;

/// Catalog fetcher bound to one base URL.
#[derive(Debug, Clone)]
pub struct HttpCatalogClient {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpCatalogClient {
    /// Builds a client from the `[catalog]` section.
    ///
    /// An unparsable base URL is a configuration error and fails here, not
    /// on the first fetch.
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("invalid catalog base URL: {}", config.base_url))?;

        let mut builder = reqwest::Client::builder();
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }
        let client = builder.build().context("failed to build HTTP client")?;

        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The request URL for one page. Query parameters already on the base
    /// URL are kept; `page` and `limit` are replaced.
    pub fn page_url(&self, page: u32, limit: usize) -> Url {
        let mut url = self.base_url.clone();
        let retained: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != "page" && k != "limit")
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        url.query_pairs_mut()
            .clear()
            .extend_pairs(retained)
            .append_pair("page", &page.to_string())
            .append_pair("limit", &limit.to_string());
        url
    }
}

#[async_trait]
impl CatalogFetcher for HttpCatalogClient {
    async fn fetch_page(&self, page: u32, limit: usize) -> Result<CatalogPage, FetchError> {
        let url = self.page_url(page, limit);
        debug!(url = %url, "Fetching catalog page {}", page);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::BadStatus {
                code: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        serde_json::from_slice(&bytes).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

//! Precedent store client.
//!
//! The corpus of prior enforcement cases lives behind an external hybrid
//! (lexical + vector) search service. This module wraps it in the narrow
//! [`PrecedentStore`] contract the pipeline depends on: `search` returns
//! ranked chunk-level hits, `fetch_detail` returns the full case record with
//! supporting text chunks. Ingestion, chunking, and embedding of the corpus
//! are the service's problem, not ours.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::config::{RetrievalConfig, StoreConfig};
use crate::models::{PrecedentCase, SearchHit};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Http(reqwest::Error),
    #[error("store returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("malformed store response: {0}")]
    Malformed(String),
    #[error("store call timed out")]
    Timeout,
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(err)
        }
    }
}

/// Narrow retrieval contract consumed by the pipeline. Mocked in tests.
#[async_trait]
pub trait PrecedentStore: Send + Sync {
    /// Hybrid search over the precedent corpus. Returns ranked hits, best
    /// first, at most the configured candidate limit.
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, StoreError>;

    /// Fetch the full case record plus supporting detail chunks.
    async fn fetch_detail(&self, case_id: &str) -> Result<PrecedentCase, StoreError>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Vec<SearchHit>,
}

/// HTTP client for the precedent search service.
pub struct HttpPrecedentStore {
    client: reqwest::Client,
    base_url: String,
    candidate_limit: usize,
    chunk_limit: usize,
}

impl HttpPrecedentStore {
    /// Create a client for the given store base URL (no trailing slash
    /// needed). The per-request timeout comes from `[store] timeout_secs`.
    pub fn new(store: &StoreConfig, retrieval: &RetrievalConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(store.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: store.url.trim_end_matches('/').to_string(),
            candidate_limit: retrieval.candidate_limit,
            chunk_limit: retrieval.detail_chunk_limit,
        })
    }

    async fn read_body(resp: reqwest::Response) -> Result<String, StoreError> {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(StoreError::Server {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl PrecedentStore for HttpPrecedentStore {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, StoreError> {
        let url = format!("{}/search", self.base_url);
        let body = serde_json::json!({
            "query": query,
            "limit": self.candidate_limit,
        });

        let resp = self.client.post(&url).json(&body).send().await?;
        let text = Self::read_body(resp).await?;
        let parsed: SearchResponse =
            serde_json::from_str(&text).map_err(|e| StoreError::Malformed(e.to_string()))?;

        info!(hits = parsed.hits.len(), "precedent search complete");
        Ok(parsed.hits)
    }

    async fn fetch_detail(&self, case_id: &str) -> Result<PrecedentCase, StoreError> {
        let url = format!(
            "{}/cases/{}?chunks={}",
            self.base_url, case_id, self.chunk_limit
        );

        let resp = self.client.get(&url).send().await?;
        let text = Self::read_body(resp).await?;
        let case: PrecedentCase =
            serde_json::from_str(&text).map_err(|e| StoreError::Malformed(e.to_string()))?;
        Ok(case)
    }
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    pub oracle: OracleConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

/// Connection settings for the external precedent search service.
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub url: String,
    #[serde(default = "default_store_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_store_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Ranked hits requested from the store before deduplication.
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,
    /// Unique precedent cases kept for deep analysis.
    #[serde(default = "default_shortlist_size")]
    pub shortlist_size: usize,
    /// Supporting chunks requested per case detail fetch.
    #[serde(default = "default_detail_chunk_limit")]
    pub detail_chunk_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            candidate_limit: default_candidate_limit(),
            shortlist_size: default_shortlist_size(),
            detail_chunk_limit: default_detail_chunk_limit(),
        }
    }
}

fn default_candidate_limit() -> usize {
    50
}
fn default_shortlist_size() -> usize {
    5
}
fn default_detail_chunk_limit() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    /// Concurrent oracle calls, shared across in-flight requests. Clamped to
    /// [`crate::analysis::MAX_CONCURRENCY`] to protect the oracle from bursts.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Bound on one similarity worker, retries included.
    #[serde(default = "default_worker_timeout_secs")]
    pub worker_timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            worker_timeout_secs: default_worker_timeout_secs(),
        }
    }
}

fn default_max_concurrency() -> usize {
    5
}
fn default_worker_timeout_secs() -> u64 {
    20
}

/// Connection settings for the reasoning oracle (an OpenAI-compatible chat
/// completions endpoint). The API key is read from `OPENAI_API_KEY`.
#[derive(Debug, Deserialize, Clone)]
pub struct OracleConfig {
    pub url: String,
    pub model: String,
    #[serde(default = "default_oracle_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_oracle_max_retries")]
    pub max_retries: u32,
}

fn default_oracle_timeout_secs() -> u64 {
    20
}
fn default_oracle_max_retries() -> u32 {
    2
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    Ok(config)
}

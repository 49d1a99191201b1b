//! Reasoning oracle client.
//!
//! The oracle is an external LLM service consumed through the narrow
//! [`ReasoningOracle`] capability: `score` compares the input case against
//! one precedent and returns a bounded similarity verdict, `narrate` turns
//! the weighted evidence into a prose rationale. It is non-deterministic and
//! retryable at the call level; it never drives control flow and never
//! touches the numeric estimate.
//!
//! # Retry Strategy
//!
//! Transient failures (HTTP 429, 5xx, network errors) retry with exponential
//! backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5). Other 4xx responses
//! fail immediately.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::config::OracleConfig;
use crate::models::{CaseInput, PrecedentCase, SimilarityAssessment};

/// Environment variable holding the oracle API key.
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";

/// Chunks of precedent detail included in a score prompt.
const PROMPT_CHUNK_LIMIT: usize = 5;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle request failed: {0}")]
    Http(reqwest::Error),
    #[error("oracle returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("malformed oracle response: {0}")]
    Malformed(String),
    #[error("OPENAI_API_KEY environment variable not set")]
    MissingApiKey,
    #[error("oracle call timed out")]
    Timeout,
}

impl From<reqwest::Error> for OracleError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(err)
        }
    }
}

/// Narrow reasoning capability consumed by the pipeline. Mocked in tests.
#[async_trait]
pub trait ReasoningOracle: Send + Sync {
    /// Score how similar one precedent is to the input case, 0–100, with a
    /// justification.
    async fn score(
        &self,
        input: &CaseInput,
        precedent: &PrecedentCase,
    ) -> Result<SimilarityAssessment, OracleError>;

    /// Produce a prose rationale for an already-computed fine estimate from
    /// the weighted evidence. The returned text must not be parsed for
    /// numbers — the estimate is fixed before this call.
    async fn narrate(
        &self,
        input: &CaseInput,
        evidence: &[(PrecedentCase, SimilarityAssessment)],
        predicted_fine: u64,
    ) -> Result<String, OracleError>;
}

/// Client for an OpenAI-compatible chat completions endpoint.
pub struct HttpOracle {
    client: reqwest::Client,
    base_url: String,
    model: String,
    max_retries: u32,
}

impl HttpOracle {
    pub fn new(config: &OracleConfig) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }

    /// One chat completion with retry/backoff. Returns the assistant text.
    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        let api_key = std::env::var(API_KEY_VAR).map_err(|_| OracleError::MissingApiKey)?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": 0.1,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return extract_content(&json);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(OracleError::Server {
                            status: status.as_u16(),
                            body: body_text,
                        });
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(OracleError::Server {
                        status: status.as_u16(),
                        body: body_text,
                    });
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| OracleError::Malformed("no attempts were made".to_string())))
    }
}

#[async_trait]
impl ReasoningOracle for HttpOracle {
    async fn score(
        &self,
        input: &CaseInput,
        precedent: &PrecedentCase,
    ) -> Result<SimilarityAssessment, OracleError> {
        let prompt = build_score_prompt(input, precedent);
        let content = self.complete(&prompt).await?;
        parse_assessment(&content, &precedent.id)
    }

    async fn narrate(
        &self,
        input: &CaseInput,
        evidence: &[(PrecedentCase, SimilarityAssessment)],
        predicted_fine: u64,
    ) -> Result<String, OracleError> {
        let prompt = build_narrate_prompt(input, evidence, predicted_fine);
        let content = self.complete(&prompt).await?;
        let text = content.trim();
        if text.is_empty() {
            return Err(OracleError::Malformed("empty rationale".to_string()));
        }
        Ok(text.to_string())
    }
}

fn extract_content(json: &serde_json::Value) -> Result<String, OracleError> {
    json["choices"][0]["message"]["content"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| OracleError::Malformed("missing choices[0].message.content".to_string()))
}

// ============ Prompts ============

fn classification_block(input: &CaseInput) -> String {
    format!(
        "- Lawfulness of Processing: {}\n\
         - Data Subject Rights: {}\n\
         - Risk Management: {}\n\
         - Accountability: {}",
        input.lawfulness.as_str(),
        input.rights.as_str(),
        input.risk.as_str(),
        input.governance.as_str(),
    )
}

fn build_score_prompt(input: &CaseInput, precedent: &PrecedentCase) -> String {
    let detail = if precedent.chunks.is_empty() {
        precedent.description.clone()
    } else {
        precedent
            .chunks
            .iter()
            .take(PROMPT_CHUNK_LIMIT)
            .cloned()
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    format!(
        "You are an expert legal analyst specializing in GDPR breach impact assessment.\n\
         \n\
         QUERY CASE:\n\
         Description: {}\n\
         Classifications:\n{}\n\
         \n\
         PRECEDENT CASE:\n\
         Company: {}\n\
         Violation: {}\n\
         Fine: EUR {}\n\
         Date: {}\n\
         Authority: {}\n\
         \n\
         DETAILED CASE CONTENT:\n{}\n\
         \n\
         Analyze the similarity between these two cases. Focus on the type of \
         violation and circumstances, the GDPR articles involved, sector and \
         scale similarities, the regulatory authority's approach, and severity \
         and impact factors.\n\
         \n\
         Format your response as:\n\
         SIMILARITY_SCORE: [0-100]\n\
         EXPLANATION: [detailed explanation]",
        input.description,
        classification_block(input),
        precedent.company,
        precedent.description,
        precedent.fine,
        precedent.date,
        precedent.authority,
        detail,
    )
}

fn build_narrate_prompt(
    input: &CaseInput,
    evidence: &[(PrecedentCase, SimilarityAssessment)],
    predicted_fine: u64,
) -> String {
    let mut cases_summary = String::new();
    for (i, (case, assessment)) in evidence.iter().enumerate() {
        cases_summary.push_str(&format!(
            "Case {}: {} - EUR {} (similarity {}%): {}\n",
            i + 1,
            case.company,
            case.fine,
            assessment.similarity,
            assessment.explanation,
        ));
    }

    format!(
        "You are an expert GDPR legal analyst explaining a fine estimate.\n\
         \n\
         QUERY CASE:\n\
         Description: {}\n\
         Classifications:\n{}\n\
         \n\
         SIMILAR PRECEDENT CASES:\n{}\n\
         The estimate of EUR {} was computed as a similarity-weighted average \
         of the precedent fines. Do not propose a different figure. Explain \
         the reasoning behind this estimate: which precedents dominate the \
         weighting and why, and which aggravating or mitigating factors in \
         the query case a regulator would likely consider.",
        input.description,
        classification_block(input),
        cases_summary,
        predicted_fine,
    )
}

// ============ Response parsing ============

/// Parse a `SIMILARITY_SCORE:` / `EXPLANATION:` response.
///
/// The score marker is required; a present-but-unparsable score falls back
/// to 50 (middle of the range) rather than failing the call. Values outside
/// [0,100] are clamped. Explanation text may continue over multiple lines.
pub(crate) fn parse_assessment(
    content: &str,
    precedent_id: &str,
) -> Result<SimilarityAssessment, OracleError> {
    let mut similarity: Option<u8> = None;
    let mut explanation = String::new();
    let mut in_explanation = false;

    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("SIMILARITY_SCORE:") {
            similarity = Some(match rest.trim().parse::<i64>() {
                Ok(value) => value.clamp(0, 100) as u8,
                Err(_) => 50,
            });
            in_explanation = false;
        } else if let Some(rest) = line.strip_prefix("EXPLANATION:") {
            explanation = rest.trim().to_string();
            in_explanation = true;
        } else if in_explanation {
            let line = line.trim();
            if !line.is_empty() {
                if !explanation.is_empty() {
                    explanation.push(' ');
                }
                explanation.push_str(line);
            }
        }
    }

    let similarity = similarity
        .ok_or_else(|| OracleError::Malformed("missing SIMILARITY_SCORE marker".to_string()))?;

    Ok(SimilarityAssessment {
        precedent_id: precedent_id.to_string(),
        similarity,
        explanation,
    })
}

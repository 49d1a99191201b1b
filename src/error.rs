//! Error taxonomy for the prediction pipeline.
//!
//! Only fatal kinds appear here: per-worker oracle failures are absorbed by
//! the analysis fallback policy and never surface as a request failure, and
//! a low-confidence aggregation is a flag in the explanation text, not an
//! error.

use std::fmt;

use thiserror::Error;

use crate::store::StoreError;

/// Pipeline stages, in execution order. Used for tracing and for attributing
/// timeouts to the stage that exceeded its bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    Retrieving,
    Selecting,
    FetchingDetails,
    Analyzing,
    Aggregating,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::Retrieving => "retrieving",
            Self::Selecting => "selecting",
            Self::FetchingDetails => "fetching_details",
            Self::Analyzing => "analyzing",
            Self::Aggregating => "aggregating",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fatal request-level failures, mapped to the external error contract.
#[derive(Debug, Error)]
pub enum PredictError {
    /// Bad enum value or missing/empty field. Rejected before any external
    /// call; never retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The precedent store is unreachable or returned malformed results.
    /// Fatal: a prediction without any precedent basis is disallowed.
    #[error("precedent retrieval failed: {0}")]
    Retrieval(#[source] StoreError),

    /// The shortlist came up empty: zero hits, or every candidate's detail
    /// fetch failed.
    #[error("no precedent cases matched the query")]
    NoPrecedentsFound,

    /// A stage exceeded its time bound.
    #[error("{0} stage exceeded its time bound")]
    Timeout(Stage),
}

impl PredictError {
    /// Machine-readable taxonomy kind, used as the `code` field of error
    /// response bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::Retrieval(_) => "retrieval_error",
            Self::NoPrecedentsFound => "no_precedents_found",
            Self::Timeout(_) => "timeout",
        }
    }

    /// HTTP status for the external response contract.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidInput(_) => 400,
            Self::Retrieval(_) => 502,
            Self::NoPrecedentsFound => 422,
            Self::Timeout(_) => 504,
        }
    }
}

impl From<crate::models::InvalidLabel> for PredictError {
    fn from(err: crate::models::InvalidLabel) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

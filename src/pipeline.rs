//! Pipeline controller.
//!
//! Sequences the stages of one prediction request:
//! validating → retrieving → selecting → fetching details → analyzing →
//! aggregating. Validation happens at the edge ([`CaseInput::parse`]);
//! everything from retrieval onward runs here. The analysis stage is
//! internally parallel but externally atomic: the controller only ever
//! observes the complete joined result.
//!
//! Cancellation is cooperative: every suspension point is an awaited I/O
//! call, so dropping the [`Predictor::predict`] future (axum drops handler
//! futures when the caller disconnects) aborts the in-flight store call or
//! the whole analysis fan-out.

use std::cmp::Reverse;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::aggregate;
use crate::analysis::{self, MAX_CONCURRENCY};
use crate::config::Config;
use crate::error::{PredictError, Stage};
use crate::models::{CaseInput, PipelineResult, PrecedentCase, SimilarityAssessment};
use crate::oracle::ReasoningOracle;
use crate::select::select_candidates;
use crate::store::{PrecedentStore, StoreError};

/// One configured prediction pipeline. Cheap to share behind an `Arc`; the
/// analysis semaphore inside it bounds oracle concurrency across every
/// request served by this instance.
pub struct Predictor {
    store: Arc<dyn PrecedentStore>,
    oracle: Arc<dyn ReasoningOracle>,
    analysis_permits: Arc<Semaphore>,
    shortlist_size: usize,
    worker_timeout: Duration,
    narrate_timeout: Duration,
}

impl Predictor {
    pub fn new(
        store: Arc<dyn PrecedentStore>,
        oracle: Arc<dyn ReasoningOracle>,
        config: &Config,
    ) -> Self {
        let permits = config.analysis.max_concurrency.clamp(1, MAX_CONCURRENCY);
        Self {
            store,
            oracle,
            analysis_permits: Arc::new(Semaphore::new(permits)),
            shortlist_size: config.retrieval.shortlist_size.max(1),
            worker_timeout: Duration::from_secs(config.analysis.worker_timeout_secs),
            narrate_timeout: Duration::from_secs(config.oracle.timeout_secs),
        }
    }

    /// Run the full pipeline for one validated case.
    pub async fn predict(&self, input: CaseInput) -> Result<PipelineResult, PredictError> {
        debug!(stage = %Stage::Validating, "input validated at the edge");

        // Retrieving: fatal on any store failure, no fallback.
        debug!(stage = %Stage::Retrieving, "querying precedent store");
        let hits = self
            .store
            .search(&input.search_query())
            .await
            .map_err(|e| match e {
                StoreError::Timeout => PredictError::Timeout(Stage::Retrieving),
                other => PredictError::Retrieval(other),
            })?;
        debug!(
            stage = %Stage::Retrieving,
            hits = hits.len(),
            best_score = hits.first().map(|h| h.score),
            "ranked candidates received"
        );

        // Selecting: stable dedupe + truncate.
        let shortlist = select_candidates(&hits, self.shortlist_size)?;
        debug!(stage = %Stage::Selecting, unique = shortlist.len(), "shortlist selected");

        // Fetching details: per-candidate failure isolation. A candidate
        // whose detail fetch fails is dropped, not the request.
        let mut cases: Vec<PrecedentCase> = Vec::with_capacity(shortlist.len());
        for case_id in &shortlist {
            match self.store.fetch_detail(case_id).await {
                Ok(case) => cases.push(case),
                Err(e) => {
                    warn!(stage = %Stage::FetchingDetails, case_id = %case_id, error = %e,
                        "dropping candidate after failed detail fetch");
                }
            }
        }
        if cases.is_empty() {
            return Err(PredictError::NoPrecedentsFound);
        }
        debug!(stage = %Stage::FetchingDetails, surviving = cases.len(), "details fetched");

        // Analyzing: bounded fan-out, count-preserving join, never fails.
        let input = Arc::new(input);
        let mut pairs = analysis::analyze(
            Arc::clone(&self.oracle),
            Arc::clone(&self.analysis_permits),
            Arc::clone(&input),
            cases,
            self.worker_timeout,
        )
        .await;
        debug!(stage = %Stage::Analyzing, assessments = pairs.len(), "analysis joined");

        pairs.sort_by(report_order);

        // Aggregating: deterministic number, narrated (or fallback) prose.
        let prediction =
            aggregate::aggregate(self.oracle.as_ref(), &input, &pairs, self.narrate_timeout).await;
        debug!(
            stage = %Stage::Aggregating,
            predicted_fine = prediction.predicted_fine,
            "prediction complete"
        );

        Ok(PipelineResult {
            similar_cases: pairs,
            prediction,
        })
    }
}

/// Report order for the similar-cases list: similarity desc, fine desc,
/// id asc. Fixed so repeated runs over the same assessments render the same
/// list.
fn report_order(
    (ca, aa): &(PrecedentCase, SimilarityAssessment),
    (cb, ab): &(PrecedentCase, SimilarityAssessment),
) -> std::cmp::Ordering {
    (Reverse(aa.similarity), Reverse(ca.fine), ca.id.as_str())
        .cmp(&(Reverse(ab.similarity), Reverse(cb.fine), cb.id.as_str()))
}

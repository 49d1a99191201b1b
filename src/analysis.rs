//! Analysis orchestration: bounded fan-out of similarity workers and a
//! count-preserving fan-in.
//!
//! One worker task runs per shortlisted precedent. Workers share a
//! process-wide semaphore so the total number of concurrent oracle calls is
//! bounded across in-flight requests. The join waits for every worker; a
//! worker that times out, fails, or panics contributes a fallback assessment
//! instead of disappearing, so the aggregator always sees exactly one
//! assessment per surviving candidate. Dropping the returned future aborts
//! the in-flight workers (the `JoinSet` aborts its tasks on drop), which is
//! how caller cancellation propagates into this stage.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

use crate::models::{CaseInput, PrecedentCase, SimilarityAssessment};
use crate::oracle::ReasoningOracle;

/// Hard cap on concurrent oracle calls, whatever the configuration says.
pub const MAX_CONCURRENCY: usize = 16;

const FALLBACK_EXPLANATION: &str =
    "Similarity analysis could not be completed for this precedent; \
     it is excluded from the weighted estimate.";

const EMPTY_EXPLANATION: &str = "No explanation was provided by the analysis.";

/// Substituted when a worker cannot produce a real assessment. Similarity 0
/// keeps the entry out of the weighting while the case itself stays visible
/// in the reported list.
fn fallback_assessment(precedent_id: &str) -> SimilarityAssessment {
    SimilarityAssessment {
        precedent_id: precedent_id.to_string(),
        similarity: 0,
        explanation: FALLBACK_EXPLANATION.to_string(),
    }
}

/// Enforce the per-worker output contract: similarity within [0,100] and a
/// non-empty explanation.
fn normalize(mut assessment: SimilarityAssessment) -> SimilarityAssessment {
    assessment.similarity = assessment.similarity.min(100);
    if assessment.explanation.trim().is_empty() {
        assessment.explanation = EMPTY_EXPLANATION.to_string();
    }
    assessment
}

async fn score_one(
    oracle: Arc<dyn ReasoningOracle>,
    permits: Arc<Semaphore>,
    input: Arc<CaseInput>,
    precedent: &PrecedentCase,
    worker_timeout: Duration,
) -> SimilarityAssessment {
    let _permit = match permits.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => return fallback_assessment(&precedent.id),
    };

    match tokio::time::timeout(worker_timeout, oracle.score(&input, precedent)).await {
        Ok(Ok(assessment)) => normalize(assessment),
        Ok(Err(e)) => {
            warn!(precedent = %precedent.id, error = %e, "similarity worker failed");
            fallback_assessment(&precedent.id)
        }
        Err(_) => {
            warn!(precedent = %precedent.id, "similarity worker timed out");
            fallback_assessment(&precedent.id)
        }
    }
}

/// Fan out one similarity worker per candidate and join all of them.
///
/// Returns exactly one `(case, assessment)` pair per input case, in no
/// particular order; the controller sorts the final list.
pub async fn analyze(
    oracle: Arc<dyn ReasoningOracle>,
    permits: Arc<Semaphore>,
    input: Arc<CaseInput>,
    cases: Vec<PrecedentCase>,
    worker_timeout: Duration,
) -> Vec<(PrecedentCase, SimilarityAssessment)> {
    let mut workers = JoinSet::new();

    for (index, case) in cases.iter().enumerate() {
        let oracle = Arc::clone(&oracle);
        let permits = Arc::clone(&permits);
        let input = Arc::clone(&input);
        let case = case.clone();
        workers.spawn(async move {
            let assessment = score_one(oracle, permits, input, &case, worker_timeout).await;
            (index, assessment)
        });
    }

    // Index-keyed join: a panicked worker leaves a hole that is filled with
    // a fallback below, keeping the mapping count-preserving.
    let mut slots: Vec<Option<SimilarityAssessment>> = vec![None; cases.len()];
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok((index, assessment)) => slots[index] = Some(assessment),
            Err(e) => warn!(error = %e, "similarity worker panicked"),
        }
    }

    cases
        .into_iter()
        .zip(slots)
        .map(|(case, slot)| {
            let assessment = slot.unwrap_or_else(|| fallback_assessment(&case.id));
            (case, assessment)
        })
        .collect()
}

//! Fine aggregation: deterministic similarity-weighted estimate plus a
//! narrative rationale.
//!
//! The number and the prose are strictly separated. The estimate is computed
//! here in integer arithmetic and is reproducible for a fixed set of
//! (fine, similarity) pairs regardless of call order; the oracle is asked
//! only to explain it, and any failure of that call downgrades to a locally
//! formatted rationale without touching the figure.

use std::time::Duration;

use tracing::warn;

use crate::models::{CaseInput, PrecedentCase, PredictionResult, SimilarityAssessment};
use crate::oracle::ReasoningOracle;

const LOW_CONFIDENCE_PREFIX: &str =
    "Low-confidence estimate: none of the retrieved precedents showed \
     meaningful similarity, so the figure is an unweighted mean of their \
     fines. ";

/// Weighted fine estimate over the joined pairs.
///
/// Zero-similarity entries are excluded from the weighting (they stay in
/// the reported list for transparency); if that excludes everything, the
/// estimate degrades to an unweighted mean and the low-confidence flag is
/// set. Rounding is half-up in `u128`, so the result is exact and
/// order-independent.
pub fn weighted_estimate(pairs: &[(PrecedentCase, SimilarityAssessment)]) -> (u64, bool) {
    if pairs.is_empty() {
        return (0, true);
    }

    let retained: Vec<(u128, u128)> = pairs
        .iter()
        .filter(|(_, a)| a.similarity > 0)
        .map(|(c, a)| (c.fine as u128, a.similarity as u128))
        .collect();

    if retained.is_empty() {
        let n = pairs.len() as u128;
        let sum: u128 = pairs.iter().map(|(c, _)| c.fine as u128).sum();
        return (((sum + n / 2) / n) as u64, true);
    }

    let numerator: u128 = retained.iter().map(|(fine, sim)| fine * sim).sum();
    let denominator: u128 = retained.iter().map(|(_, sim)| *sim).sum();
    (((numerator + denominator / 2) / denominator) as u64, false)
}

/// Deterministic rationale used when the oracle narration is unavailable.
fn fallback_rationale(
    pairs: &[(PrecedentCase, SimilarityAssessment)],
    predicted_fine: u64,
) -> String {
    let mut text = format!(
        "Estimated fine of EUR {} derived from {} precedent case(s), \
         weighted by similarity.",
        predicted_fine,
        pairs.len()
    );
    for (case, assessment) in pairs.iter().take(3) {
        text.push_str(&format!(
            " {} was fined EUR {} ({}% similar).",
            case.company, case.fine, assessment.similarity
        ));
    }
    text.push_str(" A narrative analysis of the evidence was not available for this request.");
    text
}

/// Combine the joined pairs into the final [`PredictionResult`].
///
/// `pairs` must already be in final report order so the fallback rationale
/// (and the evidence presented to the oracle) is deterministic.
pub async fn aggregate(
    oracle: &dyn ReasoningOracle,
    input: &CaseInput,
    pairs: &[(PrecedentCase, SimilarityAssessment)],
    narrate_timeout: Duration,
) -> PredictionResult {
    let (predicted_fine, low_confidence) = weighted_estimate(pairs);

    let narrated =
        match tokio::time::timeout(narrate_timeout, oracle.narrate(input, pairs, predicted_fine))
            .await
        {
            Ok(Ok(text)) => Some(text),
            Ok(Err(e)) => {
                warn!(error = %e, "rationale generation failed, using local fallback");
                None
            }
            Err(_) => {
                warn!("rationale generation timed out, using local fallback");
                None
            }
        };

    let body = narrated.unwrap_or_else(|| fallback_rationale(pairs, predicted_fine));
    let explanation = if low_confidence {
        format!("{LOW_CONFIDENCE_PREFIX}{body}")
    } else {
        body
    };

    PredictionResult {
        predicted_fine,
        explanation,
    }
}

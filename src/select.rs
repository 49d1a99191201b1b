//! Candidate selection: stable dedupe and truncation of ranked search hits.

use std::collections::HashSet;

use crate::error::PredictError;
use crate::models::SearchHit;

/// Reduce ranked chunk-level hits to a shortlist of unique case ids.
///
/// Hits are walked in rank order; the first occurrence of each distinct
/// case id wins (one case may surface as several indexed chunks), and the
/// walk stops once `shortlist_size` unique cases are collected. Rank order
/// is preserved; tie-breaking happened in the store, never here.
///
/// An empty result is `NoPrecedentsFound`.
pub fn select_candidates(
    hits: &[SearchHit],
    shortlist_size: usize,
) -> Result<Vec<String>, PredictError> {
    let mut seen = HashSet::new();
    let mut shortlist = Vec::new();

    for hit in hits {
        if shortlist.len() >= shortlist_size {
            break;
        }
        if seen.insert(hit.case_id.as_str()) {
            shortlist.push(hit.case_id.clone());
        }
    }

    if shortlist.is_empty() {
        return Err(PredictError::NoPrecedentsFound);
    }
    Ok(shortlist)
}

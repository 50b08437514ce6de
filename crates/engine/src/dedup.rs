use std::collections::HashSet;

use tracing::debug;

use crate::prepare::Candidate;
use crate::summary::{SkipBreakdown, SkipReason};

/// Keep the first candidate per natural key, in first-seen order. Later repeats are
/// counted as skipped.
pub fn dedup_candidates(candidates: Vec<Candidate>, skips: &mut SkipBreakdown) -> Vec<Candidate> {
    let mut seen = HashSet::with_capacity(candidates.len());
    let mut kept = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if seen.insert(candidate.key.clone()) {
            kept.push(candidate);
        } else {
            debug!(
                row = candidate.row_number,
                key = %candidate.key,
                reason = SkipReason::DuplicateKey.as_str(),
                "skipping row"
            );
            skips.record(SkipReason::DuplicateKey);
        }
    }
    kept
}

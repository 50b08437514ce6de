use std::collections::{BTreeMap, BTreeSet, HashSet};

use cabledesk_core::ids::{ProjectId, RecordId};
use cabledesk_storage::ImportTx;

use crate::error::ImportError;
use crate::prepare::{Candidate, ReferenceCell};

/// What a write does to the stored reference id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceUpdate {
    /// The sheet had no reference column; an existing record keeps its reference.
    Keep,
    Set(Option<RecordId>),
}

impl ReferenceUpdate {
    pub fn apply(&self, existing: Option<RecordId>) -> Option<RecordId> {
        match self {
            Self::Keep => existing,
            Self::Set(id) => *id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCandidate {
    pub candidate: Candidate,
    pub reference: ReferenceUpdate,
}

/// Distinct normalized reference names across the batch.
pub fn reference_names(candidates: &[Candidate]) -> BTreeSet<String> {
    candidates
        .iter()
        .filter_map(|c| match &c.reference {
            ReferenceCell::Named { key, .. } => Some(key.clone()),
            _ => None,
        })
        .collect()
}

/// Attach looked-up ids. Fails with every unknown name (display form, first-seen order).
pub fn bind_references(
    candidates: Vec<Candidate>,
    lookup: &BTreeMap<String, RecordId>,
) -> Result<Vec<ResolvedCandidate>, Vec<String>> {
    let mut missing = Vec::new();
    let mut missing_keys = HashSet::new();
    let mut resolved = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let reference = match &candidate.reference {
            ReferenceCell::NotInSheet => ReferenceUpdate::Keep,
            ReferenceCell::Blank => ReferenceUpdate::Set(None),
            ReferenceCell::Named { key, display } => match lookup.get(key) {
                Some(id) => ReferenceUpdate::Set(Some(*id)),
                None => {
                    if missing_keys.insert(key.clone()) {
                        missing.push(display.clone());
                    }
                    continue;
                }
            },
        };
        resolved.push(ResolvedCandidate {
            candidate,
            reference,
        });
    }

    if missing.is_empty() {
        Ok(resolved)
    } else {
        Err(missing)
    }
}

/// Resolve every reference name in one batched lookup against `target`, scoped to
/// `project_id`. No lookup happens when the batch names nothing.
pub fn resolve_references<T: ImportTx>(
    tx: &mut T,
    target: Option<&str>,
    project_id: ProjectId,
    candidates: Vec<Candidate>,
) -> Result<Vec<ResolvedCandidate>, ImportError> {
    let names = reference_names(&candidates);
    let lookup = match target {
        Some(target) if !names.is_empty() => tx.lookup_references(target, project_id, &names)?,
        _ => BTreeMap::new(),
    };
    bind_references(candidates, &lookup)
        .map_err(|names| ImportError::UnresolvedReferences { names })
}

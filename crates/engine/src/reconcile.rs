//! Insert-or-update against the rows already stored for a project.

use std::collections::{BTreeMap, HashMap};

use tracing::trace;

use cabledesk_core::ids::{ProjectId, RecordId};
use cabledesk_core::FieldValue;
use cabledesk_storage::{ImportTx, Record, RecordWrite, StorageError};

use crate::prepare::SparseFields;
use crate::profiles::CollectionProfile;
use crate::resolve::ResolvedCandidate;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileCounts {
    pub inserted: usize,
    pub updated: usize,
}

/// Build the full field-set to write. A field the sheet supplied takes the sheet value,
/// even when blank; one it lacked keeps the stored value, or null for a new record.
pub fn merge_fields<'f>(
    tracked: impl IntoIterator<Item = &'f str>,
    incoming: &SparseFields,
    existing: Option<&BTreeMap<String, FieldValue>>,
) -> BTreeMap<String, FieldValue> {
    tracked
        .into_iter()
        .map(|field| {
            let value = incoming
                .get(field)
                .or_else(|| existing.and_then(|fields| fields.get(field)))
                .cloned()
                .unwrap_or(FieldValue::Null);
            (field.to_string(), value)
        })
        .collect()
}

/// Write every candidate: update when its key is already stored, insert otherwise.
/// Existing rows are fetched once, under the transaction's write lock.
pub fn reconcile<T: ImportTx>(
    tx: &mut T,
    profile: &CollectionProfile,
    project_id: ProjectId,
    candidates: Vec<ResolvedCandidate>,
) -> Result<ReconcileCounts, StorageError> {
    let keys: Vec<String> = candidates.iter().map(|c| c.candidate.key.clone()).collect();
    let existing: HashMap<String, Record> = tx
        .fetch_existing_for_update(&profile.collection, project_id, &keys)?
        .into_iter()
        .map(|record| (record.natural_key.clone(), record))
        .collect();

    let mut counts = ReconcileCounts::default();
    for ResolvedCandidate {
        candidate,
        reference,
    } in candidates
    {
        let stored = existing.get(&candidate.key);
        let write = RecordWrite {
            record_id: stored.map_or_else(RecordId::new, |r| r.record_id),
            fields: merge_fields(
                profile.columns.tracked_fields(),
                &candidate.fields,
                stored.map(|r| &r.fields),
            ),
            reference_id: reference.apply(stored.and_then(|r| r.reference_id)),
            natural_key: candidate.key,
            label: candidate.label,
        };

        if stored.is_some() {
            trace!(row = candidate.row_number, key = %write.natural_key, "update");
            tx.update_record(&profile.collection, project_id, &write)?;
            counts.updated += 1;
        } else {
            trace!(row = candidate.row_number, key = %write.natural_key, "insert");
            tx.insert_record(&profile.collection, project_id, &write)?;
            counts.inserted += 1;
        }
    }
    Ok(counts)
}

//! In-memory store with the same transactional contract as the SQLite one.
//!
//! A transaction works on a copy of the state and swaps it in on commit, so dropping it
//! uncommitted leaves the store untouched. The `&mut` borrow held by the transaction is
//! the lock.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{SystemTime, UNIX_EPOCH};

use cabledesk_core::ids::*;

use crate::error::StorageError;
use crate::traits::{CurvePoint, CurveRecord, ImportStore, ImportTx, Record, RecordWrite, Storage};

#[derive(Debug, Clone, PartialEq)]
struct StoredRecord {
    collection: String,
    project_id: ProjectId,
    record: Record,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct MemoryState {
    projects: BTreeMap<ProjectId, String>,
    records: BTreeMap<RecordId, StoredRecord>,
    curves: BTreeMap<CurveId, CurveRecord>,
    points: BTreeMap<CurveId, Vec<CurvePoint>>,
}

impl MemoryState {
    fn find(&self, collection: &str, project_id: ProjectId, natural_key: &str) -> Option<&Record> {
        self.records
            .values()
            .find(|s| {
                s.collection == collection
                    && s.project_id == project_id
                    && s.record.natural_key == natural_key
            })
            .map(|s| &s.record)
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Equality compares full contents, which makes "nothing changed" checks trivial.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryStorage {
    state: MemoryState,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct MemoryTx<'a> {
    target: &'a mut MemoryState,
    working: MemoryState,
}

impl ImportStore for MemoryStorage {
    type Tx<'a> = MemoryTx<'a>;

    fn begin(&mut self) -> Result<MemoryTx<'_>, StorageError> {
        let working = self.state.clone();
        Ok(MemoryTx {
            target: &mut self.state,
            working,
        })
    }
}

impl ImportTx for MemoryTx<'_> {
    fn lookup_references(
        &mut self,
        collection: &str,
        project_id: ProjectId,
        natural_keys: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, RecordId>, StorageError> {
        Ok(natural_keys
            .iter()
            .filter_map(|key| {
                self.working
                    .find(collection, project_id, key)
                    .map(|r| (key.clone(), r.record_id))
            })
            .collect())
    }

    fn fetch_existing_for_update(
        &mut self,
        collection: &str,
        project_id: ProjectId,
        natural_keys: &[String],
    ) -> Result<Vec<Record>, StorageError> {
        Ok(natural_keys
            .iter()
            .filter_map(|key| self.working.find(collection, project_id, key).cloned())
            .collect())
    }

    fn insert_record(
        &mut self,
        collection: &str,
        project_id: ProjectId,
        record: &RecordWrite,
    ) -> Result<(), StorageError> {
        if !self.working.projects.contains_key(&project_id) {
            return Err(StorageError::ConstraintViolation(format!(
                "unknown project {project_id}"
            )));
        }
        if self.working.records.contains_key(&record.record_id)
            || self
                .working
                .find(collection, project_id, &record.natural_key)
                .is_some()
        {
            return Err(StorageError::ConstraintViolation(format!(
                "cannot insert {collection} record {:?}: already exists",
                record.natural_key
            )));
        }
        self.working.records.insert(
            record.record_id,
            StoredRecord {
                collection: collection.to_string(),
                project_id,
                record: Record {
                    record_id: record.record_id,
                    natural_key: record.natural_key.clone(),
                    label: record.label.clone(),
                    reference_id: record.reference_id,
                    fields: record.fields.clone(),
                },
            },
        );
        Ok(())
    }

    fn update_record(
        &mut self,
        collection: &str,
        project_id: ProjectId,
        record: &RecordWrite,
    ) -> Result<(), StorageError> {
        let stored = self
            .working
            .records
            .get_mut(&record.record_id)
            .filter(|s| s.collection == collection && s.project_id == project_id)
            .ok_or_else(|| {
                StorageError::NotFound(format!("{collection} record {}", record.record_id))
            })?;
        stored.record.label = record.label.clone();
        stored.record.reference_id = record.reference_id;
        stored
            .record
            .fields
            .extend(record.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    fn curve_exists(&mut self, curve_id: CurveId) -> Result<bool, StorageError> {
        Ok(self.working.curves.contains_key(&curve_id))
    }

    fn delete_curve_points(&mut self, curve_id: CurveId) -> Result<usize, StorageError> {
        Ok(self
            .working
            .points
            .remove(&curve_id)
            .map_or(0, |points| points.len()))
    }

    fn insert_curve_points(
        &mut self,
        curve_id: CurveId,
        points: &[CurvePoint],
    ) -> Result<(), StorageError> {
        if !self.working.curves.contains_key(&curve_id) {
            return Err(StorageError::ConstraintViolation(format!(
                "unknown curve {curve_id}"
            )));
        }
        let stored = self.working.points.entry(curve_id).or_default();
        for point in points {
            if stored.iter().any(|p| p.order == point.order) {
                return Err(StorageError::ConstraintViolation(format!(
                    "duplicate point order {} on curve {curve_id}",
                    point.order
                )));
            }
            stored.push(*point);
        }
        stored.sort_by_key(|p| p.order);
        Ok(())
    }

    fn touch_curve(&mut self, curve_id: CurveId) -> Result<(), StorageError> {
        let curve = self
            .working
            .curves
            .get_mut(&curve_id)
            .ok_or_else(|| StorageError::NotFound(format!("curve {curve_id}")))?;
        curve.updated_at = now_ms().max(curve.updated_at + 1);
        Ok(())
    }

    fn commit(self) -> Result<(), StorageError> {
        *self.target = self.working;
        Ok(())
    }
}

impl Storage for MemoryStorage {
    fn create_project(&mut self, name: &str) -> Result<ProjectId, StorageError> {
        let project_id = ProjectId::new();
        self.state.projects.insert(project_id, name.to_string());
        Ok(project_id)
    }

    fn create_curve(&mut self, project_id: ProjectId, name: &str) -> Result<CurveId, StorageError> {
        if !self.state.projects.contains_key(&project_id) {
            return Err(StorageError::NotFound(format!("project {project_id}")));
        }
        let curve_id = CurveId::new();
        self.state.curves.insert(
            curve_id,
            CurveRecord {
                curve_id,
                project_id,
                name: name.to_string(),
                updated_at: now_ms(),
            },
        );
        Ok(curve_id)
    }

    fn get_curve(&self, curve_id: CurveId) -> Result<Option<CurveRecord>, StorageError> {
        Ok(self.state.curves.get(&curve_id).cloned())
    }

    fn list_records(
        &self,
        collection: &str,
        project_id: ProjectId,
    ) -> Result<Vec<Record>, StorageError> {
        Ok(self
            .state
            .records
            .values()
            .filter(|s| s.collection == collection && s.project_id == project_id)
            .map(|s| s.record.clone())
            .collect())
    }

    fn get_record(
        &self,
        collection: &str,
        project_id: ProjectId,
        natural_key: &str,
    ) -> Result<Option<Record>, StorageError> {
        Ok(self.state.find(collection, project_id, natural_key).cloned())
    }

    fn list_curve_points(&self, curve_id: CurveId) -> Result<Vec<CurvePoint>, StorageError> {
        Ok(self.state.points.get(&curve_id).cloned().unwrap_or_default())
    }
}

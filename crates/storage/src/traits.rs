use std::collections::{BTreeMap, BTreeSet};

use cabledesk_core::{field_value::FieldValue, ids::*};

use crate::error::StorageError;

/// A persisted record of some collection, as seen inside one project.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub record_id: RecordId,
    /// Lowercased, whitespace-collapsed identifier used for matching.
    pub natural_key: String,
    /// Identifier as the user wrote it.
    pub label: String,
    pub reference_id: Option<RecordId>,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn field(&self, field_key: &str) -> Option<&FieldValue> {
        self.fields.get(field_key)
    }
}

/// A full field-set to write for one record. Inserts and updates carry every tracked field.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordWrite {
    pub record_id: RecordId,
    pub natural_key: String,
    pub label: String,
    pub reference_id: Option<RecordId>,
    pub fields: BTreeMap<String, FieldValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurveRecord {
    pub curve_id: CurveId,
    pub project_id: ProjectId,
    pub name: String,
    /// Milliseconds since the Unix epoch.
    pub updated_at: i64,
}

/// One point of a curve. `order` is 1-based and contiguous within a curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurvePoint {
    pub order: u32,
    pub primary_value: f64,
    pub secondary_value: f64,
}

/// Plain reads and the seeding operations ordinary CRUD handlers perform.
pub trait Storage {
    fn create_project(&mut self, name: &str) -> Result<ProjectId, StorageError>;

    fn create_curve(&mut self, project_id: ProjectId, name: &str) -> Result<CurveId, StorageError>;

    fn get_curve(&self, curve_id: CurveId) -> Result<Option<CurveRecord>, StorageError>;

    fn list_records(
        &self,
        collection: &str,
        project_id: ProjectId,
    ) -> Result<Vec<Record>, StorageError>;

    fn get_record(
        &self,
        collection: &str,
        project_id: ProjectId,
        natural_key: &str,
    ) -> Result<Option<Record>, StorageError>;

    fn list_curve_points(&self, curve_id: CurveId) -> Result<Vec<CurvePoint>, StorageError>;
}

/// A store that can open an import transaction.
pub trait ImportStore {
    type Tx<'a>: ImportTx
    where
        Self: 'a;

    /// Acquire a scoped transaction. Dropping it without `commit` rolls back.
    fn begin(&mut self) -> Result<Self::Tx<'_>, StorageError>;
}

/// Operations available inside one import transaction.
pub trait ImportTx {
    /// Map each requested natural key of `collection` to its record id. Unknown keys are
    /// simply absent from the result.
    fn lookup_references(
        &mut self,
        collection: &str,
        project_id: ProjectId,
        natural_keys: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, RecordId>, StorageError>;

    /// Fetch the records matching `natural_keys`, holding them against concurrent writers
    /// until the transaction ends.
    fn fetch_existing_for_update(
        &mut self,
        collection: &str,
        project_id: ProjectId,
        natural_keys: &[String],
    ) -> Result<Vec<Record>, StorageError>;

    fn insert_record(
        &mut self,
        collection: &str,
        project_id: ProjectId,
        record: &RecordWrite,
    ) -> Result<(), StorageError>;

    fn update_record(
        &mut self,
        collection: &str,
        project_id: ProjectId,
        record: &RecordWrite,
    ) -> Result<(), StorageError>;

    fn curve_exists(&mut self, curve_id: CurveId) -> Result<bool, StorageError>;

    /// Returns how many points were removed.
    fn delete_curve_points(&mut self, curve_id: CurveId) -> Result<usize, StorageError>;

    fn insert_curve_points(
        &mut self,
        curve_id: CurveId,
        points: &[CurvePoint],
    ) -> Result<(), StorageError>;

    /// Advance the curve's modification timestamp.
    fn touch_curve(&mut self, curve_id: CurveId) -> Result<(), StorageError>;

    fn commit(self) -> Result<(), StorageError>;
}

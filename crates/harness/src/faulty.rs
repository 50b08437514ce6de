use std::collections::{BTreeMap, BTreeSet};

use cabledesk_core::ids::*;
use cabledesk_storage::{
    CurvePoint, CurveRecord, ImportStore, ImportTx, Record, RecordWrite, Storage, StorageError,
};

/// Wraps a store and, once armed, fails the N-th write of every transaction.
pub struct FaultyStore<S> {
    inner: S,
    fail_on_write: Option<usize>,
}

impl<S> FaultyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fail_on_write: None,
        }
    }

    /// Fail the `nth` write (1-based) of each following transaction.
    pub fn arm(&mut self, nth: usize) {
        self.fail_on_write = Some(nth);
    }

    /// Let every write through again.
    pub fn disarm(&mut self) {
        self.fail_on_write = None;
    }

    /// The wrapped store, for comparing state around a failed import.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

pub struct FaultyTx<T> {
    inner: T,
    writes: usize,
    fail_on_write: Option<usize>,
}

impl<T> FaultyTx<T> {
    fn write(&mut self, what: &str) -> Result<(), StorageError> {
        self.writes += 1;
        if self.fail_on_write == Some(self.writes) {
            return Err(StorageError::ConstraintViolation(format!(
                "injected failure on write {} ({what})",
                self.writes
            )));
        }
        Ok(())
    }
}

impl<S: ImportStore> ImportStore for FaultyStore<S> {
    type Tx<'a>
        = FaultyTx<S::Tx<'a>>
    where
        Self: 'a;

    fn begin(&mut self) -> Result<Self::Tx<'_>, StorageError> {
        Ok(FaultyTx {
            inner: self.inner.begin()?,
            writes: 0,
            fail_on_write: self.fail_on_write,
        })
    }
}

impl<T: ImportTx> ImportTx for FaultyTx<T> {
    fn lookup_references(
        &mut self,
        collection: &str,
        project_id: ProjectId,
        natural_keys: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, RecordId>, StorageError> {
        self.inner.lookup_references(collection, project_id, natural_keys)
    }

    fn fetch_existing_for_update(
        &mut self,
        collection: &str,
        project_id: ProjectId,
        natural_keys: &[String],
    ) -> Result<Vec<Record>, StorageError> {
        self.inner.fetch_existing_for_update(collection, project_id, natural_keys)
    }

    fn insert_record(
        &mut self,
        collection: &str,
        project_id: ProjectId,
        record: &RecordWrite,
    ) -> Result<(), StorageError> {
        self.write("insert_record")?;
        self.inner.insert_record(collection, project_id, record)
    }

    fn update_record(
        &mut self,
        collection: &str,
        project_id: ProjectId,
        record: &RecordWrite,
    ) -> Result<(), StorageError> {
        self.write("update_record")?;
        self.inner.update_record(collection, project_id, record)
    }

    fn curve_exists(&mut self, curve_id: CurveId) -> Result<bool, StorageError> {
        self.inner.curve_exists(curve_id)
    }

    fn delete_curve_points(&mut self, curve_id: CurveId) -> Result<usize, StorageError> {
        self.write("delete_curve_points")?;
        self.inner.delete_curve_points(curve_id)
    }

    fn insert_curve_points(
        &mut self,
        curve_id: CurveId,
        points: &[CurvePoint],
    ) -> Result<(), StorageError> {
        self.write("insert_curve_points")?;
        self.inner.insert_curve_points(curve_id, points)
    }

    fn touch_curve(&mut self, curve_id: CurveId) -> Result<(), StorageError> {
        self.write("touch_curve")?;
        self.inner.touch_curve(curve_id)
    }

    fn commit(self) -> Result<(), StorageError> {
        self.inner.commit()
    }
}

impl<S: Storage> Storage for FaultyStore<S> {
    fn create_project(&mut self, name: &str) -> Result<ProjectId, StorageError> {
        self.inner.create_project(name)
    }

    fn create_curve(&mut self, project_id: ProjectId, name: &str) -> Result<CurveId, StorageError> {
        self.inner.create_curve(project_id, name)
    }

    fn get_curve(&self, curve_id: CurveId) -> Result<Option<CurveRecord>, StorageError> {
        self.inner.get_curve(curve_id)
    }

    fn list_records(
        &self,
        collection: &str,
        project_id: ProjectId,
    ) -> Result<Vec<Record>, StorageError> {
        self.inner.list_records(collection, project_id)
    }

    fn get_record(
        &self,
        collection: &str,
        project_id: ProjectId,
        natural_key: &str,
    ) -> Result<Option<Record>, StorageError> {
        self.inner.get_record(collection, project_id, natural_key)
    }

    fn list_curve_points(&self, curve_id: CurveId) -> Result<Vec<CurvePoint>, StorageError> {
        self.inner.list_curve_points(curve_id)
    }
}

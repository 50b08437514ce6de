use std::path::PathBuf;

use cabledesk_core::{ids::*, normalize::normalize_key_str, Sheet};
use cabledesk_engine::{
    profiles, ChildSetSummary, CollectionProfile, EngineConfig, ImportError, ImportOutcome,
    Importer,
};
use cabledesk_storage::{
    CurvePoint, ImportStore, MemoryStorage, Record, SqliteStorage, Storage, StorageConfig,
    StorageError,
};
use tempfile::TempDir;

/// One seeded project behind an importer.
pub struct TestProject<S = SqliteStorage> {
    pub importer: Importer<S>,
    pub project_id: ProjectId,
}

impl TestProject<SqliteStorage> {
    pub fn new() -> Result<Self, StorageError> {
        Self::with_store(SqliteStorage::open_in_memory()?)
    }
}

impl TestProject<MemoryStorage> {
    pub fn in_memory() -> Result<Self, StorageError> {
        Self::with_store(MemoryStorage::new())
    }
}

impl<S: ImportStore + Storage> TestProject<S> {
    pub fn with_store(store: S) -> Result<Self, StorageError> {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(mut store: S, config: EngineConfig) -> Result<Self, StorageError> {
        let project_id = store.create_project("Test Project")?;
        Ok(Self {
            importer: Importer::with_config(store, config),
            project_id,
        })
    }

    pub fn store(&self) -> &S {
        self.importer.store()
    }

    pub fn store_mut(&mut self) -> &mut S {
        self.importer.store_mut()
    }

    pub fn import(
        &mut self,
        profile: &CollectionProfile,
        sheet: &Sheet,
    ) -> Result<ImportOutcome, ImportError> {
        self.importer.import_sheet(self.project_id, profile, sheet)
    }

    /// Import a cable type catalog holding just the given names.
    pub fn seed_cable_types(&mut self, names: &[&str]) -> Result<ImportOutcome, ImportError> {
        let mut sheet = Sheet::new(["Name"]);
        for name in names {
            sheet.push_row([*name]);
        }
        self.import(&profiles::cable_types(), &sheet)
    }

    pub fn records(&self, collection: &str) -> Result<Vec<Record>, StorageError> {
        self.store().list_records(collection, self.project_id)
    }

    /// Look a record up by identifier as a user would type it.
    pub fn record(&self, collection: &str, label: &str) -> Result<Option<Record>, StorageError> {
        let key = normalize_key_str(label).unwrap_or_default();
        self.store().get_record(collection, self.project_id, &key)
    }

    pub fn create_curve(&mut self, name: &str) -> Result<CurveId, StorageError> {
        let project_id = self.project_id;
        self.store_mut().create_curve(project_id, name)
    }

    pub fn replace_points(
        &mut self,
        curve_id: CurveId,
        sheet: &Sheet,
    ) -> Result<ChildSetSummary, ImportError> {
        self.importer.replace_curve_sheet(curve_id, sheet)
    }

    pub fn points(&self, curve_id: CurveId) -> Result<Vec<CurvePoint>, StorageError> {
        self.store().list_curve_points(curve_id)
    }
}

/// A SQLite file in a temporary directory, for tests that need several connections.
pub struct TempDatabase {
    _dir: TempDir,
    path: PathBuf,
}

impl TempDatabase {
    pub fn new() -> std::io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("cabledesk.db");
        Ok(Self { _dir: dir, path })
    }

    /// Open a new connection to the file. Every call is an independent store handle.
    pub fn open(&self, config: &StorageConfig) -> Result<SqliteStorage, StorageError> {
        let path = self
            .path
            .to_str()
            .ok_or_else(|| StorageError::NotFound("non-utf8 temp path".to_string()))?;
        SqliteStorage::open_with(path, config)
    }
}

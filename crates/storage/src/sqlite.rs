use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params, params_from_iter};
use serde::{Deserialize, Serialize};
use tracing::debug;

use cabledesk_core::{field_value::FieldValue, ids::*};

use crate::error::StorageError;
use crate::schema::NOW_MS;
use crate::traits::{CurvePoint, CurveRecord, ImportStore, ImportTx, Record, RecordWrite, Storage};

/// Keeps IN-lists well under SQLite's bound-parameter limit.
const MAX_KEYS_PER_QUERY: usize = 500;

const RECORD_SELECT: &str = "SELECT r.record_id, r.natural_key, r.label, r.reference_id, f.field_key, f.value
     FROM records r LEFT JOIN record_fields f ON f.record_id = r.record_id";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// How long a writer waits on another connection's transaction before failing.
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5000,
        }
    }
}

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        Self::open_with(path, &StorageConfig::default())
    }

    pub fn open_with(path: &str, config: &StorageConfig) -> Result<Self, StorageError> {
        Self::init(Connection::open(path)?, config)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?, &StorageConfig::default())
    }

    fn init(conn: Connection, config: &StorageConfig) -> Result<Self, StorageError> {
        // Schema setup writes, so it must already honor the configured wait.
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

fn id_value(bytes: &[u8; 16]) -> Value {
    Value::Blob(bytes.to_vec())
}

/// `?start, ?start+1, ...` for an IN-list of `count` values.
fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Load records with their fields. Rows come back ordered by record id, so each record's
/// fields are contiguous.
fn query_records(
    conn: &Connection,
    filter: &str,
    values: Vec<Value>,
) -> Result<Vec<Record>, StorageError> {
    let sql = format!("{RECORD_SELECT} WHERE {filter} ORDER BY r.record_id, f.field_key");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values), |row| {
        Ok((
            row.get::<_, Vec<u8>>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<Vec<u8>>>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, Option<Vec<u8>>>(5)?,
        ))
    })?;

    let mut records: Vec<Record> = Vec::new();
    for row in rows {
        let (record_bytes, natural_key, label, reference_bytes, field_key, value_bytes) = row?;
        let record_id = RecordId::from_slice(&record_bytes)?;
        if records.last().is_none_or(|r| r.record_id != record_id) {
            let reference_id = reference_bytes
                .as_deref()
                .map(RecordId::from_slice)
                .transpose()?;
            records.push(Record {
                record_id,
                natural_key,
                label,
                reference_id,
                fields: BTreeMap::new(),
            });
        }
        if let (Some(key), Some(bytes), Some(record)) =
            (field_key, value_bytes, records.last_mut())
        {
            let value = FieldValue::from_msgpack(&bytes)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            record.fields.insert(key, value);
        }
    }
    Ok(records)
}

fn write_fields(conn: &Connection, record: &RecordWrite) -> Result<(), StorageError> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO record_fields (record_id, field_key, value) VALUES (?1, ?2, ?3)
         ON CONFLICT(record_id, field_key) DO UPDATE SET value = excluded.value",
    )?;
    for (key, value) in &record.fields {
        let value_bytes = value
            .to_msgpack()
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        stmt.execute(params![
            record.record_id.as_bytes().as_slice(),
            key,
            value_bytes,
        ])?;
    }
    Ok(())
}

/// An open `BEGIN IMMEDIATE` transaction. Rolls back when dropped uncommitted.
pub struct SqliteTx<'a> {
    tx: rusqlite::Transaction<'a>,
}

impl ImportStore for SqliteStorage {
    type Tx<'a> = SqliteTx<'a>;

    fn begin(&mut self) -> Result<SqliteTx<'_>, StorageError> {
        // IMMEDIATE takes the write lock up front, so the existence check and the
        // writes that depend on it cannot interleave with another importer.
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(SqliteTx { tx })
    }
}

impl ImportTx for SqliteTx<'_> {
    fn lookup_references(
        &mut self,
        collection: &str,
        project_id: ProjectId,
        natural_keys: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, RecordId>, StorageError> {
        let keys: Vec<&String> = natural_keys.iter().collect();
        let mut found = BTreeMap::new();
        for chunk in keys.chunks(MAX_KEYS_PER_QUERY) {
            let sql = format!(
                "SELECT natural_key, record_id FROM records
                 WHERE collection = ?1 AND project_id = ?2 AND natural_key IN ({})",
                placeholders(3, chunk.len())
            );
            let mut values = vec![
                Value::Text(collection.to_string()),
                id_value(project_id.as_bytes()),
            ];
            values.extend(chunk.iter().map(|k| Value::Text(k.to_string())));

            let mut stmt = self.tx.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?;
            for row in rows {
                let (key, id_bytes) = row?;
                found.insert(key, RecordId::from_slice(&id_bytes)?);
            }
        }
        debug!(
            collection,
            requested = natural_keys.len(),
            found = found.len(),
            "looked up references"
        );
        Ok(found)
    }

    fn fetch_existing_for_update(
        &mut self,
        collection: &str,
        project_id: ProjectId,
        natural_keys: &[String],
    ) -> Result<Vec<Record>, StorageError> {
        let mut existing = Vec::new();
        for chunk in natural_keys.chunks(MAX_KEYS_PER_QUERY) {
            let filter = format!(
                "r.collection = ?1 AND r.project_id = ?2 AND r.natural_key IN ({})",
                placeholders(3, chunk.len())
            );
            let mut values = vec![
                Value::Text(collection.to_string()),
                id_value(project_id.as_bytes()),
            ];
            values.extend(chunk.iter().map(|k| Value::Text(k.clone())));
            existing.extend(query_records(&self.tx, &filter, values)?);
        }
        Ok(existing)
    }

    fn insert_record(
        &mut self,
        collection: &str,
        project_id: ProjectId,
        record: &RecordWrite,
    ) -> Result<(), StorageError> {
        let result = self.tx.execute(
            "INSERT INTO records (record_id, collection, project_id, natural_key, label, reference_id) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.record_id.as_bytes().as_slice(),
                collection,
                project_id.as_bytes().as_slice(),
                record.natural_key,
                record.label,
                record.reference_id.as_ref().map(|id| id.as_bytes().as_slice()),
            ],
        );
        match result {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => {
                return Err(StorageError::ConstraintViolation(format!(
                    "cannot insert {collection} record {:?}: {e}",
                    record.natural_key
                )));
            }
            Err(e) => return Err(StorageError::Sqlite(e)),
        }
        write_fields(&self.tx, record)
    }

    fn update_record(
        &mut self,
        collection: &str,
        project_id: ProjectId,
        record: &RecordWrite,
    ) -> Result<(), StorageError> {
        let sql = format!(
            "UPDATE records SET label = ?1, reference_id = ?2, updated_at = {NOW_MS}
             WHERE record_id = ?3 AND collection = ?4 AND project_id = ?5"
        );
        let changed = self.tx.execute(
            &sql,
            params![
                record.label,
                record.reference_id.as_ref().map(|id| id.as_bytes().as_slice()),
                record.record_id.as_bytes().as_slice(),
                collection,
                project_id.as_bytes().as_slice(),
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!(
                "{collection} record {}",
                record.record_id
            )));
        }
        write_fields(&self.tx, record)
    }

    fn curve_exists(&mut self, curve_id: CurveId) -> Result<bool, StorageError> {
        let found = self
            .tx
            .query_row(
                "SELECT 1 FROM curves WHERE curve_id = ?1",
                params![curve_id.as_bytes().as_slice()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn delete_curve_points(&mut self, curve_id: CurveId) -> Result<usize, StorageError> {
        let removed = self.tx.execute(
            "DELETE FROM curve_points WHERE curve_id = ?1",
            params![curve_id.as_bytes().as_slice()],
        )?;
        Ok(removed)
    }

    fn insert_curve_points(
        &mut self,
        curve_id: CurveId,
        points: &[CurvePoint],
    ) -> Result<(), StorageError> {
        let mut stmt = self.tx.prepare_cached(
            "INSERT INTO curve_points (curve_id, point_order, primary_value, secondary_value) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for point in points {
            stmt.execute(params![
                curve_id.as_bytes().as_slice(),
                point.order,
                point.primary_value,
                point.secondary_value,
            ])?;
        }
        Ok(())
    }

    fn touch_curve(&mut self, curve_id: CurveId) -> Result<(), StorageError> {
        let sql = format!(
            "UPDATE curves SET updated_at = MAX({NOW_MS}, updated_at + 1) WHERE curve_id = ?1"
        );
        let changed = self
            .tx
            .execute(&sql, params![curve_id.as_bytes().as_slice()])?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("curve {curve_id}")));
        }
        Ok(())
    }

    fn commit(self) -> Result<(), StorageError> {
        self.tx.commit()?;
        Ok(())
    }
}

impl Storage for SqliteStorage {
    fn create_project(&mut self, name: &str) -> Result<ProjectId, StorageError> {
        let project_id = ProjectId::new();
        self.conn.execute(
            "INSERT INTO projects (project_id, name) VALUES (?1, ?2)",
            params![project_id.as_bytes().as_slice(), name],
        )?;
        Ok(project_id)
    }

    fn create_curve(&mut self, project_id: ProjectId, name: &str) -> Result<CurveId, StorageError> {
        let project_exists = self
            .conn
            .query_row(
                "SELECT 1 FROM projects WHERE project_id = ?1",
                params![project_id.as_bytes().as_slice()],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !project_exists {
            return Err(StorageError::NotFound(format!("project {project_id}")));
        }

        let curve_id = CurveId::new();
        self.conn.execute(
            "INSERT INTO curves (curve_id, project_id, name) VALUES (?1, ?2, ?3)",
            params![
                curve_id.as_bytes().as_slice(),
                project_id.as_bytes().as_slice(),
                name,
            ],
        )?;
        Ok(curve_id)
    }

    fn get_curve(&self, curve_id: CurveId) -> Result<Option<CurveRecord>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT project_id, name, updated_at FROM curves WHERE curve_id = ?1",
                params![curve_id.as_bytes().as_slice()],
                |row| {
                    Ok((
                        row.get::<_, Vec<u8>>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((project_bytes, name, updated_at)) => Ok(Some(CurveRecord {
                curve_id,
                project_id: ProjectId::from_slice(&project_bytes)?,
                name,
                updated_at,
            })),
            None => Ok(None),
        }
    }

    fn list_records(
        &self,
        collection: &str,
        project_id: ProjectId,
    ) -> Result<Vec<Record>, StorageError> {
        query_records(
            &self.conn,
            "r.collection = ?1 AND r.project_id = ?2",
            vec![
                Value::Text(collection.to_string()),
                id_value(project_id.as_bytes()),
            ],
        )
    }

    fn get_record(
        &self,
        collection: &str,
        project_id: ProjectId,
        natural_key: &str,
    ) -> Result<Option<Record>, StorageError> {
        let records = query_records(
            &self.conn,
            "r.collection = ?1 AND r.project_id = ?2 AND r.natural_key = ?3",
            vec![
                Value::Text(collection.to_string()),
                id_value(project_id.as_bytes()),
                Value::Text(natural_key.to_string()),
            ],
        )?;
        Ok(records.into_iter().next())
    }

    fn list_curve_points(&self, curve_id: CurveId) -> Result<Vec<CurvePoint>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT point_order, primary_value, secondary_value FROM curve_points
             WHERE curve_id = ?1 ORDER BY point_order",
        )?;
        let rows = stmt.query_map(params![curve_id.as_bytes().as_slice()], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, f64>(2)?,
            ))
        })?;

        let mut points = Vec::new();
        for row in rows {
            let (order, primary_value, secondary_value) = row?;
            let order = u32::try_from(order)
                .map_err(|_| StorageError::Serialization(format!("invalid point order {order}")))?;
            points.push(CurvePoint {
                order,
                primary_value,
                secondary_value,
            });
        }
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(key: &str, width: FieldValue) -> RecordWrite {
        RecordWrite {
            record_id: RecordId::new(),
            natural_key: key.to_lowercase(),
            label: key.to_string(),
            reference_id: None,
            fields: BTreeMap::from([("width".to_string(), width)]),
        }
    }

    #[test]
    fn insert_then_fetch_for_update() -> Result<(), StorageError> {
        let mut storage = SqliteStorage::open_in_memory()?;
        let project = storage.create_project("Plant A")?;

        let mut tx = storage.begin()?;
        tx.insert_record("material_trays", project, &write("KL-60", FieldValue::Number(60.0)))?;
        tx.insert_record("material_trays", project, &write("KL-100", FieldValue::Null))?;
        tx.commit()?;

        let mut tx = storage.begin()?;
        let existing = tx.fetch_existing_for_update(
            "material_trays",
            project,
            &["kl-60".to_string(), "kl-100".to_string(), "kl-200".to_string()],
        )?;
        drop(tx);

        assert_eq!(existing.len(), 2);
        let kl100 = existing.iter().find(|r| r.natural_key == "kl-100").unwrap();
        assert_eq!(kl100.label, "KL-100");
        assert_eq!(kl100.field("width"), Some(&FieldValue::Null));
        Ok(())
    }

    #[test]
    fn dropped_transaction_rolls_back() -> Result<(), StorageError> {
        let mut storage = SqliteStorage::open_in_memory()?;
        let project = storage.create_project("Plant A")?;

        {
            let mut tx = storage.begin()?;
            tx.insert_record("material_trays", project, &write("KL-60", FieldValue::Null))?;
        }

        assert!(storage.list_records("material_trays", project)?.is_empty());
        Ok(())
    }

    #[test]
    fn duplicate_natural_key_is_a_constraint_violation() -> Result<(), StorageError> {
        let mut storage = SqliteStorage::open_in_memory()?;
        let project = storage.create_project("Plant A")?;

        let mut tx = storage.begin()?;
        tx.insert_record("cables", project, &write("C-1", FieldValue::Null))?;
        let err = tx
            .insert_record("cables", project, &write("C-1", FieldValue::Null))
            .unwrap_err();
        assert!(matches!(err, StorageError::ConstraintViolation(_)), "got {err:?}");
        Ok(())
    }

    #[test]
    fn same_key_in_other_project_is_independent() -> Result<(), StorageError> {
        let mut storage = SqliteStorage::open_in_memory()?;
        let a = storage.create_project("Plant A")?;
        let b = storage.create_project("Plant B")?;

        let mut tx = storage.begin()?;
        tx.insert_record("cables", a, &write("C-1", FieldValue::Null))?;
        tx.insert_record("cables", b, &write("C-1", FieldValue::Null))?;
        tx.commit()?;

        assert_eq!(storage.list_records("cables", a)?.len(), 1);
        assert_eq!(storage.list_records("cables", b)?.len(), 1);
        Ok(())
    }

    #[test]
    fn lookup_spans_multiple_chunks() -> Result<(), StorageError> {
        let mut storage = SqliteStorage::open_in_memory()?;
        let project = storage.create_project("Plant A")?;

        let mut tx = storage.begin()?;
        for i in 0..(MAX_KEYS_PER_QUERY + 20) {
            tx.insert_record("cable_types", project, &write(&format!("T{i}"), FieldValue::Null))?;
        }
        tx.commit()?;

        let mut wanted: BTreeSet<String> =
            (0..(MAX_KEYS_PER_QUERY + 20)).map(|i| format!("t{i}")).collect();
        wanted.insert("missing".to_string());

        let mut tx = storage.begin()?;
        let found = tx.lookup_references("cable_types", project, &wanted)?;
        assert_eq!(found.len(), MAX_KEYS_PER_QUERY + 20);
        assert!(!found.contains_key("missing"));
        Ok(())
    }

    #[test]
    fn second_writer_waits_for_open_import() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("locking.db");
        let path = path.to_str().ok_or("non-utf8 temp path")?;
        let config = StorageConfig { busy_timeout_ms: 50 };

        let mut first = SqliteStorage::open_with(path, &config)?;
        let mut second = SqliteStorage::open_with(path, &config)?;

        let tx = first.begin()?;
        assert!(matches!(second.begin(), Err(StorageError::Sqlite(_))));
        drop(tx);

        assert!(second.begin().is_ok());
        Ok(())
    }

    #[test]
    fn open_during_import_uses_configured_timeout() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("open.db");
        let path = path.to_str().ok_or("non-utf8 temp path")?;
        let config = StorageConfig { busy_timeout_ms: 50 };

        let mut first = SqliteStorage::open_with(path, &config)?;
        let tx = first.begin()?;
        let started = std::time::Instant::now();
        assert!(SqliteStorage::open_with(path, &config).is_err());
        assert!(started.elapsed() < Duration::from_millis(2000));
        drop(tx);

        assert!(SqliteStorage::open_with(path, &config).is_ok());
        Ok(())
    }

    #[test]
    fn schema_version_recorded_once() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("version.db");
        let path = path.to_str().ok_or("non-utf8 temp path")?;

        SqliteStorage::open(path)?;
        let storage = SqliteStorage::open(path)?;
        let versions: Vec<i32> = storage
            .conn()
            .prepare("SELECT version FROM schema_version")?
            .query_map([], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        assert_eq!(versions, vec![crate::schema::SCHEMA_VERSION]);
        Ok(())
    }

    #[test]
    fn curve_points_replace_and_touch() -> Result<(), StorageError> {
        let mut storage = SqliteStorage::open_in_memory()?;
        let project = storage.create_project("Plant A")?;
        let curve = storage.create_curve(project, "Fan")?;
        let before = storage.get_curve(curve)?.unwrap().updated_at;

        let mut tx = storage.begin()?;
        assert!(tx.curve_exists(curve)?);
        tx.insert_curve_points(
            curve,
            &[
                CurvePoint {
                    order: 1,
                    primary_value: 0.0,
                    secondary_value: 4.0,
                },
                CurvePoint {
                    order: 2,
                    primary_value: 1.5,
                    secondary_value: 2.0,
                },
            ],
        )?;
        tx.touch_curve(curve)?;
        tx.commit()?;

        let points = storage.list_curve_points(curve)?;
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].primary_value, 1.5);
        assert!(storage.get_curve(curve)?.unwrap().updated_at > before);

        let mut tx = storage.begin()?;
        assert_eq!(tx.delete_curve_points(curve)?, 2);
        assert!(!tx.curve_exists(CurveId::new())?);
        Ok(())
    }

    #[test]
    fn curve_requires_project() -> Result<(), StorageError> {
        let mut storage = SqliteStorage::open_in_memory()?;
        let err = storage.create_curve(ProjectId::new(), "Fan").unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
        Ok(())
    }
}

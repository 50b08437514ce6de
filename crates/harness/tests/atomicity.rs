use std::time::{Duration, Instant};

use cabledesk_core::{field_value::FieldValue, Sheet};
use cabledesk_engine::{profiles, ImportError};
use cabledesk_harness::{FaultyStore, TempDatabase, TestProject};
use cabledesk_storage::{
    ImportStore, MemoryStorage, SqliteStorage, Storage, StorageConfig, StorageError,
};

fn tray_sheet(rows: &[(&str, &str)]) -> Sheet {
    let mut sheet = Sheet::new(["Type", "Width"]);
    for (name, width) in rows {
        sheet.push_row([*name, *width]);
    }
    sheet
}

// ============================================================================
// Injected write failures
// ============================================================================

#[test]
fn failing_nth_write_leaves_collection_unchanged() -> Result<(), Box<dyn std::error::Error>> {
    let store = FaultyStore::new(SqliteStorage::open_in_memory()?);
    let mut project = TestProject::with_store(store)?;
    let profile = profiles::material_trays();
    project.import(&profile, &tray_sheet(&[("KL-60", "60"), ("KL-100", "100")]))?;
    let before = project.records(profiles::MATERIAL_TRAYS)?;

    // Two updates, then an insert that fails.
    project.store_mut().arm(3);
    let sheet = tray_sheet(&[
        ("KL-60", "65"),
        ("KL-100", "110"),
        ("KL-200", "200"),
        ("KL-300", "300"),
    ]);
    let err = project.import(&profile, &sheet).unwrap_err();
    assert!(matches!(err, ImportError::Storage(StorageError::ConstraintViolation(_))));
    assert_eq!(project.records(profiles::MATERIAL_TRAYS)?, before);

    project.store_mut().disarm();
    let outcome = project.import(&profile, &sheet)?;
    assert_eq!(outcome.summary.updated, 2);
    assert_eq!(outcome.summary.inserted, 2);
    Ok(())
}

#[test]
fn every_failure_position_rolls_back() -> Result<(), Box<dyn std::error::Error>> {
    let profile = profiles::material_trays();
    let sheet = tray_sheet(&[("A", "1"), ("B", "2"), ("C", "3"), ("D", "4"), ("E", "5")]);

    for nth in 1..=5 {
        let mut project = TestProject::with_store(FaultyStore::new(MemoryStorage::new()))?;
        project.import(&profile, &tray_sheet(&[("A", "0"), ("C", "0")]))?;
        let before = project.store().inner().clone();

        project.store_mut().arm(nth);
        assert!(project.import(&profile, &sheet).is_err(), "write {nth} should fail");
        assert!(project.store().inner() == &before, "write {nth} left partial state");
    }
    Ok(())
}

#[test]
fn failed_point_replacement_keeps_old_points() -> Result<(), Box<dyn std::error::Error>> {
    let mut project = TestProject::with_store(FaultyStore::new(SqliteStorage::open_in_memory()?))?;
    let curve = project.create_curve("Breaker")?;
    let mut sheet = Sheet::new(["Current", "Time"]);
    sheet.push_row([1.0, 5.0]);
    sheet.push_row([2.0, 1.0]);
    project.replace_points(curve, &sheet)?;
    let before = project.store().get_curve(curve)?;

    // delete succeeds, insert fails
    project.store_mut().arm(2);
    let mut replacement = Sheet::new(["Current", "Time"]);
    replacement.push_row([9.0, 9.0]);
    assert!(project.replace_points(curve, &replacement).is_err());

    let points = project.points(curve)?;
    assert_eq!(points.len(), 2);
    assert_eq!(points[0].primary_value, 1.0);
    assert_eq!(project.store().get_curve(curve)?, before);
    Ok(())
}

// ============================================================================
// Concurrent importers
// ============================================================================

#[test]
fn second_importer_waits_for_open_transaction() -> Result<(), Box<dyn std::error::Error>> {
    let db = TempDatabase::new()?;
    let config = StorageConfig { busy_timeout_ms: 50 };
    let mut first = db.open(&config)?;
    let project_id = first.create_project("Shared")?;
    let second = db.open(&config)?;

    let mut other = TestProject {
        importer: cabledesk_engine::Importer::new(second),
        project_id,
    };
    let profile = profiles::cable_types();
    let sheet = Sheet::new(["Name"]).with_row(["NYY"]);

    let held = first.begin()?;
    let err = other.import(&profile, &sheet).unwrap_err();
    assert!(matches!(err, ImportError::Storage(StorageError::Sqlite(_))));
    drop(held);

    let outcome = cabledesk_engine::reconcile_batch(&mut first, project_id, &profile, &sheet)?;
    assert_eq!(outcome.summary.inserted, 1);

    // The second importer now sees the committed row and updates it.
    let outcome = other.import(&profile, &sheet)?;
    assert_eq!(outcome.summary.inserted, 0);
    assert_eq!(outcome.summary.updated, 1);
    assert_eq!(first.list_records(profiles::CABLE_TYPES, project_id)?.len(), 1);
    Ok(())
}

#[test]
fn opening_during_import_waits_only_configured_timeout() -> Result<(), Box<dyn std::error::Error>> {
    let db = TempDatabase::new()?;
    let config = StorageConfig { busy_timeout_ms: 50 };
    let mut first = db.open(&config)?;

    let held = first.begin()?;
    let started = Instant::now();
    assert!(matches!(db.open(&config), Err(StorageError::Sqlite(_))));
    assert!(started.elapsed() < Duration::from_millis(2000));
    drop(held);

    let mut project = TestProject::with_store(db.open(&config)?)?;
    let sheet = Sheet::new(["Name"]).with_row(["NYY"]);
    let outcome = project.import(&profiles::cable_types(), &sheet)?;
    assert_eq!(outcome.summary.inserted, 1);
    Ok(())
}

// ============================================================================
// In-memory store
// ============================================================================

#[test]
fn memory_store_runs_the_same_import() -> Result<(), Box<dyn std::error::Error>> {
    let mut project = TestProject::in_memory()?;
    project.seed_cable_types(&["TypeA", "TypeB"])?;

    let mut sheet = Sheet::new(["Cable Id", "Type", "Length"]);
    sheet.push_row(["C-1", "TypeA", "5"]);
    sheet.push_row(["c-1", "TypeA", "6"]);
    sheet.push_row(["C-2", "TypeB", "7"]);

    let summary = project.import(&profiles::cables(), &sheet)?.summary;
    assert_eq!((summary.inserted, summary.updated, summary.skipped), (2, 0, 1));

    let summary = project.import(&profiles::cables(), &sheet)?.summary;
    assert_eq!((summary.inserted, summary.updated, summary.skipped), (0, 2, 1));

    let c1 = project.record(profiles::CABLES, "C-1")?.ok_or("missing")?;
    assert_eq!(c1.field("length"), Some(&FieldValue::Number(5.0)));
    Ok(())
}

#[test]
fn memory_store_reference_abort_changes_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let mut project = TestProject::in_memory()?;
    project.seed_cable_types(&["TypeA"])?;
    let before = project.store().clone();

    let mut sheet = Sheet::new(["Cable Id", "Type"]);
    sheet.push_row(["C-1", "TypeA"]);
    sheet.push_row(["C-2", "TypeB"]);
    let err = project.import(&profiles::cables(), &sheet).unwrap_err();

    assert!(matches!(err, ImportError::UnresolvedReferences { ref names } if names == &["TypeB"]));
    assert!(project.importer.into_store() == before);
    Ok(())
}

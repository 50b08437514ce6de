pub mod config;
pub mod dedup;
pub mod error;
pub mod prepare;
pub mod profiles;
pub mod reconcile;
pub mod replace;
pub mod resolve;
pub mod summary;

pub use config::EngineConfig;
pub use error::ImportError;
pub use prepare::{Candidate, ColumnLayout, ReferenceCell, SparseFields};
pub use profiles::CollectionProfile;
pub use replace::{PointSet, positional_rows};
pub use resolve::ReferenceUpdate;
pub use summary::{
    ChildSetSummary, CollectionScope, ImportOutcome, ImportSummary, SkipBreakdown, SkipReason,
};

use tracing::{info, info_span, warn};

use cabledesk_core::ids::{CurveId, ProjectId};
use cabledesk_core::{CellValue, Sheet};
use cabledesk_storage::{ImportStore, ImportTx};

use crate::dedup::dedup_candidates;
use crate::prepare::prepare_rows;
use crate::reconcile::reconcile;
use crate::replace::{prepare_point_set, replace_points};
use crate::resolve::resolve_references;

fn log_abort(err: &ImportError) {
    match err {
        ImportError::Storage(_) | ImportError::Core(_) => {}
        _ => warn!(error = %err, "import aborted"),
    }
}

/// Merge `sheet` into the profile's collection for `project_id`.
///
/// Either every candidate row is written or the collection is left as it was. Rows that
/// cannot be prepared, and repeated keys, are counted as skipped. An import with no
/// candidate rows opens no transaction.
pub fn reconcile_batch<S: ImportStore>(
    store: &mut S,
    project_id: ProjectId,
    profile: &CollectionProfile,
    sheet: &Sheet,
) -> Result<ImportOutcome, ImportError> {
    let span = info_span!("reconcile_batch", collection = %profile.collection, %project_id);
    let _enter = span.enter();

    profile.validate()?;
    let layout = ColumnLayout::resolve(&profile.columns, &sheet.headers).inspect_err(log_abort)?;

    let mut skips = SkipBreakdown::default();
    let candidates = prepare_rows(&layout, &sheet.rows, &mut skips);
    let candidates = dedup_candidates(candidates, &mut skips);
    let mut summary = ImportSummary::new(sheet.row_count(), skips);

    if !candidates.is_empty() {
        let target = profile.columns.reference.as_ref().map(|r| r.target.as_str());
        let mut tx = store.begin()?;
        let resolved =
            resolve_references(&mut tx, target, project_id, candidates).inspect_err(log_abort)?;
        let counts = reconcile(&mut tx, profile, project_id, resolved)?;
        tx.commit()?;
        summary.inserted = counts.inserted;
        summary.updated = counts.updated;
    }

    info!(
        total = summary.total_rows,
        inserted = summary.inserted,
        updated = summary.updated,
        skipped = summary.skipped,
        "import complete"
    );
    Ok(ImportOutcome {
        summary,
        refetch: CollectionScope {
            collection: profile.collection.clone(),
            project_id,
        },
    })
}

/// Replace the whole point set of `curve_id` with the pairs read from `rows`.
pub fn replace_child_set<S: ImportStore>(
    store: &mut S,
    config: &EngineConfig,
    curve_id: CurveId,
    rows: &[Vec<CellValue>],
) -> Result<ChildSetSummary, ImportError> {
    let span = info_span!("replace_child_set", %curve_id);
    let _enter = span.enter();

    let set = prepare_point_set(rows, config.max_curve_points).inspect_err(log_abort)?;
    let mut tx = store.begin()?;
    replace_points(&mut tx, curve_id, &set.points).inspect_err(log_abort)?;
    tx.commit()?;

    let summary = ChildSetSummary {
        imported_points: set.points.len(),
        dropped_rows: set.dropped_rows,
        truncated: set.truncated,
        chartable: set.points.len() >= config.min_chart_points,
    };
    info!(
        imported = summary.imported_points,
        dropped = summary.dropped_rows,
        truncated = summary.truncated,
        "point set replaced"
    );
    Ok(summary)
}

/// An import front end owning its store.
pub struct Importer<S> {
    store: S,
    config: EngineConfig,
}

impl<S: ImportStore> Importer<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: S, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn import_sheet(
        &mut self,
        project_id: ProjectId,
        profile: &CollectionProfile,
        sheet: &Sheet,
    ) -> Result<ImportOutcome, ImportError> {
        reconcile_batch(&mut self.store, project_id, profile, sheet)
    }

    pub fn replace_curve_points(
        &mut self,
        curve_id: CurveId,
        rows: &[Vec<CellValue>],
    ) -> Result<ChildSetSummary, ImportError> {
        replace_child_set(&mut self.store, &self.config, curve_id, rows)
    }

    /// Same as `replace_curve_points`, reading the sheet's columns by position.
    pub fn replace_curve_sheet(
        &mut self,
        curve_id: CurveId,
        sheet: &Sheet,
    ) -> Result<ChildSetSummary, ImportError> {
        self.replace_curve_points(curve_id, &positional_rows(sheet))
    }
}

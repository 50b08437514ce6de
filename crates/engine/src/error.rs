use cabledesk_core::CoreError;
use cabledesk_storage::StorageError;
use thiserror::Error;

/// Batch-fatal import failures. Row-level problems are counted, never raised.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("missing required columns: {}", .columns.join(", "))]
    MissingColumns { columns: Vec<String> },

    #[error("unresolved references: {}", .names.join(", "))]
    UnresolvedReferences { names: Vec<String> },

    #[error("parent not found: {0}")]
    ParentNotFound(String),

    #[error("no valid points in sheet")]
    EmptyPointSet,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

use serde::Serialize;

use cabledesk_core::ids::ProjectId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingIdentifier,
    MissingReference,
    InvalidField,
    DuplicateKey,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingIdentifier => "missing identifier",
            Self::MissingReference => "missing reference name",
            Self::InvalidField => "invalid field",
            Self::DuplicateKey => "duplicate key in batch",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SkipBreakdown {
    pub missing_identifier: usize,
    pub missing_reference: usize,
    pub invalid_field: usize,
    pub duplicate_key: usize,
}

impl SkipBreakdown {
    pub fn record(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::MissingIdentifier => self.missing_identifier += 1,
            SkipReason::MissingReference => self.missing_reference += 1,
            SkipReason::InvalidField => self.invalid_field += 1,
            SkipReason::DuplicateKey => self.duplicate_key += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.missing_identifier + self.missing_reference + self.invalid_field + self.duplicate_key
    }
}

/// Per-row accounting for one upsert import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub total_rows: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub skips: SkipBreakdown,
}

impl ImportSummary {
    pub(crate) fn new(total_rows: usize, skips: SkipBreakdown) -> Self {
        Self {
            total_rows,
            inserted: 0,
            updated: 0,
            skipped: skips.total(),
            skips,
        }
    }

    /// Every row was either inserted, updated or skipped.
    pub fn is_balanced(&self) -> bool {
        self.inserted + self.updated + self.skipped == self.total_rows
    }
}

/// The collection a caller should reload after an import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionScope {
    pub collection: String,
    pub project_id: ProjectId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportOutcome {
    pub summary: ImportSummary,
    pub refetch: CollectionScope,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChildSetSummary {
    pub imported_points: usize,
    /// Rows without two usable non-negative numbers.
    pub dropped_rows: usize,
    /// Points cut off by the point cap.
    pub truncated: usize,
    /// Enough points to draw a curve.
    pub chartable: bool,
}

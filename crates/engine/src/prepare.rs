//! Raw rows to candidate records.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use cabledesk_core::normalize::{normalize_key_str, normalize_text};
use cabledesk_core::{ColumnMap, ColumnSpec, FieldValue, RawRow};

use crate::error::ImportError;
use crate::summary::{SkipBreakdown, SkipReason};

/// The foreign-reference cell of one row, keeping "column absent" apart from "cell blank".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceCell {
    NotInSheet,
    Blank,
    Named { key: String, display: String },
}

/// Values for exactly the columns the sheet supplied. A blank cell is an explicit
/// `FieldValue::Null`; a column the sheet lacks has no entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseFields(BTreeMap<String, FieldValue>);

impl SparseFields {
    pub fn insert(&mut self, field: &str, value: FieldValue) {
        self.0.insert(field.to_string(), value);
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// 1-based position among the sheet's data rows.
    pub row_number: usize,
    pub key: String,
    pub label: String,
    pub reference: ReferenceCell,
    pub fields: SparseFields,
}

/// A column map bound to one sheet's actual headers.
#[derive(Debug)]
pub struct ColumnLayout<'m> {
    map: &'m ColumnMap,
    key_header: String,
    reference_header: Option<String>,
    present: Vec<(&'m ColumnSpec, String)>,
}

impl<'m> ColumnLayout<'m> {
    /// Match the map against the sheet headers. Any required header the sheet lacks
    /// aborts with every missing header listed.
    pub fn resolve(map: &'m ColumnMap, headers: &[String]) -> Result<Self, ImportError> {
        let mut by_key: HashMap<String, &String> = HashMap::new();
        for header in headers {
            if let Some(key) = normalize_key_str(header) {
                by_key.entry(key).or_insert(header);
            }
        }
        let find = |wanted: &str| -> Option<String> {
            normalize_key_str(wanted).and_then(|k| by_key.get(&k).map(|h| (*h).clone()))
        };

        let missing: Vec<String> = map
            .required_headers()
            .into_iter()
            .filter(|h| find(*h).is_none())
            .map(str::to_string)
            .collect();
        let key_header = match find(&map.key.header) {
            Some(header) if missing.is_empty() => header,
            _ => return Err(ImportError::MissingColumns { columns: missing }),
        };

        let reference_header = map.reference.as_ref().and_then(|r| find(&r.header));
        let present = map
            .columns
            .iter()
            .filter_map(|spec| find(&spec.header).map(|h| (spec, h)))
            .collect();

        Ok(Self {
            map,
            key_header,
            reference_header,
            present,
        })
    }

    /// Fields this sheet supplies, in column-map order.
    pub fn present_fields(&self) -> impl Iterator<Item = &str> {
        self.present.iter().map(|(spec, _)| spec.field.as_str())
    }

    pub fn prepare_row(&self, row_number: usize, row: &RawRow) -> Result<Candidate, SkipReason> {
        let key_cell = row.get(&self.key_header);
        let label = normalize_text(key_cell).ok_or(SkipReason::MissingIdentifier)?;
        self.map
            .key
            .read(key_cell)
            .map_err(|_| SkipReason::InvalidField)?;

        let reference = match (&self.map.reference, &self.reference_header) {
            (Some(column), Some(header)) => match normalize_text(row.get(header)) {
                Some(display) => ReferenceCell::Named {
                    key: display.to_lowercase(),
                    display,
                },
                None if column.required => return Err(SkipReason::MissingReference),
                None => ReferenceCell::Blank,
            },
            _ => ReferenceCell::NotInSheet,
        };

        let mut fields = SparseFields::default();
        for (spec, header) in &self.present {
            let value = spec
                .read(row.get(header))
                .map_err(|_| SkipReason::InvalidField)?;
            fields.insert(&spec.field, value);
        }

        Ok(Candidate {
            row_number,
            key: label.to_lowercase(),
            label,
            reference,
            fields,
        })
    }
}

/// Prepare every row, counting the ones that cannot become candidates.
pub fn prepare_rows(
    layout: &ColumnLayout<'_>,
    rows: &[RawRow],
    skips: &mut SkipBreakdown,
) -> Vec<Candidate> {
    let mut candidates = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        let row_number = index + 1;
        match layout.prepare_row(row_number, row) {
            Ok(candidate) => candidates.push(candidate),
            Err(reason) => {
                debug!(row = row_number, reason = reason.as_str(), "skipping row");
                skips.record(reason);
            }
        }
    }
    candidates
}

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::field_value::FieldValue;
use crate::normalize::{normalize_date, normalize_key_str, normalize_number, normalize_text};
use crate::sheet::CellValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Conversion {
    Text,
    Number,
    Date,
}

impl Conversion {
    pub fn convert(&self, cell: &CellValue) -> FieldValue {
        match self {
            Self::Text => normalize_text(cell).into(),
            Self::Number => normalize_number(cell).into(),
            Self::Date => normalize_date(cell).into(),
        }
    }
}

/// Why a converted value was rejected by the column's rules.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleViolation {
    Blank,
    Unparseable,
    TooLong { max: usize },
    BelowMinimum { min: f64 },
}

/// A mapped data column: header, target field, conversion and validation rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub header: String,
    pub field: String,
    pub conversion: Conversion,
    /// The header must appear in the sheet.
    pub required: bool,
    /// Every row must supply a usable value.
    pub not_blank: bool,
    pub max_length: Option<usize>,
    pub min_value: Option<f64>,
}

impl ColumnSpec {
    pub fn new(header: &str, field: &str, conversion: Conversion) -> Self {
        Self {
            header: header.to_string(),
            field: field.to_string(),
            conversion,
            required: false,
            not_blank: false,
            max_length: None,
            min_value: None,
        }
    }

    pub fn text(header: &str, field: &str) -> Self {
        Self::new(header, field, Conversion::Text)
    }

    pub fn number(header: &str, field: &str) -> Self {
        Self::new(header, field, Conversion::Number)
    }

    pub fn date(header: &str, field: &str) -> Self {
        Self::new(header, field, Conversion::Date)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self.not_blank = true;
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn non_negative(mut self) -> Self {
        self.min_value = Some(0.0);
        self
    }

    /// Convert and validate one cell.
    ///
    /// A cell the conversion cannot read becomes `FieldValue::Null`, which is only
    /// rejected when `not_blank` is set.
    pub fn read(&self, cell: &CellValue) -> Result<FieldValue, RuleViolation> {
        let value = self.conversion.convert(cell);
        if value.is_null() {
            if !self.not_blank {
                return Ok(value);
            }
            return Err(if normalize_text(cell).is_some() {
                RuleViolation::Unparseable
            } else {
                RuleViolation::Blank
            });
        }
        self.check(&value)?;
        Ok(value)
    }

    fn check(&self, value: &FieldValue) -> Result<(), RuleViolation> {
        if let (Some(max), Some(s)) = (self.max_length, value.as_text()) {
            if s.chars().count() > max {
                return Err(RuleViolation::TooLong { max });
            }
        }
        if let (Some(min), Some(n)) = (self.min_value, value.as_number()) {
            if n < min {
                return Err(RuleViolation::BelowMinimum { min });
            }
        }
        Ok(())
    }
}

/// The foreign-reference column: a human-readable name resolved against another collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceColumn {
    pub header: String,
    /// Collection whose natural keys the names are matched against.
    pub target: String,
    /// A row with a blank reference cell is skipped when set.
    pub required: bool,
}

impl ReferenceColumn {
    pub fn new(header: &str, target: &str) -> Self {
        Self {
            header: header.to_string(),
            target: target.to_string(),
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Static per-entity column configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMap {
    /// Natural-key source column. Its normalized text is also the record label.
    pub key: ColumnSpec,
    pub reference: Option<ReferenceColumn>,
    pub columns: Vec<ColumnSpec>,
}

impl ColumnMap {
    pub fn new(key: ColumnSpec) -> Self {
        Self {
            key: key.required(),
            reference: None,
            columns: Vec::new(),
        }
    }

    pub fn reference(mut self, reference: ReferenceColumn) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    /// Field names a record of this kind tracks, in column order.
    pub fn tracked_fields(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.field.as_str())
    }

    /// Headers the sheet must contain before any row is processed.
    pub fn required_headers(&self) -> Vec<&str> {
        let mut headers = vec![self.key.header.as_str()];
        if let Some(reference) = self.reference.as_ref().filter(|r| r.required) {
            headers.push(reference.header.as_str());
        }
        headers.extend(
            self.columns
                .iter()
                .filter(|c| c.required)
                .map(|c| c.header.as_str()),
        );
        headers
    }

    /// Reject maps whose headers or fields collide after normalization.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.key.conversion != Conversion::Text {
            return Err(CoreError::InvalidColumnMap(format!(
                "key column {:?} must use text conversion",
                self.key.header
            )));
        }

        let mut headers = BTreeSet::new();
        let all_headers = std::iter::once(self.key.header.as_str())
            .chain(self.reference.iter().map(|r| r.header.as_str()))
            .chain(self.columns.iter().map(|c| c.header.as_str()));
        for header in all_headers {
            let normalized = normalize_key_str(header).ok_or_else(|| {
                CoreError::InvalidColumnMap("blank column header".to_string())
            })?;
            if !headers.insert(normalized) {
                return Err(CoreError::InvalidColumnMap(format!(
                    "duplicate column header {header:?}"
                )));
            }
        }

        let mut fields = BTreeSet::new();
        for field in self.tracked_fields() {
            if !fields.insert(field) {
                return Err(CoreError::InvalidColumnMap(format!(
                    "duplicate field {field:?}"
                )));
            }
        }
        Ok(())
    }
}

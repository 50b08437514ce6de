use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single tokenized spreadsheet cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Empty,
    Number(f64),
    Text(String),
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(CellValue::Empty, Into::into)
    }
}

/// One data row, keyed by the header text exactly as it appeared in the sheet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    cells: BTreeMap<String, CellValue>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, header: &str, value: impl Into<CellValue>) -> Self {
        self.insert(header, value);
        self
    }

    pub fn insert(&mut self, header: &str, value: impl Into<CellValue>) {
        self.cells.insert(header.to_string(), value.into());
    }

    /// Cell under `header`; a header with no cell in this row reads as `Empty`.
    pub fn get(&self, header: &str) -> &CellValue {
        self.cells.get(header).unwrap_or(&CellValue::Empty)
    }
}

impl<K: Into<String>, V: Into<CellValue>> FromIterator<(K, V)> for RawRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            cells: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// A tokenized worksheet: the header row defines which columns the sheet supplies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl Sheet {
    pub fn new<S: Into<String>>(headers: impl IntoIterator<Item = S>) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row given positionally against `headers`. Missing trailing cells are empty.
    pub fn push_row<V: Into<CellValue>>(&mut self, cells: impl IntoIterator<Item = V>) {
        let row = self
            .headers
            .iter()
            .map(String::as_str)
            .zip(cells.into_iter().map(Into::into))
            .collect::<RawRow>();
        self.rows.push(row);
    }

    pub fn with_row<V: Into<CellValue>>(mut self, cells: impl IntoIterator<Item = V>) -> Self {
        self.push_row(cells);
        self
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

pub mod columns;
pub mod error;
pub mod field_value;
pub mod ids;
pub mod normalize;
pub mod sheet;

pub use columns::{ColumnMap, ColumnSpec, Conversion, ReferenceColumn, RuleViolation};
pub use error::CoreError;
pub use field_value::FieldValue;
pub use ids::*;
pub use sheet::{CellValue, RawRow, Sheet};

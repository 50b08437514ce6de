//! Full replacement of a curve's ordered point set.

use tracing::debug;

use cabledesk_core::ids::CurveId;
use cabledesk_core::normalize::normalize_number;
use cabledesk_core::{CellValue, Sheet};
use cabledesk_storage::{CurvePoint, ImportTx};

use crate::error::ImportError;

#[derive(Debug, Clone, PartialEq)]
pub struct PointSet {
    /// Sorted by primary value, `order` assigned from 1.
    pub points: Vec<CurvePoint>,
    pub dropped_rows: usize,
    pub truncated: usize,
}

fn read_pair(row: &[CellValue]) -> Option<(f64, f64)> {
    let primary = normalize_number(row.first()?)?;
    let secondary = normalize_number(row.get(1)?)?;
    (primary >= 0.0 && secondary >= 0.0).then_some((primary, secondary))
}

/// Parse positional `[primary, secondary]` rows, sort ascending by primary and cap the set.
/// Rows lacking two non-negative numbers are dropped; equal primaries keep sheet order.
pub fn prepare_point_set(
    rows: &[Vec<CellValue>],
    max_points: usize,
) -> Result<PointSet, ImportError> {
    let mut pairs = Vec::with_capacity(rows.len());
    let mut dropped_rows = 0;
    for (index, row) in rows.iter().enumerate() {
        match read_pair(row) {
            Some(pair) => pairs.push(pair),
            None => {
                debug!(row = index + 1, "dropping point row");
                dropped_rows += 1;
            }
        }
    }
    if pairs.is_empty() {
        return Err(ImportError::EmptyPointSet);
    }

    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    let truncated = pairs.len().saturating_sub(max_points);
    pairs.truncate(max_points);

    let points = pairs
        .into_iter()
        .zip(1u32..)
        .map(|((primary_value, secondary_value), order)| CurvePoint {
            order,
            primary_value,
            secondary_value,
        })
        .collect();

    Ok(PointSet {
        points,
        dropped_rows,
        truncated,
    })
}

/// Cells of every row in header order, for sheets whose columns are read by position.
pub fn positional_rows(sheet: &Sheet) -> Vec<Vec<CellValue>> {
    sheet
        .rows
        .iter()
        .map(|row| sheet.headers.iter().map(|h| row.get(h).clone()).collect())
        .collect()
}

/// Swap the stored point set of `curve_id` for `points` and touch the curve.
pub fn replace_points<T: ImportTx>(
    tx: &mut T,
    curve_id: CurveId,
    points: &[CurvePoint],
) -> Result<(), ImportError> {
    if !tx.curve_exists(curve_id)? {
        return Err(ImportError::ParentNotFound(format!("curve {curve_id}")));
    }
    let removed = tx.delete_curve_points(curve_id)?;
    tx.insert_curve_points(curve_id, points)?;
    tx.touch_curve(curve_id)?;
    debug!(%curve_id, removed, inserted = points.len(), "replaced point set");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(pairs: &[(&str, &str)]) -> Vec<Vec<CellValue>> {
        pairs
            .iter()
            .map(|(a, b)| vec![CellValue::from(*a), CellValue::from(*b)])
            .collect()
    }

    fn values(set: &PointSet) -> Vec<(u32, f64, f64)> {
        set.points
            .iter()
            .map(|p| (p.order, p.primary_value, p.secondary_value))
            .collect()
    }

    #[test]
    fn sorted_by_primary_with_contiguous_order() {
        let set = prepare_point_set(&rows(&[("3", "1"), ("1", "2"), ("2", "0.5")]), 2000).unwrap();
        assert_eq!(values(&set), vec![(1, 1.0, 2.0), (2, 2.0, 0.5), (3, 3.0, 1.0)]);
        assert_eq!(set.dropped_rows, 0);
        assert_eq!(set.truncated, 0);
    }

    #[test]
    fn unusable_rows_are_dropped() {
        let mut input = rows(&[("1", "x"), ("", "2"), ("-1", "2"), ("2,5", "4"), ("3", "-0.1")]);
        input.push(vec![CellValue::Number(5.0)]);
        let set = prepare_point_set(&input, 2000).unwrap();
        assert_eq!(values(&set), vec![(1, 2.5, 4.0)]);
        assert_eq!(set.dropped_rows, 5);
    }

    #[test]
    fn no_usable_rows_is_an_error() {
        let err = prepare_point_set(&rows(&[("a", "b"), ("", "")]), 2000).unwrap_err();
        assert!(matches!(err, ImportError::EmptyPointSet));
        assert!(matches!(prepare_point_set(&[], 2000), Err(ImportError::EmptyPointSet)));
    }

    #[test]
    fn equal_primaries_keep_sheet_order() {
        let set = prepare_point_set(&rows(&[("2", "9"), ("1", "1"), ("2", "3")]), 2000).unwrap();
        assert_eq!(values(&set), vec![(1, 1.0, 1.0), (2, 2.0, 9.0), (3, 2.0, 3.0)]);
    }

    #[test]
    fn truncated_after_sorting() {
        let input: Vec<Vec<CellValue>> = (0..10)
            .rev()
            .map(|i| vec![CellValue::Number(i as f64), CellValue::Number(1.0)])
            .collect();
        let set = prepare_point_set(&input, 4).unwrap();
        assert_eq!(set.points.len(), 4);
        assert_eq!(set.truncated, 6);
        assert_eq!(set.points[3].primary_value, 3.0);
        assert_eq!(set.points[3].order, 4);
    }

    #[test]
    fn sheet_rows_read_by_position() {
        let sheet = Sheet::new(["Current", "Time"]).with_row(["10", "0.2"]);
        assert_eq!(
            positional_rows(&sheet),
            vec![vec![CellValue::from("10"), CellValue::from("0.2")]]
        );
    }
}

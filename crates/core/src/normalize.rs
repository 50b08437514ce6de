//! Cell normalization.
//!
//! Every function here is total: unusable input maps to `None`, never to an error.
//! Callers decide whether a `None` is a problem.

use chrono::NaiveDate;

use crate::sheet::CellValue;

/// Trim and collapse internal whitespace runs to a single space. Blank results are `None`.
pub fn normalize_text(value: &CellValue) -> Option<String> {
    match value {
        CellValue::Empty => None,
        CellValue::Text(s) => collapse_whitespace(s),
        CellValue::Number(n) if n.is_finite() => Some(format_number(*n)),
        CellValue::Number(_) => None,
    }
}

/// Matching form of a cell: `normalize_text`, lowercased. Never stored for display.
pub fn normalize_key(value: &CellValue) -> Option<String> {
    normalize_text(value).map(|s| s.to_lowercase())
}

/// Same as `normalize_key` for a plain string (headers, names already extracted).
pub fn normalize_key_str(value: &str) -> Option<String> {
    collapse_whitespace(value).map(|s| s.to_lowercase())
}

/// Numeric cells pass through; text cells accept a decimal comma. Non-finite is `None`.
pub fn normalize_number(value: &CellValue) -> Option<f64> {
    let n = match value {
        CellValue::Empty => return None,
        CellValue::Number(n) => *n,
        CellValue::Text(s) => s.trim().replace(',', ".").parse::<f64>().ok()?,
    };
    n.is_finite().then_some(n)
}

/// Accepts a leading `YYYY-MM-DD` prefix. No locale-specific guessing.
pub fn normalize_date(value: &CellValue) -> Option<NaiveDate> {
    let CellValue::Text(s) = value else {
        return None;
    };
    let s = s.trim();
    let prefix = s.get(..10)?;
    let bytes = prefix.as_bytes();
    let shape_ok = bytes.iter().enumerate().all(|(i, b)| match i {
        4 | 7 => *b == b'-',
        _ => b.is_ascii_digit(),
    });
    if !shape_ok {
        return None;
    }
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

fn collapse_whitespace(s: &str) -> Option<String> {
    let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

/// Integral numbers render without a fractional part so `12.0` keys the same as `"12"`.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn text_trims_and_collapses() {
        assert_eq!(normalize_text(&text("  Tray \t  A\n1 ")), Some("Tray A 1".into()));
        assert_eq!(normalize_text(&text("   ")), None);
        assert_eq!(normalize_text(&CellValue::Empty), None);
    }

    #[test]
    fn text_from_number_cell() {
        assert_eq!(normalize_text(&CellValue::Number(12.0)), Some("12".into()));
        assert_eq!(normalize_text(&CellValue::Number(2.5)), Some("2.5".into()));
        assert_eq!(normalize_text(&CellValue::Number(f64::NAN)), None);
    }

    #[test]
    fn key_is_lowercased() {
        assert_eq!(normalize_key(&text(" C-1 ")), Some("c-1".into()));
        assert_eq!(normalize_key(&text("NYY  3x2.5")), Some("nyy 3x2.5".into()));
        assert_eq!(normalize_key_str("  Cable   Id"), Some("cable id".into()));
    }

    #[test]
    fn number_accepts_decimal_comma() {
        assert_eq!(normalize_number(&text(" 12,5 ")), Some(12.5));
        assert_eq!(normalize_number(&text("3.25")), Some(3.25));
        assert_eq!(normalize_number(&CellValue::Number(7.0)), Some(7.0));
    }

    #[test]
    fn number_rejects_garbage_and_non_finite() {
        assert_eq!(normalize_number(&text("abc")), None);
        assert_eq!(normalize_number(&text("")), None);
        assert_eq!(normalize_number(&text("inf")), None);
        assert_eq!(normalize_number(&CellValue::Number(f64::INFINITY)), None);
        assert_eq!(normalize_number(&CellValue::Empty), None);
    }

    #[test]
    fn date_prefix_only() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 9);
        assert_eq!(normalize_date(&text("2024-03-09")), expected);
        assert_eq!(normalize_date(&text("2024-03-09T10:00:00Z")), expected);
        assert_eq!(normalize_date(&text("09.03.2024")), None);
        assert_eq!(normalize_date(&text("2024-3-9")), None);
        assert_eq!(normalize_date(&text("2024-02-30")), None);
        assert_eq!(normalize_date(&CellValue::Number(45000.0)), None);
    }

    #[test]
    fn date_handles_multibyte_without_panicking() {
        assert_eq!(normalize_date(&text("2024-03-ü9")), None);
        assert_eq!(normalize_date(&text("ääääää")), None);
    }
}

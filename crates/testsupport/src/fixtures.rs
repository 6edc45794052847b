//! Record builders and result-shaping helpers.

use common::{ColumnUpdate, Record};

/// Projection including every column.
pub fn all_columns(n: usize) -> Vec<bool> {
    vec![true; n]
}

/// Build an update patch from `None` = keep / `Some(v)` = set.
///
/// # Example
///
/// ```
/// use common::ColumnUpdate;
/// use testsupport::fixtures::patch;
///
/// let p = patch(&[None, Some(101), None]);
/// assert_eq!(p[0], ColumnUpdate::Keep);
/// assert_eq!(p[1], ColumnUpdate::Set(101));
/// ```
pub fn patch(changes: &[Option<i64>]) -> Vec<ColumnUpdate> {
    changes.iter().map(|c| ColumnUpdate::from_option(*c)).collect()
}

/// Deterministic records with distinct primary keys in column 0: record
/// `i` is `[base + i, (base + i) * 2, ..., (base + i) * cols]`.
pub fn seeded_records(count: usize, columns: usize, base: i64) -> Vec<Vec<i64>> {
    (0..count as i64)
        .map(|i| (1..=columns as i64).map(|c| (base + i) * c).collect())
        .collect()
}

/// Dense result rows, sorted for order-insensitive comparison.
pub fn sorted_rows(records: Vec<Record>) -> Vec<Vec<i64>> {
    let mut rows: Vec<Vec<i64>> = records.into_iter().map(|r| r.columns).collect();
    rows.sort();
    rows
}

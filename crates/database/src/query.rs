use std::sync::Arc;

use common::{ColumnId, ColumnUpdate, DbResult, Record};
use table::Table;

/// Per-table operation facade: the seven operations plus index
/// management, in host-call shape. Thin by design — every rule lives in
/// the table layer.
pub struct Query {
    table: Arc<Table>,
}

impl Query {
    pub fn new(table: Arc<Table>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    pub fn insert(&self, values: &[i64]) -> DbResult<()> {
        self.table.insert(values).map(|_| ())
    }

    /// Records matching `value` in `column`, projected densely: results
    /// carry only the columns whose projection flag is set, in schema
    /// order.
    pub fn select(
        &self,
        value: i64,
        column: ColumnId,
        projection: &[bool],
    ) -> DbResult<Vec<Record>> {
        self.table.select(value, column, projection)
    }

    /// As `select`, rewound `|version|` updates (0 = latest, saturating at
    /// the base record).
    pub fn select_version(
        &self,
        value: i64,
        column: ColumnId,
        projection: &[bool],
        version: i64,
    ) -> DbResult<Vec<Record>> {
        self.table.select_version(value, column, projection, version)
    }

    pub fn update(&self, pk: i64, updates: &[ColumnUpdate]) -> DbResult<()> {
        self.table.update(pk, updates).map(|_| ())
    }

    pub fn delete(&self, pk: i64) -> DbResult<()> {
        self.table.delete(pk)
    }

    /// Sum of `column` over live records with primary key in
    /// `[pk_low, pk_high]`; wrapping arithmetic, 0 for an empty range.
    pub fn sum(&self, pk_low: i64, pk_high: i64, column: ColumnId) -> DbResult<i64> {
        self.table.sum(pk_low, pk_high, column)
    }

    pub fn sum_version(
        &self,
        pk_low: i64,
        pk_high: i64,
        column: ColumnId,
        version: i64,
    ) -> DbResult<i64> {
        self.table.sum_version(pk_low, pk_high, column, version)
    }

    pub fn create_index(&self, column: ColumnId) -> DbResult<()> {
        self.table.create_index(column)
    }

    pub fn drop_index(&self, column: ColumnId) -> DbResult<()> {
        self.table.drop_index(column)
    }
}

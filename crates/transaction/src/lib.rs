//! Transactions: ordered lists of deferred operations with an undo log,
//! executed by dedicated worker threads.
//!
//! A transaction acquires record locks as it goes (exclusive for
//! mutations, shared for reads) and never waits: any conflict aborts it,
//! replaying the undo log in reverse. Fatal storage errors are surfaced
//! as-is without attempting rollback I/O.

mod worker;

#[cfg(test)]
mod tests;

pub use worker::TransactionWorker;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use common::{ColumnId, ColumnUpdate, DbError, DbResult};
use table::{LockMode, Table};
use tracing::debug;

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// One deferred operation against a table.
#[derive(Clone, Debug)]
pub enum Operation {
    Insert(Vec<i64>),
    Update {
        pk: i64,
        updates: Vec<ColumnUpdate>,
    },
    Delete {
        pk: i64,
    },
    Select {
        value: i64,
        column: ColumnId,
        projection: Vec<bool>,
    },
    SelectVersion {
        value: i64,
        column: ColumnId,
        projection: Vec<bool>,
        version: i64,
    },
    Sum {
        low: i64,
        high: i64,
        column: ColumnId,
    },
    SumVersion {
        low: i64,
        high: i64,
        column: ColumnId,
        version: i64,
    },
}

struct Step {
    table: Arc<Table>,
    operation: Operation,
}

enum UndoEntry {
    /// insert → delete
    Insert { table: Arc<Table>, pk: i64 },
    /// update → update back to the prior snapshot (keyed by the pk the
    /// record holds *after* the update, in case the update re-keyed it)
    Update {
        table: Arc<Table>,
        pk_after: i64,
        prior: Vec<i64>,
    },
    /// delete → re-insert the last current snapshot
    Delete { table: Arc<Table>, values: Vec<i64> },
}

/// An ordered list of deferred operations. `run` executes them in order
/// and either commits (all succeeded) or aborts, rolling back every
/// mutation already applied.
pub struct Transaction {
    id: u64,
    steps: Vec<Step>,
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            id: NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed),
            steps: Vec::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Enqueue an operation. Nothing executes until `run`.
    pub fn add(&mut self, table: &Arc<Table>, operation: Operation) {
        self.steps.push(Step {
            table: Arc::clone(table),
            operation,
        });
    }

    /// Execute the queued operations. `Ok(true)` means committed,
    /// `Ok(false)` aborted (conflict or recoverable failure, rolled back),
    /// `Err` a fatal storage error.
    pub fn run(&self) -> DbResult<bool> {
        let mut undo: Vec<UndoEntry> = Vec::new();
        let mut touched: Vec<Arc<Table>> = Vec::new();

        for step in &self.steps {
            if !touched.iter().any(|t| Arc::ptr_eq(t, &step.table)) {
                touched.push(Arc::clone(&step.table));
            }
            match self.execute(step, &mut undo) {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    self.release_locks(&touched);
                    return Err(e);
                }
                Err(e) => {
                    debug!(tx = self.id, error = %e, "aborting transaction");
                    self.rollback(undo)?;
                    self.release_locks(&touched);
                    return Ok(false);
                }
            }
        }

        self.release_locks(&touched);
        Ok(true)
    }

    fn execute(&self, step: &Step, undo: &mut Vec<UndoEntry>) -> DbResult<()> {
        let table = &step.table;
        match &step.operation {
            Operation::Insert(values) => {
                let rid = table.insert(values)?;
                // The RID is fresh, so this cannot conflict; holding it
                // keeps other transactions off the row until we resolve.
                table.locks().try_acquire(self.id, rid, LockMode::Exclusive)?;
                undo.push(UndoEntry::Insert {
                    table: Arc::clone(table),
                    pk: values[table.primary_key_column()],
                });
            }
            Operation::Update { pk, updates } => {
                let Some(rid) = table.rid_for(*pk) else {
                    return Err(DbError::KeyNotFound(*pk));
                };
                table.locks().try_acquire(self.id, rid, LockMode::Exclusive)?;
                let prior = table
                    .read_version(rid, 0)?
                    .ok_or(DbError::KeyNotFound(*pk))?;
                table.update(*pk, updates)?;
                let pk_after = updates[table.primary_key_column()].apply(*pk);
                undo.push(UndoEntry::Update {
                    table: Arc::clone(table),
                    pk_after,
                    prior,
                });
            }
            Operation::Delete { pk } => {
                let Some(rid) = table.rid_for(*pk) else {
                    return Err(DbError::KeyNotFound(*pk));
                };
                table.locks().try_acquire(self.id, rid, LockMode::Exclusive)?;
                let values = table
                    .read_version(rid, 0)?
                    .ok_or(DbError::KeyNotFound(*pk))?;
                table.delete(*pk)?;
                undo.push(UndoEntry::Delete {
                    table: Arc::clone(table),
                    values,
                });
            }
            Operation::Select {
                value,
                column,
                projection,
            } => {
                self.lock_for_read(table, *value, *column)?;
                table.select(*value, *column, projection)?;
            }
            Operation::SelectVersion {
                value,
                column,
                projection,
                version,
            } => {
                self.lock_for_read(table, *value, *column)?;
                table.select_version(*value, *column, projection, *version)?;
            }
            Operation::Sum { low, high, column } => {
                self.lock_range_for_read(table, *low, *high)?;
                table.sum(*low, *high, *column)?;
            }
            Operation::SumVersion {
                low,
                high,
                column,
                version,
            } => {
                self.lock_range_for_read(table, *low, *high)?;
                table.sum_version(*low, *high, *column, *version)?;
            }
        }
        Ok(())
    }

    fn lock_for_read(&self, table: &Arc<Table>, value: i64, column: ColumnId) -> DbResult<()> {
        // Only primary-key lookups name a single record to lock; scans and
        // secondary lookups read whatever is committed.
        if column == table.primary_key_column() {
            if let Some(rid) = table.rid_for(value) {
                table.locks().try_acquire(self.id, rid, LockMode::Shared)?;
            }
        }
        Ok(())
    }

    fn lock_range_for_read(&self, table: &Arc<Table>, low: i64, high: i64) -> DbResult<()> {
        for rid in table.rids_in_range(low, high) {
            table.locks().try_acquire(self.id, rid, LockMode::Shared)?;
        }
        Ok(())
    }

    /// Replay the undo log newest-first. Recoverable failures are logged
    /// and skipped; fatal errors are surfaced immediately.
    fn rollback(&self, undo: Vec<UndoEntry>) -> DbResult<()> {
        for entry in undo.into_iter().rev() {
            let result = match &entry {
                UndoEntry::Insert { table, pk } => table.delete(*pk).map(|_| ()),
                UndoEntry::Update {
                    table,
                    pk_after,
                    prior,
                } => {
                    let restore: Vec<ColumnUpdate> =
                        prior.iter().map(|v| ColumnUpdate::Set(*v)).collect();
                    table.update(*pk_after, &restore).map(|_| ())
                }
                UndoEntry::Delete { table, values } => table.insert(values).map(|_| ()),
            };
            match result {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => debug!(tx = self.id, error = %e, "undo entry skipped"),
            }
        }
        Ok(())
    }

    fn release_locks(&self, touched: &[Arc<Table>]) {
        for table in touched {
            table.locks().release_all(self.id);
        }
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

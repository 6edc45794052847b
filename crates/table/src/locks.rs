use ahash::RandomState;
use common::{DbError, DbResult, Rid};
use hashbrown::HashMap;
use parking_lot::Mutex;

type Map<K, V> = HashMap<K, V, RandomState>;

/// Lock mode a transaction requests on a RID.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug, Default)]
struct LockEntry {
    readers: Vec<u64>,
    writer: Option<u64>,
}

/// Record-level lock table with no-wait semantics: a conflicting request
/// fails immediately with `DbError::Conflict`, and the requesting
/// transaction aborts rather than queueing. Locks are held until the
/// transaction releases them at commit or abort.
#[derive(Debug, Default)]
pub struct LockManager {
    table: Mutex<Map<Rid, LockEntry>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire `mode` on `rid` for transaction `tx`. Re-acquiring a lock
    /// the transaction already holds succeeds, including a shared→exclusive
    /// upgrade when `tx` is the sole reader.
    pub fn try_acquire(&self, tx: u64, rid: Rid, mode: LockMode) -> DbResult<()> {
        let mut table = self.table.lock();
        let entry = table.entry(rid).or_default();
        if entry.writer.is_some_and(|w| w != tx) {
            return Err(DbError::Conflict(format!(
                "rid {} is write-locked by another transaction",
                rid.0
            )));
        }
        match mode {
            LockMode::Shared => {
                if !entry.readers.contains(&tx) {
                    entry.readers.push(tx);
                }
            }
            LockMode::Exclusive => {
                if entry.readers.iter().any(|r| *r != tx) {
                    return Err(DbError::Conflict(format!(
                        "rid {} is read-locked by another transaction",
                        rid.0
                    )));
                }
                entry.writer = Some(tx);
            }
        }
        Ok(())
    }

    /// Drop every lock held by `tx`.
    pub fn release_all(&self, tx: u64) {
        let mut table = self.table.lock();
        table.retain(|_, entry| {
            entry.readers.retain(|r| *r != tx);
            if entry.writer == Some(tx) {
                entry.writer = None;
            }
            !entry.readers.is_empty() || entry.writer.is_some()
        });
    }

    #[cfg(test)]
    pub(crate) fn is_locked(&self, rid: Rid) -> bool {
        self.table.lock().contains_key(&rid)
    }
}

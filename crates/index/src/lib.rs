//! Index layer: a unique primary-key map plus optional per-column
//! secondary indexes.
//!
//! The primary index is an ordered map so `sum`'s inclusive PK ranges
//! enumerate cheaply. Secondary indexes are hash multimaps over the
//! *current* version of a column; historical lookups always go through a
//! scan. Selects take read locks, mutations take write locks.

#[cfg(test)]
mod tests;

use ahash::RandomState;
use common::{ColumnId, DbError, DbResult, Rid};
use hashbrown::HashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;

type Map<K, V> = HashMap<K, V, RandomState>;

/// Unique map from primary-key value to base RID.
#[derive(Debug, Default)]
pub struct PrimaryIndex {
    map: RwLock<BTreeMap<i64, Rid>>,
}

impl PrimaryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore from a persisted snapshot.
    pub fn from_entries(entries: impl IntoIterator<Item = (i64, Rid)>) -> Self {
        Self {
            map: RwLock::new(entries.into_iter().collect()),
        }
    }

    pub fn insert(&self, key: i64, rid: Rid) -> DbResult<()> {
        let mut map = self.map.write();
        if map.contains_key(&key) {
            return Err(DbError::DuplicateKey(key));
        }
        map.insert(key, rid);
        Ok(())
    }

    pub fn get(&self, key: i64) -> Option<Rid> {
        self.map.read().get(&key).copied()
    }

    pub fn contains(&self, key: i64) -> bool {
        self.map.read().contains_key(&key)
    }

    pub fn remove(&self, key: i64) -> Option<Rid> {
        self.map.write().remove(&key)
    }

    /// Re-key a record whose primary-key column changed. Atomic: the old
    /// entry is only removed once the new key is known to be free.
    pub fn reassign(&self, old_key: i64, new_key: i64, rid: Rid) -> DbResult<()> {
        if old_key == new_key {
            return Ok(());
        }
        let mut map = self.map.write();
        if map.contains_key(&new_key) {
            return Err(DbError::DuplicateKey(new_key));
        }
        map.remove(&old_key);
        map.insert(new_key, rid);
        Ok(())
    }

    /// RIDs whose key falls in `[low, high]`, in key order.
    pub fn range(&self, low: i64, high: i64) -> Vec<Rid> {
        self.map
            .read()
            .range(low..=high)
            .map(|(_, rid)| *rid)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    /// Ordered dump for persistence.
    pub fn entries(&self) -> Vec<(i64, Rid)> {
        self.map.read().iter().map(|(k, v)| (*k, *v)).collect()
    }
}

/// Non-unique map from a column value to the base RIDs currently holding it.
#[derive(Debug, Default)]
pub struct SecondaryIndex {
    map: RwLock<Map<i64, Vec<Rid>>>,
}

impl SecondaryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, value: i64, rid: Rid) {
        self.map.write().entry(value).or_default().push(rid);
    }

    pub fn remove(&self, value: i64, rid: Rid) {
        let mut map = self.map.write();
        if let Some(rids) = map.get_mut(&value) {
            rids.retain(|r| *r != rid);
            if rids.is_empty() {
                map.remove(&value);
            }
        }
    }

    pub fn get(&self, value: i64) -> Vec<Rid> {
        self.map.read().get(&value).cloned().unwrap_or_default()
    }
}

/// All indexes of one table. The primary index always exists; secondaries
/// are created lazily and dropped on request.
#[derive(Debug)]
pub struct TableIndexes {
    num_columns: usize,
    pk_column: ColumnId,
    primary: PrimaryIndex,
    secondaries: Vec<RwLock<Option<SecondaryIndex>>>,
}

impl TableIndexes {
    pub fn new(num_columns: usize, pk_column: ColumnId) -> Self {
        Self {
            num_columns,
            pk_column,
            primary: PrimaryIndex::new(),
            secondaries: (0..num_columns).map(|_| RwLock::new(None)).collect(),
        }
    }

    pub fn with_primary(num_columns: usize, pk_column: ColumnId, primary: PrimaryIndex) -> Self {
        Self {
            num_columns,
            pk_column,
            primary,
            secondaries: (0..num_columns).map(|_| RwLock::new(None)).collect(),
        }
    }

    pub fn primary(&self) -> &PrimaryIndex {
        &self.primary
    }

    pub fn pk_column(&self) -> ColumnId {
        self.pk_column
    }

    fn check_column(&self, column: ColumnId) -> DbResult<()> {
        if column >= self.num_columns {
            return Err(DbError::BadArgument(format!(
                "column {column} out of bounds for {} columns",
                self.num_columns
            )));
        }
        Ok(())
    }

    pub fn has_secondary(&self, column: ColumnId) -> bool {
        column < self.num_columns && self.secondaries[column].read().is_some()
    }

    /// Build a secondary index over `column` from the given current-version
    /// entries. Indexing the primary column is rejected: it is always
    /// indexed.
    pub fn create_secondary(
        &self,
        column: ColumnId,
        entries: impl IntoIterator<Item = (i64, Rid)>,
    ) -> DbResult<()> {
        self.check_column(column)?;
        if column == self.pk_column {
            return Err(DbError::BadArgument(
                "primary key column is always indexed".into(),
            ));
        }
        let index = SecondaryIndex::new();
        for (value, rid) in entries {
            index.add(value, rid);
        }
        *self.secondaries[column].write() = Some(index);
        Ok(())
    }

    pub fn drop_secondary(&self, column: ColumnId) -> DbResult<()> {
        self.check_column(column)?;
        *self.secondaries[column].write() = None;
        Ok(())
    }

    /// Index-assisted lookup. `None` means no index covers `column` and the
    /// caller must fall back to a scan.
    pub fn lookup(&self, column: ColumnId, value: i64) -> DbResult<Option<Vec<Rid>>> {
        self.check_column(column)?;
        if column == self.pk_column {
            return Ok(Some(self.primary.get(value).into_iter().collect()));
        }
        let guard = self.secondaries[column].read();
        Ok(guard.as_ref().map(|index| index.get(value)))
    }

    /// Maintain indexes for a freshly inserted record. The caller has
    /// already claimed the primary key.
    pub fn on_insert(&self, rid: Rid, values: &[i64]) {
        for (column, secondary) in self.secondaries.iter().enumerate() {
            if let Some(index) = secondary.read().as_ref() {
                index.add(values[column], rid);
            }
        }
    }

    /// Maintain secondaries after an update changed `old` to `new`.
    /// Primary-key changes go through `PrimaryIndex::reassign` beforehand.
    pub fn on_update(&self, rid: Rid, old: &[i64], new: &[i64]) {
        for (column, secondary) in self.secondaries.iter().enumerate() {
            if old[column] == new[column] {
                continue;
            }
            if let Some(index) = secondary.read().as_ref() {
                index.remove(old[column], rid);
                index.add(new[column], rid);
            }
        }
    }

    /// Drop a deleted record from every index.
    pub fn on_delete(&self, rid: Rid, current: &[i64]) {
        self.primary.remove(current[self.pk_column]);
        for (column, secondary) in self.secondaries.iter().enumerate() {
            if let Some(index) = secondary.read().as_ref() {
                index.remove(current[column], rid);
            }
        }
    }
}

use ahash::RandomState;
use common::{DbError, DbResult, RecordLocation, Rid};
use hashbrown::HashMap;
use parking_lot::RwLock;

type Map<K, V> = HashMap<K, V, RandomState>;

/// RID → physical location map. Entries are written once at insert/update
/// registration and never move afterwards: a merge swaps the page lists
/// behind a range, not the logical coordinates recorded here.
#[derive(Debug, Default)]
pub struct PageDirectory {
    map: RwLock<Map<Rid, RecordLocation>>,
}

impl PageDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (Rid, RecordLocation)>) -> Self {
        Self {
            map: RwLock::new(entries.into_iter().collect()),
        }
    }

    pub fn register(&self, rid: Rid, location: RecordLocation) {
        self.map.write().insert(rid, location);
    }

    /// A RID handed out by an index or chain walk must resolve; a miss
    /// means the directory is corrupt, not that the caller's key is bad.
    pub fn translate(&self, rid: Rid) -> DbResult<RecordLocation> {
        self.map
            .read()
            .get(&rid)
            .copied()
            .ok_or_else(|| DbError::Storage(format!("rid {} missing from page directory", rid.0)))
    }

    pub fn get(&self, rid: Rid) -> Option<RecordLocation> {
        self.map.read().get(&rid).copied()
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    /// All registered base RIDs, ascending. Drives scans and rebuilds.
    pub fn base_rids(&self) -> Vec<Rid> {
        let mut rids: Vec<Rid> = self
            .map
            .read()
            .keys()
            .copied()
            .filter(|rid| rid.is_base())
            .collect();
        rids.sort_unstable();
        rids
    }

    /// Dump for persistence.
    pub fn entries(&self) -> Vec<(Rid, RecordLocation)> {
        self.map
            .read()
            .iter()
            .map(|(rid, loc)| (*rid, *loc))
            .collect()
    }
}

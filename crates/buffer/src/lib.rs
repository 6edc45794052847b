//! Buffer pool manager for page-level caching and I/O.
//!
//! The pool sits between the record layout and the per-table disk managers,
//! providing:
//! - a bounded frame cache keyed by `(TableId, PageId)`
//! - pin counts and RAII guards so frames in use are never evicted
//! - dirty tracking with write-back on eviction and explicit flush
//! - LRU eviction over unpinned frames only
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use buffer::BufferPool;
//! use common::{PageKey, RecordSet, TableId};
//! use storage::TableDisk;
//!
//! let pool = Arc::new(BufferPool::new(64));
//! let table = TableId(1);
//! pool.register_table(table, Arc::new(TableDisk::open("/tmp/db/tables/t").unwrap()));
//!
//! let key = PageKey { range: 0, set: RecordSet::Base, column: 0, index: 0 };
//! let (pid, mut guard) = pool.new_page(table, key).unwrap();
//! guard.write().append(42).unwrap();
//! drop(guard); // unpins, leaving the frame evictable
//! pool.flush_all().unwrap();
//! ```


use ahash::RandomState;
use common::{DbError, DbResult, PageId, PageKey, TableId};
use hashbrown::HashMap;
use lru::LruCache;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::num::NonZeroUsize;
use std::sync::Arc;
use storage::{Page, TableDisk};
use tracing::trace;

type Map<K, V> = HashMap<K, V, RandomState>;
type FrameKey = (TableId, PageId);

#[derive(Debug)]
struct Frame {
    page: Arc<RwLock<Page>>,
    pin_count: u32,
    dirty: bool,
}

#[derive(Debug)]
struct PoolState {
    frames: Map<FrameKey, Frame>,
    /// Unpinned frames in least-recently-used order. Pinned frames are
    /// absent, so `pop_lru` only ever yields legal victims.
    candidates: LruCache<FrameKey, ()>,
}

/// Bounded, shared page cache. One latch serializes the frame table; page
/// contents sit behind per-frame locks so pinned frames may be read by
/// several threads while the latch is free.
#[derive(Debug)]
pub struct BufferPool {
    capacity: usize,
    state: Mutex<PoolState>,
    disks: RwLock<Map<TableId, Arc<TableDisk>>>,
}

impl BufferPool {
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        Self {
            capacity,
            state: Mutex::new(PoolState {
                frames: Map::default(),
                candidates: LruCache::new(NonZeroUsize::new(capacity).unwrap()),
            }),
            disks: RwLock::new(Map::default()),
        }
    }

    /// Attach a table's disk manager. Pages of `table` can be fetched once
    /// this has been called.
    pub fn register_table(&self, table: TableId, disk: Arc<TableDisk>) {
        self.disks.write().insert(table, disk);
    }

    /// Detach a table, dropping its frames without write-back. Used by
    /// `drop_table`, where the files are about to be deleted anyway.
    pub fn deregister_table(&self, table: TableId) {
        let mut state = self.state.lock();
        state.frames.retain(|(t, _), _| *t != table);
        let stale: Vec<FrameKey> = state
            .candidates
            .iter()
            .map(|(k, _)| *k)
            .filter(|(t, _)| *t == table)
            .collect();
        for key in stale {
            state.candidates.pop(&key);
        }
        self.disks.write().remove(&table);
    }

    fn disk(&self, table: TableId) -> DbResult<Arc<TableDisk>> {
        self.disks
            .read()
            .get(&table)
            .cloned()
            .ok_or_else(|| DbError::Buffer(format!("table {} not registered", table.0)))
    }

    /// Fetch a page, pinning its frame. Loads from disk on a miss, evicting
    /// the least-recently-used unpinned frame if the pool is full.
    pub fn fetch(self: &Arc<Self>, table: TableId, pid: PageId) -> DbResult<PageGuard> {
        let key = (table, pid);
        let mut state = self.state.lock();
        if let Some(frame) = state.frames.get_mut(&key) {
            frame.pin_count += 1;
            let page = Arc::clone(&frame.page);
            state.candidates.pop(&key);
            return Ok(PageGuard::new(self, table, pid, page));
        }

        self.make_room(&mut state)?;
        let page = self.disk(table)?.read_page(pid)?;
        let page = Arc::new(RwLock::new(page));
        state.frames.insert(
            key,
            Frame {
                page: Arc::clone(&page),
                pin_count: 1,
                dirty: false,
            },
        );
        Ok(PageGuard::new(self, table, pid, page))
    }

    /// Allocate a page through the table's disk manager and pin it.
    pub fn new_page(
        self: &Arc<Self>,
        table: TableId,
        key: PageKey,
    ) -> DbResult<(PageId, PageGuard)> {
        let disk = self.disk(table)?;
        let pid = disk.allocate(key)?;
        let mut state = self.state.lock();
        self.make_room(&mut state)?;
        let page = Arc::new(RwLock::new(Page::new(pid.0)));
        state.frames.insert(
            (table, pid),
            Frame {
                page: Arc::clone(&page),
                pin_count: 1,
                dirty: false,
            },
        );
        Ok((pid, PageGuard::new(self, table, pid, page)))
    }

    fn unpin(&self, table: TableId, pid: PageId, dirty: bool) {
        let key = (table, pid);
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(frame) = state.frames.get_mut(&key) else {
            return;
        };
        debug_assert!(frame.pin_count > 0, "unpin without pin");
        frame.pin_count -= 1;
        frame.dirty |= dirty;
        if frame.pin_count == 0 {
            state.candidates.push(key, ());
        }
    }

    /// Evict until a free frame exists. Fails with `DbError::Buffer` when
    /// every frame is pinned.
    fn make_room(&self, state: &mut PoolState) -> DbResult<()> {
        while state.frames.len() >= self.capacity {
            let Some(((table, pid), ())) = state.candidates.pop_lru() else {
                return Err(DbError::Buffer(format!(
                    "no eviction candidate: all {} frames pinned",
                    self.capacity
                )));
            };
            if let Some(frame) = state.frames.remove(&(table, pid)) {
                if frame.dirty {
                    self.disk(table)?.write_page(&frame.page.read())?;
                }
                trace!(table = table.0, page = pid.0, "evicted frame");
            }
        }
        Ok(())
    }

    /// Write all dirty frames of one table back to disk.
    pub fn flush_table(&self, table: TableId) -> DbResult<()> {
        let disk = self.disk(table)?;
        let mut state = self.state.lock();
        for ((t, _), frame) in state.frames.iter_mut() {
            if *t == table && frame.dirty {
                disk.write_page(&frame.page.read())?;
                frame.dirty = false;
            }
        }
        Ok(())
    }

    /// Write every dirty frame back to disk.
    pub fn flush_all(&self) -> DbResult<()> {
        let mut state = self.state.lock();
        for ((table, _), frame) in state.frames.iter_mut() {
            if frame.dirty {
                self.disk(*table)?.write_page(&frame.page.read())?;
                frame.dirty = false;
            }
        }
        Ok(())
    }

    #[cfg(test)]
    fn pin_count(&self, table: TableId, pid: PageId) -> Option<u32> {
        self.state
            .lock()
            .frames
            .get(&(table, pid))
            .map(|f| f.pin_count)
    }
}

/// Pin on one frame. Holding the guard keeps the frame resident; dropping
/// it unpins, carrying the dirty flag back to the pool.
#[derive(Debug)]
pub struct PageGuard {
    pool: Arc<BufferPool>,
    table: TableId,
    pid: PageId,
    page: Arc<RwLock<Page>>,
    dirty: bool,
}

impl PageGuard {
    fn new(pool: &Arc<BufferPool>, table: TableId, pid: PageId, page: Arc<RwLock<Page>>) -> Self {
        Self {
            pool: Arc::clone(pool),
            table,
            pid,
            page,
            dirty: false,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.pid
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Page> {
        self.page.read()
    }

    /// Lock the page for writing and mark the frame dirty.
    pub fn write(&mut self) -> RwLockWriteGuard<'_, Page> {
        self.dirty = true;
        self.page.write()
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        self.pool.unpin(self.table, self.pid, self.dirty);
    }
}

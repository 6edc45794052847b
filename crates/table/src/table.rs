use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use buffer::{BufferPool, PageGuard};
use common::{
    ColumnId, ColumnUpdate, DbError, DbResult, PageKey, Record, RecordLocation, RecordSet, Rid,
    TAIL_RID_BASE, TableId,
};
use parking_lot::{Mutex, RwLock};
use storage::TableDisk;
use tracing::debug;

use crate::directory::PageDirectory;
use crate::locks::LockManager;
use crate::merge::MergeSignal;
use crate::meta::TableMeta;
use crate::range::{
    METADATA_COLUMNS, PageRange, indirection_column, page_of, rid_column, schema_column, slot_of,
    timestamp_column,
};

const DIRECTORY_FILE: &str = "page_directory.bin";
const PRIMARY_INDEX_FILE: &str = "indexes/primary.bin";

/// Schema encodings live in one i64 slot, so column count is bounded by
/// the bitmask width.
const MAX_COLUMNS: usize = 63;

/// One table: page ranges, directory, indexes, record locks, and the seven
/// operations. All methods take `&self`; a table is shared behind an `Arc`
/// by the host, transaction workers, and its merge worker.
pub struct Table {
    id: TableId,
    name: String,
    num_columns: usize,
    pk_column: ColumnId,
    pool: Arc<BufferPool>,
    disk: Arc<TableDisk>,
    next_base_rid: AtomicI64,
    next_tail_rid: AtomicI64,
    timestamp: AtomicI64,
    pub(crate) ranges: RwLock<Vec<Arc<PageRange>>>,
    pub(crate) directory: PageDirectory,
    indexes: index::TableIndexes,
    locks: LockManager,
    /// Serializes insert/update/delete bodies. Page append cursors match
    /// claimed record positions only because mutations are sequential; the
    /// merge swap also takes this to quiesce indirection writes.
    pub(crate) mutation: Mutex<()>,
    merge_signal: RwLock<Option<Arc<MergeSignal>>>,
}

impl Table {
    pub fn create(
        pool: Arc<BufferPool>,
        disk: Arc<TableDisk>,
        id: TableId,
        name: &str,
        num_columns: usize,
        pk_index: ColumnId,
    ) -> DbResult<Arc<Self>> {
        if num_columns == 0 || num_columns > MAX_COLUMNS {
            return Err(DbError::BadArgument(format!(
                "num_columns must be in 1..={MAX_COLUMNS}, got {num_columns}"
            )));
        }
        if pk_index >= num_columns {
            return Err(DbError::BadArgument(format!(
                "primary key index {pk_index} out of bounds for {num_columns} columns"
            )));
        }
        Ok(Arc::new(Self {
            id,
            name: name.to_string(),
            num_columns,
            pk_column: pk_index,
            pool,
            disk,
            next_base_rid: AtomicI64::new(0),
            next_tail_rid: AtomicI64::new(TAIL_RID_BASE),
            timestamp: AtomicI64::new(0),
            ranges: RwLock::new(Vec::new()),
            directory: PageDirectory::new(),
            indexes: index::TableIndexes::new(num_columns, pk_index),
            locks: LockManager::new(),
            mutation: Mutex::new(()),
            merge_signal: RwLock::new(None),
        }))
    }

    /// Restore a table from its persisted header, rebuilding the page
    /// directory and primary index from pages when their files are absent.
    pub fn open(
        pool: Arc<BufferPool>,
        disk: Arc<TableDisk>,
        id: TableId,
        meta: TableMeta,
    ) -> DbResult<Arc<Self>> {
        let ranges = meta
            .ranges
            .iter()
            .map(|snapshot| Arc::new(PageRange::from_snapshot(snapshot)))
            .collect();
        let table = Arc::new(Self {
            id,
            name: meta.name.clone(),
            num_columns: meta.num_columns,
            pk_column: meta.pk_index,
            pool,
            disk,
            next_base_rid: AtomicI64::new(meta.next_base_rid),
            next_tail_rid: AtomicI64::new(meta.next_tail_rid),
            timestamp: AtomicI64::new(meta.timestamp_counter),
            ranges: RwLock::new(ranges),
            directory: PageDirectory::new(),
            indexes: index::TableIndexes::new(meta.num_columns, meta.pk_index),
            locks: LockManager::new(),
            mutation: Mutex::new(()),
            merge_signal: RwLock::new(None),
        });
        table.restore_directory()?;
        table.restore_primary_index()?;
        Ok(table)
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_columns(&self) -> usize {
        self.num_columns
    }

    pub fn primary_key_column(&self) -> ColumnId {
        self.pk_column
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub(crate) fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Base RID currently owning `pk`, if any. Transactions use this to
    /// acquire record locks before touching the row.
    pub fn rid_for(&self, pk: i64) -> Option<Rid> {
        self.indexes.primary().get(pk)
    }

    /// Base RIDs whose primary key falls in `[low, high]`, in key order.
    pub fn rids_in_range(&self, low: i64, high: i64) -> Vec<Rid> {
        self.indexes.primary().range(low, high)
    }

    // ---- the seven operations ----------------------------------------

    /// Create a base record. Fails with `DuplicateKey` when the primary
    /// key is taken and `BadArgument` on arity mismatch.
    pub fn insert(&self, values: &[i64]) -> DbResult<Rid> {
        if values.len() != self.num_columns {
            return Err(DbError::BadArgument(format!(
                "expected {} values, got {}",
                self.num_columns,
                values.len()
            )));
        }
        let _guard = self.mutation.lock();
        let pk = values[self.pk_column];
        if self.indexes.primary().contains(pk) {
            return Err(DbError::DuplicateKey(pk));
        }

        let rid = Rid(self.next_base_rid.fetch_add(1, Ordering::SeqCst));
        let range = self.open_range()?;
        let position = range.claim_base_position();
        let (page, slot) = (page_of(position), slot_of(position));
        self.ensure_pages(&range, RecordSet::Base, page as usize)?;

        let location = RecordLocation {
            range: range.id,
            set: RecordSet::Base,
            page,
            slot,
        };
        let ts = self.timestamp.fetch_add(1, Ordering::SeqCst);
        for (column, value) in values.iter().enumerate() {
            self.append_cell(&range, RecordSet::Base, column, page, slot, *value)?;
        }
        self.append_cell(&range, RecordSet::Base, indirection_column(self.num_columns), page, slot, Rid::NONE.0)?;
        self.append_cell(&range, RecordSet::Base, rid_column(self.num_columns), page, slot, rid.0)?;
        self.append_cell(&range, RecordSet::Base, schema_column(self.num_columns), page, slot, 0)?;
        self.append_cell(&range, RecordSet::Base, timestamp_column(self.num_columns), page, slot, ts)?;

        self.directory.register(rid, location);
        self.indexes.primary().insert(pk, rid)?;
        self.indexes.on_insert(rid, values);
        Ok(rid)
    }

    /// Append a tail record carrying the full post-update snapshot and
    /// re-point the base record's indirection at it. A primary-key change
    /// is allowed when the target key is free.
    pub fn update(&self, pk: i64, updates: &[ColumnUpdate]) -> DbResult<Rid> {
        if updates.len() != self.num_columns {
            return Err(DbError::BadArgument(format!(
                "expected {} update slots, got {}",
                self.num_columns,
                updates.len()
            )));
        }
        let _guard = self.mutation.lock();
        let rid = self
            .indexes
            .primary()
            .get(pk)
            .ok_or(DbError::KeyNotFound(pk))?;
        let base_loc = self.directory.translate(rid)?;
        let range = self.range_of(base_loc.range)?;

        let current = self
            .read_version_in(&range, base_loc, 0)?
            .ok_or(DbError::KeyNotFound(pk))?;
        let new_values: Vec<i64> = updates
            .iter()
            .zip(&current)
            .map(|(update, current)| update.apply(*current))
            .collect();

        let new_pk = new_values[self.pk_column];
        if new_pk != pk {
            self.indexes.primary().reassign(pk, new_pk, rid)?;
        }

        let tail_rid = Rid(self.next_tail_rid.fetch_add(1, Ordering::SeqCst));
        let position = range.claim_tail_position();
        let (page, slot) = (page_of(position), slot_of(position));
        self.ensure_pages(&range, RecordSet::Tail, page as usize)?;

        let mask: i64 = updates
            .iter()
            .enumerate()
            .filter(|(_, u)| u.is_set())
            .fold(0, |mask, (i, _)| mask | (1 << i));
        let prev_head = self.read_cell(&range, base_loc, indirection_column(self.num_columns))?;
        let ts = self.timestamp.fetch_add(1, Ordering::SeqCst);

        for (column, value) in new_values.iter().enumerate() {
            self.append_cell(&range, RecordSet::Tail, column, page, slot, *value)?;
        }
        self.append_cell(&range, RecordSet::Tail, indirection_column(self.num_columns), page, slot, prev_head)?;
        self.append_cell(&range, RecordSet::Tail, rid_column(self.num_columns), page, slot, tail_rid.0)?;
        self.append_cell(&range, RecordSet::Tail, schema_column(self.num_columns), page, slot, mask)?;
        self.append_cell(&range, RecordSet::Tail, timestamp_column(self.num_columns), page, slot, ts)?;

        let tail_loc = RecordLocation {
            range: range.id,
            set: RecordSet::Tail,
            page,
            slot,
        };
        // Publish the tail before re-pointing the base so a concurrent
        // chain walk never follows a RID the directory cannot resolve.
        self.directory.register(tail_rid, tail_loc);
        self.write_cell(&range, base_loc, indirection_column(self.num_columns), tail_rid.0)?;
        let schema = self.read_cell(&range, base_loc, schema_column(self.num_columns))?;
        self.write_cell(&range, base_loc, schema_column(self.num_columns), schema | mask)?;

        self.indexes.on_update(rid, &current, &new_values);
        Ok(tail_rid)
    }

    /// Tombstone a base record. The slot is not reclaimed and the version
    /// chain becomes unreachable.
    pub fn delete(&self, pk: i64) -> DbResult<()> {
        let _guard = self.mutation.lock();
        let rid = self
            .indexes
            .primary()
            .get(pk)
            .ok_or(DbError::KeyNotFound(pk))?;
        let base_loc = self.directory.translate(rid)?;
        let range = self.range_of(base_loc.range)?;
        let current = self
            .read_version_in(&range, base_loc, 0)?
            .ok_or(DbError::KeyNotFound(pk))?;

        self.write_cell(&range, base_loc, indirection_column(self.num_columns), Rid::TOMBSTONE.0)?;
        self.indexes.on_delete(rid, &current);
        Ok(())
    }

    /// Current-version select. See [`Table::select_version`].
    pub fn select(
        &self,
        search_value: i64,
        search_column: ColumnId,
        projection: &[bool],
    ) -> DbResult<Vec<Record>> {
        self.select_version(search_value, search_column, projection, 0)
    }

    /// Select at a relative version: 0 is latest, `-k` rewinds `k` updates
    /// saturating at the base record; positive versions read the latest.
    /// Indexed columns resolve through their index; anything else falls
    /// back to a full scan of live records.
    pub fn select_version(
        &self,
        search_value: i64,
        search_column: ColumnId,
        projection: &[bool],
        version: i64,
    ) -> DbResult<Vec<Record>> {
        self.check_projection(projection)?;
        let version = version.min(0);
        let rids = if search_column == self.pk_column || version == 0 {
            match self.indexes.lookup(search_column, search_value)? {
                Some(rids) => rids,
                None => self.scan_matching(search_column, search_value, version)?,
            }
        } else {
            // Secondary indexes track the current version only, so a
            // historical lookup on a non-key column matches on the
            // rewound value instead.
            self.check_column(search_column)?;
            self.scan_matching(search_column, search_value, version)?
        };
        let mut records = Vec::with_capacity(rids.len());
        for rid in rids {
            if let Some(values) = self.read_version(rid, version)? {
                records.push(Record::new(rid, project(&values, projection)));
            }
        }
        Ok(records)
    }

    /// Sum `column` over live records whose primary key falls in
    /// `[pk_low, pk_high]`. Wrapping i64 arithmetic; an empty range sums
    /// to zero.
    pub fn sum(&self, pk_low: i64, pk_high: i64, column: ColumnId) -> DbResult<i64> {
        self.sum_version(pk_low, pk_high, column, 0)
    }

    pub fn sum_version(
        &self,
        pk_low: i64,
        pk_high: i64,
        column: ColumnId,
        version: i64,
    ) -> DbResult<i64> {
        if pk_low > pk_high {
            return Err(DbError::BadArgument(format!(
                "inverted key range [{pk_low}, {pk_high}]"
            )));
        }
        self.check_column(column)?;
        let mut total: i64 = 0;
        for rid in self.indexes.primary().range(pk_low, pk_high) {
            if let Some(values) = self.read_version(rid, version)? {
                total = total.wrapping_add(values[column]);
            }
        }
        Ok(total)
    }

    // ---- secondary index management ----------------------------------

    /// Build a secondary index over `column` from live current-version
    /// values.
    pub fn create_index(&self, column: ColumnId) -> DbResult<()> {
        self.check_column(column)?;
        let _guard = self.mutation.lock();
        let mut entries = Vec::new();
        for rid in self.directory.base_rids() {
            if let Some(values) = self.read_version(rid, 0)? {
                entries.push((values[column], rid));
            }
        }
        self.indexes.create_secondary(column, entries)
    }

    pub fn drop_index(&self, column: ColumnId) -> DbResult<()> {
        self.indexes.drop_secondary(column)
    }

    // ---- persistence --------------------------------------------------

    /// Write this table's dirty frames back to disk.
    pub fn flush(&self) -> DbResult<()> {
        self.pool.flush_table(self.id)
    }

    /// Delete the table's on-disk footprint. Used by `drop_table` after
    /// the buffer pool has discarded the table's frames.
    pub fn destroy(&self) -> DbResult<()> {
        self.disk.destroy()
    }

    /// Write the meta header, page directory, and primary index.
    pub fn persist(&self) -> DbResult<()> {
        self.to_meta().save(&self.disk)?;
        let directory = bincode::serde::encode_to_vec(
            self.directory.entries(),
            bincode::config::legacy(),
        )
        .map_err(|e| DbError::Storage(format!("serialize page directory: {e}")))?;
        self.disk.write_blob(DIRECTORY_FILE, &directory)?;
        let primary = bincode::serde::encode_to_vec(
            self.indexes.primary().entries(),
            bincode::config::legacy(),
        )
        .map_err(|e| DbError::Storage(format!("serialize primary index: {e}")))?;
        self.disk.write_blob(PRIMARY_INDEX_FILE, &primary)?;
        Ok(())
    }

    pub fn to_meta(&self) -> TableMeta {
        let ranges = self.ranges.read();
        TableMeta {
            name: self.name.clone(),
            num_columns: self.num_columns,
            pk_index: self.pk_column,
            next_base_rid: self.next_base_rid.load(Ordering::SeqCst),
            next_tail_rid: self.next_tail_rid.load(Ordering::SeqCst),
            timestamp_counter: self.timestamp.load(Ordering::SeqCst),
            page_range_count: ranges.len() as u32,
            ranges: ranges.iter().map(|range| range.to_snapshot()).collect(),
        }
    }

    fn restore_directory(&self) -> DbResult<()> {
        if let Some(bytes) = self.disk.read_blob(DIRECTORY_FILE)? {
            let (entries, _): (Vec<(Rid, RecordLocation)>, usize) =
                bincode::serde::decode_from_slice(&bytes, bincode::config::legacy())
                    .map_err(|e| DbError::Storage(format!("decode page directory: {e}")))?;
            for (rid, location) in entries {
                self.directory.register(rid, location);
            }
            return Ok(());
        }
        debug!(table = %self.name, "page directory missing, rebuilding from pages");
        let ranges: Vec<Arc<PageRange>> = self.ranges.read().clone();
        for range in ranges {
            for (set, records) in [
                (RecordSet::Base, range.base_records()),
                (RecordSet::Tail, range.tail_records()),
            ] {
                for position in 0..records {
                    let location = RecordLocation {
                        range: range.id,
                        set,
                        page: page_of(position),
                        slot: slot_of(position),
                    };
                    let rid = self.read_cell(&range, location, rid_column(self.num_columns))?;
                    self.directory.register(Rid(rid), location);
                }
            }
        }
        Ok(())
    }

    fn restore_primary_index(&self) -> DbResult<()> {
        if let Some(bytes) = self.disk.read_blob(PRIMARY_INDEX_FILE)? {
            let (entries, _): (Vec<(i64, Rid)>, usize) =
                bincode::serde::decode_from_slice(&bytes, bincode::config::legacy())
                    .map_err(|e| DbError::Storage(format!("decode primary index: {e}")))?;
            for (key, rid) in entries {
                self.indexes.primary().insert(key, rid)?;
            }
            return Ok(());
        }
        debug!(table = %self.name, "primary index missing, rebuilding from live records");
        for rid in self.directory.base_rids() {
            if let Some(values) = self.read_version(rid, 0)? {
                self.indexes.primary().insert(values[self.pk_column], rid)?;
            }
        }
        Ok(())
    }

    // ---- version traversal --------------------------------------------

    /// User-column values of `rid` at a relative version, or `None` when
    /// the record is deleted.
    pub fn read_version(&self, rid: Rid, version: i64) -> DbResult<Option<Vec<i64>>> {
        let location = self.directory.translate(rid)?;
        let range = self.range_of(location.range)?;
        self.read_version_in(&range, location, version)
    }

    pub(crate) fn read_version_in(
        &self,
        range: &PageRange,
        base_loc: RecordLocation,
        version: i64,
    ) -> DbResult<Option<Vec<i64>>> {
        let head = Rid(self.read_cell(range, base_loc, indirection_column(self.num_columns))?);
        if head.is_tombstone() {
            return Ok(None);
        }
        let tps = range.tps();
        let mut remaining = version.min(0).unsigned_abs();
        let mut current = head;
        // A link is live while it names a tail newer than the merge
        // watermark; NONE and consolidated links resolve to the base.
        while remaining > 0 && current.is_tail() && current.0 > tps {
            let tail_loc = self.directory.translate(current)?;
            current = Rid(self.read_cell(range, tail_loc, indirection_column(self.num_columns))?);
            remaining -= 1;
        }
        let location = if current.is_tail() && current.0 > tps {
            self.directory.translate(current)?
        } else {
            base_loc
        };
        let mut values = Vec::with_capacity(self.num_columns);
        for column in 0..self.num_columns {
            values.push(self.read_cell(range, location, column)?);
        }
        Ok(Some(values))
    }

    /// Full scan over live base records, matching `column` at `version`.
    fn scan_matching(&self, column: ColumnId, value: i64, version: i64) -> DbResult<Vec<Rid>> {
        let mut matches = Vec::new();
        for rid in self.directory.base_rids() {
            if let Some(values) = self.read_version(rid, version)?
                && values[column] == value
            {
                matches.push(rid);
            }
        }
        Ok(matches)
    }

    // ---- page plumbing ------------------------------------------------

    /// The open (last, non-full) page range, creating one when needed.
    fn open_range(&self) -> DbResult<Arc<PageRange>> {
        let mut ranges = self.ranges.write();
        if let Some(last) = ranges.last()
            && !last.is_full()
        {
            return Ok(Arc::clone(last));
        }
        let range = Arc::new(PageRange::new(
            ranges.len() as u32,
            self.num_columns + METADATA_COLUMNS,
        ));
        ranges.push(Arc::clone(&range));
        Ok(range)
    }

    fn range_of(&self, id: u32) -> DbResult<Arc<PageRange>> {
        self.ranges
            .read()
            .get(id as usize)
            .cloned()
            .ok_or_else(|| DbError::Storage(format!("page range {id} does not exist")))
    }

    /// Make sure every column of `set` has a page at `page_index`,
    /// allocating a full column batch when the previous pages filled up.
    fn ensure_pages(&self, range: &PageRange, set: RecordSet, page_index: usize) -> DbResult<()> {
        let mut pages = range.pages(set).write();
        let mut grew = false;
        while pages.page_count() <= page_index {
            let index = pages.page_count() as u16;
            for column in 0..pages.columns.len() {
                let key = PageKey {
                    range: range.id,
                    set,
                    column: column as u16,
                    index,
                };
                let (pid, guard) = self.pool.new_page(self.id, key)?;
                drop(guard);
                pages.columns[column].push(pid);
            }
            grew = true;
        }
        drop(pages);
        if grew && set == RecordSet::Tail {
            self.notify_merge();
        }
        Ok(())
    }

    pub(crate) fn column_page(
        &self,
        range: &PageRange,
        set: RecordSet,
        column: usize,
        page_index: u16,
    ) -> DbResult<PageGuard> {
        let pid = {
            let pages = range.pages(set).read();
            *pages
                .columns
                .get(column)
                .and_then(|pages| pages.get(page_index as usize))
                .ok_or_else(|| {
                    DbError::Storage(format!(
                        "range {} has no {:?} page {page_index} for column {column}",
                        range.id, set
                    ))
                })?
        };
        self.pool.fetch(self.id, pid)
    }

    fn append_cell(
        &self,
        range: &PageRange,
        set: RecordSet,
        column: usize,
        page_index: u16,
        expected_slot: u16,
        value: i64,
    ) -> DbResult<()> {
        let mut guard = self.column_page(range, set, column, page_index)?;
        let slot = guard.write().append(value)?;
        debug_assert_eq!(slot, expected_slot, "append cursor drifted from claimed position");
        Ok(())
    }

    pub(crate) fn read_cell(
        &self,
        range: &PageRange,
        location: RecordLocation,
        column: usize,
    ) -> DbResult<i64> {
        let guard = self.column_page(range, location.set, column, location.page)?;
        let value = guard.read().read_slot(location.slot)?;
        Ok(value)
    }

    fn write_cell(
        &self,
        range: &PageRange,
        location: RecordLocation,
        column: usize,
        value: i64,
    ) -> DbResult<()> {
        let mut guard = self.column_page(range, location.set, column, location.page)?;
        guard.write().write_slot(location.slot, value)
    }

    // ---- merge wiring -------------------------------------------------

    pub(crate) fn attach_merge_signal(&self, signal: Arc<MergeSignal>) {
        *self.merge_signal.write() = Some(signal);
    }

    fn notify_merge(&self) {
        if let Some(signal) = self.merge_signal.read().as_ref() {
            signal.notify();
        }
    }

    /// A full page range whose tail growth since its last merge crossed
    /// `threshold_pages`, claimed for merging.
    pub(crate) fn merge_candidate(&self, threshold_pages: usize) -> Option<Arc<PageRange>> {
        let ranges = self.ranges.read();
        ranges
            .iter()
            .find(|range| {
                range.is_full()
                    && range.unmerged_tail_pages() >= threshold_pages
                    && range.try_begin_merge()
            })
            .cloned()
    }

    // ---- validation ---------------------------------------------------

    fn check_projection(&self, projection: &[bool]) -> DbResult<()> {
        if projection.len() != self.num_columns {
            return Err(DbError::BadArgument(format!(
                "projection length {} does not match {} columns",
                projection.len(),
                self.num_columns
            )));
        }
        Ok(())
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
}

fn project(values: &[i64], projection: &[bool]) -> Vec<i64> {
    values
        .iter()
        .zip(projection)
        .filter_map(|(value, keep)| keep.then_some(*value))
        .collect()
}

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use common::{DbResult, PageKey, RecordSet, Rid};
use parking_lot::{Condvar, Mutex};
use storage::SLOTS_PER_PAGE;
use tracing::{info, warn};

use crate::range::{
    METADATA_COLUMNS, PageRange, RangePages, indirection_column, schema_column,
};
use crate::table::Table;

/// Wakeup channel between writers (tail page growth) and the merge thread.
#[derive(Debug, Default)]
pub(crate) struct MergeSignal {
    pending: Mutex<bool>,
    condvar: Condvar,
    shutdown: AtomicBool,
}

impl MergeSignal {
    pub(crate) fn notify(&self) {
        *self.pending.lock() = true;
        self.condvar.notify_one();
    }

    fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.condvar.notify_one();
    }

    fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

/// Background compaction thread for one table. Sleeps on a condvar until a
/// writer grows a tail page set, then folds every candidate range's tail
/// snapshots back into copy-on-write base pages.
pub struct MergeWorker {
    signal: Arc<MergeSignal>,
    handle: Option<JoinHandle<()>>,
}

impl MergeWorker {
    pub fn spawn(table: Arc<Table>, threshold_pages: usize) -> DbResult<Self> {
        let signal = Arc::new(MergeSignal::default());
        table.attach_merge_signal(Arc::clone(&signal));
        let thread_signal = Arc::clone(&signal);
        let handle = thread::Builder::new()
            .name(format!("merge-{}", table.name()))
            .spawn(move || merge_loop(table, thread_signal, threshold_pages))?;
        Ok(Self {
            signal,
            handle: Some(handle),
        })
    }

    /// Stop the worker and wait for it to exit. An in-flight merge runs to
    /// completion first.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.signal.request_shutdown();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MergeWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn merge_loop(table: Arc<Table>, signal: Arc<MergeSignal>, threshold_pages: usize) {
    loop {
        {
            let mut pending = signal.pending.lock();
            while !*pending && !signal.is_shut_down() {
                signal.condvar.wait(&mut pending);
            }
            if signal.is_shut_down() {
                return;
            }
            *pending = false;
        }
        while let Some(range) = table.merge_candidate(threshold_pages) {
            match table.merge_range(&range) {
                Ok(consolidated) if consolidated > 0 => {
                    info!(
                        table = table.name(),
                        range = range.id,
                        consolidated,
                        "merged page range"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(table = table.name(), range = range.id, error = %e, "merge failed");
                }
            }
            if signal.is_shut_down() {
                return;
            }
        }
    }
}

impl Table {
    /// Fold the current chain-head snapshot of every updated record in
    /// `range` into a fresh base page set, then atomically swap the range
    /// catalog and advance the merge watermark. Readers keep working: they
    /// hold pins on old pages or resolve through the new ones, and both
    /// agree once `tps` covers the consolidated tails.
    ///
    /// The worker only merges full ranges; a direct caller must ensure no
    /// insert lands in `range` while the merge runs (updates are fine).
    ///
    /// Returns the number of records consolidated.
    pub fn merge_range(&self, range: &PageRange) -> DbResult<usize> {
        let result = self.merge_range_inner(range);
        range.end_merge();
        result
    }

    fn merge_range_inner(&self, range: &PageRange) -> DbResult<usize> {
        let records = range.base_records();
        if records == 0 {
            return Ok(0);
        }
        let num_columns = self.num_columns();
        let total_columns = num_columns + METADATA_COLUMNS;
        let ind_col = indirection_column(num_columns);
        let schema_col = schema_column(num_columns);
        let tps_old = range.tps();
        let tail_pages_at_capture = range.tail_page_count();
        let old_base: RangePages = range.base.read().clone();
        let page_count = old_base.page_count();
        let records_in = |page_index: usize| {
            (records - page_index * SLOTS_PER_PAGE).min(SLOTS_PER_PAGE)
        };

        // Pass 1: capture each record's chain head. Whatever the head is
        // now is the snapshot this merge consolidates; later updates stay
        // ahead of the new watermark.
        let mut heads = Vec::with_capacity(records);
        for page_index in 0..page_count {
            let guard = self.pool().fetch(self.id(), old_base.columns[ind_col][page_index])?;
            let page = guard.read();
            for slot in 0..records_in(page_index) {
                heads.push(Rid(page.read_slot(slot as u16)?));
            }
        }
        let consolidate: Vec<bool> = heads
            .iter()
            .map(|head| head.is_tail() && head.0 > tps_old)
            .collect();
        let consolidated = consolidate.iter().filter(|c| **c).count();
        if consolidated == 0 {
            // Nothing to fold (e.g. every updated record was deleted), but
            // the tail growth is accounted for so the range is not
            // re-claimed immediately.
            range.set_merged_tail_pages(tail_pages_at_capture);
            return Ok(0);
        }

        // Pass 2: read the full snapshot stored at each captured head.
        let mut snapshots: Vec<Option<Vec<i64>>> = vec![None; records];
        for (position, head) in heads.iter().enumerate() {
            if !consolidate[position] {
                continue;
            }
            let tail_loc = self.directory.translate(*head)?;
            let mut values = Vec::with_capacity(num_columns);
            for column in 0..num_columns {
                values.push(self.read_cell(range, tail_loc, column)?);
            }
            snapshots[position] = Some(values);
        }

        // Pass 3: write the copy-on-write base page set. Indirection is a
        // placeholder here (re-copied under the write latch below) and the
        // schema encoding starts cleared.
        let mut new_base = RangePages::new(total_columns);
        for column in 0..total_columns {
            for page_index in 0..page_count {
                let old_guard =
                    self.pool().fetch(self.id(), old_base.columns[column][page_index])?;
                let key = PageKey {
                    range: range.id,
                    set: RecordSet::Base,
                    column: column as u16,
                    index: page_index as u16,
                };
                let (pid, mut new_guard) = self.pool().new_page(self.id(), key)?;
                {
                    let old_page = old_guard.read();
                    let mut new_page = new_guard.write();
                    for slot in 0..records_in(page_index) {
                        let position = page_index * SLOTS_PER_PAGE + slot;
                        let value = if column < num_columns {
                            match &snapshots[position] {
                                Some(values) => values[column],
                                None => old_page.read_slot(slot as u16)?,
                            }
                        } else if column == schema_col {
                            0
                        } else {
                            // indirection placeholder, RID, timestamp
                            old_page.read_slot(slot as u16)?
                        };
                        new_page.append(value)?;
                    }
                }
                new_base.columns[column].push(pid);
            }
        }

        let new_tps = heads
            .iter()
            .zip(&consolidate)
            .filter(|(_, keep)| **keep)
            .map(|(head, _)| head.0)
            .max()
            .unwrap_or(tps_old)
            .max(tps_old);

        // Swap: quiesce writers, re-copy the live indirection column so
        // chains grown mid-merge survive, then install the new page set
        // and watermark together.
        {
            let _quiesce = self.mutation.lock();
            for page_index in 0..page_count {
                let live_ind =
                    self.pool().fetch(self.id(), old_base.columns[ind_col][page_index])?;
                let live_schema =
                    self.pool().fetch(self.id(), old_base.columns[schema_col][page_index])?;
                let mut new_ind =
                    self.pool().fetch(self.id(), new_base.columns[ind_col][page_index])?;
                let mut new_schema =
                    self.pool().fetch(self.id(), new_base.columns[schema_col][page_index])?;
                let live_ind_page = live_ind.read();
                let live_schema_page = live_schema.read();
                let mut new_ind_page = new_ind.write();
                let mut new_schema_page = new_schema.write();
                for slot in 0..records_in(page_index) {
                    let position = page_index * SLOTS_PER_PAGE + slot;
                    let live_head = live_ind_page.read_slot(slot as u16)?;
                    new_ind_page.write_slot(slot as u16, live_head)?;
                    let schema = if consolidate[position] && live_head == heads[position].0 {
                        0
                    } else {
                        live_schema_page.read_slot(slot as u16)?
                    };
                    new_schema_page.write_slot(slot as u16, schema)?;
                }
            }
            *range.base.write() = new_base;
            range.set_tps(new_tps);
            range.set_merged_tail_pages(tail_pages_at_capture);
        }
        Ok(consolidated)
    }
}

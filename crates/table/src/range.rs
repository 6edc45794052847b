use common::{PageId, RecordSet};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use storage::SLOTS_PER_PAGE;

/// Base pages per column in one page range.
pub const BASE_PAGES_PER_RANGE: usize = 16;
/// Base records a page range can hold.
pub const RANGE_CAPACITY: usize = BASE_PAGES_PER_RANGE * SLOTS_PER_PAGE;

/// Metadata columns appended after the user columns of every record set.
pub(crate) const METADATA_COLUMNS: usize = 4;

pub(crate) fn indirection_column(num_columns: usize) -> usize {
    num_columns
}

pub(crate) fn rid_column(num_columns: usize) -> usize {
    num_columns + 1
}

pub(crate) fn schema_column(num_columns: usize) -> usize {
    num_columns + 2
}

pub(crate) fn timestamp_column(num_columns: usize) -> usize {
    num_columns + 3
}

/// Position arithmetic: the `n`-th record of a set lives at
/// `(n / SLOTS_PER_PAGE, n % SLOTS_PER_PAGE)`.
pub(crate) fn page_of(position: usize) -> u16 {
    (position / SLOTS_PER_PAGE) as u16
}

pub(crate) fn slot_of(position: usize) -> u16 {
    (position % SLOTS_PER_PAGE) as u16
}

/// The ordered page lists of one record set: `columns[col][page_index]`.
#[derive(Debug, Clone)]
pub(crate) struct RangePages {
    pub columns: Vec<Vec<PageId>>,
}

impl RangePages {
    pub fn new(total_columns: usize) -> Self {
        Self {
            columns: vec![Vec::new(); total_columns],
        }
    }

    pub fn page_count(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }
}

/// One page range: a bounded set of base pages per column plus tail pages
/// grown on demand. `tps` is the merge watermark: tail RIDs at or below it
/// have been folded into the base pages, so chain walks stop there.
#[derive(Debug)]
pub struct PageRange {
    pub id: u32,
    pub(crate) base: RwLock<RangePages>,
    pub(crate) tail: RwLock<RangePages>,
    base_records: AtomicU32,
    tail_records: AtomicU32,
    tps: AtomicI64,
    merged_tail_pages: AtomicU32,
    merging: AtomicBool,
}

impl PageRange {
    pub(crate) fn new(id: u32, total_columns: usize) -> Self {
        Self {
            id,
            base: RwLock::new(RangePages::new(total_columns)),
            tail: RwLock::new(RangePages::new(total_columns)),
            base_records: AtomicU32::new(0),
            tail_records: AtomicU32::new(0),
            tps: AtomicI64::new(0),
            merged_tail_pages: AtomicU32::new(0),
            merging: AtomicBool::new(false),
        }
    }

    pub(crate) fn pages(&self, set: RecordSet) -> &RwLock<RangePages> {
        match set {
            RecordSet::Base => &self.base,
            RecordSet::Tail => &self.tail,
        }
    }

    pub fn base_records(&self) -> usize {
        self.base_records.load(Ordering::SeqCst) as usize
    }

    pub fn tail_records(&self) -> usize {
        self.tail_records.load(Ordering::SeqCst) as usize
    }

    pub fn is_full(&self) -> bool {
        self.base_records() >= RANGE_CAPACITY
    }

    pub(crate) fn claim_base_position(&self) -> usize {
        self.base_records.fetch_add(1, Ordering::SeqCst) as usize
    }

    pub(crate) fn claim_tail_position(&self) -> usize {
        self.tail_records.fetch_add(1, Ordering::SeqCst) as usize
    }

    pub fn tps(&self) -> i64 {
        self.tps.load(Ordering::SeqCst)
    }

    pub(crate) fn set_tps(&self, tps: i64) {
        self.tps.store(tps, Ordering::SeqCst);
    }

    pub(crate) fn tail_page_count(&self) -> usize {
        self.tail.read().page_count()
    }

    /// Tail pages grown since the last merge; the merge candidate metric.
    pub(crate) fn unmerged_tail_pages(&self) -> usize {
        self.tail_page_count()
            .saturating_sub(self.merged_tail_pages.load(Ordering::SeqCst) as usize)
    }

    pub(crate) fn set_merged_tail_pages(&self, pages: usize) {
        self.merged_tail_pages.store(pages as u32, Ordering::SeqCst);
    }

    pub(crate) fn try_begin_merge(&self) -> bool {
        self.merging
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn end_merge(&self) {
        self.merging.store(false, Ordering::SeqCst);
    }

    pub(crate) fn to_snapshot(&self) -> RangeSnapshot {
        let page_ids = |pages: &RangePages| {
            pages
                .columns
                .iter()
                .map(|column| column.iter().map(|pid| pid.0).collect())
                .collect()
        };
        RangeSnapshot {
            id: self.id,
            base: page_ids(&self.base.read()),
            tail: page_ids(&self.tail.read()),
            base_records: self.base_records.load(Ordering::SeqCst),
            tail_records: self.tail_records.load(Ordering::SeqCst),
            tps: self.tps(),
            merged_tail_pages: self.merged_tail_pages.load(Ordering::SeqCst),
        }
    }

    pub(crate) fn from_snapshot(snapshot: &RangeSnapshot) -> Self {
        let pages = |lists: &Vec<Vec<u64>>| RangePages {
            columns: lists
                .iter()
                .map(|column| column.iter().map(|id| PageId(*id)).collect())
                .collect(),
        };
        Self {
            id: snapshot.id,
            base: RwLock::new(pages(&snapshot.base)),
            tail: RwLock::new(pages(&snapshot.tail)),
            base_records: AtomicU32::new(snapshot.base_records),
            tail_records: AtomicU32::new(snapshot.tail_records),
            tps: AtomicI64::new(snapshot.tps),
            merged_tail_pages: AtomicU32::new(snapshot.merged_tail_pages),
            merging: AtomicBool::new(false),
        }
    }
}

/// Persisted form of a page range, embedded in the table meta header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeSnapshot {
    pub id: u32,
    pub base: Vec<Vec<u64>>,
    pub tail: Vec<Vec<u64>>,
    pub base_records: u32,
    pub tail_records: u32,
    pub tps: i64,
    pub merged_tail_pages: u32,
}

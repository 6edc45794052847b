#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::{io, path::PathBuf};
use thiserror::Error;

/// Ordinal of a column within a table schema.
/// Examples:
/// - `let pk_col: ColumnId = 0;`
/// - `let grade_col: ColumnId = 3;`
pub type ColumnId = usize;

/// First RID of the tail space. Base RIDs ascend from 0, tail RIDs from
/// here; the two spaces never collide and a RID's space identifies which
/// record set it lives in.
pub const TAIL_RID_BASE: i64 = 1 << 40;

/// Record identifier. Assigned once at insert (base) or update (tail),
/// never reused. Negative values are sentinels, not records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Rid(pub i64);

impl Rid {
    /// Indirection sentinel: this record has no (further) chain entry.
    pub const NONE: Rid = Rid(-1);
    /// Indirection sentinel: the base record has been deleted.
    pub const TOMBSTONE: Rid = Rid(-2);

    pub fn is_none(self) -> bool {
        self == Rid::NONE
    }

    pub fn is_tombstone(self) -> bool {
        self == Rid::TOMBSTONE
    }

    pub fn is_tail(self) -> bool {
        self.0 >= TAIL_RID_BASE
    }

    pub fn is_base(self) -> bool {
        self.0 >= 0 && self.0 < TAIL_RID_BASE
    }
}

/// Logical identifier for a page within one table's disk space.
/// Examples:
/// - `let first = PageId(0);`
/// - `let merged_copy = PageId(417);`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId(pub u64);

/// Logical identifier for a table registered with the database.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableId(pub u64);

/// Which of a page range's two column sets a page belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordSet {
    Base,
    Tail,
}

impl RecordSet {
    /// Directory component used in the on-disk layout.
    pub fn dir_name(self) -> &'static str {
        match self {
            RecordSet::Base => "base",
            RecordSet::Tail => "tail",
        }
    }
}

/// Logical coordinates of a page: which range, set, column, and position
/// within that column's page list. The disk manager turns this into a path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageKey {
    pub range: u32,
    pub set: RecordSet,
    pub column: u16,
    pub index: u16,
}

/// Physical location of a record: `(page range, set, page index, slot)`.
/// The page directory maps every RID to one of these; the range catalog
/// resolves `(range, set, column, page)` to a `PageId`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordLocation {
    pub range: u32,
    pub set: RecordSet,
    pub page: u16,
    pub slot: u16,
}

/// A projected result record. `columns` is dense: only the projected
/// columns are present, in schema order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub rid: Rid,
    pub columns: Vec<i64>,
}

impl Record {
    pub fn new(rid: Rid, columns: Vec<i64>) -> Self {
        Self { rid, columns }
    }
}

/// One column's slot in an update: either a new value or "leave unchanged".
/// Examples:
/// - `let patch = [ColumnUpdate::Keep, ColumnUpdate::Set(101)];`
/// - `ColumnUpdate::Keep.apply(94) == 94`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnUpdate {
    Set(i64),
    Keep,
}

impl ColumnUpdate {
    pub fn apply(self, current: i64) -> i64 {
        match self {
            ColumnUpdate::Set(v) => v,
            ColumnUpdate::Keep => current,
        }
    }

    pub fn is_set(self) -> bool {
        matches!(self, ColumnUpdate::Set(_))
    }

    /// Convenience for hosts that model "unchanged" as `None`.
    pub fn from_option(value: Option<i64>) -> Self {
        match value {
            Some(v) => ColumnUpdate::Set(v),
            None => ColumnUpdate::Keep,
        }
    }
}

/// Canonical error type shared across engine subsystems.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("duplicate key {0}")]
    DuplicateKey(i64),
    #[error("key not found: {0}")]
    KeyNotFound(i64),
    #[error("bad argument: {0}")]
    BadArgument(String),
    #[error("transaction conflict: {0}")]
    Conflict(String),
    #[error("buffer pool: {0}")]
    Buffer(String),
    #[error("storage: {0}")]
    Storage(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl DbError {
    /// Fatal errors abort the operation outright; the transaction layer
    /// does not attempt rollback I/O on top of them.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DbError::Buffer(_) | DbError::Storage(_) | DbError::Io(_)
        )
    }
}

/// Result alias that carries a `DbError`.
pub type DbResult<T> = Result<T, DbError>;

/// Runtime configuration for the engine.
///
/// # Example
/// ```
/// use common::Config;
/// use std::path::PathBuf;
///
/// let config = Config::builder()
///     .data_dir(PathBuf::from("./my_db"))
///     .buffer_pool_frames(512)
///     .build();
/// assert_eq!(config.merge_threshold_pages, 16);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, bon::Builder)]
pub struct Config {
    /// Directory where table data and metadata live.
    #[builder(default = PathBuf::from("./db_data"))]
    pub data_dir: PathBuf,
    /// Number of frames the buffer pool keeps resident.
    #[builder(default = 256)]
    pub buffer_pool_frames: usize,
    /// Tail pages accumulated since the last merge before a page range
    /// becomes a merge candidate.
    #[builder(default = 16)]
    pub merge_threshold_pages: usize,
    /// Disables the background merge worker when false.
    #[builder(default = true)]
    pub merge_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./db_data"),
            buffer_pool_frames: 256,
            merge_threshold_pages: 16,
            merge_enabled: true,
        }
    }
}

/// Convenient re-exports for downstream crates.
pub mod prelude {
    pub use crate::{
        ColumnId, ColumnUpdate, Config, DbError, DbResult, PageId, PageKey, Record,
        RecordLocation, RecordSet, Rid, TableId,
    };
}

use common::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use storage::TableDisk;

use crate::range::RangeSnapshot;

const META_FILE: &str = "meta.json";

/// Persisted table header: schema shape, allocation counters, and the
/// range catalog. Written at create and at close; authoritative on open
/// (a background merge updates only the in-memory catalog, so the header
/// is current after a clean close, not mid-run). The page directory and
/// primary index have their own files and are rebuilt from pages when
/// those are missing, but the header itself is required.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMeta {
    pub name: String,
    pub num_columns: usize,
    pub pk_index: usize,
    pub next_base_rid: i64,
    pub next_tail_rid: i64,
    pub timestamp_counter: i64,
    pub page_range_count: u32,
    pub ranges: Vec<RangeSnapshot>,
}

impl TableMeta {
    pub fn load(disk: &TableDisk) -> DbResult<Option<Self>> {
        let Some(bytes) = disk.read_blob(META_FILE)? else {
            return Ok(None);
        };
        let meta = serde_json::from_slice(&bytes)
            .map_err(|e| DbError::Storage(format!("invalid table meta: {e}")))?;
        Ok(Some(meta))
    }

    pub fn save(&self, disk: &TableDisk) -> DbResult<()> {
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| DbError::Storage(format!("serialize table meta: {e}")))?;
        disk.write_blob(META_FILE, &bytes)
    }
}

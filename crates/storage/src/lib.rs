use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::RandomState;
use bincode::config::{self, Config};
use bincode::serde::{decode_from_slice, encode_into_slice};
use common::{DbError, DbResult, PageId, PageKey};
use hashbrown::HashMap;
use parking_lot::Mutex;

pub const PAGE_SIZE: usize = 4096;
pub const PAGE_HEADER_BYTES: usize = 8;
pub const SLOT_BYTES: usize = 8;
/// Slots of one column a single page holds.
pub const SLOTS_PER_PAGE: usize = (PAGE_SIZE - PAGE_HEADER_BYTES) / SLOT_BYTES;

type Map<K, V> = HashMap<K, V, RandomState>;

fn bincode_config() -> impl Config {
    config::legacy()
}

/// Fixed-size slab holding one column's worth of record slots.
///
/// Layout: `{num_records: u32, reserved: u32}` header followed by
/// `SLOTS_PER_PAGE` little-endian `i64` slots. Slots are written once by
/// `append` and overwritten in place only through `write_slot` (indirection
/// and schema-encoding maintenance).
#[derive(Debug, Clone)]
pub struct Page {
    pub id: u64,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct PageHeader {
    num_records: u32,
    reserved: u32,
}

impl Default for PageHeader {
    fn default() -> Self {
        Self {
            num_records: 0,
            reserved: 0,
        }
    }
}

impl Page {
    pub fn new(id: u64) -> Self {
        let mut page = Self {
            id,
            data: vec![0u8; PAGE_SIZE],
        };
        page.write_header(&PageHeader::default())
            .expect("initialize page header");
        page
    }

    /// Wrap raw bytes read back from disk.
    pub fn from_bytes(id: u64, data: Vec<u8>) -> DbResult<Self> {
        if data.len() != PAGE_SIZE {
            return Err(DbError::Storage(format!(
                "page {id}: expected {PAGE_SIZE} bytes, got {}",
                data.len()
            )));
        }
        let page = Self { id, data };
        let header = page.header()?;
        if header.num_records as usize > SLOTS_PER_PAGE {
            return Err(DbError::Storage(format!(
                "page {id}: corrupt header ({} records)",
                header.num_records
            )));
        }
        Ok(page)
    }

    fn header(&self) -> DbResult<PageHeader> {
        let (header, read) =
            decode_from_slice(&self.data[..PAGE_HEADER_BYTES], bincode_config())
                .map_err(|e| DbError::Storage(format!("read page header failed: {e}")))?;
        debug_assert_eq!(read, PAGE_HEADER_BYTES);
        Ok(header)
    }

    fn write_header(&mut self, header: &PageHeader) -> DbResult<()> {
        let written = encode_into_slice(
            header,
            &mut self.data[..PAGE_HEADER_BYTES],
            bincode_config(),
        )
        .map_err(|e| DbError::Storage(format!("write page header failed: {e}")))?;
        debug_assert_eq!(written, PAGE_HEADER_BYTES);
        Ok(())
    }

    fn slot_offset(slot: u16) -> usize {
        PAGE_HEADER_BYTES + slot as usize * SLOT_BYTES
    }

    pub fn num_records(&self) -> DbResult<u16> {
        Ok(self.header()?.num_records as u16)
    }

    pub fn has_capacity(&self) -> DbResult<bool> {
        Ok((self.header()?.num_records as usize) < SLOTS_PER_PAGE)
    }

    /// Append a value to the next free slot, returning the slot index.
    pub fn append(&mut self, value: i64) -> DbResult<u16> {
        let mut header = self.header()?;
        if header.num_records as usize >= SLOTS_PER_PAGE {
            return Err(DbError::Storage(format!("page {} full", self.id)));
        }
        let slot = header.num_records as u16;
        let start = Self::slot_offset(slot);
        self.data[start..start + SLOT_BYTES].copy_from_slice(&value.to_le_bytes());
        header.num_records += 1;
        self.write_header(&header)?;
        Ok(slot)
    }

    pub fn read_slot(&self, slot: u16) -> DbResult<i64> {
        self.check_slot(slot)?;
        let start = Self::slot_offset(slot);
        let mut buf = [0u8; SLOT_BYTES];
        buf.copy_from_slice(&self.data[start..start + SLOT_BYTES]);
        Ok(i64::from_le_bytes(buf))
    }

    /// Overwrite an occupied slot in place.
    pub fn write_slot(&mut self, slot: u16, value: i64) -> DbResult<()> {
        self.check_slot(slot)?;
        let start = Self::slot_offset(slot);
        self.data[start..start + SLOT_BYTES].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn check_slot(&self, slot: u16) -> DbResult<()> {
        let header = self.header()?;
        if slot >= header.num_records as u16 {
            return Err(DbError::Storage(format!(
                "page {}: slot {slot} beyond cursor {}",
                self.id, header.num_records
            )));
        }
        Ok(())
    }
}

/// Per-table disk manager: allocates monotone page ids, maps them to files
/// under the table's directory, and moves raw page bytes to and from disk.
/// The buffer pool is the only caller of the page read/write pair.
///
/// On-disk layout per page: `ranges/<r>/<base|tail>/col_<i>/page_<id>.bin`.
/// The file name carries the table-unique page id, so a copy-on-write merge
/// writes its output beside the generation it replaces and the range
/// catalog decides which files are live.
#[derive(Debug)]
pub struct TableDisk {
    root: PathBuf,
    next_page_id: AtomicU64,
    paths: Mutex<Map<PageId, PathBuf>>,
}

impl TableDisk {
    /// Open (or create) a table's disk space, scanning `ranges/` to
    /// reconstruct the page-id space.
    pub fn open(root: impl Into<PathBuf>) -> DbResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let mut paths = Map::default();
        let mut max_id = None::<u64>;
        let ranges_dir = root.join("ranges");
        if ranges_dir.exists() {
            for entry in walk_page_files(&ranges_dir)? {
                let id = parse_page_file_name(&entry).ok_or_else(|| {
                    DbError::Storage(format!("unrecognized page file {}", entry.display()))
                })?;
                max_id = Some(max_id.map_or(id, |m| m.max(id)));
                paths.insert(PageId(id), entry);
            }
        }
        Ok(Self {
            root,
            next_page_id: AtomicU64::new(max_id.map_or(0, |m| m + 1)),
            paths: Mutex::new(paths),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Allocate a fresh page at the given logical coordinates. The page is
    /// written to disk immediately so the id space survives a scan.
    pub fn allocate(&self, key: PageKey) -> DbResult<PageId> {
        let id = PageId(self.next_page_id.fetch_add(1, Ordering::SeqCst));
        let path = self
            .root
            .join("ranges")
            .join(key.range.to_string())
            .join(key.set.dir_name())
            .join(format!("col_{}", key.column))
            .join(format!("page_{}.bin", id.0));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let page = Page::new(id.0);
        fs::write(&path, &page.data)?;
        self.paths.lock().insert(id, path);
        Ok(id)
    }

    pub fn read_page(&self, pid: PageId) -> DbResult<Page> {
        let path = self.path_of(pid)?;
        let mut file = OpenOptions::new()
            .read(true)
            .open(&path)
            .map_err(|e| DbError::Storage(format!("open page {}: {e}", pid.0)))?;
        let mut buf = vec![0u8; PAGE_SIZE];
        file.read_exact(&mut buf)
            .map_err(|e| DbError::Storage(format!("read page {}: {e}", pid.0)))?;
        Page::from_bytes(pid.0, buf)
    }

    pub fn write_page(&self, page: &Page) -> DbResult<()> {
        let path = self.path_of(PageId(page.id))?;
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| DbError::Storage(format!("open page {}: {e}", page.id)))?;
        file.write_all(&page.data)
            .map_err(|e| DbError::Storage(format!("write page {}: {e}", page.id)))?;
        Ok(())
    }

    fn path_of(&self, pid: PageId) -> DbResult<PathBuf> {
        self.paths
            .lock()
            .get(&pid)
            .cloned()
            .ok_or_else(|| DbError::Storage(format!("page {} not allocated", pid.0)))
    }

    /// Read a metadata artifact (meta header, page directory, index dump)
    /// relative to the table root. `None` when the file does not exist.
    pub fn read_blob(&self, rel: &str) -> DbResult<Option<Vec<u8>>> {
        let path = self.root.join(rel);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read(path)?))
    }

    pub fn write_blob(&self, rel: &str, bytes: &[u8]) -> DbResult<()> {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, bytes)?;
        Ok(())
    }

    /// Remove the table's entire on-disk footprint.
    pub fn destroy(&self) -> DbResult<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
        }
        Ok(())
    }
}

fn walk_page_files(dir: &Path) -> DbResult<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().is_some_and(|e| e == "bin") {
                found.push(path);
            }
        }
    }
    Ok(found)
}

fn parse_page_file_name(path: &Path) -> Option<u64> {
    path.file_stem()?
        .to_str()?
        .strip_prefix("page_")?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests;

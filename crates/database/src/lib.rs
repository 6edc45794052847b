//! Database: a directory of tables sharing one buffer pool, with a merge
//! worker per table and clean open/close lifecycle.

mod query;

pub use query::Query;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::RandomState;
use buffer::BufferPool;
use common::{Config, DbError, DbResult, TableId};
use hashbrown::HashMap;
use parking_lot::Mutex;
use storage::TableDisk;
use table::{MergeWorker, Table, TableMeta};
use tracing::info;

type Map<K, V> = HashMap<K, V, RandomState>;

struct TableEntry {
    table: Arc<Table>,
    merge: Option<MergeWorker>,
}

/// An embeddable single-node table store. All workers reference the
/// database explicitly; dropping it without `close` skips the final flush.
pub struct Database {
    config: Config,
    pool: Arc<BufferPool>,
    tables: Mutex<Map<String, TableEntry>>,
    next_table_id: AtomicU64,
}

impl Database {
    /// Open (or create) the database rooted at `path` with default
    /// configuration.
    pub fn open(path: impl Into<PathBuf>) -> DbResult<Self> {
        Self::with_config(Config::builder().data_dir(path.into()).build())
    }

    /// Open with explicit configuration, loading every table found under
    /// `tables/`.
    pub fn with_config(config: Config) -> DbResult<Self> {
        let tables_dir = config.data_dir.join("tables");
        fs::create_dir_all(&tables_dir)?;
        let db = Self {
            pool: Arc::new(BufferPool::new(config.buffer_pool_frames)),
            tables: Mutex::new(Map::default()),
            next_table_id: AtomicU64::new(1),
            config,
        };

        for entry in fs::read_dir(&tables_dir)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            db.load_table(&path)?;
        }
        info!(
            data_dir = %db.config.data_dir.display(),
            tables = db.tables.lock().len(),
            "database opened"
        );
        Ok(db)
    }

    fn load_table(&self, path: &Path) -> DbResult<()> {
        let disk = Arc::new(TableDisk::open(path)?);
        let Some(meta) = TableMeta::load(&disk)? else {
            return Err(DbError::Storage(format!(
                "table directory {} has no meta header",
                path.display()
            )));
        };
        let id = TableId(self.next_table_id.fetch_add(1, Ordering::SeqCst));
        self.pool.register_table(id, Arc::clone(&disk));
        let name = meta.name.clone();
        let table = Table::open(Arc::clone(&self.pool), disk, id, meta)?;
        let merge = self.spawn_merge(&table)?;
        self.tables
            .lock()
            .insert(name, TableEntry { table, merge });
        Ok(())
    }

    fn spawn_merge(&self, table: &Arc<Table>) -> DbResult<Option<MergeWorker>> {
        if !self.config.merge_enabled {
            return Ok(None);
        }
        Ok(Some(MergeWorker::spawn(
            Arc::clone(table),
            self.config.merge_threshold_pages,
        )?))
    }

    /// Create a table of `num_columns` i64 columns with the primary key at
    /// `key_index`.
    pub fn create_table(
        &self,
        name: &str,
        num_columns: usize,
        key_index: usize,
    ) -> DbResult<Arc<Table>> {
        let mut tables = self.tables.lock();
        if tables.contains_key(name) {
            return Err(DbError::BadArgument(format!(
                "table '{name}' already exists"
            )));
        }
        let disk = Arc::new(TableDisk::open(self.config.data_dir.join("tables").join(name))?);
        let id = TableId(self.next_table_id.fetch_add(1, Ordering::SeqCst));
        self.pool.register_table(id, Arc::clone(&disk));
        let table = Table::create(Arc::clone(&self.pool), disk, id, name, num_columns, key_index)?;
        table.persist()?;
        let merge = self.spawn_merge(&table)?;
        tables.insert(
            name.to_string(),
            TableEntry {
                table: Arc::clone(&table),
                merge,
            },
        );
        info!(table = name, num_columns, key_index, "created table");
        Ok(table)
    }

    pub fn get_table(&self, name: &str) -> DbResult<Arc<Table>> {
        self.tables
            .lock()
            .get(name)
            .map(|entry| Arc::clone(&entry.table))
            .ok_or_else(|| DbError::BadArgument(format!("unknown table '{name}'")))
    }

    /// Stop the table's merge worker and delete its on-disk footprint.
    /// Handles to the table held elsewhere go stale.
    pub fn drop_table(&self, name: &str) -> DbResult<()> {
        let Some(entry) = self.tables.lock().remove(name) else {
            return Err(DbError::BadArgument(format!("unknown table '{name}'")));
        };
        if let Some(merge) = entry.merge {
            merge.shutdown();
        }
        self.pool.deregister_table(entry.table.id());
        entry.table.destroy()?;
        info!(table = name, "dropped table");
        Ok(())
    }

    /// Query facade over a table, by name.
    pub fn query(&self, name: &str) -> DbResult<Query> {
        Ok(Query::new(self.get_table(name)?))
    }

    /// Stop merge workers, flush every dirty frame, and persist table
    /// headers, page directories, and primary indexes.
    pub fn close(self) -> DbResult<()> {
        let mut tables = self.tables.lock();
        for (_, entry) in tables.drain() {
            if let Some(merge) = entry.merge {
                merge.shutdown();
            }
            entry.table.flush()?;
            entry.table.persist()?;
        }
        drop(tables);
        info!(data_dir = %self.config.data_dir.display(), "database closed");
        Ok(())
    }
}

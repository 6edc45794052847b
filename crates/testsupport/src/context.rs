//! Isolated database environments backed by a temporary directory. Each
//! test gets its own data directory, cleaned up on drop; `reopen` drives
//! durability round trips.

use common::DbResult;
use database::{Database, Query};
use tempfile::TempDir;

/// A database rooted in a fresh temporary directory.
///
/// # Example
///
/// ```
/// use testsupport::TestDb;
///
/// let db = TestDb::new().unwrap();
/// db.database().create_table("Grades", 3, 0).unwrap();
/// db.query("Grades").unwrap().insert(&[1, 2, 3]).unwrap();
///
/// let db = db.reopen().unwrap(); // close, then open the same directory
/// assert_eq!(db.query("Grades").unwrap().sum(0, 9, 2).unwrap(), 3);
/// ```
pub struct TestDb {
    dir: TempDir,
    database: Option<Database>,
}

impl TestDb {
    pub fn new() -> DbResult<Self> {
        let dir = tempfile::tempdir()?;
        let database = Database::open(dir.path())?;
        Ok(Self {
            dir,
            database: Some(database),
        })
    }

    pub fn database(&self) -> &Database {
        self.database.as_ref().expect("database is open")
    }

    pub fn query(&self, table: &str) -> DbResult<Query> {
        self.database().query(table)
    }

    /// Close the database cleanly and open the same directory again.
    pub fn reopen(mut self) -> DbResult<Self> {
        if let Some(database) = self.database.take() {
            database.close()?;
        }
        self.database = Some(Database::open(self.dir.path())?);
        Ok(self)
    }

    pub fn path(&self) -> &std::path::Path {
        self.dir.path()
    }
}

//! Setup and assertion macros for engine tests.

/// Create a [`TestDb`](crate::TestDb) with one table.
///
/// # Example
///
/// ```
/// use testsupport::test_db;
///
/// test_db!(db, table: "Grades", columns: 5, pk: 0);
/// db.query("Grades").unwrap().insert(&[1, 2, 3, 4, 5]).unwrap();
/// ```
#[macro_export]
macro_rules! test_db {
    ($db:ident, table: $name:expr, columns: $cols:expr, pk: $pk:expr) => {
        let $db = $crate::TestDb::new().unwrap();
        $db.database().create_table($name, $cols, $pk).unwrap();
    };
}

/// Assert that a select result contains exactly the expected rows,
/// ignoring order.
///
/// # Example
///
/// ```
/// use testsupport::{assert_rows, test_db};
///
/// test_db!(db, table: "Grades", columns: 2, pk: 0);
/// let query = db.query("Grades").unwrap();
/// query.insert(&[1, 10]).unwrap();
/// assert_rows!(query.select(1, 0, &[true, true]).unwrap(), [[1, 10]]);
/// ```
#[macro_export]
macro_rules! assert_rows {
    ($records:expr, [$([$($value:expr),* $(,)?]),* $(,)?]) => {
        let mut expected: Vec<Vec<i64>> = vec![$(vec![$($value),*]),*];
        expected.sort();
        ::pretty_assertions::assert_eq!($crate::fixtures::sorted_rows($records), expected);
    };
}

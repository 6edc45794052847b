//! The scaffolding itself, exercised the way downstream test suites use it.

use testsupport::prelude::*;
use testsupport::{assert_rows, test_db};

#[test]
fn test_db_macro_builds_a_working_table() {
    test_db!(db, table: "users", columns: 3, pk: 0);
    let query = db.query("users").unwrap();
    for record in seeded_records(10, 3, 500) {
        query.insert(&record).unwrap();
    }
    assert_rows!(
        query.select(500, 0, &all_columns(3)).unwrap(),
        [[500, 1000, 1500]]
    );
}

#[test]
fn reopen_round_trips_state() {
    test_db!(db, table: "users", columns: 2, pk: 0);
    db.query("users").unwrap().insert(&[1, 42]).unwrap();

    let db = db.reopen().unwrap();
    assert_rows!(
        db.query("users").unwrap().select(1, 0, &all_columns(2)).unwrap(),
        [[1, 42]]
    );
}

#[test]
fn patch_drives_updates() {
    test_db!(db, table: "users", columns: 3, pk: 0);
    let query = db.query("users").unwrap();
    query.insert(&[1, 10, 20]).unwrap();
    query.update(1, &patch(&[None, Some(11), None])).unwrap();
    assert_rows!(
        query.select(1, 0, &all_columns(3)).unwrap(),
        [[1, 11, 20]]
    );
}

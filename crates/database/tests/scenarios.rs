//! End-to-end host scenarios: each test drives the public surface the way
//! the embedding host does.

use testsupport::prelude::*;
use testsupport::{assert_rows, test_db};

#[test]
fn insert_and_project() {
    test_db!(db, table: "Grades", columns: 5, pk: 0);
    let query = db.query("Grades").unwrap();

    query.insert(&[90210, 93, 94, 95, 96]).unwrap();
    assert_rows!(
        query.select(90210, 0, &[true, false, true, false, true]).unwrap(),
        [[90210, 95, 96]]
    );
}

#[test]
fn update_history_rewinds_and_saturates() {
    test_db!(db, table: "Grades", columns: 5, pk: 0);
    let query = db.query("Grades").unwrap();

    query.insert(&[90210, 93, 94, 95, 96]).unwrap();
    query
        .update(90210, &patch(&[None, Some(100), None, None, None]))
        .unwrap();
    query
        .update(90210, &patch(&[None, Some(101), Some(102), None, None]))
        .unwrap();

    let proj = [false, true, true, false, false];
    assert_rows!(query.select_version(90210, 0, &proj, 0).unwrap(), [[101, 102]]);
    assert_rows!(query.select_version(90210, 0, &proj, -1).unwrap(), [[100, 94]]);
    assert_rows!(query.select_version(90210, 0, &proj, -2).unwrap(), [[93, 94]]);
    assert_rows!(query.select_version(90210, 0, &proj, -3).unwrap(), [[93, 94]]);
}

#[test]
fn range_sum_over_primary_keys() {
    test_db!(db, table: "Grades", columns: 2, pk: 0);
    let query = db.query("Grades").unwrap();

    for pk in 1..=10 {
        query.insert(&[pk, pk]).unwrap();
    }
    assert_eq!(query.sum(3, 7, 1).unwrap(), 25);
}

#[test]
fn secondary_select_finds_duplicated_values() {
    test_db!(db, table: "Grades", columns: 5, pk: 0);
    let query = db.query("Grades").unwrap();

    for pk in 0..8 {
        let v = if [0, 1, 5, 7].contains(&pk) { 1 } else { 42 };
        query.insert(&[pk, 0, v, 0, 0]).unwrap();
    }
    query.create_index(2).unwrap();

    let pks: Vec<i64> = sorted_rows(query.select(1, 2, &all_columns(5)).unwrap())
        .into_iter()
        .map(|row| row[0])
        .collect();
    assert_eq!(pks, vec![0, 1, 5, 7]);
}

#[test]
fn delete_removes_from_selects_and_sums() {
    test_db!(db, table: "Grades", columns: 5, pk: 0);
    let query = db.query("Grades").unwrap();

    for pk in 0..8 {
        let v = if [0, 1, 5, 7].contains(&pk) { 1 } else { 42 };
        query.insert(&[pk, 0, v, 0, 0]).unwrap();
    }
    query.create_index(2).unwrap();
    query.delete(5).unwrap();

    assert!(query.select(5, 0, &all_columns(5)).unwrap().is_empty());
    assert_eq!(query.select(1, 2, &all_columns(5)).unwrap().len(), 3);
    assert_eq!(query.sum(0, 10, 0).unwrap(), 0 + 1 + 2 + 3 + 4 + 6 + 7);
}

#[test]
fn durability_round_trip() {
    test_db!(db, table: "Grades", columns: 5, pk: 0);
    {
        let query = db.query("Grades").unwrap();
        query.insert(&[90210, 93, 94, 95, 96]).unwrap();
        query
            .update(90210, &patch(&[None, Some(100), None, None, None]))
            .unwrap();
        query
            .update(90210, &patch(&[None, Some(101), Some(102), None, None]))
            .unwrap();
    }

    let db = db.reopen().unwrap();
    let table = db.database().get_table("Grades").unwrap();
    assert_eq!(table.num_columns(), 5);

    let query = db.query("Grades").unwrap();
    assert_rows!(
        query.select(90210, 0, &all_columns(5)).unwrap(),
        [[90210, 101, 102, 95, 96]]
    );
    // History survives the round trip too.
    assert_rows!(
        query.select_version(90210, 0, &all_columns(5), -2).unwrap(),
        [[90210, 93, 94, 95, 96]]
    );
}

#[test]
fn reopen_preserves_multiple_tables_and_continues_rid_space() {
    test_db!(db, table: "Grades", columns: 3, pk: 0);
    db.database().create_table("Enrollment", 2, 1).unwrap();
    db.query("Grades").unwrap().insert(&[1, 2, 3]).unwrap();
    db.query("Enrollment").unwrap().insert(&[7, 100]).unwrap();

    let db = db.reopen().unwrap();
    let grades = db.query("Grades").unwrap();
    grades.insert(&[2, 4, 6]).unwrap();
    assert_rows!(grades.select(2, 0, &all_columns(3)).unwrap(), [[2, 4, 6]]);
    assert_rows!(
        db.query("Enrollment").unwrap().select(100, 1, &all_columns(2)).unwrap(),
        [[7, 100]]
    );
}

#[test]
fn bulk_workload_stays_consistent() {
    test_db!(db, table: "Grades", columns: 4, pk: 0);
    let query = db.query("Grades").unwrap();

    let records = seeded_records(500, 4, 1000);
    for record in &records {
        query.insert(record).unwrap();
    }
    // Every key comes back exactly as inserted.
    for record in &records {
        let got = query.select(record[0], 0, &all_columns(4)).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(&got[0].columns, record);
    }
    let expected: i64 = records.iter().map(|r| r[3]).sum();
    assert_eq!(query.sum(1000, 1499, 3).unwrap(), expected);
}

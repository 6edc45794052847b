use std::sync::Arc;

use buffer::BufferPool;
use common::ColumnUpdate::{Keep, Set};
use common::{DbError, TableId};
use storage::TableDisk;
use table::{LockMode, Table};
use tempfile::{TempDir, tempdir};

use super::*;

fn test_table() -> (TempDir, Arc<Table>) {
    let dir = tempdir().unwrap();
    let pool = Arc::new(BufferPool::new(128));
    let disk = Arc::new(TableDisk::open(dir.path()).unwrap());
    pool.register_table(TableId(1), Arc::clone(&disk));
    let table = Table::create(pool, disk, TableId(1), "grades", 3, 0).unwrap();
    (dir, table)
}

fn select_row(table: &Table, pk: i64) -> Option<Vec<i64>> {
    let mut records = table.select(pk, 0, &[true, true, true]).unwrap();
    records.pop().map(|r| r.columns)
}

#[test]
fn committed_transaction_applies_all_operations() {
    let (_dir, table) = test_table();
    let mut tx = Transaction::new();
    tx.add(&table, Operation::Insert(vec![1, 10, 20]));
    tx.add(&table, Operation::Insert(vec![2, 30, 40]));
    tx.add(
        &table,
        Operation::Update {
            pk: 1,
            updates: vec![Keep, Set(11), Keep],
        },
    );
    tx.add(
        &table,
        Operation::Sum {
            low: 0,
            high: 10,
            column: 1,
        },
    );

    assert_eq!(tx.run().unwrap(), true);
    assert_eq!(select_row(&table, 1), Some(vec![1, 11, 20]));
    assert_eq!(select_row(&table, 2), Some(vec![2, 30, 40]));
    // Locks are gone after commit.
    assert!(table.rid_for(1).is_some());
    let rid = table.rid_for(1).unwrap();
    table.locks().try_acquire(9999, rid, LockMode::Exclusive).unwrap();
    table.locks().release_all(9999);
}

#[test]
fn duplicate_key_aborts_and_rolls_back_the_whole_batch() {
    let (_dir, table) = test_table();
    table.insert(&[5, 0, 0]).unwrap();

    let mut tx = Transaction::new();
    tx.add(&table, Operation::Insert(vec![1, 1, 1]));
    tx.add(
        &table,
        Operation::Update {
            pk: 5,
            updates: vec![Keep, Set(77), Keep],
        },
    );
    tx.add(&table, Operation::Insert(vec![5, 2, 2])); // duplicate

    assert_eq!(tx.run().unwrap(), false);
    // The earlier insert and update were undone.
    assert_eq!(select_row(&table, 1), None);
    assert_eq!(select_row(&table, 5), Some(vec![5, 0, 0]));
}

#[test]
fn missing_key_aborts() {
    let (_dir, table) = test_table();
    let mut tx = Transaction::new();
    tx.add(&table, Operation::Insert(vec![1, 1, 1]));
    tx.add(&table, Operation::Delete { pk: 404 });

    assert_eq!(tx.run().unwrap(), false);
    assert_eq!(select_row(&table, 1), None);
}

#[test]
fn delete_rollback_reinserts_the_snapshot() {
    let (_dir, table) = test_table();
    table.insert(&[3, 30, 33]).unwrap();
    table.update(3, &[Keep, Set(31), Keep]).unwrap();

    let mut tx = Transaction::new();
    tx.add(&table, Operation::Delete { pk: 3 });
    tx.add(&table, Operation::Insert(vec![3, 0, 0])); // reuses the freed key
    tx.add(
        &table,
        Operation::Update {
            pk: 404,
            updates: vec![Keep, Keep, Keep],
        },
    ); // forces the abort

    assert_eq!(tx.run().unwrap(), false);
    // Undo runs newest-first: the placeholder insert is deleted, then the
    // original record comes back with its updated values.
    assert_eq!(select_row(&table, 3), Some(vec![3, 31, 33]));
}

#[test]
fn rekeying_update_rolls_back_to_the_original_key() {
    let (_dir, table) = test_table();
    table.insert(&[1, 10, 20]).unwrap();

    let mut tx = Transaction::new();
    tx.add(
        &table,
        Operation::Update {
            pk: 1,
            updates: vec![Set(2), Set(11), Keep],
        },
    );
    tx.add(&table, Operation::Delete { pk: 404 }); // force abort

    assert_eq!(tx.run().unwrap(), false);
    assert_eq!(select_row(&table, 1), Some(vec![1, 10, 20]));
    assert_eq!(select_row(&table, 2), None);
}

#[test]
fn conflicting_lock_aborts_the_newer_transaction() {
    let (_dir, table) = test_table();
    table.insert(&[1, 10, 20]).unwrap();
    let rid = table.rid_for(1).unwrap();

    // Another transaction holds the record exclusively.
    table.locks().try_acquire(777, rid, LockMode::Exclusive).unwrap();

    let mut tx = Transaction::new();
    tx.add(&table, Operation::Insert(vec![2, 0, 0]));
    tx.add(
        &table,
        Operation::Update {
            pk: 1,
            updates: vec![Keep, Set(99), Keep],
        },
    );
    assert_eq!(tx.run().unwrap(), false);

    // Rolled back, and the holder's lock still stands.
    assert_eq!(select_row(&table, 1), Some(vec![1, 10, 20]));
    assert_eq!(select_row(&table, 2), None);
    assert!(matches!(
        table.locks().try_acquire(888, rid, LockMode::Shared),
        Err(DbError::Conflict(_))
    ));
    table.locks().release_all(777);
}

#[test]
fn shared_read_locks_block_writers_until_release() {
    let (_dir, table) = test_table();
    table.insert(&[1, 10, 20]).unwrap();
    let rid = table.rid_for(1).unwrap();
    table.locks().try_acquire(777, rid, LockMode::Shared).unwrap();

    let mut tx = Transaction::new();
    tx.add(
        &table,
        Operation::Update {
            pk: 1,
            updates: vec![Keep, Set(99), Keep],
        },
    );
    assert_eq!(tx.run().unwrap(), false);

    // Reads coexist with the shared holder.
    let mut reader = Transaction::new();
    reader.add(
        &table,
        Operation::Select {
            value: 1,
            column: 0,
            projection: vec![true, true, true],
        },
    );
    assert_eq!(reader.run().unwrap(), true);
    table.locks().release_all(777);
}

#[test]
fn workers_run_batches_in_parallel() {
    let (_dir, table) = test_table();
    for pk in 0..20 {
        table.insert(&[pk, 0, 0]).unwrap();
    }

    // Worker A updates even keys, worker B updates odd keys: disjoint
    // lock sets, so every transaction commits.
    let mut worker_a = TransactionWorker::new();
    let mut worker_b = TransactionWorker::new();
    for pk in 0..20 {
        let mut tx = Transaction::new();
        tx.add(
            &table,
            Operation::Update {
                pk,
                updates: vec![Keep, Set(pk + 100), Keep],
            },
        );
        if pk % 2 == 0 {
            worker_a.add(tx);
        } else {
            worker_b.add(tx);
        }
    }

    worker_a.run().unwrap();
    worker_b.run().unwrap();
    assert_eq!(worker_a.join(), 10);
    assert_eq!(worker_b.join(), 10);

    for pk in 0..20 {
        assert_eq!(select_row(&table, pk), Some(vec![pk, pk + 100, 0]));
    }
}

#[test]
fn worker_counts_only_commits() {
    let (_dir, table) = test_table();
    table.insert(&[1, 0, 0]).unwrap();

    let mut worker = TransactionWorker::new();
    let mut good = Transaction::new();
    good.add(
        &table,
        Operation::Update {
            pk: 1,
            updates: vec![Keep, Set(5), Keep],
        },
    );
    worker.add(good);
    let mut bad = Transaction::new();
    bad.add(&table, Operation::Delete { pk: 404 });
    worker.add(bad);

    worker.run().unwrap();
    assert_eq!(worker.join(), 1);
    assert_eq!(worker.committed(), 1);
}

use super::*;
use pretty_assertions::assert_eq;

#[test]
fn primary_rejects_duplicates() {
    let index = PrimaryIndex::new();
    index.insert(90210, Rid(0)).unwrap();
    let err = index.insert(90210, Rid(1)).unwrap_err();
    assert!(matches!(err, DbError::DuplicateKey(90210)));
    assert_eq!(index.get(90210), Some(Rid(0)));
}

#[test]
fn primary_range_is_inclusive_and_ordered() {
    let index = PrimaryIndex::new();
    for key in [5, 3, 9, 7, 1] {
        index.insert(key, Rid(key * 10)).unwrap();
    }
    assert_eq!(index.range(3, 7), vec![Rid(30), Rid(50), Rid(70)]);
    assert_eq!(index.range(8, 8), vec![]);
}

#[test]
fn primary_reassign_is_atomic() {
    let index = PrimaryIndex::new();
    index.insert(1, Rid(0)).unwrap();
    index.insert(2, Rid(1)).unwrap();

    // Collision leaves both entries untouched.
    let err = index.reassign(1, 2, Rid(0)).unwrap_err();
    assert!(matches!(err, DbError::DuplicateKey(2)));
    assert_eq!(index.get(1), Some(Rid(0)));

    index.reassign(1, 3, Rid(0)).unwrap();
    assert_eq!(index.get(1), None);
    assert_eq!(index.get(3), Some(Rid(0)));
}

#[test]
fn primary_round_trips_through_entries() {
    let index = PrimaryIndex::new();
    index.insert(2, Rid(20)).unwrap();
    index.insert(1, Rid(10)).unwrap();
    let restored = PrimaryIndex::from_entries(index.entries());
    assert_eq!(restored.len(), 2);
    assert_eq!(restored.get(1), Some(Rid(10)));
}

#[test]
fn secondary_is_a_multimap() {
    let index = SecondaryIndex::new();
    index.add(1, Rid(0));
    index.add(1, Rid(5));
    index.add(2, Rid(7));
    assert_eq!(index.get(1), vec![Rid(0), Rid(5)]);

    index.remove(1, Rid(0));
    assert_eq!(index.get(1), vec![Rid(5)]);
    index.remove(1, Rid(5));
    assert_eq!(index.get(1), vec![]);
}

#[test]
fn lookup_uses_primary_for_pk_column() {
    let indexes = TableIndexes::new(3, 0);
    indexes.primary().insert(42, Rid(9)).unwrap();
    assert_eq!(indexes.lookup(0, 42).unwrap(), Some(vec![Rid(9)]));
    assert_eq!(indexes.lookup(0, 43).unwrap(), Some(vec![]));
}

#[test]
fn lookup_without_secondary_requests_a_scan() {
    let indexes = TableIndexes::new(3, 0);
    assert_eq!(indexes.lookup(2, 1).unwrap(), None);
    assert!(indexes.lookup(3, 1).is_err());
}

#[test]
fn secondary_lifecycle_and_maintenance() {
    let indexes = TableIndexes::new(3, 0);
    indexes
        .create_secondary(2, vec![(1, Rid(0)), (1, Rid(5))])
        .unwrap();
    assert_eq!(indexes.lookup(2, 1).unwrap(), Some(vec![Rid(0), Rid(5)]));

    // Insert and update keep the secondary current.
    indexes.on_insert(Rid(7), &[10, 0, 1]);
    assert_eq!(
        indexes.lookup(2, 1).unwrap(),
        Some(vec![Rid(0), Rid(5), Rid(7)])
    );
    indexes.on_update(Rid(7), &[10, 0, 1], &[10, 0, 2]);
    assert_eq!(indexes.lookup(2, 1).unwrap(), Some(vec![Rid(0), Rid(5)]));
    assert_eq!(indexes.lookup(2, 2).unwrap(), Some(vec![Rid(7)]));

    indexes.drop_secondary(2).unwrap();
    assert_eq!(indexes.lookup(2, 1).unwrap(), None);
}

#[test]
fn create_secondary_on_pk_is_rejected() {
    let indexes = TableIndexes::new(3, 1);
    assert!(matches!(
        indexes.create_secondary(1, vec![]),
        Err(DbError::BadArgument(_))
    ));
}

#[test]
fn on_delete_clears_every_index() {
    let indexes = TableIndexes::new(2, 0);
    indexes.primary().insert(5, Rid(3)).unwrap();
    indexes.create_secondary(1, vec![(99, Rid(3))]).unwrap();

    indexes.on_delete(Rid(3), &[5, 99]);
    assert_eq!(indexes.primary().get(5), None);
    assert_eq!(indexes.lookup(1, 99).unwrap(), Some(vec![]));
}

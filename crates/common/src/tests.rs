use super::*;
use std::io;

#[test]
fn config_defaults_are_sane() {
    let cfg = Config::default();
    assert_eq!(cfg.buffer_pool_frames, 256);
    assert_eq!(cfg.merge_threshold_pages, 16);
    assert!(cfg.merge_enabled);
}

#[test]
fn rid_spaces_are_disjoint() {
    let base = Rid(0);
    let tail = Rid(TAIL_RID_BASE);
    assert!(base.is_base() && !base.is_tail());
    assert!(tail.is_tail() && !tail.is_base());
    assert!(!Rid::NONE.is_base() && !Rid::NONE.is_tail());
    assert!(Rid::TOMBSTONE.is_tombstone());
}

#[test]
fn column_update_applies() {
    assert_eq!(ColumnUpdate::Set(7).apply(3), 7);
    assert_eq!(ColumnUpdate::Keep.apply(3), 3);
    assert_eq!(ColumnUpdate::from_option(None), ColumnUpdate::Keep);
    assert_eq!(ColumnUpdate::from_option(Some(9)), ColumnUpdate::Set(9));
}

#[test]
fn fatal_errors_are_distinguished() {
    assert!(DbError::Buffer("no eviction candidate".into()).is_fatal());
    assert!(DbError::Storage("short page".into()).is_fatal());
    assert!(!DbError::DuplicateKey(5).is_fatal());
    assert!(!DbError::KeyNotFound(5).is_fatal());
    assert!(!DbError::Conflict("rid 3 locked".into()).is_fatal());
}

#[test]
fn db_error_formats_cleanly() {
    let err = DbError::DuplicateKey(90210);
    assert!(format!("{err}").contains("90210"));
}

#[test]
fn io_error_converts() {
    let e = io::Error::other("oops");
    let db_err: DbError = e.into();
    assert!(matches!(db_err, DbError::Io(_)));
}

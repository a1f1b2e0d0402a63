// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn ids(scan: RecordScan) -> Vec<u64> {
    scan.map(|r| r.unwrap().id.get()).collect()
}

#[test]
fn fake_assigns_sequential_ids() {
    let store = FakeLogStore::new();
    let a = store.append(&"a".into(), "one").unwrap();
    let b = store.append(&"b".into(), "two").unwrap();

    assert_eq!(a.id, MessageId::new(1));
    assert_eq!(b.id, MessageId::new(2));
    assert_eq!(store.last_id(), MessageId::new(2));
}

#[test]
fn fake_rejects_duplicate_tokens() {
    let store = FakeLogStore::new();
    store.append(&"a".into(), "one").unwrap();

    let err = store.append(&"a".into(), "one again").unwrap_err();
    assert!(matches!(err, AppendError::DuplicateToken(t) if t.as_str() == "a"));
    assert_eq!(store.records().len(), 1);
    assert_eq!(store.append_calls(), 2);
}

#[test]
fn fake_outage_fails_appends_and_scans() {
    let store = FakeLogStore::new();
    store.set_unavailable(true);

    assert!(matches!(
        store.append(&"a".into(), "one"),
        Err(AppendError::StorageUnavailable(_))
    ));
    assert!(store.scan_after(MessageId::ZERO).is_err());

    store.set_unavailable(false);
    assert!(store.append(&"a".into(), "one").is_ok());
}

#[test]
fn fake_scan_failure_truncates_then_errors() {
    let store = FakeLogStore::new();
    for i in 0..5 {
        store.append(&format!("t{}", i).into(), "x").unwrap();
    }
    store.fail_scans_after(2);

    let items: Vec<_> = store.scan_after(MessageId::ZERO).unwrap().collect();
    assert_eq!(items.len(), 3);
    assert!(items[0].is_ok());
    assert!(items[1].is_ok());
    assert!(items[2].is_err());
}

#[test]
fn fake_scan_after_filters_by_id() {
    let store = FakeLogStore::new();
    for i in 0..4 {
        store.append(&format!("t{}", i).into(), "x").unwrap();
    }

    assert_eq!(ids(store.scan_after(MessageId::new(2)).unwrap()), vec![3, 4]);
    assert!(ids(store.scan_after(MessageId::new(1000)).unwrap()).is_empty());
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use proptest::prelude::*;
use tempfile::TempDir;

fn make_test_log() -> (MessageLog, TempDir) {
    let tmp = TempDir::new().unwrap();
    let log = MessageLog::open(&tmp.path().join("messages.log")).unwrap();
    (log, tmp)
}

fn scan_ids(log: &MessageLog, min_id: u64) -> Vec<u64> {
    log.scan_after(MessageId::new(min_id))
        .unwrap()
        .map(|r| r.unwrap().id.get())
        .collect()
}

fn append_raw(path: &Path, bytes: &[u8]) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(bytes).unwrap();
}

#[test]
fn first_append_gets_id_one() {
    let (log, _tmp) = make_test_log();

    let record = log.append(&"tok-1".into(), "hello").unwrap();

    assert_eq!(record.id, MessageId::new(1));
    assert_eq!(record.token.as_str(), "tok-1");
    assert_eq!(record.content, "hello");
    assert_eq!(log.last_id(), MessageId::new(1));
}

#[test]
fn duplicate_token_is_rejected_without_mutation() {
    let (log, _tmp) = make_test_log();
    log.append(&"tok-1".into(), "hello").unwrap();
    let len_before = std::fs::metadata(log.path()).unwrap().len();

    let err = log.append(&"tok-1".into(), "hello").unwrap_err();

    assert!(matches!(err, AppendError::DuplicateToken(t) if t.as_str() == "tok-1"));
    assert_eq!(log.len(), 1);
    assert_eq!(std::fs::metadata(log.path()).unwrap().len(), len_before);
}

#[test]
fn records_and_tokens_survive_reopen() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("messages.log");

    {
        let log = MessageLog::open(&path).unwrap();
        log.append(&"a".into(), "one").unwrap();
        log.append(&"b".into(), "two").unwrap();
    }

    let log = MessageLog::open(&path).unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log.last_id(), MessageId::new(2));
    assert!(matches!(
        log.append(&"a".into(), "one"),
        Err(AppendError::DuplicateToken(_))
    ));
    assert_eq!(log.append(&"c".into(), "three").unwrap().id, MessageId::new(3));
}

#[test]
fn scan_after_returns_later_records_in_order() {
    let (log, _tmp) = make_test_log();
    for i in 1..=5 {
        log.append(&format!("tok-{}", i).into(), &format!("msg {}", i))
            .unwrap();
    }

    assert_eq!(scan_ids(&log, 0), vec![1, 2, 3, 4, 5]);
    assert_eq!(scan_ids(&log, 3), vec![4, 5]);
    assert_eq!(scan_ids(&log, 5), Vec::<u64>::new());
}

#[test]
fn scan_after_beyond_last_id_is_empty() {
    let (log, _tmp) = make_test_log();
    for i in 1..=10 {
        log.append(&format!("tok-{}", i).into(), "x").unwrap();
    }

    assert!(scan_ids(&log, 1000).is_empty());
}

#[test]
fn scan_on_empty_log_is_empty() {
    let (log, _tmp) = make_test_log();
    assert!(scan_ids(&log, 0).is_empty());
}

#[test]
fn scan_is_restartable_and_sees_new_commits() {
    let (log, _tmp) = make_test_log();
    log.append(&"a".into(), "one").unwrap();
    assert_eq!(scan_ids(&log, 0), vec![1]);

    log.append(&"b".into(), "two").unwrap();
    assert_eq!(scan_ids(&log, 0), vec![1, 2]);
}

#[test]
fn scan_reads_only_prefix_committed_at_start() {
    let (log, _tmp) = make_test_log();
    log.append(&"a".into(), "one").unwrap();

    let scan = log.scan_after(MessageId::ZERO).unwrap();
    log.append(&"b".into(), "two").unwrap();

    let ids: Vec<u64> = scan.map(|r| r.unwrap().id.get()).collect();
    assert_eq!(ids, vec![1]);
}

#[test]
fn torn_final_line_is_truncated_on_open() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("messages.log");
    {
        let log = MessageLog::open(&path).unwrap();
        log.append(&"a".into(), "one").unwrap();
    }
    let intact_len = std::fs::metadata(&path).unwrap().len();
    append_raw(&path, br#"{"id":2,"token":"b","cont"#);

    let log = MessageLog::open(&path).unwrap();

    assert_eq!(std::fs::metadata(&path).unwrap().len(), intact_len);
    assert_eq!(log.last_id(), MessageId::new(1));
    // the torn submission was never acknowledged, so its token is free
    assert_eq!(log.append(&"b".into(), "two").unwrap().id, MessageId::new(2));
    assert_eq!(scan_ids(&log, 0), vec![1, 2]);
}

#[test]
fn checksum_mismatch_in_final_line_is_truncated() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("messages.log");
    {
        let log = MessageLog::open(&path).unwrap();
        log.append(&"a".into(), "one").unwrap();
    }
    append_raw(
        &path,
        b"{\"id\":2,\"token\":\"b\",\"content\":\"two\",\"crc\":1}\n",
    );

    let log = MessageLog::open(&path).unwrap();
    assert_eq!(log.len(), 1);
}

#[test]
fn poisoned_log_refuses_appends_and_keeps_committed_prefix() {
    let (log, _tmp) = make_test_log();
    log.append(&"tok-1".into(), "one").unwrap();
    log.append(&"tok-2".into(), "two").unwrap();

    log.lock().poisoned = true;

    let err = log.append(&"tok-3".into(), "three").unwrap_err();
    assert!(matches!(err, AppendError::StorageUnavailable(_)));
    // A known token is still refused as unavailable, not acked as a duplicate
    let err = log.append(&"tok-1".into(), "one").unwrap_err();
    assert!(matches!(err, AppendError::StorageUnavailable(_)));

    assert_eq!(log.last_id(), MessageId::new(2));
    assert_eq!(scan_ids(&log, 0), vec![1, 2]);
}

#[test]
fn rollback_discards_partial_write() {
    let (log, tmp) = make_test_log();
    let path = tmp.path().join("messages.log");
    log.append(&"tok-1".into(), "one").unwrap();
    let committed_len = std::fs::metadata(&path).unwrap().len();

    // Bytes left behind by a write that failed part way
    append_raw(&path, b"{\"id\":2,\"tok");
    log.lock().rollback();

    assert_eq!(std::fs::metadata(&path).unwrap().len(), committed_len);
    assert!(!log.lock().poisoned);
    assert_eq!(scan_ids(&log, 0), vec![1]);

    let record = log.append(&"tok-2".into(), "two").unwrap();
    assert_eq!(record.id, MessageId::new(2));

    drop(log);
    let reopened = MessageLog::open(&path).unwrap();
    assert_eq!(scan_ids(&reopened, 0), vec![1, 2]);
}

#[test]
fn damage_before_the_tail_fails_open() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("messages.log");
    std::fs::write(&path, b"not json\n").unwrap();
    {
        // a valid record after the garbage makes the garbage non-tail
        let entry = LogEntry::seal(&MessageRecord::new(MessageId::new(1), "a".into(), "x"));
        let mut line = serde_json::to_vec(&entry).unwrap();
        line.push(b'\n');
        append_raw(&path, &line);
    }

    let err = MessageLog::open(&path).err().unwrap();
    assert!(matches!(err, LogError::Corrupt { line: 1, .. }));
}

#[test]
fn duplicate_token_on_disk_fails_open() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("messages.log");
    for id in 1..=2 {
        let entry = LogEntry::seal(&MessageRecord::new(MessageId::new(id), "same".into(), "x"));
        let mut line = serde_json::to_vec(&entry).unwrap();
        line.push(b'\n');
        append_raw_create(&path, &line);
    }

    let err = MessageLog::open(&path).err().unwrap();
    assert!(matches!(err, LogError::Corrupt { line: 2, .. }));
}

fn append_raw_create(path: &Path, bytes: &[u8]) {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    file.write_all(bytes).unwrap();
}

#[test]
fn checksum_covers_token_boundary() {
    let a = checksum(MessageId::new(1), &"ab".into(), "c");
    let b = checksum(MessageId::new(1), &"a".into(), "bc");
    assert_ne!(a, b);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn one_record_per_token_with_ascending_ids(
        tokens in proptest::collection::vec(0u8..8, 1..40)
    ) {
        let (log, _tmp) = make_test_log();
        let mut expected_tokens = Vec::new();

        for t in &tokens {
            let token = IdempotencyToken::new(format!("tok-{}", t));
            match log.append(&token, "payload") {
                Ok(_) => {
                    prop_assert!(!expected_tokens.contains(t));
                    expected_tokens.push(*t);
                }
                Err(AppendError::DuplicateToken(_)) => {
                    prop_assert!(expected_tokens.contains(t));
                }
                Err(e) => prop_assert!(false, "unexpected error: {}", e),
            }
        }

        let records: Vec<MessageRecord> = log
            .scan_after(MessageId::ZERO)
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        prop_assert_eq!(records.len(), expected_tokens.len());
        for pair in records.windows(2) {
            prop_assert!(pair[0].id < pair[1].id);
        }
    }

    #[test]
    fn scan_after_is_exactly_the_suffix(count in 0u64..20, min_id in 0u64..25) {
        let (log, _tmp) = make_test_log();
        for i in 0..count {
            log.append(&format!("tok-{}", i).into(), "x").unwrap();
        }

        let expected: Vec<u64> = (1..=count).filter(|id| *id > min_id).collect();
        prop_assert_eq!(scan_ids(&log, min_id), expected);
    }
}

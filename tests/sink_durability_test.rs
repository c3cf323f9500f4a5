use chrono::{TimeZone, Utc};
use lsm_logger::adapters::CsvReadingSink;
use lsm_logger::domain::decimal::Decimal;
use lsm_logger::domain::model::{LogRecord, Reading, TimestampZone, Unit, Verdict, VerdictStatus};
use lsm_logger::domain::ports::ReadingSink;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn reading(value: &str, second: u32) -> Reading {
    Reading {
        value: Decimal::parse(value).unwrap(),
        unit: Some(Unit::Mm),
        timestamp: Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, second).unwrap(),
        raw_line: format!("+{}", value),
    }
}

fn verdict() -> Verdict {
    Verdict {
        status: VerdictStatus::Pass,
        rule_id: Some("nominal".to_string()),
        margin: Some(Decimal::parse("0.001").unwrap()),
    }
}

fn hash_prefix(path: &Path, len: usize) -> Vec<u8> {
    let bytes = fs::read(path).unwrap();
    Sha256::digest(&bytes[..len]).to_vec()
}

fn read_records(path: &Path) -> Vec<LogRecord> {
    csv::Reader::from_path(path)
        .unwrap()
        .deserialize()
        .collect::<Result<Vec<LogRecord>, _>>()
        .unwrap()
}

#[test]
fn test_reopen_continues_sequence_without_touching_prior_bytes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("readings.csv");

    {
        let mut sink = CsvReadingSink::open(&path, TimestampZone::Utc).unwrap();
        for (i, value) in ["0.110", "0.111", "0.109"].iter().enumerate() {
            let sequence = sink.append(&reading(value, i as u32), &verdict()).unwrap();
            assert_eq!(sequence, i as u64 + 1);
        }
    }

    let prior_len = fs::metadata(&path).unwrap().len() as usize;
    let prior_hash = hash_prefix(&path, prior_len);

    {
        let mut sink = CsvReadingSink::open(&path, TimestampZone::Utc).unwrap();
        assert_eq!(sink.next_sequence(), 4);
        assert_eq!(sink.append(&reading("0.112", 10), &verdict()).unwrap(), 4);
        assert_eq!(sink.append(&reading("0.108", 11), &verdict()).unwrap(), 5);
        sink.flush().unwrap();
    }

    assert_eq!(hash_prefix(&path, prior_len), prior_hash);

    let content = fs::read_to_string(&path).unwrap();
    assert_eq!(content.matches("sequence_number").count(), 1);

    let records = read_records(&path);
    let sequences: Vec<u64> = records.iter().map(|r| r.sequence_number).collect();
    assert_eq!(sequences, vec![1, 2, 3, 4, 5]);
    assert_eq!(records[3].decoded_value, "0.112");
    assert_eq!(records[3].timestamp, "2026-05-04T09:00:10.000Z");
    assert_eq!(records[3].verdict_status, "PASS");
    assert_eq!(records[3].rule_id, "nominal");
}

#[test]
fn test_crash_torn_row_is_preserved_and_sequence_not_reused() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("readings.csv");

    {
        let mut sink = CsvReadingSink::open(&path, TimestampZone::Utc).unwrap();
        sink.append(&reading("0.110", 0), &verdict()).unwrap();
        sink.append(&reading("0.111", 1), &verdict()).unwrap();
    }

    // simulate a crash in the middle of writing row 3
    let mut bytes = fs::read(&path).unwrap();
    bytes.extend_from_slice(b"3,2026-05-04T09:00:0");
    fs::write(&path, &bytes).unwrap();
    let prior_hash = hash_prefix(&path, bytes.len());

    let mut sink = CsvReadingSink::open(&path, TimestampZone::Utc).unwrap();
    assert_eq!(sink.append(&reading("0.112", 5), &verdict()).unwrap(), 4);

    assert_eq!(hash_prefix(&path, bytes.len()), prior_hash);
    let content = fs::read_to_string(&path).unwrap();
    let last_two: Vec<&str> = content.lines().rev().take(2).collect();
    assert_eq!(last_two[1], "3,2026-05-04T09:00:0");
    assert!(last_two[0].starts_with("4,2026-05-04T09:00:05.000Z,+0.112,0.112,"));
}

#[test]
fn test_local_timezone_rows_carry_offset() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("local.csv");

    let mut sink = CsvReadingSink::open(&path, TimestampZone::Local).unwrap();
    sink.append(&reading("0.110", 0), &verdict()).unwrap();

    let records = read_records(&path);
    let parsed = chrono::DateTime::parse_from_rfc3339(&records[0].timestamp).unwrap();
    assert_eq!(parsed.with_timezone(&Utc), reading("0.110", 0).timestamp);
}

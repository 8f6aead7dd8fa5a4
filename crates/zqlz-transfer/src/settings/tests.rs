use pretty_assertions::assert_eq;
use tempfile::tempdir;

use super::*;

#[test]
fn test_defaults() {
    let settings = TransferSettings::default();
    assert_eq!(settings.max_jobs, 1);

    let consumer = &settings.consumer;
    assert_eq!(consumer.container, None);
    assert!(consumer.open_new_connections);
    assert!(consumer.use_transactions);
    assert_eq!(consumer.commit_after_rows, 10_000);
    assert!(consumer.open_table_on_finish);
    assert!(!consumer.truncate_before_load);
    assert!(!consumer.ignore_errors);

    let producer = &settings.producer;
    assert!(producer.open_new_connections);
    assert!(producer.query_row_count);
    assert_eq!(producer.extract_type, ExtractType::SingleQuery);
    assert_eq!(producer.segment_size, 100_000);
}

#[test]
fn test_missing_keys_take_defaults() {
    let json = r#"{
        "consumer": { "container": "warehouse/public", "commitAfterRows": 500 },
        "producer": { "extractType": "segments" }
    }"#;
    let settings: TransferSettings = serde_json::from_str(json).unwrap();

    assert_eq!(settings.consumer.container.as_deref(), Some("warehouse/public"));
    assert_eq!(settings.consumer.commit_after_rows, 500);
    assert!(settings.consumer.use_transactions);
    assert_eq!(settings.producer.extract_type, ExtractType::Segments);
    assert_eq!(settings.producer.segment_size, DEFAULT_SEGMENT_SIZE);
    assert_eq!(settings.max_jobs, DEFAULT_MAX_JOBS);
}

#[test]
fn test_empty_object_is_default() {
    let settings: TransferSettings = serde_json::from_str("{}").unwrap();
    assert_eq!(settings, TransferSettings::default());
}

#[test]
fn test_keys_are_camel_case() {
    let settings = TransferSettings::default().with_max_jobs(4);
    let value = serde_json::to_value(&settings).unwrap();

    assert_eq!(value["maxJobs"], 4);
    for key in [
        "container",
        "openNewConnections",
        "useTransactions",
        "commitAfterRows",
        "openTableOnFinish",
    ] {
        assert!(value["consumer"].get(key).is_some(), "consumer.{key}");
    }
    for key in ["openNewConnections", "extractType", "segmentSize", "queryRowCount"] {
        assert!(value["producer"].get(key).is_some(), "producer.{key}");
    }
    assert_eq!(value["producer"]["extractType"], "single_query");
}

#[test]
fn test_builders_clamp_to_one() {
    assert_eq!(ConsumerSettings::default().with_commit_after_rows(0).commit_after_rows, 1);
    assert_eq!(ProducerSettings::default().with_segments(0).segment_size, 1);
    assert_eq!(TransferSettings::default().with_max_jobs(0).max_jobs, 1);
}

#[test]
fn test_save_and_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("data_transfer.json");

    let settings = TransferSettings {
        consumer: ConsumerSettings::default()
            .with_container("analytics/staging")
            .with_transactions(false)
            .with_commit_after_rows(250)
            .with_truncate_before_load(true),
        producer: ProducerSettings::default()
            .with_segments(5_000)
            .with_query_row_count(false),
        max_jobs: 3,
    };
    settings.save_to(&path).unwrap();

    let loaded = TransferSettings::load_from(&path).unwrap();
    assert_eq!(loaded, settings);
}

#[test]
fn test_load_missing_file_yields_defaults() {
    let dir = tempdir().unwrap();
    let loaded = TransferSettings::load_from(&dir.path().join("absent.json")).unwrap();
    assert_eq!(loaded, TransferSettings::default());
}

#[test]
fn test_load_invalid_json_fails() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data_transfer.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(TransferSettings::load_from(&path).is_err());
}

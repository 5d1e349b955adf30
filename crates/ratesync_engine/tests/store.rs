use std::fs;

use ratesync_core::{OutcomeTag, RecordLookup, ResultRecord};
use ratesync_engine::{
    ensure_store_dir, lookup, write_record, JsonFileStore, MemoryStore, ResultStore, StoreError,
    StoredRecord,
};
use tempfile::TempDir;

#[test]
fn memory_store_put_get_delete() {
    let store = MemoryStore::new();
    assert_eq!(store.get("result-batch-1-0").unwrap(), None);
    store.put("result-batch-1-0", "{}").unwrap();
    assert_eq!(store.get("result-batch-1-0").unwrap().as_deref(), Some("{}"));
    store.delete("result-batch-1-0").unwrap();
    assert_eq!(store.get("result-batch-1-0").unwrap(), None);
    // Deleting a missing key is fine.
    store.delete("result-batch-1-0").unwrap();
}

#[test]
fn file_store_survives_reopen() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested").join("results.json");

    let store = JsonFileStore::open(path.clone()).unwrap();
    store.put("result-batch-1-0", "a").unwrap();
    store.put("result-batch-1-1", "b").unwrap();
    drop(store);

    let reopened = JsonFileStore::open(path.clone()).unwrap();
    assert_eq!(reopened.get("result-batch-1-1").unwrap().as_deref(), Some("b"));
    reopened.delete("result-batch-1-0").unwrap();
    assert_eq!(reopened.get("result-batch-1-0").unwrap(), None);

    let on_disk: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk, serde_json::json!({ "result-batch-1-1": "b" }));
}

#[test]
fn corrupt_file_is_refused() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("results.json");
    fs::write(&path, "not json").unwrap();
    let err = JsonFileStore::open(path).unwrap_err();
    assert!(matches!(err, StoreError::Corrupt(_)));
}

#[test]
fn store_dir_must_be_a_directory() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("not_a_dir");
    fs::write(&file_path, "x").unwrap();
    assert!(matches!(
        ensure_store_dir(&file_path),
        Err(StoreError::StoreDir(_))
    ));
    assert!(JsonFileStore::open(file_path.join("results.json")).is_err());
}

#[test]
fn outcome_records_round_trip_through_lookup() {
    let store = MemoryStore::new();
    let record = StoredRecord::outcome(&OutcomeTag::AlreadyInList, 42);
    write_record(&store, "k", &record).unwrap();
    assert_eq!(
        lookup(&store, "k"),
        RecordLookup::Found(ResultRecord {
            success: true,
            result: OutcomeTag::AlreadyInList,
            timestamp_ms: 42,
        })
    );
}

#[test]
fn failure_tags_are_written_unsuccessful() {
    let store = MemoryStore::new();
    write_record(&store, "k", &StoredRecord::outcome(&OutcomeTag::NoImdbId, 1)).unwrap();
    let raw: serde_json::Value = serde_json::from_str(&store.get("k").unwrap().unwrap()).unwrap();
    assert_eq!(
        raw,
        serde_json::json!({ "success": false, "result": "no-imdb-id", "timestamp": 1 })
    );
}

#[test]
fn processing_marker_is_recognized() {
    let store = MemoryStore::new();
    store
        .put(
            "k",
            r#"{"status":"processing","movieId":"1292052","imdbId":"tt0111161","timestamp":5}"#,
        )
        .unwrap();
    assert_eq!(lookup(&store, "k"), RecordLookup::Processing);
    assert_eq!(lookup(&store, "other"), RecordLookup::Missing);
}

#[test]
fn garbage_value_is_unreadable() {
    let store = MemoryStore::new();
    store.put("k", "{\"success\":\"maybe\"}").unwrap();
    assert!(matches!(lookup(&store, "k"), RecordLookup::Unreadable(_)));
}

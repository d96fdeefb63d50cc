use bytes::Bytes;
use ryos_snapshot::models::record::{json_record, StoredField};
use ryos_snapshot::models::snapshot::StoreName;
use ryos_snapshot::persistence::{DiskFlatStore, DiskObjectStore, FlatStore, ObjectStoreBackend};
use serde_json::json;
use std::collections::BTreeMap;

// ==================== Flat Store Tests ====================

#[test]
fn test_disk_flat_store_persists_across_reopen() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("flat").join("settings.bin");

    {
        let store = DiskFlatStore::open(&path).unwrap();
        store.set("ryos:theme", "system7").unwrap();
        store.set("ryos:volume", "0.4").unwrap();
        store.remove("ryos:volume").unwrap();
    }

    let store = DiskFlatStore::open(&path).unwrap();
    assert_eq!(store.get("ryos:theme").unwrap().as_deref(), Some("system7"));
    assert_eq!(store.get("ryos:volume").unwrap(), None);
    assert!(!path.with_extension("bin.tmp").exists());
}

#[test]
fn test_disk_flat_store_replace_all() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("settings.bin");
    let store = DiskFlatStore::open(&path).unwrap();
    store.set("old", "1").unwrap();

    let next = BTreeMap::from([("a".to_string(), "x".to_string()), ("b".to_string(), "y".to_string())]);
    store.replace_all(next.clone()).unwrap();
    assert_eq!(store.get_all().unwrap(), next);

    let reopened = DiskFlatStore::open(&path).unwrap();
    assert_eq!(reopened.get_all().unwrap(), next);
}

#[test]
fn test_corrupt_flat_store_is_quarantined() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("settings.bin");
    std::fs::write(&path, b"\xff\xff\xff\xffnot bincode").unwrap();

    let store = DiskFlatStore::open(&path).unwrap();
    assert!(store.get_all().unwrap().is_empty());
    assert!(path.with_extension("bin.corrupt").exists());
}

// ==================== Object Store Tests ====================

#[tokio::test]
async fn test_disk_object_store_round_trips_binary_fields() {
    let tmp = tempfile::tempdir().unwrap();
    let store = DiskObjectStore::open(tmp.path()).unwrap();

    let mut value = json_record([("name", json!("song.mp3"))]);
    value.insert(
        "content".into(),
        StoredField::Binary {
            mime: "audio/mpeg".into(),
            data: Bytes::from(vec![0u8, 255, 10, 13]),
        },
    );
    store
        .put(StoreName::Documents, "../weird key/ü", value.clone())
        .await
        .unwrap();

    assert_eq!(
        store.get(StoreName::Documents, "../weird key/ü").await.unwrap(),
        Some(value)
    );
    assert_eq!(store.count(StoreName::Documents).await.unwrap(), 1);
    assert_eq!(store.count(StoreName::Images).await.unwrap(), 0);
}

#[tokio::test]
async fn test_disk_object_store_cursor_and_clear() {
    let tmp = tempfile::tempdir().unwrap();
    let store = DiskObjectStore::open(tmp.path()).unwrap();

    for i in 0..25 {
        store
            .put(
                StoreName::Trash,
                &format!("item-{i}"),
                json_record([("name", json!(format!("item-{i}.txt")))]),
            )
            .await
            .unwrap();
    }

    let mut cursor = store.open_cursor(StoreName::Trash).await.unwrap();
    let mut keys = Vec::new();
    while let Some(item) = cursor.next().await {
        keys.push(item.unwrap().0);
    }
    keys.sort();
    let mut expected: Vec<String> = (0..25).map(|i| format!("item-{i}")).collect();
    expected.sort();
    assert_eq!(keys, expected);

    store.clear(StoreName::Trash).await.unwrap();
    assert_eq!(store.count(StoreName::Trash).await.unwrap(), 0);
}

#[tokio::test]
async fn test_disk_object_store_missing_keys() {
    let tmp = tempfile::tempdir().unwrap();
    let store = DiskObjectStore::open(tmp.path()).unwrap();

    assert_eq!(store.get(StoreName::Images, "nope").await.unwrap(), None);
    store.delete(StoreName::Images, "nope").await.unwrap();
}

#[tokio::test]
async fn test_corrupt_record_is_skipped_by_cursor() {
    let tmp = tempfile::tempdir().unwrap();
    let store = DiskObjectStore::open(tmp.path()).unwrap();
    store
        .put(StoreName::Images, "good", json_record([("name", json!("a.png"))]))
        .await
        .unwrap();
    std::fs::write(tmp.path().join("images").join("zz.json"), b"{oops").unwrap();

    let mut cursor = store.open_cursor(StoreName::Images).await.unwrap();
    let mut ok = 0;
    let mut failed = 0;
    while let Some(item) = cursor.next().await {
        match item {
            Ok(_) => ok += 1,
            Err(_) => failed += 1,
        }
    }
    assert_eq!((ok, failed), (1, 1));
    assert_eq!(store.count(StoreName::Images).await.unwrap(), 1);
}

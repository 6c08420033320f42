//! File-backed store lifecycle: create, reopen, compact, backup,
//! encryption.

use micadb::engine::{Store, StoreConfig};
use micadb::storage::DurabilityMode;
use micadb::{ColumnAttrs, ColumnType, Error, Value};
use tempfile::TempDir;

fn populate(store: &Store, n: usize) -> Vec<micadb::ObjKey> {
    let mut txn = store.begin_write().unwrap();
    txn.create_table("note").unwrap();
    txn.add_column("note", "text", ColumnType::String, false, ColumnAttrs::NONE)
        .unwrap();
    txn.add_column("note", "stars", ColumnType::Int, false, ColumnAttrs::INDEXED)
        .unwrap();
    let mut keys = Vec::new();
    for i in 0..n {
        let k = txn.create_object("note").unwrap();
        txn.set("note", k, "text", Value::String(format!("note {i}")))
            .unwrap();
        txn.set("note", k, "stars", Value::Int((i % 5) as i64))
            .unwrap();
        keys.push(k);
    }
    txn.commit().unwrap();
    keys
}

#[test]
fn test_create_close_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("notes.mica");

    let keys = {
        let store = Store::open(StoreConfig::at_path(&path)).unwrap();
        let keys = populate(&store, 10);
        assert_eq!(store.current_version(), 1);
        keys
    };

    let store = Store::open(StoreConfig::at_path(&path)).unwrap();
    assert_eq!(store.current_version(), 1);
    let reader = store.begin_read().unwrap();
    assert_eq!(reader.object_count("note").unwrap(), 10);
    assert_eq!(
        reader.get("note", keys[3], "text").unwrap(),
        Value::String("note 3".into())
    );
    // Secondary indexes survive a reopen
    assert_eq!(
        reader
            .indexed_keys("note", "stars", &Value::Int(0))
            .unwrap()
            .len(),
        2
    );
}

#[test]
fn test_reopen_sees_latest_of_many_commits() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("notes.mica");

    {
        let store = Store::open(StoreConfig::at_path(&path)).unwrap();
        let keys = populate(&store, 4);
        for (i, &k) in keys.iter().enumerate() {
            let mut txn = store.begin_write().unwrap();
            txn.set("note", k, "stars", Value::Int(10 + i as i64))
                .unwrap();
            txn.commit().unwrap();
        }
        assert_eq!(store.current_version(), 5);
    }

    let store = Store::open(StoreConfig::at_path(&path)).unwrap();
    assert_eq!(store.current_version(), 5);
    let reader = store.begin_read().unwrap();
    let keys = reader.object_keys("note").unwrap();
    assert_eq!(reader.get("note", keys[3], "stars").unwrap(), Value::Int(13));
}

#[test]
fn test_compact_preserves_data() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("notes.mica");
    let store = Store::open(StoreConfig::at_path(&path)).unwrap();
    let keys = populate(&store, 20);

    // Churn to create garbage versions
    for round in 0..5 {
        let mut txn = store.begin_write().unwrap();
        for &k in &keys {
            txn.set("note", k, "stars", Value::Int(round)).unwrap();
        }
        txn.commit().unwrap();
    }

    store.compact().unwrap();

    // The compacted file is still readable in-process and after reopen
    let reader = store.begin_read().unwrap();
    assert_eq!(reader.get("note", keys[0], "stars").unwrap(), Value::Int(4));
    drop(reader);
    drop(store);

    let store = Store::open(StoreConfig::at_path(&path)).unwrap();
    let reader = store.begin_read().unwrap();
    assert_eq!(reader.object_count("note").unwrap(), 20);
    assert_eq!(reader.get("note", keys[19], "stars").unwrap(), Value::Int(4));
}

#[test]
fn test_backup_produces_compressed_copy() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("notes.mica");
    let backup = dir.path().join("notes.backup");
    let store = Store::open(StoreConfig::at_path(&path)).unwrap();
    populate(&store, 50);

    store.backup_to(&backup).unwrap();
    let meta = std::fs::metadata(&backup).unwrap();
    assert!(meta.len() > 0);
}

#[test]
fn test_encrypted_store_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("secret.mica");
    let key = [7u8; 32];

    {
        let store =
            Store::open(StoreConfig::at_path(&path).with_encryption_key(key)).unwrap();
        populate(&store, 5);
    }

    let store = Store::open(StoreConfig::at_path(&path).with_encryption_key(key)).unwrap();
    let reader = store.begin_read().unwrap();
    assert_eq!(reader.object_count("note").unwrap(), 5);
}

#[test]
fn test_wrong_key_fails_to_open() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("secret.mica");

    {
        let store =
            Store::open(StoreConfig::at_path(&path).with_encryption_key([7u8; 32])).unwrap();
        populate(&store, 3);
    }

    let err = Store::open(StoreConfig::at_path(&path).with_encryption_key([8u8; 32]))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::DecryptionFailed(_) | Error::Corruption(_)
    ));
}

#[test]
fn test_relaxed_durability_still_persists_on_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("notes.mica");

    {
        let store = Store::open(
            StoreConfig::at_path(&path).with_durability(DurabilityMode::Relaxed),
        )
        .unwrap();
        populate(&store, 3);
    }

    let store = Store::open(StoreConfig::at_path(&path)).unwrap();
    assert_eq!(
        store.begin_read().unwrap().object_count("note").unwrap(),
        3
    );
}

#[test]
fn test_in_memory_store_rejects_file_ops() {
    let store = Store::open(StoreConfig::in_memory()).unwrap();
    assert!(store.compact().is_err());
    assert!(store.backup_to(std::path::Path::new("/tmp/nope")).is_err());
}

//! End-to-end changeset replication between independent stores.

use micadb::engine::{Store, StoreConfig};
use micadb::sync::{apply_changeset, encode_changeset, parse_changeset, PeerId};
use micadb::{ColumnAttrs, ColumnType, Error, LinkType, Value};

/// Replay every recorded commit of `src` into `dst`
fn replicate(src: &Store, dst: &Store, peer: PeerId) {
    for record in src.history() {
        let frame = encode_changeset(peer, &record.changes);
        let changeset = parse_changeset(&frame).unwrap();
        let mut txn = dst.begin_write().unwrap();
        apply_changeset(&mut txn, &changeset).unwrap();
        txn.commit().unwrap();
    }
}

fn assert_tables_equal(a: &Store, b: &Store, table: &str, columns: &[&str]) {
    let ra = a.begin_read().unwrap();
    let rb = b.begin_read().unwrap();
    let ka = ra.object_keys(table).unwrap();
    let kb = rb.object_keys(table).unwrap();
    assert_eq!(ka, kb, "key sets differ for table {table}");
    for &k in &ka {
        for &col in columns {
            assert_eq!(
                ra.get(table, k, col).unwrap(),
                rb.get(table, k, col).unwrap(),
                "cell {table}[{k:?}].{col} differs"
            );
        }
    }
}

#[test]
fn test_full_replication_from_empty() {
    let src = Store::open(StoreConfig::in_memory().with_history()).unwrap();
    let dst = Store::open(StoreConfig::in_memory()).unwrap();

    let mut txn = src.begin_write().unwrap();
    txn.create_table("city").unwrap();
    txn.add_column("city", "name", ColumnType::String, false, ColumnAttrs::UNIQUE)
        .unwrap();
    txn.add_column("city", "pop", ColumnType::Int, true, ColumnAttrs::NONE)
        .unwrap();
    txn.commit().unwrap();

    let mut txn = src.begin_write().unwrap();
    for (name, pop) in [("umeå", Some(92_000)), ("kiruna", None)] {
        let k = txn.create_object("city").unwrap();
        txn.set("city", k, "name", Value::String(name.into()))
            .unwrap();
        if let Some(p) = pop {
            txn.set("city", k, "pop", Value::Int(p)).unwrap();
        }
    }
    txn.commit().unwrap();

    replicate(&src, &dst, PeerId::random());
    assert_tables_equal(&src, &dst, "city", &["name", "pop"]);

    // Unique index arrives with the schema
    let rb = dst.begin_read().unwrap();
    assert_eq!(
        rb.indexed_keys("city", "name", &Value::String("kiruna".into()))
            .unwrap()
            .len(),
        1
    );
}

#[test]
fn test_replication_replays_link_semantics() {
    let src = Store::open(StoreConfig::in_memory().with_history()).unwrap();
    let dst = Store::open(StoreConfig::in_memory()).unwrap();

    let mut txn = src.begin_write().unwrap();
    txn.create_table("doc").unwrap();
    txn.create_table("tab").unwrap();
    txn.add_link_column("tab", "doc", "doc", LinkType::Strong)
        .unwrap();
    let d = txn.create_object("doc").unwrap();
    let t1 = txn.create_object("tab").unwrap();
    let t2 = txn.create_object("tab").unwrap();
    txn.set("tab", t1, "doc", Value::Link(d)).unwrap();
    txn.set("tab", t2, "doc", Value::Link(d)).unwrap();
    txn.commit().unwrap();

    // Erasing one referrer keeps the doc, erasing the last cascades it;
    // neither cascade appears in the changeset
    let mut txn = src.begin_write().unwrap();
    txn.erase_object("tab", t1).unwrap();
    txn.commit().unwrap();
    let mut txn = src.begin_write().unwrap();
    txn.erase_object("tab", t2).unwrap();
    txn.commit().unwrap();

    replicate(&src, &dst, PeerId::random());

    let ra = src.begin_read().unwrap();
    let rb = dst.begin_read().unwrap();
    assert!(!ra.has_object("doc", d).unwrap());
    assert!(!rb.has_object("doc", d).unwrap());
    assert_eq!(rb.object_count("tab").unwrap(), 0);
}

#[test]
fn test_replication_is_deterministic_across_copies() {
    let src = Store::open(StoreConfig::in_memory().with_history()).unwrap();
    let copy1 = Store::open(StoreConfig::in_memory()).unwrap();
    let copy2 = Store::open(StoreConfig::in_memory()).unwrap();

    let mut txn = src.begin_write().unwrap();
    txn.create_table("item").unwrap();
    txn.add_column("item", "tags", ColumnType::IntList, false, ColumnAttrs::NONE)
        .unwrap();
    let k = txn.create_object("item").unwrap();
    for (i, tag) in [30, 10, 20].into_iter().enumerate() {
        txn.list_insert("item", k, "tags", i, tag).unwrap();
    }
    txn.list_set("item", k, "tags", 1, 11).unwrap();
    txn.list_erase("item", k, "tags", 0).unwrap();
    txn.commit().unwrap();

    let peer = PeerId::random();
    replicate(&src, &copy1, peer);
    replicate(&src, &copy2, peer);

    let expect = vec![11, 20];
    for store in [&src, &copy1, &copy2] {
        let r = store.begin_read().unwrap();
        assert_eq!(r.list_values("item", k, "tags").unwrap(), expect);
    }
}

#[test]
fn test_apply_failure_leaves_destination_untouched() {
    let src = Store::open(StoreConfig::in_memory().with_history()).unwrap();
    let dst = Store::open(StoreConfig::in_memory()).unwrap();

    let mut txn = src.begin_write().unwrap();
    txn.create_table("city").unwrap();
    txn.commit().unwrap();
    replicate(&src, &dst, PeerId::random());

    // A changeset against an object dst never had
    let mut txn = src.begin_write().unwrap();
    let ghost = txn.create_object("city").unwrap();
    txn.commit().unwrap();
    let mut txn = src.begin_write().unwrap();
    txn.erase_object("city", ghost).unwrap();
    let frame = encode_changeset(PeerId::random(), txn.changes());
    txn.rollback().unwrap();

    let changeset = parse_changeset(&frame).unwrap();
    let mut txn = dst.begin_write().unwrap();
    let err = apply_changeset(&mut txn, &changeset).unwrap_err();
    assert!(matches!(err, Error::BadTransactionLog(_)));
    txn.rollback().unwrap();

    assert_eq!(dst.current_version(), 1);
    assert_eq!(dst.begin_read().unwrap().object_count("city").unwrap(), 0);
}

#[test]
fn test_corrupt_frame_never_reaches_apply() {
    let src = Store::open(StoreConfig::in_memory().with_history()).unwrap();
    let mut txn = src.begin_write().unwrap();
    txn.create_table("city").unwrap();
    let mut frame = encode_changeset(PeerId::random(), txn.changes());
    txn.rollback().unwrap();

    let last = frame.len() - 1;
    frame[last] ^= 0x01;
    assert!(matches!(
        parse_changeset(&frame),
        Err(Error::BadChangesetFormat(_))
    ));
}

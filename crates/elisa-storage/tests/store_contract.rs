//! Store contract tests run against every bundled driver.

use elisa_storage::{DriverRegistry, Record, ScanRange, Store, StoreConfig, StoreError};
use std::sync::Arc;

fn open_all(dir: &std::path::Path) -> Vec<(String, Arc<dyn Store>)> {
    let registry = DriverRegistry::with_defaults();
    let config = StoreConfig::at(dir);
    registry
        .names()
        .into_iter()
        .map(|name| {
            let store = registry
                .open(&name, "contract/items", &config)
                .unwrap_or_else(|e| panic!("driver {} failed to open: {}", name, e));
            (name, store)
        })
        .collect()
}

fn scan_ids(store: &dyn Store, range: ScanRange) -> Vec<String> {
    store
        .scan(range)
        .expect("scan should start")
        .map(|item| item.expect("scan item").0)
        .collect()
}

#[test]
fn test_put_then_get_returns_record() {
    let temp_dir = tempfile::tempdir().expect("tempdir should be created");
    for (name, store) in open_all(temp_dir.path()) {
        store.put("k", Record::from("v1")).unwrap();
        store.put("k", Record::from("v2")).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(Record::from("v2")), "{}", name);
        assert_eq!(store.len().unwrap(), 1, "{}", name);
    }
}

#[test]
fn test_delete_then_get_is_absent() {
    let temp_dir = tempfile::tempdir().expect("tempdir should be created");
    for (name, store) in open_all(temp_dir.path()) {
        store.put("k", Record::from("v")).unwrap();
        assert!(store.delete("k").unwrap(), "{}", name);
        assert_eq!(store.get("k").unwrap(), None, "{}", name);
        assert!(!store.delete("k").unwrap(), "{}", name);
    }
}

#[test]
fn test_scan_visits_each_id_once_in_order() {
    let temp_dir = tempfile::tempdir().expect("tempdir should be created");
    for (name, store) in open_all(temp_dir.path()) {
        for id in ["doc-3", "doc-1", "doc-2", "other"] {
            store.put(id, Record::from_slice(id.as_bytes())).unwrap();
        }

        assert_eq!(
            scan_ids(store.as_ref(), ScanRange::All),
            vec!["doc-1", "doc-2", "doc-3", "other"],
            "{}",
            name
        );
        assert_eq!(
            scan_ids(store.as_ref(), ScanRange::prefix("doc-")),
            vec!["doc-1", "doc-2", "doc-3"],
            "{}",
            name
        );
        assert_eq!(
            scan_ids(store.as_ref(), ScanRange::between("doc-2", "other")),
            vec!["doc-2", "doc-3"],
            "{}",
            name
        );
    }
}

#[test]
fn test_cursors_are_independent() {
    let temp_dir = tempfile::tempdir().expect("tempdir should be created");
    for (name, store) in open_all(temp_dir.path()) {
        store.put("a", Record::from("1")).unwrap();
        store.put("b", Record::from("2")).unwrap();

        let mut first = store.scan(ScanRange::All).unwrap();
        let mut second = store.scan(ScanRange::All).unwrap();
        assert_eq!(first.next().unwrap().unwrap().0, "a", "{}", name);
        assert_eq!(second.next().unwrap().unwrap().0, "a", "{}", name);
        assert_eq!(first.next().unwrap().unwrap().0, "b", "{}", name);
        assert!(first.next().is_none(), "{}", name);
        assert_eq!(second.next().unwrap().unwrap().0, "b", "{}", name);
    }
}

#[test]
fn test_closed_store_rejects_calls() {
    let temp_dir = tempfile::tempdir().expect("tempdir should be created");
    for (name, store) in open_all(temp_dir.path()) {
        store.close().unwrap();
        store.close().unwrap();

        assert!(store.is_closed(), "{}", name);
        assert!(matches!(store.get("a"), Err(StoreError::StoreClosed)), "{}", name);
        assert!(matches!(store.len(), Err(StoreError::StoreClosed)), "{}", name);
        assert!(
            matches!(store.put("a", Record::from("1")), Err(StoreError::StoreClosed)),
            "{}",
            name
        );
    }
}

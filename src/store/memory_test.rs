use super::*;

fn meta(pairs: &[(&str, &str)]) -> Metadata {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn test_put_get() {
    let store = MemStore::new("test-put-get");

    store
        .put("a/k1", b"hello", meta(&[("target", "t1")]))
        .unwrap();
    let object = store.get("a/k1").unwrap();
    assert_eq!(object.body, b"hello".to_vec());
    assert_eq!(object.metadata.get("target"), Some(&"t1".to_string()));

    // puts overwrite in place.
    store.put("a/k1", b"world", Metadata::new()).unwrap();
    let object = store.get("a/k1").unwrap();
    assert_eq!(object.body, b"world".to_vec());
    assert!(object.metadata.is_empty());

    assert!(matches!(store.get("a/k2"), Err(Error::KeyNotFound(_, _))));
}

#[test]
fn test_get_range() {
    let store = MemStore::new("test-get-range");
    store.put("a/k1", b"0123456789", Metadata::new()).unwrap();

    assert_eq!(store.get_range("a/k1", 0, 3).unwrap(), b"0123".to_vec());
    assert_eq!(store.get_range("a/k1", 4, 6).unwrap(), b"456".to_vec());
    assert_eq!(store.get_range("a/k1", 9, 9).unwrap(), b"9".to_vec());
    // over-long ranges clamp at the end of the object.
    assert_eq!(store.get_range("a/k1", 5, 100).unwrap(), b"56789".to_vec());

    assert!(store.get_range("a/k1", 10, 12).is_err());
    assert!(matches!(
        store.get_range("a/k2", 0, 1),
        Err(Error::KeyNotFound(_, _))
    ));
}

#[test]
fn test_list() {
    let store = MemStore::new("test-list");
    for key in &["b/2", "a/2", "a/10", "a/1", "c/1"] {
        store.put(key, b"", Metadata::new()).unwrap();
    }

    let keys: Vec<String> = store
        .list("a/")
        .unwrap()
        .map(|key| key.unwrap())
        .collect();
    // lexical, not numeric, order.
    assert_eq!(keys, vec!["a/1", "a/10", "a/2"]);

    let keys: Vec<String> = store.list("").unwrap().map(|key| key.unwrap()).collect();
    assert_eq!(keys.len(), 5);
    assert_eq!(store.list("d/").unwrap().count(), 0);
}

#[test]
fn test_delete() {
    let store = MemStore::new("test-delete");
    store.put("a/k1", b"x", Metadata::new()).unwrap();

    store.delete("a/k1").unwrap();
    assert!(store.get("a/k1").is_err());
    // deleting a missing key is quiet, like the real thing.
    store.delete("a/k1").unwrap();
}

#[test]
fn test_delete_batch() {
    let store = MemStore::new("test-delete-batch");
    let keys: Vec<String> = (0..100).map(|i| format!("a/{:03}", i)).collect();
    for key in keys.iter() {
        store.put(key, b"", Metadata::new()).unwrap();
    }

    store.delete_batch(&keys[..60]).unwrap();
    assert_eq!(store.len().unwrap(), 40);
    store.delete_batch(&keys[60..]).unwrap();
    assert!(store.is_empty().unwrap());

    let too_many: Vec<String> = (0..1001).map(|i| format!("a/{}", i)).collect();
    assert!(matches!(
        store.delete_batch(&too_many),
        Err(Error::InvalidInput(_, _))
    ));
}

#[test]
fn test_presign() {
    let store = MemStore::new("bucket");
    store.put("a/blobs/b1", b"x", Metadata::new()).unwrap();

    let url = store.presign_get("a/blobs/b1").unwrap();
    assert_eq!(url.scheme(), "memory");
    assert_eq!(url.host_str(), Some("bucket"));
    assert_eq!(url.path(), "/a/blobs/b1");
}

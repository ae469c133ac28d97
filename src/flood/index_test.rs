use std::sync::Arc;

use super::*;
use crate::store::memory::MemStore;

fn new_index() -> (Arc<MemStore>, KeyIndex) {
    let store = Arc::new(MemStore::new("test-index"));
    let handle: Arc<dyn Store> = Arc::clone(&store) as Arc<dyn Store>;
    let prefixes = Arc::new(Prefixes::new("acct").unwrap());
    let index = KeyIndex::new(handle, prefixes, 2);
    (store, index)
}

fn live_keys(store: &MemStore, lookup: &str) -> Vec<String> {
    store
        .list(&format!("acct/index/{}--", lookup))
        .unwrap()
        .map(|key| key.unwrap())
        .collect()
}

#[test]
fn test_put_get_delete() {
    let (store, index) = new_index();

    assert_eq!(index.get("event-1").unwrap(), None);

    index.put("event-1", "journal-a").unwrap();
    assert_eq!(index.get("event-1").unwrap(), Some("journal-a".to_string()));

    // overwrite appends a higher revision and erases the lower one.
    index.put("event-1", "journal-b").unwrap();
    assert_eq!(index.get("event-1").unwrap(), Some("journal-b".to_string()));
    let keys = live_keys(&store, "event-1");
    assert_eq!(keys.len(), 1);
    assert!(keys[0].ends_with("--0000000002"), "{}", keys[0]);

    index.delete("event-1").unwrap();
    assert_eq!(index.get("event-1").unwrap(), None);
    assert!(live_keys(&store, "event-1").is_empty());

    // deleting an absent key is a no-op.
    index.delete("event-1").unwrap();
}

#[test]
fn test_put_batch() {
    let (store, index) = new_index();

    let mut entries = BTreeMap::new();
    for i in 0..10 {
        entries.insert(format!("event-{}", i), "journal-a".to_string());
    }
    index.put_batch(&entries).unwrap();
    for i in 0..10 {
        let lookup = format!("event-{}", i);
        assert_eq!(index.get(&lookup).unwrap(), Some("journal-a".to_string()));
    }

    for (_, target) in entries.iter_mut() {
        *target = "journal-b".to_string();
    }
    index.put_batch(&entries).unwrap();
    for i in 0..10 {
        let lookup = format!("event-{}", i);
        assert_eq!(index.get(&lookup).unwrap(), Some("journal-b".to_string()));
        assert_eq!(live_keys(&store, &lookup).len(), 1);
    }
}

#[test]
fn test_lookup_isolation() {
    let (_store, index) = new_index();

    // one lookup key being a prefix of another must not mix entries.
    index.put("event", "journal-a").unwrap();
    index.put("event-longer", "journal-b").unwrap();
    assert_eq!(index.get("event").unwrap(), Some("journal-a".to_string()));
    assert_eq!(
        index.get("event-longer").unwrap(),
        Some("journal-b".to_string())
    );

    index.delete("event").unwrap();
    assert_eq!(index.get("event").unwrap(), None);
    assert_eq!(
        index.get("event-longer").unwrap(),
        Some("journal-b".to_string())
    );
}

use rand::{prelude::random, rngs::SmallRng, Rng, SeedableRng};

use super::*;
use crate::store::memory::MemStore;

fn seeded_store(name: &str, keys: &[String]) -> Arc<MemStore> {
    let store = Arc::new(MemStore::new(name));
    for key in keys.iter() {
        store.put(key, b"", Metadata::new()).unwrap();
    }
    store
}

#[test]
fn test_delete_keys() {
    let seed: u64 = random();
    println!("test_delete_keys {}", seed);
    let mut rng = SmallRng::seed_from_u64(seed);

    // enough keys for several batches per worker.
    let n = 2500 + rng.gen_range(0..500);
    let keys: Vec<String> = (0..n).map(|i| format!("pfx/{:06}", i)).collect();
    let store = seeded_store("test-delete-keys", &keys);
    let handle: Arc<dyn Store> = Arc::clone(&store) as Arc<dyn Store>;

    delete_keys(&handle, keys, 4).unwrap();
    assert!(store.is_empty().unwrap());

    // deleting nothing is a no-op.
    delete_keys(&handle, vec![], 4).unwrap();
}

#[test]
fn test_delete_keys_partial() {
    let keys: Vec<String> = (0..100).map(|i| format!("pfx/{:03}", i)).collect();
    let store = seeded_store("test-delete-partial", &keys);
    let handle: Arc<dyn Store> = Arc::clone(&store) as Arc<dyn Store>;

    delete_keys(&handle, keys[..50].to_vec(), 2).unwrap();
    assert_eq!(store.len().unwrap(), 50);
}

#[test]
fn test_concurrent_list() {
    let mut keys = vec![];
    for prefix in &["a", "b", "c"] {
        for i in 0..50 {
            keys.push(format!("{}/{:03}", prefix, i));
        }
    }
    keys.push("d/000".to_string());
    let store = seeded_store("test-concurrent-list", &keys);
    let handle: Arc<dyn Store> = Arc::clone(&store) as Arc<dyn Store>;

    let prefixes = vec!["a/".to_string(), "b/".to_string(), "c/".to_string()];
    let mut listed = concurrent_list(&handle, &prefixes, 4).unwrap();
    assert_eq!(listed.len(), 150);

    // unordered across prefixes, complete within each.
    listed.sort();
    let mut want: Vec<String> = keys
        .iter()
        .filter(|key| !key.starts_with("d/"))
        .cloned()
        .collect();
    want.sort();
    assert_eq!(listed, want);

    assert!(concurrent_list(&handle, &[], 4).unwrap().is_empty());
}

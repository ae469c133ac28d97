//! Module `store` define the seam between the journaling engine and the
//! blob store.
//!
//! The engine talks to the store exclusively through the [Store] trait,
//! a thin facade over an S3-like key-value service: put with user
//! metadata, get, ranged get, lexically ordered prefix listing, delete,
//! bounded batch-delete and presigned GET URLs. [memory::MemStore]
//! implements the trait in process and is what the test suites run
//! against.
//!
//! Bulk helpers [delete_keys] and [concurrent_list] fan their work out
//! on a bounded [thread::Pool].

use url::Url;

use std::{collections::BTreeMap, mem, sync::mpsc, sync::Arc};

use crate::{util::thread, Result};

pub mod memory;

/// Maximum number of keys a single batch-delete call may carry.
pub const BATCH_DELETE_MAX: usize = 1000;

// channel buffer for bulk-helper pools.
const BULK_CHAN: usize = 16;

/// User metadata attached to a store object.
pub type Metadata = BTreeMap<String, String>;

/// A stored object, body and user metadata together.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Object {
    pub body: Vec<u8>,
    pub metadata: Metadata,
}

/// Blob-store facade.
///
/// Implementations shall report a missing object as [Error::KeyNotFound],
/// distinct from transport failures, and shall list keys in lexical
/// order. Retries, if any, are the implementation's business.
pub trait Store: Send + Sync {
    /// Store `body` under `key` along with user `metadata`, overwriting
    /// any existing object.
    fn put(&self, key: &str, body: &[u8], metadata: Metadata) -> Result<()>;

    /// Fetch the object under `key`, body and metadata.
    fn get(&self, key: &str) -> Result<Object>;

    /// Fetch bytes `lo..=hi` of the object under `key`. Ranges reaching
    /// past the end of the object are clamped, the way S3 clamps
    /// `bytes=lo-hi`.
    fn get_range(&self, key: &str, lo: u64, hi: u64) -> Result<Vec<u8>>;

    /// Iterate keys starting with `prefix`, in lexical order.
    fn list(&self, prefix: &str) -> Result<Box<dyn Iterator<Item = Result<String>> + Send>>;

    /// Delete the object under `key`. Deleting a missing key is not an
    /// error.
    fn delete(&self, key: &str) -> Result<()>;

    /// Delete up to [BATCH_DELETE_MAX] keys in one call.
    fn delete_batch(&self, keys: &[String]) -> Result<()>;

    /// Return a presigned GET URL for the object under `key`. The URL
    /// shall honor HTTP byte-range requests.
    fn presign_get(&self, key: &str) -> Result<Url>;
}

/// Delete `keys` in batches of [BATCH_DELETE_MAX], fanning the batches
/// out over `workers` threads.
pub fn delete_keys(store: &Arc<dyn Store>, keys: Vec<String>, workers: usize) -> Result<()> {
    if keys.is_empty() {
        return Ok(());
    }

    let mut pool = thread::Pool::new_sync("store-deleter", BULK_CHAN);
    pool.set_pool_size(workers.max(1));
    {
        let store = Arc::clone(store);
        pool.spawn(move |rx: thread::Rx<Vec<String>, ()>| {
            let store = Arc::clone(&store);
            move || delete_loop(store, rx)
        });
    }

    for chunk in keys.chunks(BATCH_DELETE_MAX) {
        pool.post(chunk.to_vec())?;
    }
    for res in pool.close_wait()? {
        res?
    }
    Ok(())
}

fn delete_loop(store: Arc<dyn Store>, rx: thread::Rx<Vec<String>, ()>) -> Result<()> {
    let mut res = Ok(());
    while let Ok((keys, _tx)) = rx.recv() {
        if let Err(err) = store.delete_batch(&keys) {
            res = Err(err)
        }
    }
    res
}

/// Concurrently list objects for each prefix in `prefixes`, over
/// `workers` threads. Lexical ordering across prefixes is lost.
pub fn concurrent_list(
    store: &Arc<dyn Store>,
    prefixes: &[String],
    workers: usize,
) -> Result<Vec<String>> {
    if prefixes.is_empty() {
        return Ok(vec![]);
    }

    let mut pool = thread::Pool::new_sync("store-lister", BULK_CHAN);
    pool.set_pool_size(workers.min(prefixes.len()).max(1));
    {
        let store = Arc::clone(store);
        pool.spawn(move |rx: thread::Rx<String, Result<Vec<String>>>| {
            let store = Arc::clone(&store);
            move || list_loop(store, rx)
        });
    }

    let (tx, rx) = mpsc::channel();
    for prefix in prefixes.iter() {
        pool.request_tx(prefix.clone(), tx.clone())?;
    }
    mem::drop(tx);

    let mut keys = vec![];
    while let Ok(res) = rx.recv() {
        keys.extend(res?);
    }
    pool.close_wait()?;

    Ok(keys)
}

fn list_loop(store: Arc<dyn Store>, rx: thread::Rx<String, Result<Vec<String>>>) {
    while let Ok((prefix, tx)) = rx.recv() {
        let res = list_prefix(&store, &prefix);
        if let Some(tx) = tx {
            tx.send(res).ok();
        }
    }
}

fn list_prefix(store: &Arc<dyn Store>, prefix: &str) -> Result<Vec<String>> {
    let mut keys = vec![];
    for key in store.list(prefix)? {
        keys.push(key?)
    }
    Ok(keys)
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;

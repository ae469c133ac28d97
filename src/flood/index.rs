//! Secondary index locating an event's current journal, built entirely
//! out of empty store objects.
//!
//! An entry for lookup key `L` is a chain of objects `L--<rev>` where
//! `rev` is a zero-padded ten digit revision and the target sits in
//! user metadata. Overwrites append a higher revision and erase the
//! lower ones, instead of overwriting in place, so readers are never
//! exposed to the store's overwrite eventual-consistency. Readers pick
//! the lexically last revision.
//!
//! A single writer per lookup key is assumed. Two concurrent puts can
//! mint the same revision number, after which the entry's value is
//! undefined.

use std::{collections::BTreeMap, sync::Arc};

use crate::{
    flood::{id::DELIMITER, Prefixes},
    store::{self, Metadata, Store},
    Error, Result,
};

// metadata key carrying the indexed value.
const TARGET: &str = "target";

pub struct KeyIndex {
    store: Arc<dyn Store>,
    prefixes: Arc<Prefixes>,
    workers: usize,
}

impl KeyIndex {
    pub fn new(store: Arc<dyn Store>, prefixes: Arc<Prefixes>, workers: usize) -> KeyIndex {
        KeyIndex {
            store,
            prefixes,
            workers,
        }
    }

    /// Point `lookup` at `target`, erasing older revisions.
    pub fn put(&self, lookup: &str, target: &str) -> Result<()> {
        let stale = self.write_revision(lookup, target)?;
        store::delete_keys(&self.store, stale, self.workers)
    }

    /// Point each lookup key at its target, deferring all erasures into
    /// one batched delete.
    pub fn put_batch(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let mut stale = vec![];
        for (lookup, target) in entries.iter() {
            stale.extend(self.write_revision(lookup, target)?);
        }
        store::delete_keys(&self.store, stale, self.workers)
    }

    /// Return the current target for `lookup`, if any.
    pub fn get(&self, lookup: &str) -> Result<Option<String>> {
        let keys = self.lookup_keys(lookup)?;
        match keys.last() {
            Some(key) => {
                let object = self.store.get(key)?;
                match object.metadata.get(TARGET) {
                    Some(target) => Ok(Some(target.clone())),
                    None => err_at!(Fatal, msg: "index entry {} has no target", key),
                }
            }
            None => Ok(None),
        }
    }

    /// Drop every revision recorded for `lookup`.
    pub fn delete(&self, lookup: &str) -> Result<()> {
        let keys = self.lookup_keys(lookup)?;
        store::delete_keys(&self.store, keys, self.workers)
    }

    // Write the next revision for `lookup` and return the keys it
    // supersedes.
    fn write_revision(&self, lookup: &str, target: &str) -> Result<Vec<String>> {
        let keys = self.lookup_keys(lookup)?;
        let revision = match keys.last() {
            Some(key) => revision_number(key)? + 1,
            None => 1,
        };
        let key = format!("{}{:010}", self.key_prefix(lookup), revision);

        let mut metadata = Metadata::new();
        metadata.insert(TARGET.to_string(), target.to_string());
        self.store.put(&key, b"", metadata)?;

        Ok(keys)
    }

    fn lookup_keys(&self, lookup: &str) -> Result<Vec<String>> {
        let mut keys = vec![];
        for key in self.store.list(&self.key_prefix(lookup))? {
            keys.push(key?)
        }
        Ok(keys)
    }

    fn key_prefix(&self, lookup: &str) -> String {
        format!("{}/{}{}", self.prefixes.index, lookup, DELIMITER)
    }
}

fn revision_number(key: &str) -> Result<u64> {
    match key.rsplitn(2, DELIMITER).next() {
        Some(rev) => err_at!(FailConvert, rev.parse::<u64>(), "revision in {}", key),
        None => err_at!(Fatal, msg: "no revision in {}", key),
    }
}

#[cfg(test)]
#[path = "index_test.rs"]
mod index_test;

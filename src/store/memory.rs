//! In-process [Store] implementation, primarily for tests and local
//! experiments.

use url::Url;

use std::{
    collections::BTreeMap,
    convert::TryFrom,
    sync::RwLock,
};

use crate::{
    store::{Metadata, Object, Store, BATCH_DELETE_MAX},
    Error, Result,
};

/// Blob store held entirely in memory, behind a reader-writer lock.
///
/// Keys list in lexical order and ranged gets clamp like S3, so the
/// engine behaves the same here as against a real bucket. Presigned
/// URLs use the `memory://<name>/<key>` scheme.
pub struct MemStore {
    name: String,
    objects: RwLock<BTreeMap<String, Object>>,
}

impl MemStore {
    pub fn new(name: &str) -> MemStore {
        MemStore {
            name: name.to_string(),
            objects: RwLock::new(BTreeMap::new()),
        }
    }

    /// Return the number of live objects in the store.
    pub fn len(&self) -> Result<usize> {
        Ok(err_at!(Fatal, self.objects.read())?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl Store for MemStore {
    fn put(&self, key: &str, body: &[u8], metadata: Metadata) -> Result<()> {
        let object = Object {
            body: body.to_vec(),
            metadata,
        };
        err_at!(Fatal, self.objects.write())?.insert(key.to_string(), object);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Object> {
        match err_at!(Fatal, self.objects.read())?.get(key) {
            Some(object) => Ok(object.clone()),
            None => err_at!(KeyNotFound, msg: "{}", key),
        }
    }

    fn get_range(&self, key: &str, lo: u64, hi: u64) -> Result<Vec<u8>> {
        let objects = err_at!(Fatal, self.objects.read())?;
        let body = match objects.get(key) {
            Some(object) => &object.body,
            None => return err_at!(KeyNotFound, msg: "{}", key),
        };
        let lo = err_at!(FailConvert, usize::try_from(lo))?;
        let hi = err_at!(FailConvert, usize::try_from(hi))?;
        if lo >= body.len() || hi < lo {
            return err_at!(InvalidInput, msg: "range {}-{} of {} bytes", lo, hi, body.len());
        }
        let hi = hi.min(body.len() - 1);
        Ok(body[lo..=hi].to_vec())
    }

    fn list(&self, prefix: &str) -> Result<Box<dyn Iterator<Item = Result<String>> + Send>> {
        let keys: Vec<String> = err_at!(Fatal, self.objects.read())?
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();
        Ok(Box::new(keys.into_iter().map(Ok)))
    }

    fn delete(&self, key: &str) -> Result<()> {
        err_at!(Fatal, self.objects.write())?.remove(key);
        Ok(())
    }

    fn delete_batch(&self, keys: &[String]) -> Result<()> {
        if keys.len() > BATCH_DELETE_MAX {
            return err_at!(InvalidInput, msg: "batch of {} keys", keys.len());
        }
        let mut objects = err_at!(Fatal, self.objects.write())?;
        for key in keys.iter() {
            objects.remove(key);
        }
        Ok(())
    }

    fn presign_get(&self, key: &str) -> Result<Url> {
        let url = format!("memory://{}/{}", self.name, key);
        err_at!(FailConvert, Url::parse(&url))
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod memory_test;

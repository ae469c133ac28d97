//! Module implement the journaling engine.
//!
//! The engine is driven through the [FlashFlood] type, created from a
//! [Store] handle and a [Config] value. All objects live under the
//! configured root prefix:
//!
//! ```text
//! root/journals/<journal_id>        manifest (JSON)
//! root/journals/<journal_id>.dead   tombstone
//! root/blobs/<blob_id>              event bytes, concatenated
//! root/update/<update_id>           UPDATE/DELETE marker
//! root/index/<event_id>--<rev>      secondary index entry
//! ```
//!
//! Mutation never overwrites a live key. A journal rewrite uploads a
//! fresh journal id and tombstones the old one; an index overwrite
//! appends a higher revision and erases the lower ones. Listing hides
//! tombstoned keys and stale versions, so readers only ever observe
//! live journals.

use std::sync::Arc;

use crate::{
    store::{Metadata, Store},
    Error, Result,
};

pub mod dates;
pub mod flood;
pub mod id;
pub mod index;
pub mod journal;
pub mod stream;
pub mod update;

pub use crate::flood::flood::FlashFlood;
pub use crate::flood::journal::{Event, EventRecord, Journal, Manifest};
pub use crate::flood::stream::{replay_event_stream, EventStream, Fetch, HttpFetch};
pub use crate::flood::update::JournalUpdate;

/// Default number of worker threads used for store fan-out.
pub const POOL_SIZE: usize = 10;

/// Default event-count threshold for [FlashFlood::journal].
pub const JOURNAL_MIN_EVENTS: usize = 100;

/// Default budget for [FlashFlood::update].
pub const UPDATE_BATCH: usize = 1000;

/// Configuration for [FlashFlood] instances.
#[derive(Clone, Debug)]
pub struct Config {
    /// Prefix under which all of the engine's objects are stored. Must
    /// not end with `/`.
    pub root_prefix: String,
    /// Size of the bounded worker pool used for store fan-out.
    pub pool_size: usize,
}

impl Config {
    pub fn new(root_prefix: &str) -> Config {
        Config {
            root_prefix: root_prefix.to_string(),
            pool_size: POOL_SIZE,
        }
    }

    pub fn set_pool_size(&mut self, pool_size: usize) -> &mut Self {
        self.pool_size = pool_size;
        self
    }
}

// Prefix layout under the root, shared by every value type the engine
// hands out.
pub(crate) struct Prefixes {
    pub journals: String,
    pub blobs: String,
    pub update: String,
    pub index: String,
}

impl Prefixes {
    pub(crate) fn new(root_prefix: &str) -> Result<Prefixes> {
        if root_prefix.ends_with('/') {
            return err_at!(InvalidInput, msg: "root prefix {:?} ends with `/`", root_prefix);
        }
        Ok(Prefixes {
            journals: format!("{}/journals", root_prefix),
            blobs: format!("{}/blobs", root_prefix),
            update: format!("{}/update", root_prefix),
            index: format!("{}/index", root_prefix),
        })
    }
}

// Mark `key` logically deleted by writing its tombstone sibling. The
// live object must still be listed under `key`.
pub(crate) fn tombstone(store: &Arc<dyn Store>, key: &str) -> Result<()> {
    match store.list(key)?.next() {
        Some(item) => {
            item?;
        }
        None => return err_at!(KeyNotFound, msg: "cannot tombstone missing {}", key),
    }
    let dead = format!("{}{}", key, id::TOMBSTONE_SUFFIX);
    store.put(&dead, b"", Metadata::new())
}

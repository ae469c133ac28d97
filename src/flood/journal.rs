//! The unit of persistence: an ordered, immutable list of event records
//! plus one contiguous data blob.

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::{
    convert::TryFrom,
    io::{self, Read},
    sync::Arc,
};

use crate::{
    flood::{
        dates,
        id::{self, JournalId, UpdateAction},
        update::UpdateMap,
        Prefixes,
    },
    store::{Metadata, Store},
    util, Error, Result,
};

/// A single event, as seen by producers and consumers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Event {
    pub event_id: String,
    pub date: DateTime<Utc>,
    pub data: Vec<u8>,
}

/// One event's entry within a journal manifest.
///
/// Offsets are contiguous, `events[i+1].offset` is always
/// `events[i].offset + events[i].size`, so the journal blob is exactly
/// the concatenation of its event bytes.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct EventRecord {
    pub event_id: String,
    pub timestamp: String,
    pub offset: u64,
    pub size: u64,
}

/// Manifest document stored against each journal, as JSON.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Manifest {
    pub journal_id: String,
    pub from_date: String,
    pub to_date: String,
    pub size: u64,
    pub events: Vec<EventRecord>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Location {
    Memory,
    Cloud,
}

/// An ordered batch of events in one contiguous blob.
///
/// Journals are immutable once uploaded. Deriving a journal through
/// [Journal::updated] produces a fresh blob id and a fresh
/// formation-timestamp version; the old journal is left for the caller
/// to tombstone.
pub struct Journal {
    store: Arc<dyn Store>,
    prefixes: Arc<Prefixes>,
    pub(crate) events: Vec<EventRecord>,
    data: Vec<u8>,
    blob_id: String,
    version: String,
    location: Location,
    body: Option<io::Cursor<Vec<u8>>>,
}

impl Journal {
    /// Start a fresh empty journal held in memory.
    pub fn new(store: Arc<dyn Store>, prefixes: Arc<Prefixes>) -> Journal {
        Journal::with_events(store, prefixes, vec![], vec![])
    }

    /// Build an in-memory journal from `events` and their concatenated
    /// bytes.
    pub fn with_events(
        store: Arc<dyn Store>,
        prefixes: Arc<Prefixes>,
        events: Vec<EventRecord>,
        data: Vec<u8>,
    ) -> Journal {
        Journal {
            store,
            prefixes,
            events,
            data,
            blob_id: Uuid::new_v4().to_string(),
            version: dates::timestamp_now(),
            location: Location::Memory,
            body: None,
        }
    }

    pub(crate) fn set_version(&mut self, version: &str) -> &mut Self {
        self.version = version.to_string();
        self
    }

    /// Load a journal from its manifest key. The body stays in the
    /// store until read.
    pub fn from_key(store: Arc<dyn Store>, prefixes: Arc<Prefixes>, key: &str) -> Result<Journal> {
        let journal_id = JournalId::from_key(key)?;
        let object = store.get(key)?;
        let manifest: Manifest = util::from_json_bytes(&object.body)?;
        Ok(Journal {
            store,
            prefixes,
            events: manifest.events,
            data: vec![],
            blob_id: journal_id.blob_id().to_string(),
            version: journal_id.version().to_string(),
            location: Location::Cloud,
            body: None,
        })
    }

    /// Load a journal from its id.
    pub fn from_id(
        store: Arc<dyn Store>,
        prefixes: Arc<Prefixes>,
        journal_id: &JournalId,
    ) -> Result<Journal> {
        let key = format!("{}/{}", prefixes.journals, journal_id);
        Journal::from_key(store, prefixes, &key)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Identifier computed from the first/last event timestamps, the
    /// version and the blob id. An empty journal has no id.
    pub fn id(&self) -> Result<JournalId> {
        match (self.events.first(), self.events.last()) {
            (Some(first), Some(last)) => Ok(JournalId::make(
                &first.timestamp,
                &last.timestamp,
                &self.version,
                &self.blob_id,
            )),
            _ => err_at!(Fatal, msg: "no id for an empty journal"),
        }
    }

    pub fn size(&self) -> Result<u64> {
        match self.location {
            Location::Memory => err_at!(FailConvert, u64::try_from(self.data.len())),
            Location::Cloud => Ok(self.events.iter().map(|e| e.size).sum()),
        }
    }

    pub fn manifest(&self) -> Result<Manifest> {
        let journal_id = self.id()?.to_string();
        let (first, last) = match (self.events.first(), self.events.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => unreachable!(), // id() refused already
        };
        Ok(Manifest {
            journal_id,
            from_date: first.timestamp.clone(),
            to_date: last.timestamp.clone(),
            size: self.size()?,
            events: self.events.clone(),
        })
    }

    /// Drop the read cursor so the body reads from the start again.
    pub fn reload(&mut self) {
        self.body = None
    }

    /// Read the next `n` bytes of the journal body. The body comes from
    /// the in-memory buffer for local journals and from a store get for
    /// uploaded ones; a cursor advances across calls.
    pub(crate) fn body_read(&mut self, n: usize) -> Result<Vec<u8>> {
        self.fill_body()?;
        let cursor = match self.body.as_mut() {
            Some(cursor) => cursor,
            None => unreachable!(),
        };
        let mut buf = vec![0; n];
        err_at!(Fatal, cursor.read_exact(&mut buf), "short body in {}", self.blob_id)?;
        Ok(buf)
    }

    /// Read the remainder of the journal body.
    pub(crate) fn body_read_all(&mut self) -> Result<Vec<u8>> {
        self.fill_body()?;
        let cursor = match self.body.as_mut() {
            Some(cursor) => cursor,
            None => unreachable!(),
        };
        let mut buf = vec![];
        err_at!(Fatal, cursor.read_to_end(&mut buf))?;
        Ok(buf)
    }

    fn fill_body(&mut self) -> Result<()> {
        if self.body.is_none() {
            let buf = match self.location {
                Location::Memory => self.data.clone(),
                Location::Cloud => self.store.get(&self.blob_key())?.body,
            };
            self.body = Some(io::Cursor::new(buf));
        }
        Ok(())
    }

    /// Fetch a single event out of this journal with a ranged get
    /// against the blob.
    pub fn get_event(&self, event_id: &str) -> Result<Event> {
        for e in self.events.iter() {
            if e.event_id == event_id {
                let date = dates::from_timestamp(&e.timestamp)?;
                let data = match e.size {
                    0 => vec![],
                    size => {
                        let (lo, hi) = (e.offset, e.offset + size - 1);
                        self.store.get_range(&self.blob_key(), lo, hi)?
                    }
                };
                return Ok(Event {
                    event_id: event_id.to_string(),
                    date,
                    data,
                });
            }
        }
        err_at!(EventNotFound, msg: "event {} not in journal {}", event_id, self.id()?)
    }

    /// Derive a new journal with `updates` applied: events with an
    /// UPDATE marker take the marker's bytes, events with a DELETE
    /// marker are dropped, offsets are recomputed contiguously. Callers
    /// shall skip the call when `updates` is empty.
    pub fn updated(&mut self, updates: &UpdateMap) -> Result<Journal> {
        self.reload();
        let mut new_events: Vec<EventRecord> = vec![];
        let mut new_data: Vec<u8> = vec![];
        for e in self.events.clone().into_iter() {
            let size = err_at!(FailConvert, usize::try_from(e.size))?;
            let event_data = self.body_read(size)?;
            let offset = err_at!(FailConvert, u64::try_from(new_data.len()))?;
            match updates.get(&e.event_id) {
                None => {
                    new_data.extend_from_slice(&event_data);
                    new_events.push(EventRecord { offset, ..e });
                }
                Some(update) => match update.action()? {
                    UpdateAction::Update => {
                        let data = update.data()?;
                        let size = err_at!(FailConvert, u64::try_from(data.len()))?;
                        new_data.extend_from_slice(&data);
                        new_events.push(EventRecord { offset, size, ..e });
                    }
                    UpdateAction::Delete => (),
                },
            }
        }
        Ok(Journal::with_events(
            Arc::clone(&self.store),
            Arc::clone(&self.prefixes),
            new_events,
            new_data,
        ))
    }

    /// Append a block of events and their bytes, rebasing offsets onto
    /// the current end of the journal.
    pub(crate) fn append(&mut self, events: Vec<EventRecord>, data: Vec<u8>) -> Result<()> {
        let base = err_at!(FailConvert, u64::try_from(self.data.len()))?;
        for e in events.into_iter() {
            let offset = base + e.offset;
            self.events.push(EventRecord { offset, ..e });
        }
        self.data.extend_from_slice(&data);
        Ok(())
    }

    /// Upload blob and manifest, in that order. Discovery is
    /// manifest-driven, so a crash in between leaves only an orphan
    /// blob. Returns the manifest key.
    pub fn upload(&mut self) -> Result<String> {
        if self.is_empty() {
            return err_at!(JournalUploadError, msg: "journal with no events");
        }
        let manifest = self.manifest()?;
        let body = self.body_read_all()?;

        let mut blob_meta = Metadata::new();
        blob_meta.insert("journal_id".to_string(), manifest.journal_id.clone());
        self.store.put(&self.blob_key(), &body, blob_meta)?;

        let key = format!("{}/{}", self.prefixes.journals, manifest.journal_id);
        let mut meta = Metadata::new();
        meta.insert("number_of_events".to_string(), self.events.len().to_string());
        meta.insert("journal_data_size".to_string(), self.data.len().to_string());
        self.store.put(&key, &util::into_json_bytes(&manifest)?, meta)?;

        self.reload(); // make the body readable again
        debug!(target: "flashflood", "uploaded journal {}", manifest.journal_id);
        Ok(key)
    }

    /// Tombstone this journal's manifest. Refuses when no live object
    /// is listed under the manifest key.
    pub fn delete(&self) -> Result<()> {
        let key = format!("{}/{}", self.prefixes.journals, self.id()?);
        crate::flood::tombstone(&self.store, &key)
    }

    fn blob_key(&self) -> String {
        format!("{}/{}", self.prefixes.blobs, self.blob_id)
    }

    /// List live journals: for every `range_prefix` group of the
    /// lexical manifest listing, the greatest version that has not been
    /// tombstoned.
    pub fn list(store: &Arc<dyn Store>, prefixes: &Arc<Prefixes>) -> Result<Lister> {
        let keys = store.list(&format!("{}/", prefixes.journals))?;
        Ok(Lister {
            keys,
            range_prefix: String::default(),
            candidates: vec![],
            done: false,
        })
    }
}

/// Lazy iterator over live journal ids, in lexical (= chronological)
/// order of their range prefix.
pub struct Lister {
    keys: Box<dyn Iterator<Item = Result<String>> + Send>,
    range_prefix: String,
    candidates: Vec<JournalId>,
    done: bool,
}

impl Iterator for Lister {
    type Item = Result<JournalId>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.keys.next() {
                Some(Ok(key)) => {
                    let live = id::strip_tombstone(&key);
                    let journal_id = match JournalId::from_key(live) {
                        Ok(journal_id) => journal_id,
                        Err(err) => {
                            self.done = true;
                            return Some(Err(err));
                        }
                    };
                    if journal_id.range_prefix() != self.range_prefix {
                        // a new group starts; flush the previous one.
                        let out = self.candidates.pop();
                        self.candidates.clear();
                        self.range_prefix = journal_id.range_prefix().to_string();
                        if !id::is_tombstone(&key) {
                            self.candidates.push(journal_id);
                        }
                        if let Some(out) = out {
                            return Some(Ok(out));
                        }
                    } else if id::is_tombstone(&key) {
                        // tombstones immediately follow their live key.
                        self.candidates.retain(|c| c != &journal_id);
                    } else {
                        self.candidates.push(journal_id);
                    }
                }
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(err));
                }
                None => {
                    self.done = true;
                    return self.candidates.pop().map(Ok);
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "journal_test.rs"]
mod journal_test;

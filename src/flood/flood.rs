//! The journaling engine, orchestrating puts, lookups, compaction,
//! mutation markers and replay on top of the prefix layout.

use chrono::{DateTime, Utc};
use log::{debug, info};
use uuid::Uuid;

use std::{collections::BTreeMap, convert::TryFrom, mem, sync::mpsc, sync::Arc};

use crate::{
    flood::{
        dates::{self, DateRange},
        id::{self, JournalId},
        index::KeyIndex,
        journal::{Event, EventRecord, Journal, Lister},
        stream::EventStream,
        tombstone,
        update::JournalUpdate,
        Config, Prefixes,
    },
    store::{self, Store},
    util::thread,
    Error, Result,
};

// channel buffer for the combine pool.
const COMBINE_CHAN: usize = 16;

/// Append-mostly event journal over a blob store.
///
/// Mutating operations assume a single concurrent writer; readers can
/// run concurrently with each other and with that writer. Refer to the
/// crate documentation for the storage layout.
pub struct FlashFlood {
    store: Arc<dyn Store>,
    config: Config,
    prefixes: Arc<Prefixes>,
    index: KeyIndex,
}

impl FlashFlood {
    pub fn new(store: Arc<dyn Store>, config: Config) -> Result<FlashFlood> {
        let prefixes = Arc::new(Prefixes::new(&config.root_prefix)?);
        let index = KeyIndex::new(
            Arc::clone(&store),
            Arc::clone(&prefixes),
            config.pool_size,
        );
        Ok(FlashFlood {
            store,
            config,
            prefixes,
            index,
        })
    }

    /// Append one event. `event_id` defaults to a fresh uuid, `date` to
    /// now. The event lands as a one-event journal carrying the `new`
    /// version and is indexed right away.
    pub fn put(
        &self,
        data: &[u8],
        event_id: Option<&str>,
        date: Option<DateTime<Utc>>,
    ) -> Result<Event> {
        let date = date.unwrap_or_else(Utc::now);
        let event_id = match event_id {
            Some(event_id) => event_id.to_string(),
            None => Uuid::new_v4().to_string(),
        };
        if event_id.contains(id::DELIMITER) {
            return err_at!(InvalidInput, msg: "{:?} not allowed in event id", id::DELIMITER);
        }
        if self.event_exists(&event_id)? {
            return err_at!(EventExists, msg: "event {} already exists", event_id);
        }

        let events = vec![EventRecord {
            event_id: event_id.clone(),
            timestamp: dates::to_timestamp(&date),
            offset: 0,
            size: err_at!(FailConvert, u64::try_from(data.len()))?,
        }];
        let mut journal = Journal::with_events(
            Arc::clone(&self.store),
            Arc::clone(&self.prefixes),
            events,
            data.to_vec(),
        );
        journal.set_version(id::NEW_VERSION);
        journal.upload()?;
        self.index_journal(&journal)?;
        debug!(target: "flashflood", "new journal {}", journal.id()?);

        Ok(Event {
            event_id,
            date,
            data: data.to_vec(),
        })
    }

    pub fn event_exists(&self, event_id: &str) -> Result<bool> {
        Ok(self.index.get(event_id)?.is_some())
    }

    /// Fetch one event through the index and a ranged blob get.
    pub fn get_event(&self, event_id: &str) -> Result<Event> {
        let journal_id = self.journal_for_event(event_id)?;
        let journal = Journal::from_id(
            Arc::clone(&self.store),
            Arc::clone(&self.prefixes),
            &journal_id,
        )?;
        journal.get_event(event_id)
    }

    /// Record an UPDATE marker for an existing event. Replay and
    /// lookups keep returning the old bytes until [FlashFlood::update]
    /// applies the marker.
    pub fn update_event(&self, event_id: &str, new_data: &[u8]) -> Result<()> {
        if !self.event_exists(event_id)? {
            return err_at!(EventNotFound, msg: "event {} not found", event_id);
        }
        let journal_id = self.journal_for_event(event_id)?;
        JournalUpdate::upload_update(
            &self.store,
            &self.prefixes,
            &journal_id,
            event_id,
            new_data.to_vec(),
        )?;
        Ok(())
    }

    /// Record a DELETE marker for an existing event and de-index it.
    /// The event stops resolving through lookups immediately but stays
    /// visible in replay until [FlashFlood::update] applies the marker.
    pub fn delete_event(&self, event_id: &str) -> Result<()> {
        let journal_id = self.journal_for_event(event_id)?;
        JournalUpdate::upload_delete(&self.store, &self.prefixes, &journal_id, event_id)?;
        self.index.delete(event_id)
    }

    /// Apply pending markers, journal by journal, rewriting each
    /// affected journal, until the running marker count reaches
    /// `number_of_updates_to_apply`. Returns the count applied.
    pub fn update(&self, number_of_updates_to_apply: usize) -> Result<usize> {
        let mut count = 0;
        for item in JournalUpdate::get_updates_for_all_journals(&self.store, &self.prefixes)? {
            let (journal_id, updates) = item?;
            info!(target: "flashflood", "updating journal {}", journal_id);

            let mut journal = Journal::from_id(
                Arc::clone(&self.store),
                Arc::clone(&self.prefixes),
                &journal_id,
            )?;
            let mut new_journal = journal.updated(&updates)?;
            if !new_journal.is_empty() {
                new_journal.upload()?;
                self.index_journal(&new_journal)?;
            }
            journal.delete()?;
            for (_, update) in updates.iter() {
                update.delete()?;
            }

            count += updates.len();
            if number_of_updates_to_apply <= count {
                break;
            }
        }
        Ok(count)
    }

    /// Merge `new` journals into one compacted journal, once at least
    /// `minimum_number_of_events` events spanning at least
    /// `minimum_size` bytes are visible. Fails with
    /// [Error::JournalingError], touching nothing, when the thresholds
    /// cannot be met.
    pub fn journal(&self, minimum_number_of_events: usize, minimum_size: u64) -> Result<()> {
        let (mut number_of_events, mut size) = (0_usize, 0_u64);
        let mut journals_to_combine = vec![];
        for journal_id in self.new_journals()? {
            let journal_id = journal_id?;
            let journal = Journal::from_id(
                Arc::clone(&self.store),
                Arc::clone(&self.prefixes),
                &journal_id,
            )?;
            size += journal.size()?;
            number_of_events += journal.events.len();
            journals_to_combine.push(journal);
            if minimum_number_of_events <= number_of_events && minimum_size <= size {
                break;
            }
        }
        if number_of_events < minimum_number_of_events {
            return err_at!(
                JournalingError, msg: "minimum_number_of_events={}", minimum_number_of_events
            );
        }
        if size < minimum_size {
            return err_at!(JournalingError, msg: "minimum_size={}", minimum_size);
        }
        self.combine_journals(journals_to_combine)
    }

    fn new_journals(&self) -> Result<impl Iterator<Item = Result<JournalId>>> {
        let iter = Journal::list(&self.store, &self.prefixes)?;
        Ok(iter.filter(|item| match item {
            Ok(journal_id) => journal_id.version() == id::NEW_VERSION,
            Err(_) => true,
        }))
    }

    /// Concatenate `journals`, in input order, into one freshly
    /// versioned journal. Pending markers of each source journal are
    /// applied on the way in; source journals and consumed markers are
    /// tombstoned once the combined journal is up.
    pub fn combine_journals(&self, journals: Vec<Journal>) -> Result<()> {
        if journals.is_empty() {
            return Ok(());
        }
        info!(target: "flashflood", "combining {} journals", journals.len());
        let prepared = self.prepare_combines(journals)?;

        let mut new_journal =
            Journal::new(Arc::clone(&self.store), Arc::clone(&self.prefixes));
        let mut source_keys = vec![];
        let mut markers = vec![];
        for prep in prepared.into_iter() {
            source_keys.push(format!("{}/{}", self.prefixes.journals, prep.journal_id));
            new_journal.append(prep.events, prep.data)?;
            markers.extend(prep.updates);
        }

        if !new_journal.is_empty() {
            new_journal.upload()?;
            self.index_journal(&new_journal)?;
        }
        for key in source_keys.iter() {
            tombstone(&self.store, key)?;
        }
        for update in markers.iter() {
            update.delete()?;
        }
        Ok(())
    }

    // Fan the per-journal reads (markers, derived events, body bytes)
    // out on the worker pool, then reassemble in input order.
    fn prepare_combines(&self, journals: Vec<Journal>) -> Result<Vec<Prepared>> {
        let n = journals.len();

        let mut pool = thread::Pool::new_sync("flashflood-combine", COMBINE_CHAN);
        pool.set_pool_size(self.config.pool_size.min(n).max(1));
        {
            let store = Arc::clone(&self.store);
            let prefixes = Arc::clone(&self.prefixes);
            pool.spawn(move |rx: thread::Rx<(usize, Journal), (usize, Result<Prepared>)>| {
                let (store, prefixes) = (Arc::clone(&store), Arc::clone(&prefixes));
                move || combine_loop(store, prefixes, rx)
            });
        }

        let (tx, rx) = mpsc::channel();
        for (pos, journal) in journals.into_iter().enumerate() {
            pool.request_tx((pos, journal), tx.clone())?;
        }
        mem::drop(tx);

        let mut prepared: Vec<Option<Prepared>> = (0..n).map(|_| None).collect();
        while let Ok((pos, res)) = rx.recv() {
            prepared[pos] = Some(res?);
        }
        pool.close_wait()?;

        let mut out = vec![];
        for (pos, item) in prepared.into_iter().enumerate() {
            match item {
                Some(prep) => out.push(prep),
                None => return err_at!(Fatal, msg: "combine dropped journal at {}", pos),
            }
        }
        Ok(out)
    }

    /// Replay events in `(from_date : to_date]`, in non-decreasing
    /// timestamp order across journals.
    pub fn replay(
        &self,
        from_date: Option<DateTime<Utc>>,
        to_date: Option<DateTime<Utc>>,
    ) -> Result<Replay> {
        let range = DateRange::new(from_date, to_date)?;
        let journals = self.list_journals(from_date, to_date)?;
        Ok(Replay {
            store: Arc::clone(&self.store),
            prefixes: Arc::clone(&self.prefixes),
            range,
            journals,
            current: None,
        })
    }

    /// Live journals whose date range intersects `(from_date : to_date]`.
    /// Scanning stops once a journal starts past `to_date`.
    pub fn list_journals(
        &self,
        from_date: Option<DateTime<Utc>>,
        to_date: Option<DateTime<Utc>>,
    ) -> Result<ListJournals> {
        let range = DateRange::new(from_date, to_date)?;
        Ok(ListJournals {
            journals: Journal::list(&self.store, &self.prefixes)?,
            range,
            done: false,
        })
    }

    /// Per listed journal, its manifest enriched with a presigned GET
    /// URL on the blob, for replay outside the engine.
    pub fn list_event_streams(
        &self,
        from_date: Option<DateTime<Utc>>,
        to_date: Option<DateTime<Utc>>,
    ) -> Result<ListEventStreams> {
        Ok(ListEventStreams {
            store: Arc::clone(&self.store),
            prefixes: Arc::clone(&self.prefixes),
            journals: self.list_journals(from_date, to_date)?,
        })
    }

    /// Delete every object under the root prefix and consume the
    /// engine.
    pub fn destroy(self) -> Result<()> {
        let prefixes = vec![
            format!("{}/", self.prefixes.journals),
            format!("{}/", self.prefixes.blobs),
            format!("{}/", self.prefixes.update),
            format!("{}/", self.prefixes.index),
        ];
        let keys = store::concurrent_list(&self.store, &prefixes, self.config.pool_size)?;
        store::delete_keys(&self.store, keys, self.config.pool_size)
    }

    fn index_journal(&self, journal: &Journal) -> Result<()> {
        let journal_id = journal.id()?.to_string();
        let entries: BTreeMap<String, String> = journal
            .events
            .iter()
            .map(|e| (e.event_id.clone(), journal_id.clone()))
            .collect();
        self.index.put_batch(&entries)
    }

    fn journal_for_event(&self, event_id: &str) -> Result<JournalId> {
        match self.index.get(event_id)? {
            Some(target) => JournalId::parse(&target),
            None => err_at!(EventNotFound, msg: "journal not found for {}", event_id),
        }
    }
}

struct Prepared {
    journal_id: JournalId,
    events: Vec<EventRecord>,
    data: Vec<u8>,
    updates: Vec<JournalUpdate>,
}

fn combine_loop(
    store: Arc<dyn Store>,
    prefixes: Arc<Prefixes>,
    rx: thread::Rx<(usize, Journal), (usize, Result<Prepared>)>,
) -> Result<()> {
    while let Ok(((pos, journal), tx)) = rx.recv() {
        let res = prepare_journal(&store, &prefixes, journal);
        if let Some(tx) = tx {
            tx.send((pos, res)).ok();
        }
    }
    Ok(())
}

fn prepare_journal(
    store: &Arc<dyn Store>,
    prefixes: &Arc<Prefixes>,
    mut journal: Journal,
) -> Result<Prepared> {
    let journal_id = journal.id()?;
    debug!(target: "flashflood", "combining journal {}", journal_id);
    let updates = JournalUpdate::get_updates_for_journal(store, prefixes, &journal_id)?;
    let (events, data) = match updates.len() {
        0 => (journal.events.clone(), journal.body_read_all()?),
        _ => {
            let mut derived = journal.updated(&updates)?;
            (derived.events.clone(), derived.body_read_all()?)
        }
    };
    Ok(Prepared {
        journal_id,
        events,
        data,
        updates: updates.into_iter().map(|(_, update)| update).collect(),
    })
}

/// Lazy iterator over live journals intersecting a date range.
pub struct ListJournals {
    journals: Lister,
    range: DateRange,
    done: bool,
}

impl Iterator for ListJournals {
    type Item = Result<JournalId>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.journals.next() {
                Some(Ok(journal_id)) => {
                    let journal_range = match journal_range(&journal_id) {
                        Ok(journal_range) => journal_range,
                        Err(err) => {
                            self.done = true;
                            return Some(Err(err));
                        }
                    };
                    if self.range.overlaps(&journal_range) {
                        return Some(Ok(journal_id));
                    } else if self.range.is_future(&journal_range.start) {
                        self.done = true;
                        return None;
                    }
                }
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(err));
                }
                None => {
                    self.done = true;
                    return None;
                }
            }
        }
    }
}

fn journal_range(journal_id: &JournalId) -> Result<DateRange> {
    DateRange::new(Some(journal_id.start_date()?), Some(journal_id.end_date()?))
}

struct ReplayJournal {
    journal: Journal,
    pos: usize,
}

/// Lazy, one-shot iterator over events in replay order.
pub struct Replay {
    store: Arc<dyn Store>,
    prefixes: Arc<Prefixes>,
    range: DateRange,
    journals: ListJournals,
    current: Option<ReplayJournal>,
}

impl Replay {
    // Next in-range event out of the current journal; None once the
    // journal is exhausted or past the range.
    fn next_from_current(&mut self) -> Option<Result<Event>> {
        let range = self.range;
        let rj = self.current.as_mut()?;
        while rj.pos < rj.journal.events.len() {
            let e = rj.journal.events[rj.pos].clone();
            rj.pos += 1;
            let date = match dates::from_timestamp(&e.timestamp) {
                Ok(date) => date,
                Err(err) => return Some(Err(err)),
            };
            let size = match usize::try_from(e.size) {
                Ok(size) => size,
                Err(err) => return Some(err_at!(FailConvert, Err(err))),
            };
            // bytes are consumed for every event so the cursor stays
            // aligned with the records.
            let data = match rj.journal.body_read(size) {
                Ok(data) => data,
                Err(err) => return Some(Err(err)),
            };
            if range.contains(&date) {
                return Some(Ok(Event {
                    event_id: e.event_id,
                    date,
                    data,
                }));
            } else if range.is_future(&date) {
                return None;
            }
        }
        None
    }
}

impl Iterator for Replay {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current.is_some() {
                match self.next_from_current() {
                    Some(item) => return Some(item),
                    None => self.current = None,
                }
            }
            match self.journals.next() {
                Some(Ok(journal_id)) => {
                    debug!(target: "flashflood", "replaying journal {}", journal_id);
                    let journal = match Journal::from_id(
                        Arc::clone(&self.store),
                        Arc::clone(&self.prefixes),
                        &journal_id,
                    ) {
                        Ok(journal) => journal,
                        Err(err) => return Some(Err(err)),
                    };
                    self.current = Some(ReplayJournal { journal, pos: 0 });
                }
                Some(Err(err)) => return Some(Err(err)),
                None => return None,
            }
        }
    }
}

/// Lazy iterator over event-stream documents, one per listed journal.
pub struct ListEventStreams {
    store: Arc<dyn Store>,
    prefixes: Arc<Prefixes>,
    journals: ListJournals,
}

impl Iterator for ListEventStreams {
    type Item = Result<EventStream>;

    fn next(&mut self) -> Option<Self::Item> {
        let journal_id = match self.journals.next()? {
            Ok(journal_id) => journal_id,
            Err(err) => return Some(Err(err)),
        };
        let journal = match Journal::from_id(
            Arc::clone(&self.store),
            Arc::clone(&self.prefixes),
            &journal_id,
        ) {
            Ok(journal) => journal,
            Err(err) => return Some(Err(err)),
        };
        let manifest = match journal.manifest() {
            Ok(manifest) => manifest,
            Err(err) => return Some(Err(err)),
        };
        let blob_key = format!("{}/{}", self.prefixes.blobs, journal_id.blob_id());
        let stream_url = match self.store.presign_get(&blob_key) {
            Ok(url) => url,
            Err(err) => return Some(Err(err)),
        };
        Some(Ok(EventStream {
            manifest,
            stream_url,
        }))
    }
}

#[cfg(test)]
#[path = "flood_test.rs"]
mod flood_test;

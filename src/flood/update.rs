//! UPDATE/DELETE markers recorded against individual events, applied
//! later by rewriting whole journals.

use std::{collections::BTreeMap, sync::Arc};

use crate::{
    flood::{
        id::{self, JournalId, JournalUpdateId, UpdateAction},
        Prefixes,
    },
    store::{Metadata, Store},
    Result,
};

/// Pending updates for one journal, keyed by event id.
///
/// When several markers exist for the same event, the last one in
/// lexical order, that is the latest created timestamp, wins. Callers
/// that need stricter semantics must serialize their updates.
pub type UpdateMap = BTreeMap<String, JournalUpdate>;

/// A recorded intent to update or delete one event of one journal.
pub struct JournalUpdate {
    store: Arc<dyn Store>,
    prefixes: Arc<Prefixes>,
    id: JournalUpdateId,
    data: Option<Vec<u8>>,
}

impl JournalUpdate {
    fn new(store: Arc<dyn Store>, prefixes: Arc<Prefixes>, id: JournalUpdateId) -> JournalUpdate {
        JournalUpdate {
            store,
            prefixes,
            id,
            data: None,
        }
    }

    /// Record an UPDATE marker carrying the event's new bytes.
    pub fn upload_update(
        store: &Arc<dyn Store>,
        prefixes: &Arc<Prefixes>,
        journal_id: &JournalId,
        event_id: &str,
        data: Vec<u8>,
    ) -> Result<JournalUpdate> {
        let id = JournalUpdateId::make(journal_id, event_id, UpdateAction::Update);
        let val = JournalUpdate {
            store: Arc::clone(store),
            prefixes: Arc::clone(prefixes),
            id,
            data: Some(data),
        };
        val.upload()?;
        Ok(val)
    }

    /// Record a DELETE marker with an empty body.
    pub fn upload_delete(
        store: &Arc<dyn Store>,
        prefixes: &Arc<Prefixes>,
        journal_id: &JournalId,
        event_id: &str,
    ) -> Result<JournalUpdate> {
        let id = JournalUpdateId::make(journal_id, event_id, UpdateAction::Delete);
        let val = JournalUpdate {
            store: Arc::clone(store),
            prefixes: Arc::clone(prefixes),
            id,
            data: Some(vec![]),
        };
        val.upload()?;
        Ok(val)
    }

    fn upload(&self) -> Result<()> {
        let body = match &self.data {
            Some(data) => data.as_slice(),
            None => &[],
        };
        self.store.put(&self.key(), body, Metadata::new())
    }

    pub fn id(&self) -> &JournalUpdateId {
        &self.id
    }

    pub fn journal_id(&self) -> Result<JournalId> {
        self.id.journal_id()
    }

    pub fn event_id(&self) -> Result<&str> {
        self.id.event_id()
    }

    pub fn action(&self) -> Result<UpdateAction> {
        self.id.action()
    }

    /// The marker's body, fetched from the store when this value came
    /// out of a listing.
    pub fn data(&self) -> Result<Vec<u8>> {
        match &self.data {
            Some(data) => Ok(data.clone()),
            None => Ok(self.store.get(&self.key())?.body),
        }
    }

    /// Tombstone this marker. Refuses when no live marker is listed.
    pub fn delete(&self) -> Result<()> {
        crate::flood::tombstone(&self.store, &self.key())
    }

    fn key(&self) -> String {
        format!("{}/{}", self.prefixes.update, self.id)
    }

    /// List marker ids under `id_prefix` (empty lists everything) in
    /// lexical order, skipping tombstoned markers.
    pub fn list(
        store: &Arc<dyn Store>,
        prefixes: &Arc<Prefixes>,
        id_prefix: &str,
    ) -> Result<ListUpdates> {
        let keys = store.list(&format!("{}/{}", prefixes.update, id_prefix))?;
        Ok(ListUpdates {
            keys,
            prev: None,
            done: false,
        })
    }

    /// Pending updates recorded against `journal_id`.
    pub fn get_updates_for_journal(
        store: &Arc<dyn Store>,
        prefixes: &Arc<Prefixes>,
        journal_id: &JournalId,
    ) -> Result<UpdateMap> {
        let id_prefix = JournalUpdateId::prefix_for_journal(journal_id);
        let mut updates = UpdateMap::new();
        for id in JournalUpdate::list(store, prefixes, &id_prefix)? {
            let update = JournalUpdate::new(Arc::clone(store), Arc::clone(prefixes), id?);
            let event_id = update.event_id()?.to_string();
            updates.insert(event_id, update); // last marker wins
        }
        Ok(updates)
    }

    /// Stream `(journal_id, updates)` batches, one per journal that has
    /// pending markers, in the order markers appear.
    pub fn get_updates_for_all_journals(
        store: &Arc<dyn Store>,
        prefixes: &Arc<Prefixes>,
    ) -> Result<GroupedUpdates> {
        let ids = JournalUpdate::list(store, prefixes, "")?;
        Ok(GroupedUpdates {
            store: Arc::clone(store),
            prefixes: Arc::clone(prefixes),
            ids,
            pending: None,
            done: false,
        })
    }

    /// Distinct journals that have pending markers, in marker order.
    pub fn out_of_date_journals(
        store: &Arc<dyn Store>,
        prefixes: &Arc<Prefixes>,
    ) -> Result<OutOfDate> {
        let ids = JournalUpdate::list(store, prefixes, "")?;
        Ok(OutOfDate {
            ids,
            prev: None,
            done: false,
        })
    }
}

/// Lazy iterator over live marker ids.
///
/// A tombstone sorts immediately after its live sibling, so a one-step
/// look-behind is enough to skip the pair.
pub struct ListUpdates {
    keys: Box<dyn Iterator<Item = Result<String>> + Send>,
    prev: Option<String>,
    done: bool,
}

impl Iterator for ListUpdates {
    type Item = Result<JournalUpdateId>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.keys.next() {
                Some(Ok(key)) => {
                    let out = match self.prev.take() {
                        Some(prev) if !id::is_tombstone(&key) && !id::is_tombstone(&prev) => {
                            Some(prev)
                        }
                        _ => None,
                    };
                    self.prev = Some(key);
                    if let Some(out) = out {
                        return Some(JournalUpdateId::from_key(&out));
                    }
                }
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(err));
                }
                None => {
                    self.done = true;
                    return match self.prev.take() {
                        Some(prev) if !id::is_tombstone(&prev) => {
                            Some(JournalUpdateId::from_key(&prev))
                        }
                        _ => None,
                    };
                }
            }
        }
    }
}

/// Iterator grouping consecutive markers by their journal.
pub struct GroupedUpdates {
    store: Arc<dyn Store>,
    prefixes: Arc<Prefixes>,
    ids: ListUpdates,
    pending: Option<(JournalId, UpdateMap)>,
    done: bool,
}

impl Iterator for GroupedUpdates {
    type Item = Result<(JournalId, UpdateMap)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.ids.next() {
                Some(Ok(id)) => {
                    let journal_id = match id.journal_id() {
                        Ok(journal_id) => journal_id,
                        Err(err) => {
                            self.done = true;
                            return Some(Err(err));
                        }
                    };
                    let update =
                        JournalUpdate::new(Arc::clone(&self.store), Arc::clone(&self.prefixes), id);
                    let event_id = match update.event_id() {
                        Ok(event_id) => event_id.to_string(),
                        Err(err) => {
                            self.done = true;
                            return Some(Err(err));
                        }
                    };
                    let same_journal = match &self.pending {
                        Some((current, _)) => *current == journal_id,
                        None => false,
                    };
                    if same_journal {
                        if let Some((_, updates)) = self.pending.as_mut() {
                            updates.insert(event_id, update);
                        }
                    } else {
                        let out = self.pending.take();
                        let mut updates = UpdateMap::new();
                        updates.insert(event_id, update);
                        self.pending = Some((journal_id, updates));
                        if let Some(out) = out {
                            return Some(Ok(out));
                        }
                    }
                }
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(err));
                }
                None => {
                    self.done = true;
                    return self.pending.take().map(Ok);
                }
            }
        }
    }
}

/// Iterator over distinct journal ids that have pending markers.
pub struct OutOfDate {
    ids: ListUpdates,
    prev: Option<JournalId>,
    done: bool,
}

impl Iterator for OutOfDate {
    type Item = Result<JournalId>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.ids.next() {
                Some(Ok(id)) => {
                    let journal_id = match id.journal_id() {
                        Ok(journal_id) => journal_id,
                        Err(err) => {
                            self.done = true;
                            return Some(Err(err));
                        }
                    };
                    if self.prev.as_ref() != Some(&journal_id) {
                        self.prev = Some(journal_id.clone());
                        return Some(Ok(journal_id));
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

#[cfg(test)]
#[path = "update_test.rs"]
mod update_test;

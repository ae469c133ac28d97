use std::{thread as std_thread, time};

use super::*;

use crate::store::memory::MemStore;

fn new_store() -> (Arc<dyn Store>, Arc<Prefixes>) {
    let store: Arc<dyn Store> = Arc::new(MemStore::new("test-update"));
    let prefixes = Arc::new(Prefixes::new("acct").unwrap());
    (store, prefixes)
}

fn journal_id(day: u32) -> JournalId {
    JournalId::make(
        &format!("2021-01-{:02}T000000.000000Z", day),
        &format!("2021-01-{:02}T000000.000001Z", day),
        "new",
        &format!("blob-{}", day),
    )
}

#[test]
fn test_upload_and_data() {
    let (store, prefixes) = new_store();
    let jid = journal_id(1);

    let update =
        JournalUpdate::upload_update(&store, &prefixes, &jid, "event-1", b"fresh".to_vec())
            .unwrap();
    assert_eq!(update.journal_id().unwrap(), jid);
    assert_eq!(update.event_id().unwrap(), "event-1");
    assert_eq!(update.action().unwrap(), UpdateAction::Update);
    assert_eq!(update.data().unwrap(), b"fresh".to_vec());

    let delete = JournalUpdate::upload_delete(&store, &prefixes, &jid, "event-2").unwrap();
    assert_eq!(delete.action().unwrap(), UpdateAction::Delete);
    assert_eq!(delete.data().unwrap(), b"".to_vec());

    // a listed marker fetches its body lazily.
    let listed = JournalUpdate::get_updates_for_journal(&store, &prefixes, &jid).unwrap();
    assert_eq!(listed["event-1"].data().unwrap(), b"fresh".to_vec());
}

#[test]
fn test_list_skips_tombstones() {
    let (store, prefixes) = new_store();
    let jid = journal_id(1);

    let u1 = JournalUpdate::upload_update(&store, &prefixes, &jid, "event-1", b"a".to_vec())
        .unwrap();
    std_thread::sleep(time::Duration::from_millis(2));
    let u2 = JournalUpdate::upload_update(&store, &prefixes, &jid, "event-2", b"b".to_vec())
        .unwrap();
    std_thread::sleep(time::Duration::from_millis(2));
    let u3 = JournalUpdate::upload_delete(&store, &prefixes, &jid, "event-3").unwrap();

    let ids: Vec<JournalUpdateId> = JournalUpdate::list(&store, &prefixes, "")
        .unwrap()
        .map(|item| item.unwrap())
        .collect();
    assert_eq!(ids, vec![u1.id().clone(), u2.id().clone(), u3.id().clone()]);

    // tombstoned markers disappear, wherever they sit in the listing.
    u2.delete().unwrap();
    let ids: Vec<JournalUpdateId> = JournalUpdate::list(&store, &prefixes, "")
        .unwrap()
        .map(|item| item.unwrap())
        .collect();
    assert_eq!(ids, vec![u1.id().clone(), u3.id().clone()]);

    u3.delete().unwrap();
    let ids: Vec<JournalUpdateId> = JournalUpdate::list(&store, &prefixes, "")
        .unwrap()
        .map(|item| item.unwrap())
        .collect();
    assert_eq!(ids, vec![u1.id().clone()]);

    u1.delete().unwrap();
    assert_eq!(JournalUpdate::list(&store, &prefixes, "").unwrap().count(), 0);
}

#[test]
fn test_delete_missing() {
    let (store, prefixes) = new_store();
    let jid = journal_id(1);

    let update =
        JournalUpdate::upload_update(&store, &prefixes, &jid, "event-1", b"a".to_vec()).unwrap();
    store
        .delete(&format!("acct/update/{}", update.id()))
        .unwrap();
    assert!(update.delete().is_err());
}

#[test]
fn test_last_marker_wins() {
    let (store, prefixes) = new_store();
    let jid = journal_id(1);

    JournalUpdate::upload_update(&store, &prefixes, &jid, "event-1", b"first".to_vec()).unwrap();
    std_thread::sleep(time::Duration::from_millis(2));
    JournalUpdate::upload_update(&store, &prefixes, &jid, "event-1", b"second".to_vec()).unwrap();

    let updates = JournalUpdate::get_updates_for_journal(&store, &prefixes, &jid).unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates["event-1"].data().unwrap(), b"second".to_vec());
}

#[test]
fn test_grouping() {
    let (store, prefixes) = new_store();
    let (jid1, jid2) = (journal_id(1), journal_id(2));

    JournalUpdate::upload_update(&store, &prefixes, &jid1, "event-1", b"a".to_vec()).unwrap();
    JournalUpdate::upload_delete(&store, &prefixes, &jid1, "event-2").unwrap();
    JournalUpdate::upload_update(&store, &prefixes, &jid2, "event-3", b"c".to_vec()).unwrap();

    let groups: Vec<(JournalId, UpdateMap)> =
        JournalUpdate::get_updates_for_all_journals(&store, &prefixes)
            .unwrap()
            .map(|item| item.unwrap())
            .collect();
    assert_eq!(groups.len(), 2);

    let by_journal: Vec<(&JournalId, Vec<&String>)> = groups
        .iter()
        .map(|(jid, updates)| (jid, updates.keys().collect()))
        .collect();
    for (jid, events) in by_journal.iter() {
        if **jid == jid1 {
            assert_eq!(*events, vec!["event-1", "event-2"]);
        } else {
            assert_eq!(**jid, jid2);
            assert_eq!(*events, vec!["event-3"]);
        }
    }

    let out_of_date: Vec<JournalId> = JournalUpdate::out_of_date_journals(&store, &prefixes)
        .unwrap()
        .map(|item| item.unwrap())
        .collect();
    assert_eq!(out_of_date.len(), 2);
    assert!(out_of_date.contains(&jid1));
    assert!(out_of_date.contains(&jid2));
}

#[test]
fn test_updates_for_journal_isolated() {
    let (store, prefixes) = new_store();
    let (jid1, jid2) = (journal_id(1), journal_id(2));

    JournalUpdate::upload_update(&store, &prefixes, &jid1, "event-1", b"a".to_vec()).unwrap();
    JournalUpdate::upload_update(&store, &prefixes, &jid2, "event-2", b"b".to_vec()).unwrap();

    let updates = JournalUpdate::get_updates_for_journal(&store, &prefixes, &jid1).unwrap();
    assert_eq!(updates.len(), 1);
    assert!(updates.contains_key("event-1"));
}

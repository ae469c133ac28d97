use chrono::{Duration, TimeZone, Utc};

use std::{io, sync::Arc};

use super::*;
use crate::{
    flood::{Config, FlashFlood},
    store::{memory::MemStore, Store},
};

// byte-range fetch against a MemStore, resolving `memory://` URLs the
// way an HTTP client resolves presigned ones.
struct MemFetch(Arc<MemStore>);

impl Fetch for MemFetch {
    fn fetch_range(&self, url: &Url, lo: u64, hi: u64) -> Result<Box<dyn io::Read + Send>> {
        let key = url.path().trim_start_matches('/').to_string();
        let data = self.0.get_range(&key, lo, hi)?;
        Ok(Box::new(io::Cursor::new(data)))
    }
}

fn new_engine(name: &str) -> (Arc<MemStore>, FlashFlood) {
    let store = Arc::new(MemStore::new(name));
    let handle: Arc<dyn Store> = Arc::clone(&store) as Arc<dyn Store>;
    let mut config = Config::new("flashflood-test");
    config.set_pool_size(4);
    let engine = FlashFlood::new(handle, config).unwrap();
    (store, engine)
}

fn event_date(i: i64) -> DateTime<Utc> {
    Utc.ymd(2021, 6, 1).and_hms(0, 0, 0) + Duration::seconds(i)
}

fn put_events(engine: &FlashFlood, n: usize) -> Vec<Event> {
    (0..n)
        .map(|i| {
            let event_id = format!("event-{:03}", i);
            let data = format!("data-{:03}", i).into_bytes();
            engine
                .put(&data, Some(&event_id), Some(event_date(i as i64)))
                .unwrap()
        })
        .collect()
}

#[test]
fn test_event_stream_document() {
    let (_store, engine) = new_engine("test-stream-doc");
    put_events(&engine, 3);
    engine.journal(3, 0).unwrap();

    let streams: Vec<EventStream> = engine
        .list_event_streams(None, None)
        .unwrap()
        .map(|item| item.unwrap())
        .collect();
    assert_eq!(streams.len(), 1);

    // the document serializes with the manifest flattened.
    let doc = serde_json::to_value(&streams[0]).unwrap();
    assert!(doc.get("journal_id").is_some());
    assert!(doc.get("events").is_some());
    assert!(doc.get("stream_url").is_some());
    assert!(doc.get("manifest").is_none());

    let back: EventStream = serde_json::from_value(doc).unwrap();
    assert_eq!(back.manifest.journal_id, streams[0].manifest.journal_id);
}

#[test]
fn test_full_replay() {
    let (store, engine) = new_engine("test-stream-full");
    let events = put_events(&engine, 10);
    engine.journal(10, 0).unwrap();

    let fetcher = MemFetch(Arc::clone(&store));
    let mut replayed = vec![];
    for stream in engine.list_event_streams(None, None).unwrap() {
        let stream = stream.unwrap();
        for event in replay_event_stream(&stream, &fetcher, None, None).unwrap() {
            replayed.push(event.unwrap());
        }
    }

    assert_eq!(replayed.len(), 10);
    for (got, want) in replayed.iter().zip(events.iter()) {
        assert_eq!(got.event_id, want.event_id);
        assert_eq!(got.date, want.date);
        assert_eq!(got.data, want.data);
    }
}

#[test]
fn test_range_replay() {
    // partial date requests must download only a range of the journal.
    let (store, engine) = new_engine("test-stream-range");
    let events = put_events(&engine, 10);
    engine.journal(10, 0).unwrap();

    let from_date = events[3].date;
    let fetcher = MemFetch(Arc::clone(&store));
    let mut replayed = vec![];
    for stream in engine.list_event_streams(Some(from_date), None).unwrap() {
        let stream = stream.unwrap();
        for event in replay_event_stream(&stream, &fetcher, Some(from_date), None).unwrap() {
            replayed.push(event.unwrap());
        }
    }

    let got: Vec<&str> = replayed.iter().map(|e| e.event_id.as_str()).collect();
    let want: Vec<&str> = events[4..].iter().map(|e| e.event_id.as_str()).collect();
    assert_eq!(got, want);
    for (got, want) in replayed.iter().zip(events[4..].iter()) {
        assert_eq!(got.data, want.data);
    }
}

#[test]
fn test_range_replay_upper_bound() {
    let (store, engine) = new_engine("test-stream-upper");
    let events = put_events(&engine, 10);
    engine.journal(10, 0).unwrap();

    let from_date = events[2].date;
    let to_date = events[6].date;
    let fetcher = MemFetch(Arc::clone(&store));
    let mut replayed = vec![];
    for stream in engine
        .list_event_streams(Some(from_date), Some(to_date))
        .unwrap()
    {
        let stream = stream.unwrap();
        for event in
            replay_event_stream(&stream, &fetcher, Some(from_date), Some(to_date)).unwrap()
        {
            replayed.push(event.unwrap());
        }
    }

    let got: Vec<&str> = replayed.iter().map(|e| e.event_id.as_str()).collect();
    let want: Vec<&str> = events[3..=6].iter().map(|e| e.event_id.as_str()).collect();
    assert_eq!(got, want);
}

#[test]
fn test_no_events_in_range() {
    let (store, engine) = new_engine("test-stream-empty");
    put_events(&engine, 3);
    engine.journal(3, 0).unwrap();

    let stream: EventStream = engine
        .list_event_streams(None, None)
        .unwrap()
        .next()
        .unwrap()
        .unwrap();

    // nothing in range, nothing fetched.
    let fetcher = MemFetch(Arc::clone(&store));
    let n = replay_event_stream(
        &stream,
        &fetcher,
        Some(event_date(100)),
        Some(event_date(200)),
    )
    .unwrap()
    .count();
    assert_eq!(n, 0);
}

//! Replay over presigned URLs, for consumers without store
//! credentials.
//!
//! [FlashFlood::list_event_streams] hands out one [EventStream] per
//! live journal; [replay_event_stream] turns such a document into
//! events with a single HTTP byte-range request against the presigned
//! URL.
//!
//! [FlashFlood::list_event_streams]: crate::flood::FlashFlood::list_event_streams

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use std::{
    convert::TryFrom,
    io::{self, Read},
    vec,
};

use crate::{
    flood::{
        dates::{self, DateRange},
        journal::{Event, EventRecord, Manifest},
    },
    Error, Result,
};

/// A journal manifest enriched with a presigned GET URL on its blob.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EventStream {
    #[serde(flatten)]
    pub manifest: Manifest,
    pub stream_url: Url,
}

/// Byte-range fetch over a URL, the reader side's only collaborator.
pub trait Fetch {
    /// Return a reader over bytes `lo..=hi` of the resource at `url`.
    fn fetch_range(&self, url: &Url, lo: u64, hi: u64) -> Result<Box<dyn io::Read + Send>>;
}

/// [Fetch] implementation doing a plain HTTP GET with a Range header.
pub struct HttpFetch;

impl Fetch for HttpFetch {
    fn fetch_range(&self, url: &Url, lo: u64, hi: u64) -> Result<Box<dyn io::Read + Send>> {
        let range = format!("bytes={}-{}", lo, hi);
        let resp = err_at!(StoreError, ureq::get(url.as_str()).set("Range", &range).call())?;
        Ok(Box::new(resp.into_reader()))
    }
}

/// Replay the events of one event-stream document that fall in
/// `(from_date : to_date]`.
///
/// Only the byte range from the first in-range event to the end of the
/// blob is fetched, in one request; events are then read sequentially
/// out of the body. When no event is in range, nothing is fetched.
pub fn replay_event_stream<F>(
    stream: &EventStream,
    fetcher: &F,
    from_date: Option<DateTime<Utc>>,
    to_date: Option<DateTime<Utc>>,
) -> Result<StreamReplay>
where
    F: Fetch,
{
    let range = DateRange::new(from_date, to_date)?;

    let mut first = None;
    for (pos, e) in stream.manifest.events.iter().enumerate() {
        let date = dates::from_timestamp(&e.timestamp)?;
        if range.contains(&date) {
            first = Some(pos);
            break;
        }
        if range.is_future(&date) {
            break;
        }
    }

    let (events, body) = match first {
        Some(pos) => {
            let offset = stream.manifest.events[pos].offset;
            let hi = stream.manifest.size.saturating_sub(1);
            let body = fetcher.fetch_range(&stream.stream_url, offset, hi)?;
            (stream.manifest.events[pos..].to_vec(), Some(body))
        }
        None => (vec![], None),
    };

    Ok(StreamReplay {
        events: events.into_iter(),
        body,
        range,
    })
}

/// Lazy, one-shot iterator over the events of one stream document.
pub struct StreamReplay {
    events: vec::IntoIter<EventRecord>,
    body: Option<Box<dyn io::Read + Send>>,
    range: DateRange,
}

impl Iterator for StreamReplay {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        let e = self.events.next()?;
        let date = match dates::from_timestamp(&e.timestamp) {
            Ok(date) => date,
            Err(err) => return Some(Err(err)),
        };
        if self.range.is_future(&date) {
            self.events = vec![].into_iter();
            self.body = None;
            return None;
        }
        let body = self.body.as_mut()?;
        let size = match err_at!(FailConvert, usize::try_from(e.size)) {
            Ok(size) => size,
            Err(err) => return Some(Err(err)),
        };
        let mut data = vec![0; size];
        if let Err(err) = err_at!(StoreError, body.read_exact(&mut data), "stream body") {
            return Some(Err(err));
        }
        Some(Ok(Event {
            event_id: e.event_id,
            date,
            data,
        }))
    }
}

#[cfg(test)]
#[path = "stream_test.rs"]
mod stream_test;

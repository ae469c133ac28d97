//! Flashflood is an append-mostly event journal layered on top of a
//! blob store offering little more than put/get/list/delete with
//! prefix scans.
//!
//! Producers append small dated events with [FlashFlood::put]; consumers
//! replay them in strict timestamp order, either streaming directly from
//! the store with [FlashFlood::replay], or following presigned URLs to
//! journal blobs with [FlashFlood::list_event_streams] and
//! [replay_event_stream].
//!
//! Events land as one-event journals and are periodically merged into
//! larger ordered journals by [FlashFlood::journal]. Events can also be
//! changed after the fact: [FlashFlood::update_event] and
//! [FlashFlood::delete_event] record marker objects, and
//! [FlashFlood::update] reconciles them by rewriting whole journals in
//! the background. Journals are immutable, every mutation writes a new
//! key and tombstones the old one, so the engine never depends on the
//! store's overwrite consistency.
//!
//! Concurrent writers
//! ------------------
//!
//! Mutating operations, `put`, `update_event`, `delete_event`, `journal`
//! and `update`, assume a single concurrent writer. Readers, `replay`,
//! `get_event` and the listing operations, are always safe to run
//! concurrently with each other and with one writer.
//!
//! [FlashFlood]: crate::flood::FlashFlood
//! [FlashFlood::put]: crate::flood::FlashFlood::put
//! [FlashFlood::replay]: crate::flood::FlashFlood::replay
//! [FlashFlood::journal]: crate::flood::FlashFlood::journal
//! [FlashFlood::update]: crate::flood::FlashFlood::update
//! [FlashFlood::update_event]: crate::flood::FlashFlood::update_event
//! [FlashFlood::delete_event]: crate::flood::FlashFlood::delete_event
//! [FlashFlood::list_event_streams]: crate::flood::FlashFlood::list_event_streams
//! [replay_event_stream]: crate::flood::replay_event_stream

use std::{error, fmt, result};

/// Short form to compose Error values.
///
/// Here are few possible ways:
///
/// ```ignore
/// use flashflood::Error;
/// err_at!(StoreError, msg: "put failed for {}", key)
/// ```
///
/// ```ignore
/// use flashflood::Error;
/// err_at!(FailJson, serde_json::from_slice(&data))
/// ```
///
/// ```ignore
/// use flashflood::Error;
/// err_at!(FailConvert, usize::try_from(size), "journal {}", id)
/// ```
#[macro_export]
macro_rules! err_at {
    ($v:ident, msg: $($arg:expr),+) => {{
        let prefix = format!("{}:{}", file!(), line!());
        Err(Error::$v(prefix, format!($($arg),+)))
    }};
    ($v:ident, $e:expr) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                Err(Error::$v(prefix, format!("{}", err)))
            }
        }
    }};
    ($v:ident, $e:expr, $($arg:expr),+) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                let msg = format!($($arg),+);
                Err(Error::$v(prefix, format!("{} {}", err, msg)))
            }
        }
    }};
}

pub mod flood;
pub mod store;
pub mod util;

pub use crate::flood::{replay_event_stream, Config, Event, FlashFlood};

/// Error variants that can be returned by this package's API.
///
/// Each variant carries a prefix, typically the file location where the
/// error happened, and a human readable message.
#[derive(Clone)]
pub enum Error {
    /// Put of an event id that is already indexed.
    EventExists(String, String),
    /// Lookup or mutation of an event id unknown to the index.
    EventNotFound(String, String),
    /// Journaling thresholds cannot be met from visible new journals.
    JournalingError(String, String),
    /// Attempt to upload a journal with no events.
    JournalUploadError(String, String),
    /// Store object expected to exist is missing.
    KeyNotFound(String, String),
    /// Invalid argument from the caller.
    InvalidInput(String, String),
    /// JSON encoding or decoding failure.
    FailJson(String, String),
    /// Numeric or text conversion failure.
    FailConvert(String, String),
    /// Failure reported by the blob store or the transport.
    StoreError(String, String),
    /// Inter-thread communication failure.
    IPCFail(String, String),
    /// Thread spawn/join failure.
    ThreadFail(String, String),
    /// Invariant violation, typically a bug.
    Fatal(String, String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        use Error::*;

        match self {
            EventExists(p, msg) => write!(f, "{} EventExists: {}", p, msg),
            EventNotFound(p, msg) => write!(f, "{} EventNotFound: {}", p, msg),
            JournalingError(p, msg) => write!(f, "{} JournalingError: {}", p, msg),
            JournalUploadError(p, msg) => write!(f, "{} JournalUploadError: {}", p, msg),
            KeyNotFound(p, msg) => write!(f, "{} KeyNotFound: {}", p, msg),
            InvalidInput(p, msg) => write!(f, "{} InvalidInput: {}", p, msg),
            FailJson(p, msg) => write!(f, "{} FailJson: {}", p, msg),
            FailConvert(p, msg) => write!(f, "{} FailConvert: {}", p, msg),
            StoreError(p, msg) => write!(f, "{} StoreError: {}", p, msg),
            IPCFail(p, msg) => write!(f, "{} IPCFail: {}", p, msg),
            ThreadFail(p, msg) => write!(f, "{} ThreadFail: {}", p, msg),
            Fatal(p, msg) => write!(f, "{} Fatal: {}", p, msg),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{}", self)
    }
}

impl error::Error for Error {}

/// Type alias for Result returned by functions of this package.
pub type Result<T> = result::Result<T, Error>;

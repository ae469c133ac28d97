//! Composite identifiers for journals, update markers and tombstones.

use chrono::{DateTime, Utc};

use std::{fmt, result};

use crate::{flood::dates, Error, Result};

/// Separator between the parts of a composite id. Event ids must not
/// contain it.
pub const DELIMITER: &str = "--";

/// Suffix marking a live key as logically deleted.
pub const TOMBSTONE_SUFFIX: &str = ".dead";

/// Version literal carried by freshly ingested one-event journals.
pub const NEW_VERSION: &str = "new";

/// Test whether `key` is a tombstone sibling.
pub fn is_tombstone(key: &str) -> bool {
    key.ends_with(TOMBSTONE_SUFFIX)
}

/// Return `key` with a trailing tombstone suffix removed.
pub fn strip_tombstone(key: &str) -> &str {
    key.strip_suffix(TOMBSTONE_SUFFIX).unwrap_or(key)
}

/// Journal identifier, `start_ts--end_ts--version--blob_id`.
///
/// All versions of one logical journal share the `start_ts--end_ts`
/// range prefix; the greatest non-tombstoned version is the live one.
/// `version` is either a formation timestamp or the [NEW_VERSION]
/// literal.
#[derive(Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct JournalId(String);

impl fmt::Display for JournalId {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for JournalId {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{:?}", self.0)
    }
}

impl JournalId {
    pub fn make(start_ts: &str, end_ts: &str, version: &str, blob_id: &str) -> JournalId {
        JournalId([start_ts, end_ts, version, blob_id].join(DELIMITER))
    }

    /// Validate and wrap a raw id string.
    pub fn parse(id: &str) -> Result<JournalId> {
        match id.split(DELIMITER).count() {
            4 => Ok(JournalId(id.to_string())),
            n => err_at!(InvalidInput, msg: "journal id {:?} has {} parts", id, n),
        }
    }

    /// Parse the id out of a full store key.
    pub fn from_key(key: &str) -> Result<JournalId> {
        let id = key.rsplitn(2, '/').next().unwrap_or(key);
        JournalId::parse(id)
    }

    fn parts(&self) -> (&str, &str, &str, &str) {
        let mut iter = self.0.split(DELIMITER);
        match (iter.next(), iter.next(), iter.next(), iter.next()) {
            (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
            _ => unreachable!(), // validated at construction
        }
    }

    pub fn start_timestamp(&self) -> &str {
        self.parts().0
    }

    pub fn end_timestamp(&self) -> &str {
        self.parts().1
    }

    pub fn version(&self) -> &str {
        self.parts().2
    }

    pub fn blob_id(&self) -> &str {
        self.parts().3
    }

    pub fn start_date(&self) -> Result<DateTime<Utc>> {
        dates::from_timestamp(self.parts().0)
    }

    pub fn end_date(&self) -> Result<DateTime<Utc>> {
        let end = self.parts().1;
        if end == NEW_VERSION {
            self.start_date()
        } else {
            dates::from_timestamp(end)
        }
    }

    /// The `start_ts--end_ts` part shared by all versions of this
    /// journal's range.
    pub fn range_prefix(&self) -> &str {
        self.0.rsplitn(3, DELIMITER).last().unwrap_or("")
    }

    /// Character-reversed id, under which update markers for this
    /// journal are stored.
    pub fn reversed(&self) -> String {
        self.0.chars().rev().collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Action recorded by an update marker.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UpdateAction {
    Update,
    Delete,
}

impl fmt::Display for UpdateAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{}", self.as_name())
    }
}

impl UpdateAction {
    pub fn as_name(&self) -> &'static str {
        match self {
            UpdateAction::Update => "UPDATE",
            UpdateAction::Delete => "DELETE",
        }
    }

    pub fn from_name(name: &str) -> Result<UpdateAction> {
        match name {
            "UPDATE" => Ok(UpdateAction::Update),
            "DELETE" => Ok(UpdateAction::Delete),
            name => err_at!(InvalidInput, msg: "update action {:?}", name),
        }
    }
}

/// Update-marker identifier,
/// `reverse(journal_id)--event_id--created_ts--ACTION`.
///
/// The journal id is stored reversed so that markers for one journal
/// are adjacent in lexical order, while markers recorded later never
/// sort between the markers of two distinct journals recorded earlier.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct JournalUpdateId(String);

impl fmt::Display for JournalUpdateId {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{}", self.0)
    }
}

impl JournalUpdateId {
    pub fn make(journal_id: &JournalId, event_id: &str, action: UpdateAction) -> JournalUpdateId {
        let id = [
            journal_id.reversed().as_str(),
            event_id,
            dates::timestamp_now().as_str(),
            action.as_name(),
        ]
        .join(DELIMITER);
        JournalUpdateId(id)
    }

    /// Validate and wrap a raw id string.
    pub fn parse(id: &str) -> Result<JournalUpdateId> {
        let val = JournalUpdateId(id.to_string());
        val.parts()?;
        Ok(val)
    }

    /// Parse the id out of a full store key.
    pub fn from_key(key: &str) -> Result<JournalUpdateId> {
        let id = key.rsplitn(2, '/').next().unwrap_or(key);
        JournalUpdateId::parse(id)
    }

    // The reversed journal id contains delimiters of its own, so parts
    // are split off from the right.
    fn parts(&self) -> Result<(JournalId, &str, &str, UpdateAction)> {
        let mut iter = self.0.rsplitn(4, DELIMITER);
        match (iter.next(), iter.next(), iter.next(), iter.next()) {
            (Some(action), Some(ts), Some(event_id), Some(rev)) => {
                let journal_id: String = rev.chars().rev().collect();
                let journal_id = JournalId::parse(&journal_id)?;
                Ok((journal_id, event_id, ts, UpdateAction::from_name(action)?))
            }
            _ => err_at!(InvalidInput, msg: "update id {:?}", self.0),
        }
    }

    pub fn journal_id(&self) -> Result<JournalId> {
        Ok(self.parts()?.0)
    }

    pub fn event_id(&self) -> Result<&str> {
        Ok(self.parts()?.1)
    }

    pub fn timestamp(&self) -> Result<&str> {
        Ok(self.parts()?.2)
    }

    pub fn action(&self) -> Result<UpdateAction> {
        Ok(self.parts()?.3)
    }

    /// Listing prefix gathering every marker recorded against
    /// `journal_id`.
    pub fn prefix_for_journal(journal_id: &JournalId) -> String {
        journal_id.reversed()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[path = "id_test.rs"]
mod id_test;

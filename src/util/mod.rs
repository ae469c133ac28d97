//! Module implement common utility functions.

use serde::{de::DeserializeOwned, Serialize};

use crate::{Error, Result};

pub mod thread;

pub use thread::Thread;

/// Helper function to serialize value `T` implementing Serialize, into
/// a JSON byte-string.
pub fn into_json_bytes<T>(value: &T) -> Result<Vec<u8>>
where
    T: Serialize,
{
    err_at!(FailJson, serde_json::to_vec(value))
}

/// Helper function to deserialize value `T` implementing Deserialize,
/// from a JSON byte-string.
pub fn from_json_bytes<T>(data: &[u8]) -> Result<T>
where
    T: DeserializeOwned,
{
    err_at!(FailJson, serde_json::from_slice(data))
}

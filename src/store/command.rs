//! Replicated Command Type
//!
//! One `Command` is one state transition. The set of operations is closed and
//! small, so it is a tagged enum with an exhaustive match rather than an open
//! registry. Encoding is JSON: stable across process restarts, which matters
//! because replicas replay committed log entries verbatim, possibly long after
//! the entry was written.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::table::KvTable;

/// A serializable write/read request, dispatched against the local table.
/// Immutable once constructed; consumed once by the state machine (replicated
/// path) or directly by local dispatch (reads, standalone mode).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "UPPERCASE")]
pub enum Command {
    Set { key: String, value: String },
    Del { key: String },
    Get { key: String },
}

impl Command {
    /// Dispatches by kind. `Get` is the only variant producing a payload.
    pub fn apply(&self, table: &KvTable) -> Result<Option<String>> {
        match self {
            Command::Set { key, value } => {
                table.set(key, value);
                Ok(None)
            }
            Command::Del { key } => {
                table.delete(key);
                Ok(None)
            }
            Command::Get { key } => Ok(table.get(key)),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Fails on malformed bytes or an unrecognized command tag.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn key(&self) -> &str {
        match self {
            Command::Set { key, .. } | Command::Del { key } | Command::Get { key } => key,
        }
    }
}

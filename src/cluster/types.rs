//! Cluster Data Types
//!
//! `NodeDescriptor` is the unit of cluster metadata: one member's shard
//! assignment, gossiped to every other node as an opaque blob. The JSON
//! encoding omits empty/zero fields so the blob stays compact on the wire,
//! and decoding tolerates their absence.

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// One cluster member's shard assignment as disseminated through the
/// membership overlay. `addr` (the gossip address) uniquely identifies a node;
/// `api_addr` is where clients are redirected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDescriptor {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_addr: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub addr: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub slot_begin: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub slot_end: u32,
    /// True when this node is the current write leader of its shard.
    #[serde(rename = "leader", default, skip_serializing_if = "is_false")]
    pub leader: bool,
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

fn is_false(v: &bool) -> bool {
    !*v
}

impl NodeDescriptor {
    /// Whether `slot` falls inside this node's inclusive slot range.
    pub fn covers_slot(&self, slot: u32) -> bool {
        self.slot_begin <= slot && slot <= self.slot_end
    }

    /// Whether the advertised slot range lies inside the keyspace. Gossip
    /// payloads come from the network; a descriptor that fails this check
    /// must never enter the ledger.
    pub fn valid_slot_range(&self) -> bool {
        self.slot_begin <= self.slot_end && self.slot_end < super::slots::SLOT_COUNT
    }

    pub fn encode_meta(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode_meta(meta: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(meta)?)
    }
}

/// Cluster-wide readiness as derived from the current leader descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Leader slot ranges form a contiguous, non-overlapping cover of the keyspace.
    Ok,
    /// No leader descriptors are known (or a lookup hit an impossible gap).
    Error,
    /// Leaders exist but their ranges leave a gap, overlap, or miss an endpoint.
    NotReady,
}

impl Readiness {
    /// Stable wire code reported to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Readiness::Ok => "OK",
            Readiness::Error => "ERROR",
            Readiness::NotReady => "NOT_READY",
        }
    }
}

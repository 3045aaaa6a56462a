//! Node Configuration
//!
//! Command-line flags for one store process plus slot-range parsing. A
//! malformed slot range is a startup failure, never a silently defaulted one.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use crate::cluster::slots::SLOT_COUNT;

#[derive(Debug, Parser)]
#[command(name = "slotkv", about = "Sharded, replicated key-value store node")]
pub struct NodeConfig {
    /// Host the API listener binds to.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port of the public key-value API.
    #[arg(long, default_value_t = 8000)]
    pub api_port: u16,

    /// Directory for snapshot state.
    #[arg(long, default_value = "/tmp/slotkv")]
    pub data_dir: PathBuf,

    /// API address of an existing member to join as a replica. When absent
    /// this node bootstraps its own single-member group.
    #[arg(long)]
    pub join: Option<String>,

    /// UDP bind address of the gossip overlay. When absent the node runs
    /// standalone with membership disabled.
    #[arg(long)]
    pub gossip_bind: Option<SocketAddr>,

    /// Gossip addresses of existing overlay members to join through.
    #[arg(long, value_delimiter = ',')]
    pub seeds: Vec<SocketAddr>,

    /// Slot range owned by this shard, as `begin-end` (inclusive).
    /// Defaults to the full keyspace.
    #[arg(long)]
    pub slots: Option<String>,

    /// Log filter, e.g. `info` or `slotkv=debug`.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl NodeConfig {
    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.host, self.api_port)
    }

    /// The `(begin, end)` slot range this node owns.
    pub fn slot_range(&self) -> Result<(u32, u32)> {
        match &self.slots {
            Some(range) => parse_slot_range(range),
            None => Ok((0, SLOT_COUNT - 1)),
        }
    }
}

/// Parses an inclusive `begin-end` slot range and validates it against the
/// keyspace bounds.
pub fn parse_slot_range(range: &str) -> Result<(u32, u32)> {
    let (begin, end) = range
        .split_once('-')
        .with_context(|| format!("slot range {:?} is not of the form begin-end", range))?;

    let begin: u32 = begin
        .trim()
        .parse()
        .with_context(|| format!("invalid slot range begin {:?}", begin))?;
    let end: u32 = end
        .trim()
        .parse()
        .with_context(|| format!("invalid slot range end {:?}", end))?;

    if begin > end {
        bail!("slot range begin {} exceeds end {}", begin, end);
    }
    if end >= SLOT_COUNT {
        bail!("slot range end {} outside keyspace 0-{}", end, SLOT_COUNT - 1);
    }

    Ok((begin, end))
}

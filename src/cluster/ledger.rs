//! Slot Ledger
//!
//! The per-process, eventually-consistent view of every known node's shard
//! assignment. Node list, derived leader list, and the readiness code live
//! inside one mutex so readiness can never be observed out of sync with the
//! list that produced it. Readiness is fully re-derived after every mutation;
//! membership churn is low-frequency, so correctness wins over incremental
//! bookkeeping.

use std::sync::Mutex;

use tracing::{debug, error, info, warn};

use super::slots::slot_for_key;
use super::types::{NodeDescriptor, Readiness};

struct LedgerInner {
    nodes: Vec<NodeDescriptor>,
    leaders: Vec<NodeDescriptor>,
    readiness: Readiness,
}

/// Cluster membership ledger, keyed by gossip address.
pub struct SlotLedger {
    inner: Mutex<LedgerInner>,
}

impl SlotLedger {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LedgerInner {
                nodes: Vec::new(),
                leaders: Vec::new(),
                readiness: Readiness::Error,
            }),
        }
    }

    /// Registers a newly discovered node. Placeholder descriptors with an
    /// empty address are never registered, and a duplicate address is a no-op.
    pub fn join(&self, node: NodeDescriptor) {
        if node.addr.is_empty() {
            return;
        }
        if !node.valid_slot_range() {
            warn!(addr = %node.addr, begin = node.slot_begin, end = node.slot_end,
                "dropping join with out-of-keyspace slot range");
            return;
        }
        let mut inner = self.inner.lock().expect("slot ledger lock poisoned");

        if inner.nodes.iter().any(|n| n.addr == node.addr) {
            info!(addr = %node.addr, "ignoring join for already-known node");
            return;
        }

        inner.nodes.push(node);
        Self::check_coverage(&mut inner);
    }

    /// Overwrites the leadership flag and slot range of the entry matching the
    /// address, or falls back to a join when the node is unknown.
    pub fn update(&self, node: NodeDescriptor) {
        if !node.valid_slot_range() {
            warn!(addr = %node.addr, begin = node.slot_begin, end = node.slot_end,
                "dropping update with out-of-keyspace slot range");
            return;
        }
        let mut inner = self.inner.lock().expect("slot ledger lock poisoned");

        match inner.nodes.iter_mut().find(|n| n.addr == node.addr) {
            Some(existing) => {
                existing.leader = node.leader;
                existing.slot_begin = node.slot_begin;
                existing.slot_end = node.slot_end;
            }
            None => {
                if node.addr.is_empty() {
                    return;
                }
                inner.nodes.push(node);
            }
        }
        Self::check_coverage(&mut inner);
    }

    /// Removes the entry matching the address, if present.
    pub fn leave(&self, node: NodeDescriptor) {
        let mut inner = self.inner.lock().expect("slot ledger lock poisoned");

        if let Some(pos) = inner.nodes.iter().position(|n| n.addr == node.addr) {
            inner.nodes.remove(pos);
        }
        Self::check_coverage(&mut inner);
    }

    /// True iff the keyspace is fully covered by leader slot ranges.
    pub fn enabled(&self) -> bool {
        let inner = self.inner.lock().expect("slot ledger lock poisoned");
        inner.readiness == Readiness::Ok
    }

    pub fn readiness(&self) -> Readiness {
        let inner = self.inner.lock().expect("slot ledger lock poisoned");
        inner.readiness
    }

    /// Snapshot copy of the current leader subset, sorted by slot begin.
    pub fn leaders(&self) -> Vec<NodeDescriptor> {
        let inner = self.inner.lock().expect("slot ledger lock poisoned");
        inner.leaders.clone()
    }

    pub fn node_count(&self) -> usize {
        let inner = self.inner.lock().expect("slot ledger lock poisoned");
        inner.nodes.len()
    }

    /// Resolves a key to the API address of its owning node.
    ///
    /// Returns `("", readiness)` without attempting a lookup while the ledger
    /// is not fully consistent. When `require_leader` is set only the leader
    /// subset is scanned; otherwise any known node covering the slot matches.
    pub fn find_node(&self, key: &str, require_leader: bool) -> (String, Readiness) {
        let inner = self.inner.lock().expect("slot ledger lock poisoned");

        if inner.readiness != Readiness::Ok {
            return (String::new(), inner.readiness);
        }

        let slot = slot_for_key(key);
        let list = if require_leader {
            &inner.leaders
        } else {
            &inner.nodes
        };

        for node in list {
            if node.covers_slot(slot) {
                return (node.api_addr.clone(), Readiness::Ok);
            }
        }

        // Unreachable while readiness is OK; if it fires, the ledger state and
        // the derived leader list disagree.
        error!(slot, require_leader, "no descriptor covers slot despite OK readiness");
        (String::new(), Readiness::Error)
    }

    fn check_coverage(inner: &mut LedgerInner) {
        inner.leaders = inner
            .nodes
            .iter()
            .filter(|n| n.leader)
            .cloned()
            .collect();
        inner.leaders.sort_by_key(|n| n.slot_begin);

        debug!(leaders = inner.leaders.len(), nodes = inner.nodes.len(), "recomputing readiness");

        inner.readiness = Self::derive_readiness(&inner.leaders);
        debug!(readiness = ?inner.readiness, "readiness recomputed");
    }

    fn derive_readiness(leaders: &[NodeDescriptor]) -> Readiness {
        use super::slots::SLOT_COUNT;

        if leaders.is_empty() {
            return Readiness::Error;
        }
        if leaders[0].slot_begin != 0 {
            debug!(begin = leaders[0].slot_begin, "lowest slot range does not start at 0");
            return Readiness::NotReady;
        }
        if leaders[leaders.len() - 1].slot_end != SLOT_COUNT - 1 {
            debug!(
                end = leaders[leaders.len() - 1].slot_end,
                "highest slot range does not end at {}", SLOT_COUNT - 1
            );
            return Readiness::NotReady;
        }
        // Ingest validation bounds slot_end below SLOT_COUNT, but the
        // adjacency check still must not overflow on any input.
        for pair in leaders.windows(2) {
            if pair[0].slot_end.checked_add(1) != Some(pair[1].slot_begin) {
                debug!(
                    end = pair[0].slot_end,
                    next_begin = pair[1].slot_begin,
                    "gap or overlap between adjacent slot ranges"
                );
                return Readiness::NotReady;
            }
        }
        Readiness::Ok
    }
}

impl Default for SlotLedger {
    fn default() -> Self {
        Self::new()
    }
}

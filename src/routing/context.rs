//! Routing Context
//!
//! Ties the local shard together: the table, the optional replication handle,
//! the membership overlay, and the slot ledger. Local identity (API address,
//! slot range, leadership flag) sits under its own lock, separate from the
//! ledger's, so an ownership check never contends with a membership update.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cluster::slots::slot_for_key;
use crate::cluster::{NodeDescriptor, Readiness, SlotLedger};
use crate::membership::{DisabledOverlay, MembershipOverlay, PeerEvents};
use crate::replication::{ReplicationError, ReplicationHandle};
use crate::store::{Command, KvTable};

/// Deadline for a replicated command to commit.
const APPLY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    /// The request needs the shard leader and this node is not it.
    #[error("not the shard leader")]
    NotLeader,
    /// Leader slot ranges do not cover the keyspace; code is `ERROR` or
    /// `NOT_READY`.
    #[error("cluster is not ready ({0})")]
    ClusterNotReady(&'static str),
    #[error("replication is not configured on this node")]
    NoReplication,
    #[error(transparent)]
    Replication(#[from] ReplicationError),
    #[error("command failed: {0}")]
    Command(String),
}

struct LocalIdentity {
    api_addr: String,
    gossip_addr: String,
    slot_begin: u32,
    slot_end: u32,
    leader: bool,
}

impl LocalIdentity {
    fn descriptor(&self) -> NodeDescriptor {
        NodeDescriptor {
            api_addr: self.api_addr.clone(),
            addr: self.gossip_addr.clone(),
            slot_begin: self.slot_begin,
            slot_end: self.slot_end,
            leader: self.leader,
        }
    }
}

pub struct RoutingContext {
    table: Arc<KvTable>,
    replication: Option<Arc<ReplicationHandle>>,
    ledger: Arc<SlotLedger>,
    overlay: Mutex<Arc<dyn MembershipOverlay>>,
    identity: Mutex<LocalIdentity>,
}

impl RoutingContext {
    /// Builds the context for one node. Without a replication handle the node
    /// is standalone and its leadership flag is pinned true.
    pub fn new(
        table: Arc<KvTable>,
        replication: Option<Arc<ReplicationHandle>>,
        api_addr: String,
        slot_begin: u32,
        slot_end: u32,
    ) -> Self {
        let leader = replication.is_none();

        Self {
            table,
            replication,
            ledger: Arc::new(SlotLedger::new()),
            overlay: Mutex::new(Arc::new(DisabledOverlay)),
            identity: Mutex::new(LocalIdentity {
                api_addr,
                gossip_addr: String::new(),
                slot_begin,
                slot_end,
                leader,
            }),
        }
    }

    pub fn ledger(&self) -> &SlotLedger {
        &self.ledger
    }

    pub fn is_leader(&self) -> bool {
        self.identity.lock().expect("identity lock poisoned").leader
    }

    fn local_descriptor(&self) -> NodeDescriptor {
        self.identity
            .lock()
            .expect("identity lock poisoned")
            .descriptor()
    }

    fn overlay(&self) -> Arc<dyn MembershipOverlay> {
        self.overlay.lock().expect("overlay lock poisoned").clone()
    }

    /// Attaches a live membership overlay, registering this node's own
    /// descriptor in the ledger and publishing it to the cluster.
    pub fn set_cluster(&self, overlay: Arc<dyn MembershipOverlay>, gossip_addr: String) {
        let descriptor = {
            let mut identity = self.identity.lock().expect("identity lock poisoned");
            identity.gossip_addr = gossip_addr;
            identity.descriptor()
        };

        self.ledger.join(descriptor.clone());

        match descriptor.encode_meta() {
            Ok(meta) => overlay.update_local(meta),
            Err(e) => warn!("failed to encode local descriptor: {}", e),
        }

        *self.overlay.lock().expect("overlay lock poisoned") = overlay;
        info!(addr = %descriptor.addr, "cluster overlay attached");
    }

    /// Subscribes this context to leadership changes of the local group.
    pub fn watch_leadership(self: &Arc<Self>) {
        if let Some(handle) = &self.replication {
            let ctx = self.clone();
            handle.listen(move |is_leader| ctx.leadership_changed(is_leader));
        }
    }

    /// Records a local leadership flip and re-publishes this node's
    /// descriptor, both to the overlay and to the local ledger.
    pub fn leadership_changed(&self, is_leader: bool) {
        let descriptor = {
            let mut identity = self.identity.lock().expect("identity lock poisoned");
            identity.leader = is_leader;
            identity.descriptor()
        };

        info!(leader = is_leader, "local leadership changed");

        self.ledger.update(descriptor.clone());

        let overlay = self.overlay();
        if overlay.enabled() {
            match descriptor.encode_meta() {
                Ok(meta) => overlay.update_local(meta),
                Err(e) => warn!("failed to encode local descriptor: {}", e),
            }
        }
    }

    /// Pure local decision: should this node handle `key`? With membership
    /// disabled every key is local.
    pub fn check_self(&self, key: &str, require_leader: bool) -> bool {
        if !self.overlay().enabled() {
            return true;
        }

        let identity = self.identity.lock().expect("identity lock poisoned");
        let slot = slot_for_key(key);
        let covers = identity.slot_begin <= slot && slot <= identity.slot_end;

        if require_leader {
            covers && identity.leader
        } else {
            covers
        }
    }

    /// Resolves the cluster node owning `key`. `Ok(None)` means the resolved
    /// address is this node's own API address; the comparison happens here
    /// and nowhere else.
    pub fn select_cluster_node(
        &self,
        key: &str,
        require_leader: bool,
    ) -> Result<Option<String>, RoutingError> {
        let (addr, readiness) = self.ledger.find_node(key, require_leader);

        match readiness {
            Readiness::Ok => {
                let local_api = self
                    .identity
                    .lock()
                    .expect("identity lock poisoned")
                    .api_addr
                    .clone();
                if addr == local_api {
                    Ok(None)
                } else {
                    Ok(Some(addr))
                }
            }
            other => Err(RoutingError::ClusterNotReady(other.code())),
        }
    }

    /// Full routing decision for one request. `Ok(None)` means serve locally;
    /// `Ok(Some(addr))` means redirect the client to `addr`.
    pub fn route(&self, key: &str, require_leader: bool) -> Result<Option<String>, RoutingError> {
        if !self.check_self(key, require_leader) {
            if let Some(addr) = self.select_cluster_node(key, require_leader)? {
                return Ok(Some(addr));
            }
        }

        // Serving locally: a write still needs this node to hold leadership.
        if require_leader && !self.is_leader() {
            return Err(RoutingError::NotLeader);
        }
        Ok(None)
    }

    /// Executes a command locally. Writes go through the replication handle
    /// unless no group is configured; reads pass `bypass_replication` and hit
    /// the table directly.
    pub async fn process_cmd(
        &self,
        cmd: &Command,
        bypass_replication: bool,
    ) -> Result<Option<String>, RoutingError> {
        match (&self.replication, bypass_replication) {
            (Some(handle), false) => {
                debug!(key = cmd.key(), "submitting command for replication");
                let entry = cmd
                    .encode()
                    .map_err(|e| RoutingError::Command(e.to_string()))?;
                handle.apply(entry, APPLY_TIMEOUT).await?;
                Ok(None)
            }
            _ => cmd
                .apply(&self.table)
                .map_err(|e| RoutingError::Command(e.to_string())),
        }
    }

    /// Adds a new replica to this shard's consensus group.
    pub fn replica_join(&self, addr: &str) -> Result<(), RoutingError> {
        match &self.replication {
            Some(handle) => {
                handle.join(addr)?;
                Ok(())
            }
            None => Err(RoutingError::NoReplication),
        }
    }

    /// Closes the overlay and shuts the consensus group down.
    pub fn shutdown(&self) {
        self.overlay().close();

        if let Some(handle) = &self.replication {
            if let Err(e) = handle.shutdown() {
                warn!("consensus group shutdown failed: {}", e);
            }
        }
    }
}

/// Overlay events become ledger mutations. A peer whose metadata does not
/// decode is dropped with a warning rather than poisoning the ledger.
impl PeerEvents for RoutingContext {
    fn peer_joined(&self, name: &str, meta: &[u8]) {
        if meta.is_empty() {
            debug!(name, "peer joined without metadata, awaiting descriptor");
            return;
        }
        match NodeDescriptor::decode_meta(meta) {
            Ok(descriptor) => {
                info!(name, addr = %descriptor.addr, "peer joined");
                self.ledger.join(descriptor);
            }
            Err(e) => warn!(name, "dropping join with undecodable metadata: {}", e),
        }
    }

    fn peer_updated(&self, name: &str, meta: &[u8]) {
        match NodeDescriptor::decode_meta(meta) {
            Ok(descriptor) => {
                debug!(name, addr = %descriptor.addr, "peer metadata updated");
                self.ledger.update(descriptor);
            }
            Err(e) => warn!(name, "dropping update with undecodable metadata: {}", e),
        }
    }

    fn peer_left(&self, name: &str, meta: &[u8]) {
        match NodeDescriptor::decode_meta(meta) {
            Ok(descriptor) => {
                info!(name, addr = %descriptor.addr, "peer left");
                self.ledger.leave(descriptor);
            }
            Err(e) => warn!(name, "departed peer left undecodable metadata: {}", e),
        }
    }
}

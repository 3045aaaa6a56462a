//! Gossip Service
//!
//! UDP gossip with SWIM-style failure detection, extended with per-peer
//! metadata blobs. Every ack piggybacks the full peer list so shard
//! descriptors spread without a central registry; a node that changes its own
//! descriptor can additionally push it to every live peer and wait for
//! acknowledgements before acting on the new assignment.

use anyhow::{bail, Result};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use std::{net::SocketAddr, time::Duration};
use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::overlay::{MembershipOverlay, PeerEvents, WaitFuture};
use super::types::{GossipMessage, Peer, PeerName, PeerState};

const GOSSIP_INTERVAL: Duration = Duration::from_millis(500);
const FAILURE_DETECTION_INTERVAL: Duration = Duration::from_secs(2);
const SUSPECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Outstanding convergence wait for one metadata push.
struct PendingAck {
    remaining: AtomicUsize,
    done: Notify,
}

pub struct GossipService {
    pub local_name: PeerName,
    local_addr: SocketAddr,
    local_meta: Mutex<Vec<u8>>,
    pub peers: Arc<DashMap<PeerName, Peer>>,
    socket: Arc<UdpSocket>,
    incarnation: AtomicU64,
    meta_seq: AtomicU64,
    pending_acks: DashMap<u64, Arc<PendingAck>>,
    events: Mutex<Option<Arc<dyn PeerEvents>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl GossipService {
    pub async fn new(
        bind_addr: SocketAddr,
        seed_nodes: Vec<SocketAddr>,
        meta: Vec<u8>,
    ) -> Result<Arc<Self>> {
        let socket = UdpSocket::bind(bind_addr).await?;
        let local_name = PeerName::new();
        let local_peer = Peer {
            name: local_name.clone(),
            addr: bind_addr,
            meta: meta.clone(),
            state: PeerState::Alive,
            incarnation: 1,
            last_seen: Some(Instant::now()),
        };
        let peers = Arc::new(DashMap::new());
        peers.insert(local_name.clone(), local_peer.clone());

        if !seed_nodes.is_empty() {
            info!("joining overlay via {} seed node(s)", seed_nodes.len());

            for seed_node in seed_nodes.iter() {
                let msg = GossipMessage::Join {
                    peer: local_peer.clone(),
                };

                let encoded = bincode::serialize(&msg)?;
                socket.send_to(&encoded, seed_node).await?;
                info!("sent join request to {}", seed_node);
            }
        }

        Ok(Arc::new(Self {
            local_name,
            local_addr: bind_addr,
            local_meta: Mutex::new(meta),
            peers,
            socket: Arc::new(socket),
            incarnation: AtomicU64::new(1),
            meta_seq: AtomicU64::new(0),
            pending_acks: DashMap::new(),
            events: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }))
    }

    /// Installs the peer event sink. Must be called before `start`; events
    /// for peers merged earlier are not replayed.
    pub fn subscribe(&self, sink: Arc<dyn PeerEvents>) {
        *self.events.lock().expect("event sink lock poisoned") = Some(sink);
    }

    pub async fn start(self: Arc<Self>) {
        info!("starting gossip service");

        let gossip_handle = {
            let service = self.clone();
            tokio::spawn(async move {
                service.gossip_loop().await;
            })
        };

        let receive_handle = {
            let service = self.clone();
            tokio::spawn(async move {
                service.receive_loop().await;
            })
        };

        let failure_detection_handle = {
            let service = self.clone();
            tokio::spawn(async move {
                service.failure_detection_loop().await;
            })
        };

        let mut tasks = self.tasks.lock().expect("task list lock poisoned");
        tasks.push(gossip_handle);
        tasks.push(receive_handle);
        tasks.push(failure_detection_handle);

        info!("all gossip background tasks started");
    }

    pub fn get_alive_peers(&self) -> Vec<Peer> {
        self.peers
            .iter()
            .filter(|entry| entry.value().state == PeerState::Alive)
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn remote_alive_peers(&self) -> Vec<Peer> {
        self.peers
            .iter()
            .filter(|entry| {
                entry.value().name != self.local_name && entry.value().state == PeerState::Alive
            })
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn local_peer(&self) -> Peer {
        Peer {
            name: self.local_name.clone(),
            addr: self.local_addr,
            meta: self.local_meta.lock().expect("meta lock poisoned").clone(),
            state: PeerState::Alive,
            incarnation: self.incarnation.load(Ordering::Acquire),
            last_seen: Some(Instant::now()),
        }
    }

    fn emit<F>(&self, fire: F)
    where
        F: FnOnce(&dyn PeerEvents),
    {
        let sink = self.events.lock().expect("event sink lock poisoned");
        if let Some(sink) = sink.as_ref() {
            fire(sink.as_ref());
        }
    }

    async fn gossip_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(GOSSIP_INTERVAL);

        loop {
            interval.tick().await;

            let alive_peers = self.remote_alive_peers();
            if alive_peers.is_empty() {
                continue;
            }

            use rand::Rng;
            let idx = rand::thread_rng().gen_range(0..alive_peers.len());
            let target = &alive_peers[idx];

            let msg = GossipMessage::Ping {
                from: self.local_name.clone(),
                incarnation: self.incarnation.load(Ordering::Acquire),
            };

            if let Ok(encoded) = bincode::serialize(&msg) {
                if let Err(e) = self.socket.send_to(&encoded, target.addr).await {
                    warn!("failed to send ping to {:?}: {}", target.name, e);
                } else {
                    debug!("sent ping to {:?}", target.name);
                }
            } else {
                error!("failed to serialize GossipMessage::Ping");
            }
        }
    }

    async fn receive_loop(self: Arc<Self>) {
        let mut buf = vec![0u8; 65536];

        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, src)) => match bincode::deserialize::<GossipMessage>(&buf[..len]) {
                    Ok(msg) => {
                        if let Err(e) = self.handle_message(msg, src).await {
                            error!("error handling message from {}: {}", src, e);
                        }
                    }
                    Err(e) => {
                        warn!("failed to deserialize message from {}: {}", src, e);
                    }
                },
                Err(e) => {
                    error!("failed to receive UDP packet: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    async fn handle_message(&self, msg: GossipMessage, src: SocketAddr) -> Result<()> {
        match msg {
            GossipMessage::Ping { from, incarnation } => {
                self.handle_ping(from, incarnation, src).await?;
            }

            GossipMessage::Ack {
                from,
                incarnation,
                peers,
            } => {
                self.handle_ack(from, incarnation, peers).await?;
            }

            GossipMessage::Join { peer } => {
                self.handle_join(peer).await?;
            }

            GossipMessage::Leave { name } => {
                self.handle_leave(name);
            }

            GossipMessage::Suspect { name, incarnation } => {
                self.handle_suspect(name, incarnation).await?;
            }

            GossipMessage::Alive { name, incarnation } => {
                self.handle_alive(name, incarnation).await?;
            }

            GossipMessage::MetaUpdate { seq, peer } => {
                self.handle_meta_update(seq, peer, src).await?;
            }

            GossipMessage::MetaAck { seq, from } => {
                self.handle_meta_ack(seq, from);
            }
        }

        Ok(())
    }

    async fn handle_ping(
        &self,
        from: PeerName,
        from_incarnation: u64,
        src: SocketAddr,
    ) -> Result<()> {
        debug!("received ping from {:?}", from);

        if let Some(mut peer) = self.peers.get_mut(&from) {
            peer.last_seen = Some(Instant::now());

            if from_incarnation > peer.incarnation {
                peer.incarnation = from_incarnation;
            }
        } else {
            info!("discovered new peer via ping: {:?} at {}", from, src);

            let new_peer = Peer {
                name: from.clone(),
                addr: src,
                meta: Vec::new(),
                state: PeerState::Alive,
                incarnation: from_incarnation,
                last_seen: Some(Instant::now()),
            };

            self.peers.insert(new_peer.name.clone(), new_peer);
        }

        let mut all_peers: Vec<Peer> = self
            .peers
            .iter()
            .filter(|entry| entry.value().name != self.local_name)
            .map(|entry| entry.value().clone())
            .collect();
        all_peers.push(self.local_peer());

        let reply = GossipMessage::Ack {
            from: self.local_name.clone(),
            incarnation: self.incarnation.load(Ordering::Acquire),
            peers: all_peers,
        };

        let encoded = bincode::serialize(&reply)?;
        self.socket.send_to(&encoded, src).await?;

        debug!("sent ack to {:?} with {} peers", from, self.peers.len());

        Ok(())
    }

    async fn handle_ack(
        &self,
        from: PeerName,
        from_incarnation: u64,
        peers: Vec<Peer>,
    ) -> Result<()> {
        debug!(
            "received ack from {:?} (inc={}) with {} peers",
            from,
            from_incarnation,
            peers.len()
        );

        if let Some(mut peer) = self.peers.get_mut(&from) {
            if from_incarnation > peer.incarnation {
                peer.incarnation = from_incarnation;
            }
            peer.last_seen = Some(Instant::now());
        }

        for peer in peers {
            self.merge_peer(peer);
        }

        Ok(())
    }

    /// Folds a gossiped peer record into the local view. Fires join and
    /// update events as the record introduces a peer or changes its metadata.
    fn merge_peer(&self, incoming: Peer) {
        if incoming.name == self.local_name {
            return;
        }

        match self.peers.get_mut(&incoming.name) {
            Some(mut existing) => {
                if incoming.incarnation > existing.incarnation {
                    debug!(
                        "updating {:?}: inc {} -> {}",
                        incoming.name, existing.incarnation, incoming.incarnation,
                    );

                    let meta_changed =
                        !incoming.meta.is_empty() && incoming.meta != existing.meta;

                    existing.state = incoming.state;
                    existing.incarnation = incoming.incarnation;
                    existing.last_seen = Some(Instant::now());
                    if meta_changed {
                        existing.meta = incoming.meta.clone();
                    }
                    drop(existing);

                    if meta_changed {
                        self.emit(|sink| sink.peer_updated(&incoming.name.0, &incoming.meta));
                    }
                } else if incoming.incarnation == existing.incarnation
                    && incoming.state == PeerState::Alive
                    && existing.state == PeerState::Suspect
                {
                    info!("{:?} refuted suspicion", incoming.name);
                    existing.state = PeerState::Alive;
                    existing.last_seen = Some(Instant::now());
                }
            }
            None => {
                info!("discovered new peer: {:?} at {}", incoming.name, incoming.addr);

                let mut with_timestamp = incoming.clone();
                with_timestamp.last_seen = Some(Instant::now());

                self.peers.insert(with_timestamp.name.clone(), with_timestamp);
                self.emit(|sink| sink.peer_joined(&incoming.name.0, &incoming.meta));
            }
        }
    }

    async fn handle_suspect(&self, name: PeerName, incarnation: u64) -> Result<()> {
        match self.peers.get_mut(&name) {
            Some(mut existing) => {
                if incarnation > existing.incarnation {
                    if name == self.local_name {
                        info!("refuting suspicion against self at {}", existing.addr);
                        let my_incarnation = self.incarnation.fetch_add(1, Ordering::AcqRel) + 1;

                        existing.incarnation = my_incarnation;
                        existing.state = PeerState::Alive;
                        existing.last_seen = Some(Instant::now());
                        drop(existing);

                        let msg = GossipMessage::Alive {
                            name: name.clone(),
                            incarnation: my_incarnation,
                        };
                        self.broadcast_message(msg).await;
                    } else {
                        info!("peer {:?} at {} suspected", existing.name, existing.addr);
                        existing.state = PeerState::Suspect;
                        existing.incarnation = incarnation;
                        existing.last_seen = Some(Instant::now());
                    }
                }
            }
            None => {
                debug!("suspect message for unknown peer {:?}", name);
            }
        }

        Ok(())
    }

    async fn handle_alive(&self, name: PeerName, incarnation: u64) -> Result<()> {
        match self.peers.get_mut(&name) {
            Some(mut existing) => {
                if incarnation > existing.incarnation {
                    info!(
                        "peer {:?} at {} is now alive (inc={})",
                        existing.name, existing.addr, incarnation
                    );
                    existing.state = PeerState::Alive;
                    existing.incarnation = incarnation;
                    existing.last_seen = Some(Instant::now());
                } else if incarnation == existing.incarnation
                    && existing.state == PeerState::Suspect
                {
                    info!(
                        "peer {:?} at {} successfully refuted suspicion",
                        existing.name, existing.addr,
                    );
                    existing.state = PeerState::Alive;
                    existing.incarnation = incarnation;
                    existing.last_seen = Some(Instant::now());
                }
            }
            None => {
                debug!("alive message for unknown peer {:?}", name);
            }
        }

        Ok(())
    }

    async fn handle_join(&self, mut peer: Peer) -> Result<()> {
        info!("peer {:?} joining overlay at {}", peer.name, peer.addr);

        peer.last_seen = Some(Instant::now());

        let name = peer.name.clone();
        let meta = peer.meta.clone();
        self.peers.insert(peer.name.clone(), peer);
        self.emit(|sink| sink.peer_joined(&name.0, &meta));

        info!("overlay size now: {}", self.peers.len());

        Ok(())
    }

    /// A peer announced a graceful departure: drop it immediately instead of
    /// waiting out the suspect/dead timeouts.
    fn handle_leave(&self, name: PeerName) {
        if name == self.local_name {
            return;
        }

        match self.peers.remove(&name) {
            Some((_, peer)) => {
                info!("peer {:?} at {} left the overlay", peer.name, peer.addr);
                self.emit(|sink| sink.peer_left(&name.0, &peer.meta));
            }
            None => {
                debug!("leave message for unknown peer {:?}", name);
            }
        }
    }

    #[cfg(test)]
    pub(crate) async fn handle_join_for_tests(&self, peer: Peer) -> Result<()> {
        self.handle_join(peer).await
    }

    #[cfg(test)]
    pub(crate) fn handle_leave_for_tests(&self, name: PeerName) {
        self.handle_leave(name)
    }

    async fn handle_meta_update(&self, seq: u64, peer: Peer, src: SocketAddr) -> Result<()> {
        debug!("received meta update seq={} from {:?}", seq, peer.name);

        self.merge_peer(peer);

        let reply = GossipMessage::MetaAck {
            seq,
            from: self.local_name.clone(),
        };
        let encoded = bincode::serialize(&reply)?;
        self.socket.send_to(&encoded, src).await?;

        Ok(())
    }

    fn handle_meta_ack(&self, seq: u64, from: PeerName) {
        debug!("received meta ack seq={} from {:?}", seq, from);

        if let Some(pending) = self.pending_acks.get(&seq) {
            // Duplicate acks from a retransmitting peer must not underflow.
            let before = pending
                .remaining
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| v.checked_sub(1));
            if before == Ok(1) {
                pending.done.notify_waiters();
            }
        }
    }

    async fn failure_detection_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(FAILURE_DETECTION_INTERVAL);

        loop {
            interval.tick().await;
            let now = Instant::now();

            let mut messages_to_broadcast = Vec::new();
            let mut departed = Vec::new();

            for mut entry in self.peers.iter_mut() {
                let peer = entry.value_mut();

                if peer.name == self.local_name {
                    continue;
                }

                if let Some(last_seen) = peer.last_seen {
                    let elapsed = now.duration_since(last_seen);

                    match peer.state {
                        PeerState::Alive => {
                            if elapsed > SUSPECT_TIMEOUT {
                                warn!(
                                    "peer {:?} suspected (no contact for {:?})",
                                    peer.name, elapsed
                                );

                                peer.state = PeerState::Suspect;

                                let msg = GossipMessage::Suspect {
                                    name: peer.name.clone(),
                                    incarnation: peer.incarnation,
                                };

                                messages_to_broadcast.push(msg);
                            }
                        }

                        PeerState::Suspect => {
                            if elapsed > DEAD_TIMEOUT {
                                warn!(
                                    "peer {:?} declared dead (no contact for {:?})",
                                    peer.name, elapsed
                                );

                                peer.state = PeerState::Dead;
                                departed.push(peer.name.clone());
                            }
                        }

                        PeerState::Dead => {}
                    }
                } else {
                    peer.last_seen = Some(now);
                }
            }

            // Dead peers leave the cluster view entirely so their shard
            // records stop influencing routing.
            for name in departed {
                let removed = self.peers.remove(&name);
                let meta = removed.map(|(_, p)| p.meta).unwrap_or_default();
                self.emit(|sink| sink.peer_left(&name.0, &meta));
                info!("overlay size now: {} alive peers", self.get_alive_peers().len());
            }

            for msg in messages_to_broadcast {
                self.broadcast_message(msg).await;
            }
        }
    }

    async fn broadcast_message(&self, msg: GossipMessage) {
        if let Ok(encoded) = bincode::serialize(&msg) {
            for entry in self.peers.iter() {
                let peer = entry.value();

                if peer.name == self.local_name {
                    continue;
                }

                if peer.state == PeerState::Alive {
                    if let Err(e) = self.socket.send_to(&encoded, peer.addr).await {
                        warn!("failed to broadcast to {:?}: {}", peer.name, e);
                    }
                }
            }
        }
    }

    async fn push_meta(&self, seq: u64, targets: &[Peer]) -> Result<()> {
        let msg = GossipMessage::MetaUpdate {
            seq,
            peer: self.local_peer(),
        };
        let encoded = bincode::serialize(&msg)?;

        for target in targets {
            if let Err(e) = self.socket.send_to(&encoded, target.addr).await {
                warn!("failed to push meta to {:?}: {}", target.name, e);
            }
        }

        Ok(())
    }

    fn set_local_meta(&self, meta: Vec<u8>) {
        *self.local_meta.lock().expect("meta lock poisoned") = meta.clone();
        let inc = self.incarnation.fetch_add(1, Ordering::AcqRel) + 1;

        if let Some(mut local) = self.peers.get_mut(&self.local_name) {
            local.meta = meta;
            local.incarnation = inc;
            local.last_seen = Some(Instant::now());
        }
    }
}

impl MembershipOverlay for GossipService {
    fn enabled(&self) -> bool {
        true
    }

    fn local_name(&self) -> String {
        self.local_name.0.clone()
    }

    fn update_local(&self, meta: Vec<u8>) {
        self.set_local_meta(meta);

        // Best-effort push; periodic gossip acks carry the blob regardless.
        let seq = self.meta_seq.fetch_add(1, Ordering::AcqRel) + 1;
        let msg = GossipMessage::MetaUpdate {
            seq,
            peer: self.local_peer(),
        };
        if let Ok(encoded) = bincode::serialize(&msg) {
            for target in self.remote_alive_peers() {
                if self.socket.try_send_to(&encoded, target.addr).is_err() {
                    debug!("meta push to {:?} deferred to gossip", target.name);
                }
            }
        }
    }

    fn update_local_and_wait(&self, meta: Vec<u8>, timeout: Duration) -> WaitFuture<'_> {
        Box::pin(async move {
            self.set_local_meta(meta);

            let targets = self.remote_alive_peers();
            if targets.is_empty() {
                return Ok(());
            }

            let seq = self.meta_seq.fetch_add(1, Ordering::AcqRel) + 1;
            let pending = Arc::new(PendingAck {
                remaining: AtomicUsize::new(targets.len()),
                done: Notify::new(),
            });
            self.pending_acks.insert(seq, pending.clone());

            if let Err(e) = self.push_meta(seq, &targets).await {
                self.pending_acks.remove(&seq);
                return Err(e);
            }

            let waited = tokio::time::timeout(timeout, async {
                loop {
                    let notified = pending.done.notified();
                    if pending.remaining.load(Ordering::Acquire) == 0 {
                        break;
                    }
                    notified.await;
                }
            })
            .await;

            self.pending_acks.remove(&seq);

            if waited.is_err() {
                bail!(
                    "metadata update not acknowledged by {} peer(s) within {:?}",
                    pending.remaining.load(Ordering::Acquire),
                    timeout
                );
            }
            Ok(())
        })
    }

    fn close(&self) {
        // Best-effort departure broadcast so peers can drop this node right
        // away instead of waiting out the failure-detection timeouts.
        let msg = GossipMessage::Leave {
            name: self.local_name.clone(),
        };
        if let Ok(encoded) = bincode::serialize(&msg) {
            for target in self.remote_alive_peers() {
                if self.socket.try_send_to(&encoded, target.addr).is_err() {
                    debug!("leave announcement to {:?} not sent", target.name);
                }
            }
        }

        let mut tasks = self.tasks.lock().expect("task list lock poisoned");
        for task in tasks.drain(..) {
            task.abort();
        }
        info!("gossip service closed");
    }
}

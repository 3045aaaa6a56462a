use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Instant;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PeerName(pub String);

impl PeerName {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for PeerName {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum PeerState {
    Alive,
    Suspect,
    Dead,
}

/// One member of the gossip overlay.
///
/// Carries identity, network addressing, lifecycle state, and the opaque
/// metadata blob the peer last published (its shard descriptor). The
/// `incarnation` field is a logical clock used to order updates and resolve
/// conflicts (e.g., refuting a false "Suspect" claim).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Peer {
    pub name: PeerName,
    pub addr: SocketAddr,
    pub meta: Vec<u8>,
    pub state: PeerState,
    pub incarnation: u64,

    #[serde(skip)]
    pub last_seen: Option<Instant>,
}

/// The wire protocol for inter-node gossip.
///
/// - `Ping/Ack`: Liveness checks; acks piggyback the full peer list with
///   metadata, which is how shard assignments disseminate.
/// - `Join`: Sent by new nodes to seed nodes to enter the overlay.
/// - `Leave`: Announces a graceful departure so peers do not have to wait
///   for the suspect/dead timeouts.
/// - `Suspect/Alive`: Disseminates changes in node health.
/// - `MetaUpdate/MetaAck`: Direct push of a changed local metadata blob;
///   the sequence number lets the publisher wait for convergence acks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GossipMessage {
    Ping {
        from: PeerName,
        incarnation: u64,
    },

    Ack {
        from: PeerName,
        incarnation: u64,
        peers: Vec<Peer>,
    },

    Join {
        peer: Peer,
    },

    Leave {
        name: PeerName,
    },

    Suspect {
        name: PeerName,
        incarnation: u64,
    },

    Alive {
        name: PeerName,
        incarnation: u64,
    },

    MetaUpdate {
        seq: u64,
        peer: Peer,
    },

    MetaAck {
        seq: u64,
        from: PeerName,
    },
}

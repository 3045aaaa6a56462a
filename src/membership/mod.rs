//! Membership & Discovery Module
//!
//! Disseminates each node's shard metadata cluster-wide through a Gossip-based
//! membership protocol (inspired by SWIM) and surfaces peer changes to the
//! routing layer as join/leave/update events.
//!
//! ## Core Mechanisms
//! - **Gossip Protocol**: Nodes periodically exchange status updates via UDP;
//!   acks carry the full peer list, including each peer's metadata blob, so
//!   shard assignments spread without a central registry.
//! - **Failure Detection**: "Suspect" -> "Dead" transitions with timeouts; a
//!   dead peer is reported as having left the cluster.
//! - **Incarnation Numbers**: Conflict resolution when node state is disputed
//!   (e.g., refuting a false "Suspect" claim).
//! - **Overlay Trait**: The rest of the system depends on `MembershipOverlay`
//!   only; a disabled stub is the valid degenerate single-node mode.

pub mod overlay;
pub mod service;
pub mod types;

pub use overlay::{DisabledOverlay, MembershipOverlay, PeerEvents};
pub use service::GossipService;

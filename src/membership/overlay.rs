//! Membership Overlay Contract
//!
//! The routing layer never talks to the gossip service directly. It publishes
//! its own shard metadata through `MembershipOverlay` and receives peer
//! lifecycle changes through `PeerEvents`. `DisabledOverlay` is the valid
//! degenerate mode for a node running without gossip: publishing is a no-op
//! and no peers ever appear.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use anyhow::Result;

/// Boxed future for publish-and-wait so the overlay stays object-safe.
pub type WaitFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// What the routing layer needs from a membership substrate.
pub trait MembershipOverlay: Send + Sync {
    /// Whether this node participates in an overlay at all.
    fn enabled(&self) -> bool;

    /// This node's stable overlay identity.
    fn local_name(&self) -> String;

    /// Replaces the local metadata blob and lets gossip spread it
    /// opportunistically. Fire-and-forget.
    fn update_local(&self, meta: Vec<u8>);

    /// Replaces the local metadata blob and pushes it to every known live
    /// peer, resolving once each one acknowledged or the timeout elapsed.
    fn update_local_and_wait(&self, meta: Vec<u8>, timeout: Duration) -> WaitFuture<'_>;

    /// Stops background tasks and leaves the overlay.
    fn close(&self);
}

/// Callbacks the overlay fires as the peer set changes. Each carries the
/// peer's current (for a departure, last known) metadata blob.
pub trait PeerEvents: Send + Sync {
    fn peer_joined(&self, name: &str, meta: &[u8]);
    fn peer_updated(&self, name: &str, meta: &[u8]);
    fn peer_left(&self, name: &str, meta: &[u8]);
}

/// Overlay stub for single-node deployments.
pub struct DisabledOverlay;

impl MembershipOverlay for DisabledOverlay {
    fn enabled(&self) -> bool {
        false
    }

    fn local_name(&self) -> String {
        String::new()
    }

    fn update_local(&self, _meta: Vec<u8>) {}

    fn update_local_and_wait(&self, _meta: Vec<u8>, _timeout: Duration) -> WaitFuture<'_> {
        Box::pin(async { Ok(()) })
    }

    fn close(&self) {}
}

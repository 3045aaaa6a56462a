//! Request Routing Module
//!
//! Decides, per request, whether this node serves a key, redirects the client
//! to the owning node, or rejects the request outright.
//!
//! ## Core Mechanisms
//! - **Ownership Check**: Pure local decision against this node's slot range
//!   and leadership flag; with membership disabled every key is local.
//! - **Cluster Lookup**: Falls through to the slot ledger to resolve the
//!   owning node's API address, surfacing readiness problems as typed errors.
//! - **Command Execution**: Writes go through the replication handle with a
//!   fixed deadline; reads bypass replication and hit the table directly.
//! - **Peer Glue**: Implements `PeerEvents`, translating overlay metadata
//!   into slot ledger mutations.

pub mod context;
pub mod handlers;
pub mod protocol;

pub use context::{RoutingContext, RoutingError};

#[cfg(test)]
mod tests;

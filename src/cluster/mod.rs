//! Slot Ownership Module
//!
//! Maintains the cluster-wide view of which node owns which part of the
//! 16384-slot keyspace, and answers "who serves this key?".
//!
//! ## Core Concepts
//! - **Slots**: Every key hashes to one of 16384 buckets via a CRC-32 checksum
//!   (polynomial `0xD5828281`), the unit of sharding granularity.
//! - **Descriptors**: Each cluster member gossips a `NodeDescriptor` (addresses,
//!   slot range, leadership flag) as an opaque metadata blob.
//! - **Readiness**: After every membership mutation the `SlotLedger` re-derives
//!   whether the leader-owned slot ranges exactly cover the keyspace with no
//!   gaps or overlaps. Routing is refused while they do not.

pub mod ledger;
pub mod slots;
pub mod types;

pub use ledger::SlotLedger;
pub use types::{NodeDescriptor, Readiness};

#[cfg(test)]
mod tests;

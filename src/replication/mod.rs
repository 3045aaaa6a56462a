//! Replication Module
//!
//! Everything between "a client wrote a key" and "every replica's table shows
//! it". The consensus algorithm itself (leader election, log transport) is a
//! black box behind the `ConsensusGroup` trait; this module owns what sits on
//! either side of it:
//!
//! - **`fsm`**: The deterministic state machine that turns committed log
//!   entries into table mutations, plus snapshot capture/persist/restore.
//! - **`group`**: The `ConsensusGroup` contract and `LocalGroup`, the
//!   in-process single-member implementation used for non-networked
//!   deployments and tests.
//! - **`adapter`**: `ReplicationHandle`, the interface the routing layer
//!   consumes — apply-with-timeout, runtime voter join, and non-blocking
//!   leadership-change notification delivery.

pub mod adapter;
pub mod fsm;
pub mod group;

pub use adapter::{leadership_channel, ReplicationHandle};
pub use fsm::StateMachine;
pub use group::{ConsensusGroup, LocalGroup, ReplicationError};

//! Sharded Replicated Key-Value Store Library
//!
//! This library crate defines the core modules that make up the store.
//! It serves as the foundation for the binary executable (`main.rs`).
//!
//! ## Architecture Modules
//! The system is composed of five loosely coupled subsystems:
//!
//! - **`store`**: The local state layer. A single exclusive-lock key-value table
//!   plus the serializable `Command` type that is the unit of replication.
//! - **`replication`**: The consensus-facing layer. The deterministic state machine
//!   that applies committed commands, snapshot/restore support, and the adapter
//!   wrapping a `ConsensusGroup` capability (apply, join, leadership notifications).
//! - **`cluster`**: The slot-ownership ledger. Tracks every known node's slot range,
//!   continuously re-derives whether the 16384-slot keyspace is fully covered,
//!   and resolves a key to its owning node.
//! - **`membership`**: The cluster coordination layer. A UDP gossip overlay
//!   disseminating per-node metadata blobs, behind a `MembershipOverlay` trait
//!   so single-node deployments can run with the overlay disabled.
//! - **`routing`**: The orchestrator. Per-request ownership checks, redirect
//!   decisions, and the HTTP handlers exposing the store to clients.

pub mod cluster;
pub mod config;
pub mod membership;
pub mod replication;
pub mod routing;
pub mod store;

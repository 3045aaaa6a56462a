//! Local Storage Module
//!
//! The authoritative per-process state: a string key-value table guarded by a
//! single exclusive lock, and the `Command` type describing one state transition.
//!
//! ## Core Concepts
//! - **Exclusive locking**: Every table operation, reads included, takes the same
//!   lock. A read on the node that just applied a committed entry is guaranteed
//!   to see that entry's effect.
//! - **Commands**: `Set`/`Delete`/`Get` are the closed set of operations. Commands
//!   are encoded to a stable JSON form because committed log entries are replayed
//!   verbatim by every replica, potentially after a restart.

pub mod command;
pub mod table;

pub use command::Command;
pub use table::KvTable;

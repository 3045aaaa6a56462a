//! Consensus Group Contract
//!
//! The consensus algorithm is an external capability: the rest of the system
//! only needs "replicate these bytes within a deadline", "add a voter", and
//! "tell me when local leadership changes". `LocalGroup` is the in-process,
//! single-member implementation of that contract: committing an entry is
//! applying it to the local state machine, which is exactly the degenerate
//! case of a one-voter replica set.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use super::fsm::StateMachine;

/// Boxed apply future so the group stays object-safe behind `Arc<dyn _>`.
pub type ApplyFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ReplicationError>> + Send + 'a>>;

#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    /// The deadline elapsed before commit was confirmed. The command may
    /// still commit afterwards: callers must treat this as unknown outcome,
    /// never as "definitely did not happen".
    #[error("replication timed out after {0:?} (commit status unknown)")]
    Timeout(Duration),
    #[error("consensus group is not initialized")]
    NotInitialized,
    #[error("consensus group is shut down")]
    Shutdown,
    #[error("command rejected by state machine: {0}")]
    Rejected(String),
}

/// The capability contract a consensus implementation must provide.
pub trait ConsensusGroup: Send + Sync {
    /// Submits a command for replication; resolves once the entry is
    /// committed and applied, or the timeout elapses.
    fn apply(&self, entry: Vec<u8>, timeout: Duration) -> ApplyFuture<'_>;

    /// Adds a new voting member to this shard's replica set at runtime.
    fn add_voter(&self, addr: &str) -> Result<(), ReplicationError>;

    /// Gracefully stops the group. Not guaranteed idempotent; callers own
    /// calling it exactly once.
    fn shutdown(&self) -> Result<(), ReplicationError>;
}

/// In-process single-member consensus group.
///
/// Leadership notifications go out through a bounded channel with `try_send`:
/// a slow consumer drops notifications rather than stalling the group.
pub struct LocalGroup {
    fsm: Arc<StateMachine>,
    voters: Mutex<Vec<String>>,
    bootstrapped: AtomicBool,
    shut_down: AtomicBool,
}

impl LocalGroup {
    /// When `bootstrap` is set, the group starts as a brand-new single-member
    /// replica set with this node as sole voter and immediately queues a
    /// became-leader notification. Otherwise the node waits to be added via
    /// `add_voter` on an existing member.
    pub fn new(fsm: Arc<StateMachine>, notify: mpsc::Sender<bool>, bootstrap: bool) -> Self {
        let group = Self {
            fsm,
            voters: Mutex::new(Vec::new()),
            bootstrapped: AtomicBool::new(bootstrap),
            shut_down: AtomicBool::new(false),
        };

        if bootstrap {
            info!("bootstrapping single-member consensus group");
            if notify.try_send(true).is_err() {
                warn!("leadership notification queue full, dropping");
            }
        }

        group
    }
}

impl ConsensusGroup for LocalGroup {
    fn apply(&self, entry: Vec<u8>, timeout: Duration) -> ApplyFuture<'_> {
        Box::pin(async move {
            if self.shut_down.load(Ordering::Acquire) {
                return Err(ReplicationError::Shutdown);
            }
            if !self.bootstrapped.load(Ordering::Acquire) {
                return Err(ReplicationError::NotInitialized);
            }

            // Single member: commit is local apply.
            let applied = tokio::time::timeout(timeout, async { self.fsm.apply(&entry) })
                .await
                .map_err(|_| ReplicationError::Timeout(timeout))?;

            match applied {
                Some(Err(e)) => Err(ReplicationError::Rejected(e.to_string())),
                _ => Ok(()),
            }
        })
    }

    fn add_voter(&self, addr: &str) -> Result<(), ReplicationError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(ReplicationError::Shutdown);
        }
        if !self.bootstrapped.load(Ordering::Acquire) {
            return Err(ReplicationError::NotInitialized);
        }

        let mut voters = self.voters.lock().expect("voter list lock poisoned");
        if !voters.iter().any(|v| v == addr) {
            voters.push(addr.to_string());
            info!(addr, voters = voters.len(), "voter added to replica set");
        }
        Ok(())
    }

    fn shutdown(&self) -> Result<(), ReplicationError> {
        self.shut_down.store(true, Ordering::Release);
        info!("consensus group shut down");
        Ok(())
    }
}

//! Replication Adapter
//!
//! `ReplicationHandle` is the shape the routing layer consumes: submit bytes
//! with a deadline, add replicas at runtime, subscribe to leadership changes,
//! shut down. Leadership notifications arrive on a bounded channel whose
//! producer never blocks; a dedicated consumer task drains them so a slow
//! callback cannot stall the group's internals.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use rand::Rng;
use tokio::sync::mpsc;
use tracing::warn;

use super::group::{ConsensusGroup, ReplicationError};

/// Depth of the leadership notification queue. Notifications beyond this are
/// dropped; the latest state still arrives because every flip enqueues anew.
const LEADERSHIP_QUEUE_DEPTH: usize = 16;

/// Builds the bounded channel a consensus group publishes leadership changes
/// on. The sender side goes to the group, the receiver to `ReplicationHandle`.
pub fn leadership_channel() -> (mpsc::Sender<bool>, mpsc::Receiver<bool>) {
    mpsc::channel(LEADERSHIP_QUEUE_DEPTH)
}

/// Wraps a `ConsensusGroup` together with its leadership notification stream.
pub struct ReplicationHandle {
    group: Arc<dyn ConsensusGroup>,
    notifications: Mutex<Option<mpsc::Receiver<bool>>>,
}

impl ReplicationHandle {
    pub fn new(group: Arc<dyn ConsensusGroup>, notifications: mpsc::Receiver<bool>) -> Self {
        Self {
            group,
            notifications: Mutex::new(Some(notifications)),
        }
    }

    /// Submits a command for replication, blocking the calling task until
    /// commit or deadline. A timeout is an unknown outcome, not a failure.
    pub async fn apply(&self, entry: Vec<u8>, timeout: Duration) -> Result<(), ReplicationError> {
        self.group.apply(entry, timeout).await
    }

    /// Adds a new voting replica to this shard's group.
    pub fn join(&self, addr: &str) -> Result<(), ReplicationError> {
        self.group.add_voter(addr)
    }

    /// Installs the leadership-change callback. Spawns the consumer task that
    /// drains the notification queue; may be called once per handle.
    pub fn listen<F>(&self, callback: F)
    where
        F: Fn(bool) + Send + 'static,
    {
        let receiver = self
            .notifications
            .lock()
            .expect("notification lock poisoned")
            .take();

        match receiver {
            Some(mut rx) => {
                tokio::spawn(async move {
                    while let Some(is_leader) = rx.recv().await {
                        callback(is_leader);
                    }
                });
            }
            None => warn!("leadership listener already installed, ignoring"),
        }
    }

    pub fn shutdown(&self) -> Result<(), ReplicationError> {
        self.group.shutdown()
    }
}

/// Asks an existing cluster member to add this node to its consensus group,
/// via the member's HTTP join endpoint. Retried with backoff and jitter; the
/// join target may still be starting up when we are.
pub async fn request_join(join_addr: &str, local_addr: &str) -> Result<()> {
    let url = format!("http://{}/join?addr={}", join_addr, local_addr);
    let client = reqwest::Client::new();
    let mut delay_ms = 150u64;
    let attempts = 3;

    for attempt in 0..attempts {
        let response = client
            .get(&url)
            .timeout(Duration::from_secs(2))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            Ok(resp) => {
                if attempt + 1 == attempts {
                    bail!("join request to {} failed: {}", join_addr, resp.status());
                }
            }
            Err(e) => {
                if attempt + 1 == attempts {
                    return Err(e).context(format!("join request to {} failed", join_addr));
                }
            }
        }

        let jitter = rand::thread_rng().gen_range(0..50);
        tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
        delay_ms = (delay_ms * 2).min(1200);
    }

    bail!("join request retry attempts exhausted")
}

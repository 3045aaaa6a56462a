//! Replicated State Machine
//!
//! The apply target the consensus group drives. One lock spans apply,
//! snapshot capture, and restore: a snapshot taken mid-apply would not be a
//! valid consistent point, and a restore racing an apply would lose the entry.
//!
//! An entry that fails to decode is applied as a no-op. The entry is already
//! committed in the group's log by the time it reaches us; rejecting it here
//! would stall the whole apply pipeline, which is worse than ignoring bytes
//! no replica can interpret anyway.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tracing::warn;

use crate::store::{Command, KvTable};

/// Outcome of applying one decoded command.
pub type CommandOutcome = Result<Option<String>>;

/// Deterministic applier: committed log entries in, table mutations out.
/// Identical on every replica of a shard.
pub struct StateMachine {
    gate: Mutex<()>,
    table: Arc<KvTable>,
}

impl StateMachine {
    pub fn new(table: Arc<KvTable>) -> Self {
        Self {
            gate: Mutex::new(()),
            table,
        }
    }

    /// Applies one committed log entry in delivery order.
    ///
    /// Returns `None` when the entry does not decode (logged, no observable
    /// effect); otherwise the command's own outcome, so the submitting caller
    /// can observe command-level errors.
    pub fn apply(&self, entry: &[u8]) -> Option<CommandOutcome> {
        let _gate = self.gate.lock().expect("state machine lock poisoned");

        match Command::decode(entry) {
            Ok(cmd) => Some(cmd.apply(&self.table)),
            Err(e) => {
                warn!("ignoring committed entry that failed to decode: {}", e);
                None
            }
        }
    }

    /// Captures a consistent point-in-time copy of the table. Holding the
    /// apply gate guarantees no apply is in flight while the copy is taken.
    pub fn snapshot(&self) -> TableSnapshot {
        let _gate = self.gate.lock().expect("state machine lock poisoned");

        TableSnapshot {
            data: self.table.dump(),
        }
    }

    /// Replaces the local table wholesale with the decoded stream contents.
    /// The stream is fully consumed before decoding, so it is drained even
    /// when the payload turns out to be malformed.
    pub fn restore(&self, mut reader: impl Read) -> Result<()> {
        let _gate = self.gate.lock().expect("state machine lock poisoned");

        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;

        let data: HashMap<String, String> = serde_json::from_slice(&buf)?;
        self.table.replace(data);
        Ok(())
    }
}

/// A point-in-time capture of the table, ready to be persisted.
pub struct TableSnapshot {
    data: HashMap<String, String>,
}

impl TableSnapshot {
    /// Serializes the captured table into `sink` with a stable encoding.
    /// On any failure the sink is cancelled first so a partial snapshot is
    /// never finalized; on success the sink is closed.
    pub fn persist(&self, sink: &mut dyn SnapshotSink) -> Result<()> {
        let bytes = match serde_json::to_vec(&self.data) {
            Ok(bytes) => bytes,
            Err(e) => {
                if let Err(cancel_err) = sink.cancel() {
                    warn!("failed to cancel snapshot sink: {}", cancel_err);
                }
                return Err(e.into());
            }
        };

        if let Err(e) = sink.write_all(&bytes) {
            if let Err(cancel_err) = sink.cancel() {
                warn!("failed to cancel snapshot sink: {}", cancel_err);
            }
            return Err(e.into());
        }

        sink.close()?;
        Ok(())
    }

    /// Cleanup hook invoked after the persistence lifecycle finishes,
    /// success or not. Nothing to release for an in-memory capture.
    pub fn release(&self) {}

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Destination for a serialized snapshot. `cancel` must discard anything
/// already written; only `close` finalizes the snapshot as valid.
pub trait SnapshotSink {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn close(&mut self) -> io::Result<()>;
    fn cancel(&mut self) -> io::Result<()>;
}

/// In-memory sink, used by tests and restore round-trips.
#[derive(Default)]
pub struct BufferSink {
    pub data: Vec<u8>,
    pub closed: bool,
    pub cancelled: bool,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotSink for BufferSink {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        Ok(())
    }

    fn cancel(&mut self) -> io::Result<()> {
        self.cancelled = true;
        self.data.clear();
        Ok(())
    }
}

/// File-backed sink: writes to a temp path, renames into place on close,
/// removes the temp file on cancel. A crash mid-write leaves only the temp
/// file behind, never a truncated snapshot under the final name.
pub struct FileSnapshotSink {
    tmp_path: PathBuf,
    final_path: PathBuf,
    file: Option<File>,
}

/// File name a finalized snapshot is stored under inside the data directory.
pub const SNAPSHOT_FILE: &str = "snapshot.json";

impl FileSnapshotSink {
    pub fn create(dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let final_path = dir.join(SNAPSHOT_FILE);
        let tmp_path = dir.join(format!("{}.tmp", SNAPSHOT_FILE));
        let file = File::create(&tmp_path)?;

        Ok(Self {
            tmp_path,
            final_path,
            file: Some(file),
        })
    }
}

impl SnapshotSink for FileSnapshotSink {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.write_all(bytes),
            None => Err(io::Error::new(
                io::ErrorKind::Other,
                "snapshot sink already finalized",
            )),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            file.sync_all()?;
            fs::rename(&self.tmp_path, &self.final_path)?;
        }
        Ok(())
    }

    fn cancel(&mut self) -> io::Result<()> {
        if self.file.take().is_some() {
            fs::remove_file(&self.tmp_path)?;
        }
        Ok(())
    }
}

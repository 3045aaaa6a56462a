//! Exclusive-Lock Key-Value Table
//!
//! A plain `HashMap` behind one `Mutex`. Deliberately not a concurrent map:
//! the apply path and the local read path must serialize against each other
//! so a read issued after an apply on the same node observes the write.

use std::collections::HashMap;
use std::sync::Mutex;

/// The local key-value table. Mutated only through `Command` application
/// (or wholesale replacement during snapshot restore).
pub struct KvTable {
    table: Mutex<HashMap<String, String>>,
}

impl KvTable {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
        }
    }

    pub fn set(&self, key: &str, value: &str) {
        let mut table = self.table.lock().expect("kv table lock poisoned");
        table.insert(key.to_string(), value.to_string());
    }

    /// Takes the exclusive lock, not a shared one: read-after-apply visibility
    /// on this node is part of the table's contract.
    pub fn get(&self, key: &str) -> Option<String> {
        let table = self.table.lock().expect("kv table lock poisoned");
        table.get(key).cloned()
    }

    pub fn delete(&self, key: &str) {
        let mut table = self.table.lock().expect("kv table lock poisoned");
        table.remove(key);
    }

    pub fn len(&self) -> usize {
        let table = self.table.lock().expect("kv table lock poisoned");
        table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Point-in-time copy of the whole table. Callers that need a consistent
    /// snapshot must hold the state machine's apply gate around this call.
    pub fn dump(&self) -> HashMap<String, String> {
        let table = self.table.lock().expect("kv table lock poisoned");
        table.clone()
    }

    /// Replaces the entire table. Used by snapshot restore.
    pub fn replace(&self, data: HashMap<String, String>) {
        let mut table = self.table.lock().expect("kv table lock poisoned");
        *table = data;
    }
}

impl Default for KvTable {
    fn default() -> Self {
        Self::new()
    }
}

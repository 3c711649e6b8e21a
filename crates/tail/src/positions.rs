//! Per-client read positions.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Concurrency-safe map from client identity (source IP) to the last byte
/// offset that client has consumed.
///
/// Entries are created lazily on first write and live for the process; the
/// value is a single integer per distinct viewer, so no eviction is needed.
#[derive(Debug, Default)]
pub struct PositionStore {
    inner: Mutex<HashMap<String, u64>>,
}

impl PositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored offset for a client, or 0 when unknown.
    pub fn get(&self, client: &str) -> u64 {
        let map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let offset = map.get(client).copied().unwrap_or(0);
        tracing::debug!(client, offset, "position lookup");
        offset
    }

    /// Records the latest offset for a client.
    pub fn set(&self, client: &str, offset: u64) {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.insert(client.to_string(), offset);
        tracing::debug!(client, offset, entries = map.len(), "position stored");
    }

    /// Number of distinct clients tracked.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

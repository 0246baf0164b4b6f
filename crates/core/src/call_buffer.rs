//! Accumulation of streamed tool-call argument fragments.

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// The raw argument text received so far for one call identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct CallBuffer {
    pub call_id: String,
    /// Tool name resolved on an earlier fragment. Later fragments may omit it.
    pub name: String,
    pub raw: String,
    pub opened_at: Instant,
}

/// Owns every live `CallBuffer`, one per call identifier.
#[derive(Debug, Default)]
pub struct CallBufferStore {
    buffers: HashMap<String, CallBuffer>,
}

impl CallBufferStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `fragment` to the buffer for `call_id`, opening it if needed.
    ///
    /// Fragments are appended in the order this is called; the name given when
    /// the buffer is opened sticks for its whole lifetime.
    pub fn append(&mut self, call_id: &str, name: &str, fragment: &str, now: Instant) {
        self.buffers
            .entry(call_id.to_string())
            .or_insert_with(|| CallBuffer {
                call_id: call_id.to_string(),
                name: name.to_string(),
                raw: String::new(),
                opened_at: now,
            })
            .raw
            .push_str(fragment);
    }

    pub fn remembered_name(&self, call_id: &str) -> Option<&str> {
        self.buffers.get(call_id).map(|b| b.name.as_str())
    }

    pub fn get(&self, call_id: &str) -> Option<&CallBuffer> {
        self.buffers.get(call_id)
    }

    /// Removes and returns the buffer for `call_id`.
    pub fn take(&mut self, call_id: &str) -> Option<CallBuffer> {
        self.buffers.remove(call_id)
    }

    /// Drops every buffer opened more than `ttl` before `now`.
    pub fn expire(&mut self, now: Instant, ttl: Duration) -> Vec<CallBuffer> {
        let stale: Vec<String> = self
            .buffers
            .values()
            .filter(|b| now.saturating_duration_since(b.opened_at) > ttl)
            .map(|b| b.call_id.clone())
            .collect();
        stale
            .iter()
            .filter_map(|id| self.buffers.remove(id))
            .collect()
    }

    /// Discards everything, returning how many buffers were live.
    pub fn clear(&mut self) -> usize {
        let n = self.buffers.len();
        self.buffers.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

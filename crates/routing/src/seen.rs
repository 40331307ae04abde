//! Time-bounded cache of recently processed message ids.

use std::collections::HashMap;

/// Suppresses duplicates and forwarding loops.
///
/// Ids expire after the configured window; an id seen again after expiry is
/// treated as new.
#[derive(Debug)]
pub struct SeenCache {
    entries: HashMap<String, u64>,
    window_ms: u64,
}

impl SeenCache {
    pub fn new(window_ms: u64) -> Self {
        Self {
            entries: HashMap::new(),
            window_ms,
        }
    }

    /// Record a sighting. Returns `true` if this is the first time the id
    /// is seen within the window.
    pub fn observe(&mut self, id: &str, now: u64) -> bool {
        match self.entries.get(id) {
            Some(&seen_at) if now.saturating_sub(seen_at) <= self.window_ms => false,
            _ => {
                self.entries.insert(id.to_string(), now);
                true
            }
        }
    }

    /// Periodic sweep removing expired ids. Tolerates no pending work.
    pub fn prune(&mut self, now: u64) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, &mut seen_at| now.saturating_sub(seen_at) <= self.window_ms);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

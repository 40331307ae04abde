//! Delivery acknowledgment tracking.
//!
//! The tracker is a liveness watchdog, not a retransmission layer. When an
//! acknowledgment deadline passes, the timer is re-armed and the attempt
//! counted; the message itself is never sent again. Once the retry budget is
//! exhausted a `DeliveryFailed` event is emitted so higher layers can react.

use sovra_core::{EventBus, NodeEvent};
use std::collections::HashMap;

#[derive(Debug)]
struct PendingDelivery {
    destination: String,
    deadline: u64,
    attempts: u32,
}

/// Tracks outgoing messages awaiting acknowledgment.
#[derive(Debug)]
pub struct DeliveryTracker {
    pending: HashMap<String, PendingDelivery>,
    ack_timeout_ms: u64,
    max_retries: u32,
    bus: EventBus,
}

impl DeliveryTracker {
    pub fn new(ack_timeout_ms: u64, max_retries: u32, bus: EventBus) -> Self {
        Self {
            pending: HashMap::new(),
            ack_timeout_ms,
            max_retries,
            bus,
        }
    }

    /// Start watching a sent message for an acknowledgment.
    pub fn track(&mut self, message_id: impl Into<String>, destination: impl Into<String>, now: u64) {
        self.pending.insert(
            message_id.into(),
            PendingDelivery {
                destination: destination.into(),
                deadline: now + self.ack_timeout_ms,
                attempts: 0,
            },
        );
    }

    /// Record an acknowledgment. Returns `false` for unknown or already
    /// acknowledged ids.
    pub fn acknowledge(&mut self, message_id: &str) -> bool {
        self.pending.remove(message_id).is_some()
    }

    /// Advance all pending timers. Expired entries get their timer re-armed
    /// and their attempt counted; entries past the retry budget are dropped
    /// with a `DeliveryFailed` event. Returns the ids that failed this sweep.
    pub fn sweep(&mut self, now: u64) -> Vec<String> {
        let mut failed = Vec::new();

        for (id, entry) in self.pending.iter_mut() {
            if entry.deadline > now {
                continue;
            }
            entry.attempts += 1;
            if entry.attempts > self.max_retries {
                failed.push(id.clone());
            } else {
                entry.deadline = now + self.ack_timeout_ms;
                tracing::debug!(
                    message_id = %id,
                    destination = %entry.destination,
                    attempt = entry.attempts,
                    "acknowledgment overdue, re-arming timer"
                );
            }
        }

        for id in &failed {
            if let Some(entry) = self.pending.remove(id) {
                tracing::warn!(
                    message_id = %id,
                    destination = %entry.destination,
                    attempts = entry.attempts,
                    "delivery failed, retry budget exhausted"
                );
                self.bus.emit(NodeEvent::DeliveryFailed {
                    message_id: id.clone(),
                    attempts: entry.attempts,
                });
            }
        }

        failed
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

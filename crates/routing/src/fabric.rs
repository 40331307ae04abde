//! The routing fabric: send paths and the receive state machine.

use crate::delivery::DeliveryTracker;
use crate::error::{RoutingError, RoutingResult};
use crate::message::{MessageType, RoutedMessage, BROADCAST_RECIPIENT};
use crate::seen::SeenCache;
use crate::table::RoutingTable;
use sovra_core::{time::now_ms, EventBus, Identity, KeyDirectory, NodeEvent, RoutingConfig};
use std::sync::Arc;

/// Outcome of processing one incoming message.
///
/// Every terminal state of the receive pipeline is a variant here rather
/// than an error, so callers can log and count every path uniformly.
#[derive(Debug)]
pub enum ReceiveAction {
    /// Message was addressed to this node and accepted
    Delivered {
        message_id: String,
        payload: serde_json::Value,
    },
    /// Message was re-signed and is ready to send to `next_hop`
    Forwarded {
        message: Box<RoutedMessage>,
        next_hop: String,
    },
    /// Already processed within the seen window
    Duplicate,
    /// Hop budget exhausted before reaching the destination
    Expired,
    /// A structural or signature check failed
    Invalid { reason: String },
    /// No table entry or discoverable path toward the destination
    NoRoute,
    /// Dropped by local policy
    Dropped { reason: String },
}

/// Per-node routing engine.
///
/// Owns the routing table, the seen cache, and the delivery tracker. Hop
/// signature verification resolves signer keys through the registered key
/// directories in order, falling back to the local identity for the node's
/// own hops.
pub struct RoutingFabric<I: Identity> {
    identity: Arc<I>,
    config: RoutingConfig,
    bus: EventBus,
    table: RoutingTable,
    seen: SeenCache,
    tracker: DeliveryTracker,
    directories: Vec<Arc<dyn KeyDirectory>>,
}

impl<I: Identity> RoutingFabric<I> {
    pub fn new(identity: Arc<I>, config: RoutingConfig, bus: EventBus) -> Self {
        let table = RoutingTable::new(config.route_lifetime_ms, bus.clone());
        let seen = SeenCache::new(config.seen_cache_window_ms);
        let tracker = DeliveryTracker::new(
            config.ack_timeout_ms,
            config.max_delivery_retries,
            bus.clone(),
        );
        Self {
            identity,
            config,
            bus,
            table,
            seen,
            tracker,
            directories: Vec::new(),
        }
    }

    /// Register a key directory consulted during hop verification.
    /// Directories are tried in registration order.
    pub fn add_key_directory(&mut self, directory: Arc<dyn KeyDirectory>) {
        self.directories.push(directory);
    }

    pub fn table(&mut self) -> &mut RoutingTable {
        &mut self.table
    }

    /// Point-to-point message for a directly reachable peer.
    pub fn send_direct(
        &mut self,
        to: impl Into<String>,
        payload: serde_json::Value,
    ) -> RoutingResult<RoutedMessage> {
        self.send(MessageType::Direct, to.into(), payload)
    }

    /// Point-to-point message through intermediate hops. Fails up front when
    /// neither the table nor path discovery knows a way to the destination.
    pub fn send_routed(
        &mut self,
        to: impl Into<String>,
        payload: serde_json::Value,
    ) -> RoutingResult<RoutedMessage> {
        let to = to.into();
        if self.table.get_route(&to).is_none() && self.table.find_path(&to).is_none() {
            return Err(RoutingError::NoRoute { destination: to });
        }
        self.send(MessageType::Routed, to, payload)
    }

    /// Wildcard message for all reachable peers.
    pub fn broadcast(&mut self, payload: serde_json::Value) -> RoutingResult<RoutedMessage> {
        self.send(MessageType::Broadcast, BROADCAST_RECIPIENT.to_string(), payload)
    }

    /// Wildcard message forwarded until TTL exhaustion.
    pub fn flood(&mut self, payload: serde_json::Value) -> RoutingResult<RoutedMessage> {
        self.send(MessageType::Flood, BROADCAST_RECIPIENT.to_string(), payload)
    }

    fn send(
        &mut self,
        kind: MessageType,
        to: String,
        payload: serde_json::Value,
    ) -> RoutingResult<RoutedMessage> {
        let mut message = RoutedMessage::new(
            kind,
            self.identity.node_id(),
            to,
            payload,
            self.config.default_ttl,
        );
        if self.config.require_signatures {
            message.sign_last_hop(self.identity.as_ref())?;
        }

        // Own messages enter the seen cache so an echo is a duplicate
        self.seen.observe(&message.id, now_ms());

        if matches!(kind, MessageType::Direct | MessageType::Routed) {
            self.tracker.track(&message.id, &message.to, now_ms());
        }

        tracing::debug!(
            message_id = %message.id,
            to = %message.to,
            ttl = message.ttl,
            "message constructed"
        );
        self.bus.emit(NodeEvent::MessageSent {
            message_id: message.id.clone(),
            to: message.to.clone(),
        });
        Ok(message)
    }

    /// Process an incoming message.
    ///
    /// Checks run in a fixed order: duplicate suppression, TTL, hop
    /// signatures, then local delivery or forwarding. Each check short
    /// circuits into its own action.
    pub fn receive(&mut self, mut message: RoutedMessage) -> ReceiveAction {
        let now = now_ms();

        if !self.seen.observe(&message.id, now) {
            return ReceiveAction::Duplicate;
        }

        if message.ttl == 0 {
            tracing::debug!(message_id = %message.id, "hop budget exhausted");
            return ReceiveAction::Expired;
        }

        if self.config.require_signatures {
            if message.signatures.is_empty() {
                return ReceiveAction::Invalid {
                    reason: "unsigned message".to_string(),
                };
            }
            if let Err(e) = message.verify_hops(self.identity.as_ref(), |node_id| {
                self.resolve_signing_key(node_id)
            }) {
                self.bus.emit(NodeEvent::Warning {
                    component: "routing".to_string(),
                    detail: format!("rejected message {}: {e}", message.id),
                });
                return ReceiveAction::Invalid {
                    reason: e.to_string(),
                };
            }
        }

        if message.to == self.identity.node_id() || message.to == BROADCAST_RECIPIENT {
            // Clears the watchdog when a tracked message loops back around
            self.tracker.acknowledge(&message.id);
            self.bus.emit(NodeEvent::MessageDelivered {
                message_id: message.id.clone(),
                from: message.from.clone(),
            });
            return ReceiveAction::Delivered {
                message_id: message.id,
                payload: message.payload,
            };
        }

        if !self.config.forwarding_enabled {
            return ReceiveAction::Dropped {
                reason: "forwarding disabled".to_string(),
            };
        }
        if message.hop_count() >= self.config.max_hops {
            return ReceiveAction::Dropped {
                reason: "hop limit reached".to_string(),
            };
        }

        let next_hop = match self.table.get_route(&message.to) {
            Some(route) => route.next_hop.clone(),
            None => match self.table.find_path(&message.to) {
                Some(path) if !path.is_empty() => path[0].clone(),
                _ => return ReceiveAction::NoRoute,
            },
        };

        // Decrement before recording our hop so the signed TTL matches what
        // the next receiver observes
        message.ttl -= 1;
        message.append_hop(self.identity.node_id());
        if self.config.require_signatures {
            if let Err(e) = message.sign_last_hop(self.identity.as_ref()) {
                return ReceiveAction::Invalid {
                    reason: format!("could not sign forwarding hop: {e}"),
                };
            }
        }

        self.bus.emit(NodeEvent::MessageForwarded {
            message_id: message.id.clone(),
            next_hop: next_hop.clone(),
            ttl: message.ttl,
        });
        ReceiveAction::Forwarded {
            message: Box::new(message),
            next_hop,
        }
    }

    /// Record an acknowledgment for a tracked delivery.
    pub fn acknowledge_delivery(&mut self, message_id: &str) -> bool {
        self.tracker.acknowledge(message_id)
    }

    /// Periodic maintenance: delivery timers, seen cache, route expiry.
    /// Returns the message ids whose delivery failed this sweep.
    pub fn sweep(&mut self) -> Vec<String> {
        let now = now_ms();
        let failed = self.tracker.sweep(now);
        self.seen.prune(now);
        self.table.prune_expired();
        failed
    }

    pub fn pending_deliveries(&self) -> usize {
        self.tracker.pending_count()
    }

    fn resolve_signing_key(&self, node_id: &str) -> Option<[u8; 32]> {
        for directory in &self.directories {
            if let Some(key) = directory.signing_key_for(node_id) {
                return Some(key);
            }
        }
        if node_id == self.identity.node_id() {
            return Some(self.identity.signing_public_key());
        }
        None
    }
}

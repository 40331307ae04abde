//! Event notifications for fabric state transitions.
//!
//! The channel, routing, and trust components announce their state changes
//! on a shared broadcast bus. Consumers (observability, autonomous layers)
//! subscribe; emitters never block on subscriber completion, and events for
//! which no subscriber exists are silently discarded.

use tokio::sync::broadcast;

/// Default buffer per subscriber before lagging receivers drop events.
const DEFAULT_CAPACITY: usize = 256;

/// State-transition notifications emitted by the fabric components.
#[derive(Debug, Clone)]
pub enum NodeEvent {
    /// Secure channel established with a peer
    ChannelOpened { channel_id: String, peer_id: String },
    /// Secure channel closed; uptime measured from open
    ChannelClosed {
        channel_id: String,
        peer_id: String,
        reason: String,
        uptime_ms: u64,
    },
    /// Rekey initiated on a channel
    ChannelRekeyStarted { channel_id: String, old_epoch: u64 },
    /// Rekey finished; channel now encrypts under the new epoch
    ChannelRekeyCompleted { channel_id: String, new_epoch: u64 },
    /// Cryptographic failure on a channel
    ChannelError { channel_id: String, detail: String },
    /// Message decrypted on a channel
    ChannelMessage { channel_id: String, epoch: u64 },

    /// Route inserted into the routing table
    RouteAdded {
        destination: String,
        next_hop: String,
        metric: u32,
    },
    /// Route removed (expired or superseded)
    RouteRemoved { destination: String },
    /// Outgoing message constructed and signed
    MessageSent { message_id: String, to: String },
    /// Message forwarded toward its destination
    MessageForwarded {
        message_id: String,
        next_hop: String,
        ttl: u32,
    },
    /// Message delivered locally
    MessageDelivered { message_id: String, from: String },
    /// Acknowledgment never arrived after all retries
    DeliveryFailed { message_id: String, attempts: u32 },

    /// Peer added to the trust store
    TrustPeerAdded { peer_id: String, level: u8 },
    /// Peer removed from the trust store
    TrustPeerRemoved { peer_id: String },
    /// Peer trust level or metadata changed
    TrustPeerUpdated { peer_id: String, level: u8 },
    /// Sync round finished
    TrustSyncCompleted {
        applied: usize,
        duplicates: usize,
        rejected: usize,
    },

    /// Non-fatal anomaly worth surfacing to operators
    Warning { component: String, detail: String },
}

/// Broadcast bus connecting fabric components to their observers.
///
/// Cloning is cheap; all clones share the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<NodeEvent>,
}

impl EventBus {
    /// Create a bus with the default per-subscriber capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus with an explicit per-subscriber capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event. Never blocks; a missing subscriber is not an error.
    pub fn emit(&self, event: NodeEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_is_ok() {
        let bus = EventBus::new();
        bus.emit(NodeEvent::Warning {
            component: "test".to_string(),
            detail: "no one listening".to_string(),
        });
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(NodeEvent::RouteAdded {
            destination: "node-b".to_string(),
            next_hop: "node-c".to_string(),
            metric: 2,
        });

        match rx.recv().await.unwrap() {
            NodeEvent::RouteAdded {
                destination,
                next_hop,
                metric,
            } => {
                assert_eq!(destination, "node-b");
                assert_eq!(next_hop, "node-c");
                assert_eq!(metric, 2);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers_see_same_event() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(NodeEvent::TrustPeerRemoved {
            peer_id: "peer-x".to_string(),
        });

        assert!(matches!(
            rx1.recv().await.unwrap(),
            NodeEvent::TrustPeerRemoved { .. }
        ));
        assert!(matches!(
            rx2.recv().await.unwrap(),
            NodeEvent::TrustPeerRemoved { .. }
        ));
    }
}

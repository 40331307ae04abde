//! Multi-node routing with trust-store-backed signature verification.

use sovra_core::{EventBus, Identity, NodeKeys, RoutingConfig};
use sovra_routing::{ReceiveAction, RoutingFabric};
use sovra_trust::{PeerRecord, TrustLevel, TrustStore};
use std::sync::Arc;

/// Trust store holding the signing keys of every listed node.
fn directory_of(nodes: &[&NodeKeys]) -> Arc<TrustStore> {
    let mut store = TrustStore::in_memory();
    for node in nodes {
        store
            .upsert_peer(PeerRecord::new(
                node.node_id(),
                node.signing_public_key(),
                node.exchange_public_key(),
                TrustLevel::Medium,
                0,
            ))
            .unwrap();
    }
    Arc::new(store)
}

fn fabric(keys: Arc<NodeKeys>, directory: Arc<TrustStore>) -> RoutingFabric<NodeKeys> {
    let mut fabric = RoutingFabric::new(keys, RoutingConfig::default(), EventBus::new());
    fabric.add_key_directory(directory);
    fabric
}

#[test]
fn message_crosses_a_three_node_chain() {
    let alice = Arc::new(NodeKeys::generate("node-a"));
    let relay = Arc::new(NodeKeys::generate("node-r"));
    let bob = Arc::new(NodeKeys::generate("node-b"));
    let directory = directory_of(&[&alice, &relay, &bob]);

    let mut fabric_a = fabric(alice, directory.clone());
    let mut fabric_r = fabric(relay, directory.clone());
    let mut fabric_b = fabric(bob, directory);

    fabric_a.table().add_route("node-b", "node-r", 2, vec![]);
    fabric_r.table().add_route("node-b", "node-b", 1, vec![]);

    let msg = fabric_a
        .send_routed("node-b", serde_json::json!({"op": "ping"}))
        .unwrap();
    let sent_id = msg.id.clone();

    let forwarded = match fabric_r.receive(msg) {
        ReceiveAction::Forwarded { message, next_hop } => {
            assert_eq!(next_hop, "node-b");
            *message
        }
        other => panic!("relay did not forward: {other:?}"),
    };

    match fabric_b.receive(forwarded) {
        ReceiveAction::Delivered {
            message_id,
            payload,
        } => {
            assert_eq!(message_id, sent_id);
            assert_eq!(payload, serde_json::json!({"op": "ping"}));
        }
        other => panic!("destination did not deliver: {other:?}"),
    }
}

#[test]
fn relay_tampering_is_caught_downstream() {
    let alice = Arc::new(NodeKeys::generate("node-a"));
    let relay = Arc::new(NodeKeys::generate("node-r"));
    let bob = Arc::new(NodeKeys::generate("node-b"));
    let directory = directory_of(&[&alice, &relay, &bob]);

    let mut fabric_a = fabric(alice, directory.clone());
    let mut fabric_r = fabric(relay, directory.clone());
    let mut fabric_b = fabric(bob, directory);

    fabric_a.table().add_route("node-b", "node-r", 2, vec![]);
    fabric_r.table().add_route("node-b", "node-b", 1, vec![]);

    let msg = fabric_a
        .send_routed("node-b", serde_json::json!("honest payload"))
        .unwrap();

    let mut forwarded = match fabric_r.receive(msg) {
        ReceiveAction::Forwarded { message, .. } => *message,
        other => panic!("relay did not forward: {other:?}"),
    };
    // Relay rewrites the payload after signing
    forwarded.payload = serde_json::json!("forged payload");

    assert!(matches!(
        fabric_b.receive(forwarded),
        ReceiveAction::Invalid { .. }
    ));
}

#[test]
fn ttl_runs_out_along_a_long_chain() {
    let alice = Arc::new(NodeKeys::generate("node-a"));
    let bob = Arc::new(NodeKeys::generate("node-b"));
    let directory = directory_of(&[&alice, &bob]);

    let mut config = RoutingConfig::default();
    config.default_ttl = 1;
    let mut fabric_a = RoutingFabric::new(alice, config, EventBus::new());
    fabric_a.add_key_directory(directory.clone());
    fabric_a.table().add_route("node-z", "node-b", 5, vec![]);

    let mut fabric_b = fabric(bob, directory);
    fabric_b.table().add_route("node-z", "node-z", 1, vec![]);

    let msg = fabric_a
        .send_routed("node-z", serde_json::json!(0))
        .unwrap();

    // The relay spends the last TTL unit forwarding
    let forwarded = match fabric_b.receive(msg) {
        ReceiveAction::Forwarded { message, .. } => *message,
        other => panic!("relay did not forward: {other:?}"),
    };
    assert_eq!(forwarded.ttl, 0);

    // Whoever receives it next declares it expired
    let carol = Arc::new(NodeKeys::generate("node-z"));
    let mut fabric_z = fabric(carol, directory_of(&[]));
    assert!(matches!(fabric_z.receive(forwarded), ReceiveAction::Expired));
}

#[test]
fn echoed_message_is_a_duplicate_at_the_sender() {
    let alice = Arc::new(NodeKeys::generate("node-a"));
    let bob = Arc::new(NodeKeys::generate("node-b"));
    let directory = directory_of(&[&alice, &bob]);

    let mut fabric_a = fabric(alice, directory);
    let msg = fabric_a.broadcast(serde_json::json!("hello all")).unwrap();

    // The sender's own broadcast comes back around
    assert!(matches!(fabric_a.receive(msg), ReceiveAction::Duplicate));
}

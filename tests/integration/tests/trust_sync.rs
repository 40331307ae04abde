//! Trust state convergence between node replicas.

use sovra_core::{EventBus, NodeEvent, NodeKeys, TrustConfig};
use sovra_trust::{IngestOutcome, TrustLevel, TrustSync};
use std::sync::Arc;

fn replica(node_id: &str, bus: EventBus) -> TrustSync<NodeKeys> {
    TrustSync::new(
        Arc::new(NodeKeys::generate(node_id)),
        TrustConfig::default(),
        bus,
    )
}

#[tokio::test]
async fn fresh_node_pulls_full_trust_state() -> anyhow::Result<()> {
    let mut replica_a = replica("node-a", EventBus::new());
    replica_a.add_peer("peer-p", [1u8; 32], [2u8; 32], TrustLevel::Medium)?;
    replica_a.set_trust_level("peer-p", TrustLevel::High)?;

    // node-b starts from a completely empty trust store
    let bus = EventBus::new();
    let mut rx = bus.subscribe();
    let mut replica_b = replica("node-b", bus);

    let report = replica_b.sync_from(&replica_a, 0)?;
    assert_eq!(report.applied, 2);
    assert_eq!(report.rejected, 0);
    assert_eq!(replica_b.store().level_of("peer-p"), TrustLevel::High);

    let mut sync_events = 0;
    while let Ok(event) = rx.try_recv() {
        if let NodeEvent::TrustSyncCompleted {
            applied, rejected, ..
        } = event
        {
            assert_eq!(applied, 2);
            assert_eq!(rejected, 0);
            sync_events += 1;
        }
    }
    assert_eq!(sync_events, 1);
    Ok(())
}

#[test]
fn repeated_sync_rounds_converge() {
    let mut replica_a = replica("node-a", EventBus::new());
    replica_a
        .add_peer("peer-x", [1u8; 32], [2u8; 32], TrustLevel::Low)
        .unwrap();

    let mut replica_b = replica("node-b", EventBus::new());
    replica_b.sync_from(&replica_a, 0).unwrap();

    // The level changes upstream; the sequence watermark keeps the
    // already-applied update off the wire next round
    replica_a
        .set_trust_level("peer-x", TrustLevel::Ultimate)
        .unwrap();
    let report = replica_b.sync_from(&replica_a, 0).unwrap();

    assert_eq!(report.applied, 1);
    assert_eq!(report.duplicates, 0);
    assert_eq!(replica_b.store().level_of("peer-x"), TrustLevel::Ultimate);
}

#[test]
fn forged_updates_do_not_spread() {
    let mut replica_a = replica("node-a", EventBus::new());
    let mut update = replica_a
        .add_peer("peer-x", [1u8; 32], [2u8; 32], TrustLevel::Low)
        .unwrap();
    // Attacker escalates the level in transit
    update.trust_level = Some(TrustLevel::Ultimate);

    let mut replica_b = replica("node-b", EventBus::new());
    assert!(matches!(
        replica_b.ingest(update).unwrap(),
        IngestOutcome::Rejected { .. }
    ));
    assert_eq!(replica_b.store().level_of("peer-x"), TrustLevel::Unknown);
}

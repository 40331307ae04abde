//! End-to-end secure channel session between two nodes.

use sovra_channel::{ChannelState, CloseReason, SecureChannel};
use sovra_core::{ChannelConfig, EventBus, Identity, NodeEvent, NodeKeys};

fn session_pair(config: ChannelConfig, bus: EventBus) -> (SecureChannel, SecureChannel) {
    let alice = NodeKeys::generate("alice");
    let bob = NodeKeys::generate("bob");

    let chan_a = SecureChannel::open(
        &alice,
        "bob",
        &bob.exchange_public_key(),
        config.clone(),
        bus.clone(),
    )
    .unwrap();
    let chan_b =
        SecureChannel::open(&bob, "alice", &alice.exchange_public_key(), config, bus).unwrap();
    (chan_a, chan_b)
}

#[tokio::test]
async fn session_with_mid_stream_rekey() -> anyhow::Result<()> {
    let config = ChannelConfig {
        rekey_message_threshold: 3,
        ..ChannelConfig::default()
    };
    let bus = EventBus::new();
    let mut rx = bus.subscribe();
    let (mut chan_a, mut chan_b) = session_pair(config, bus);

    // Three messages under epoch 0
    for i in 0..3 {
        let plaintext = format!("message {i}");
        let envelope = chan_a.send(plaintext.as_bytes())?;
        assert_eq!(envelope.epoch, 0);
        assert_eq!(chan_b.receive(&envelope)?, plaintext.as_bytes());
    }

    // The fourth send crosses the threshold; both sides advance in step
    chan_b.rekey()?;
    let envelope = chan_a.send(b"message 3")?;
    assert_eq!(envelope.epoch, 1);
    assert_eq!(chan_b.receive(&envelope)?, b"message 3");

    let envelope = chan_a.send(b"message 4")?;
    assert_eq!(envelope.epoch, 1);
    assert_eq!(chan_b.receive(&envelope)?, b"message 4");

    // Exactly one rekey per side was announced
    let mut started = 0;
    let mut completed = 0;
    while let Ok(event) = rx.try_recv() {
        match event {
            NodeEvent::ChannelRekeyStarted { .. } => started += 1,
            NodeEvent::ChannelRekeyCompleted { new_epoch, .. } => {
                assert_eq!(new_epoch, 1);
                completed += 1;
            }
            _ => {}
        }
    }
    assert_eq!(started, 2);
    assert_eq!(completed, 2);
    Ok(())
}

#[test]
fn receiver_in_transition_window_accepts_previous_epoch() {
    let (mut chan_a, mut chan_b) = session_pair(ChannelConfig::default(), EventBus::new());

    // An envelope encrypted just before the receiver rekeys
    let stale = chan_a.send(b"in flight").unwrap();
    chan_b.rekey().unwrap();

    assert_eq!(chan_b.receive(&stale).unwrap(), b"in flight");
}

#[test]
fn close_is_terminal() {
    let (mut chan_a, _chan_b) = session_pair(ChannelConfig::default(), EventBus::new());

    chan_a.close(CloseReason::Normal);
    assert_eq!(chan_a.state(), ChannelState::Closed);
    assert!(chan_a.send(b"too late").is_err());
}

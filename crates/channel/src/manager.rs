//! Per-peer channel registry with a periodic rekey sweep.

use crate::channel::{ChannelState, CloseReason, SecureChannel};
use crate::error::ChannelResult;
use sovra_core::{time::now_ms, ChannelConfig, EventBus, Identity};
use std::collections::HashMap;
use std::sync::Arc;

/// Owns every secure channel on this node, keyed by peer id.
///
/// Channels are mutated only through the manager; other components hold
/// peer ids, never channel references.
pub struct ChannelManager<I: Identity> {
    identity: Arc<I>,
    config: ChannelConfig,
    bus: EventBus,
    channels: HashMap<String, SecureChannel>,
}

impl<I: Identity> ChannelManager<I> {
    pub fn new(identity: Arc<I>, config: ChannelConfig, bus: EventBus) -> Self {
        Self {
            identity,
            config,
            bus,
            channels: HashMap::new(),
        }
    }

    /// Open a channel to a peer, or return the existing open one.
    pub fn open_channel(
        &mut self,
        peer_id: &str,
        peer_exchange_key: &[u8; 32],
    ) -> ChannelResult<&mut SecureChannel> {
        let reopen = match self.channels.get(peer_id) {
            Some(existing) => existing.state() == ChannelState::Closed,
            None => true,
        };

        if reopen {
            let channel = SecureChannel::open(
                self.identity.as_ref(),
                peer_id,
                peer_exchange_key,
                self.config.clone(),
                self.bus.clone(),
            )?;
            self.channels.insert(peer_id.to_string(), channel);
        }

        self.channels.get_mut(peer_id).ok_or_else(|| {
            crate::error::ChannelError::InvalidState("channel registry out of sync".to_string())
        })
    }

    pub fn channel(&self, peer_id: &str) -> Option<&SecureChannel> {
        self.channels.get(peer_id)
    }

    pub fn channel_mut(&mut self, peer_id: &str) -> Option<&mut SecureChannel> {
        self.channels.get_mut(peer_id)
    }

    /// Close and drop the channel to a peer, if any.
    pub fn close_channel(&mut self, peer_id: &str, reason: CloseReason) {
        if let Some(mut channel) = self.channels.remove(peer_id) {
            channel.close(reason);
        }
    }

    /// Close every channel.
    pub fn close_all(&mut self, reason: CloseReason) {
        for (_, mut channel) in self.channels.drain() {
            channel.close(reason);
        }
    }

    /// Periodic rekey sweep. Rekeys every open channel whose policy
    /// condition is met; returns how many were rekeyed. Safe to call with
    /// no pending work.
    pub fn sweep(&mut self) -> usize {
        let now = now_ms();
        let mut rekeyed = 0;
        for channel in self.channels.values_mut() {
            if channel.rekey_due(now) && channel.rekey().is_ok() {
                rekeyed += 1;
            }
        }
        rekeyed
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sovra_core::NodeKeys;

    fn manager() -> (ChannelManager<NodeKeys>, NodeKeys) {
        let local = Arc::new(NodeKeys::generate("local"));
        let peer = NodeKeys::generate("peer");
        let mgr = ChannelManager::new(local, ChannelConfig::default(), EventBus::new());
        (mgr, peer)
    }

    #[test]
    fn test_open_is_idempotent() {
        let (mut mgr, peer) = manager();
        let key = peer.exchange_public_key();

        let id1 = mgr.open_channel("peer", &key).unwrap().id().to_string();
        let id2 = mgr.open_channel("peer", &key).unwrap().id().to_string();

        assert_eq!(id1, id2);
        assert_eq!(mgr.channel_count(), 1);
    }

    #[test]
    fn test_reopen_after_close() {
        let (mut mgr, peer) = manager();
        let key = peer.exchange_public_key();

        let id1 = mgr.open_channel("peer", &key).unwrap().id().to_string();
        mgr.close_channel("peer", CloseReason::Normal);
        assert_eq!(mgr.channel_count(), 0);

        let id2 = mgr.open_channel("peer", &key).unwrap().id().to_string();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_sweep_with_no_channels() {
        let (mut mgr, _) = manager();
        assert_eq!(mgr.sweep(), 0);
    }

    #[test]
    fn test_sweep_rekeys_due_channels() {
        let local = Arc::new(NodeKeys::generate("local"));
        let peer = NodeKeys::generate("peer");
        let config = ChannelConfig {
            rekey_message_threshold: 1,
            ..Default::default()
        };
        let mut mgr = ChannelManager::new(local, config, EventBus::new());

        let channel = mgr.open_channel("peer", &peer.exchange_public_key()).unwrap();
        channel.send(b"one").unwrap();

        assert_eq!(mgr.sweep(), 1);
        assert_eq!(mgr.channel("peer").unwrap().epoch(), 1);
    }

    #[test]
    fn test_close_all() {
        let (mut mgr, peer) = manager();
        let other = NodeKeys::generate("other");

        mgr.open_channel("peer", &peer.exchange_public_key()).unwrap();
        mgr.open_channel("other", &other.exchange_public_key()).unwrap();
        assert_eq!(mgr.channel_count(), 2);

        mgr.close_all(CloseReason::Shutdown);
        assert_eq!(mgr.channel_count(), 0);
    }
}

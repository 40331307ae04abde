//! Per-peer encrypted session with epoch rekeying.

use crate::envelope::ChannelEnvelope;
use crate::error::{ChannelError, ChannelResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use sovra_core::{time::now_ms, ChannelConfig, EventBus, Identity, NodeEvent};
use std::collections::VecDeque;
use zeroize::Zeroizing;

/// Nonce size for ChaCha20-Poly1305 (96 bits / 12 bytes).
const NONCE_SIZE: usize = 12;

/// Channel lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Initializing,
    Open,
    Rekeying,
    Closed,
    Error,
}

/// Why a channel was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Normal,
    Error,
    PeerRemoved,
    Shutdown,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Normal => "normal",
            CloseReason::Error => "error",
            CloseReason::PeerRemoved => "peer_removed",
            CloseReason::Shutdown => "shutdown",
        }
    }
}

/// Encrypted session with one peer.
///
/// Key material is owned exclusively by the channel and wiped on close.
/// The epoch counter only moves forward; each rekey derives the next key
/// from the current one with a one-way keyed hash, so a retired key cannot
/// be reconstructed from its successor.
pub struct SecureChannel {
    id: String,
    peer_id: String,
    state: ChannelState,
    /// Current epoch key (zeroized on drop)
    key: Zeroizing<[u8; 32]>,
    epoch: u64,
    /// Messages encrypted under the current epoch
    message_count: u64,
    /// Retired keys kept for the transition window, oldest first
    retired: VecDeque<(u64, Zeroizing<[u8; 32]>)>,
    /// Monotonic component of the nonce, reset per epoch
    nonce_counter: u32,
    opened_at: u64,
    last_activity: u64,
    config: ChannelConfig,
    bus: EventBus,
}

impl SecureChannel {
    /// Open a channel to `peer_id`, deriving the epoch-0 key from the
    /// identity's X25519 agreement with the peer's exchange key.
    pub fn open<I: Identity>(
        identity: &I,
        peer_id: impl Into<String>,
        peer_exchange_key: &[u8; 32],
        config: ChannelConfig,
        bus: EventBus,
    ) -> ChannelResult<Self> {
        let peer_id = peer_id.into();
        let shared = identity
            .derive_shared_key(peer_exchange_key)
            .map_err(|e| ChannelError::KeyExchange(e.to_string()))?;

        let key = Zeroizing::new(blake3::derive_key(&epoch_context(0), &shared));
        let now = now_ms();
        let id = format!("chan-{}-{}", peer_id, now);

        let channel = Self {
            id: id.clone(),
            peer_id: peer_id.clone(),
            state: ChannelState::Open,
            key,
            epoch: 0,
            message_count: 0,
            retired: VecDeque::new(),
            nonce_counter: 0,
            opened_at: now,
            last_activity: now,
            config,
            bus,
        };

        tracing::debug!(channel_id = %id, peer_id = %peer_id, "channel opened");
        channel.bus.emit(NodeEvent::ChannelOpened {
            channel_id: id,
            peer_id,
        });

        Ok(channel)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    /// Whether the rekey policy condition is met.
    ///
    /// Either the per-epoch message count hit the threshold, or the
    /// wall-clock interval since the last channel activity elapsed.
    pub fn rekey_due(&self, now: u64) -> bool {
        self.state == ChannelState::Open
            && (self.message_count >= self.config.rekey_message_threshold
                || now.saturating_sub(self.last_activity) >= self.config.rekey_interval_ms)
    }

    /// Encrypt a message under the current epoch key.
    ///
    /// Rekeys first when the policy condition is met. The nonce is a 4-byte
    /// monotonic counter followed by 8 random bytes; the counter guarantees
    /// uniqueness per channel instance within an epoch.
    pub fn send(&mut self, plaintext: &[u8]) -> ChannelResult<ChannelEnvelope> {
        if self.state != ChannelState::Open {
            return Err(ChannelError::NotOpen(format!(
                "channel {} is {:?}",
                self.id, self.state
            )));
        }

        let now = now_ms();
        if self.rekey_due(now) {
            self.rekey()?;
        }

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        nonce_bytes[..4].copy_from_slice(&self.nonce_counter.to_be_bytes());
        rand::thread_rng().fill_bytes(&mut nonce_bytes[4..]);

        let cipher = ChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(&*self.key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| {
                self.state = ChannelState::Error;
                ChannelError::EncryptFailed(e.to_string())
            })?;

        self.nonce_counter += 1;
        self.message_count += 1;
        self.last_activity = now;

        Ok(ChannelEnvelope {
            channel_id: self.id.clone(),
            epoch: self.epoch,
            nonce: BASE64.encode(nonce_bytes),
            ciphertext: BASE64.encode(&ciphertext),
            timestamp: now,
        })
    }

    /// Decrypt an envelope.
    ///
    /// Valid in `Open` or `Rekeying`. Envelopes from the previous epoch are
    /// accepted while the retired key is still inside the transition window;
    /// anything older is rejected as an expired epoch, bounding the replay
    /// window to one epoch.
    pub fn receive(&mut self, envelope: &ChannelEnvelope) -> ChannelResult<Vec<u8>> {
        if self.state != ChannelState::Open && self.state != ChannelState::Rekeying {
            return Err(ChannelError::NotOpen(format!(
                "channel {} is {:?}",
                self.id, self.state
            )));
        }

        if envelope.epoch > self.epoch {
            return Err(ChannelError::EpochAhead {
                envelope: envelope.epoch,
                current: self.epoch,
            });
        }

        let key: &[u8; 32] = if envelope.epoch == self.epoch {
            &self.key
        } else if envelope.epoch + 1 == self.epoch {
            self.retired
                .iter()
                .find(|(epoch, _)| *epoch == envelope.epoch)
                .map(|(_, key)| &**key)
                .ok_or(ChannelError::EpochExpired {
                    envelope: envelope.epoch,
                    current: self.epoch,
                })?
        } else {
            return Err(ChannelError::EpochExpired {
                envelope: envelope.epoch,
                current: self.epoch,
            });
        };

        let nonce_bytes = BASE64
            .decode(&envelope.nonce)
            .map_err(|e| ChannelError::MalformedEnvelope(format!("nonce: {e}")))?;
        if nonce_bytes.len() != NONCE_SIZE {
            return Err(ChannelError::MalformedEnvelope(format!(
                "nonce must be {NONCE_SIZE} bytes, got {}",
                nonce_bytes.len()
            )));
        }
        let ciphertext = BASE64
            .decode(&envelope.ciphertext)
            .map_err(|e| ChannelError::MalformedEnvelope(format!("ciphertext: {e}")))?;

        let cipher = ChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
            .map_err(|e| {
                self.bus.emit(NodeEvent::ChannelError {
                    channel_id: self.id.clone(),
                    detail: format!("decrypt failed at epoch {}", envelope.epoch),
                });
                ChannelError::DecryptFailed(e.to_string())
            })?;

        self.last_activity = now_ms();
        self.bus.emit(NodeEvent::ChannelMessage {
            channel_id: self.id.clone(),
            epoch: envelope.epoch,
        });

        Ok(plaintext)
    }

    /// Advance to the next epoch.
    ///
    /// The new key is `derive_key(epoch-tagged context, current key)`, a
    /// one-way keyed hash, so the outgoing key cannot be recovered from the
    /// new one. The outgoing key is retained for the transition window;
    /// per-epoch counters reset.
    pub fn rekey(&mut self) -> ChannelResult<()> {
        if self.state != ChannelState::Open {
            return Err(ChannelError::InvalidState(format!(
                "cannot rekey channel in state {:?}",
                self.state
            )));
        }

        self.state = ChannelState::Rekeying;
        let old_epoch = self.epoch;
        self.bus.emit(NodeEvent::ChannelRekeyStarted {
            channel_id: self.id.clone(),
            old_epoch,
        });

        let next_epoch = self.epoch + 1;
        let next_key = Zeroizing::new(blake3::derive_key(&epoch_context(next_epoch), &*self.key));
        let outgoing = std::mem::replace(&mut self.key, next_key);
        self.retired.push_back((old_epoch, outgoing));
        while self.retired.len() > self.config.retired_key_window {
            // Oldest retired key drops out of the transition window; its
            // Zeroizing wrapper wipes it.
            self.retired.pop_front();
        }

        self.epoch = next_epoch;
        self.message_count = 0;
        self.nonce_counter = 0;
        self.last_activity = now_ms();
        self.state = ChannelState::Open;

        tracing::debug!(channel_id = %self.id, epoch = next_epoch, "channel rekeyed");
        self.bus.emit(NodeEvent::ChannelRekeyCompleted {
            channel_id: self.id.clone(),
            new_epoch: next_epoch,
        });

        Ok(())
    }

    /// Close the channel and zeroize all key material.
    pub fn close(&mut self, reason: CloseReason) {
        if self.state == ChannelState::Closed {
            return;
        }

        self.key = Zeroizing::new([0u8; 32]);
        self.retired.clear();
        self.state = ChannelState::Closed;

        let uptime_ms = now_ms().saturating_sub(self.opened_at);
        tracing::debug!(channel_id = %self.id, reason = reason.as_str(), uptime_ms, "channel closed");
        self.bus.emit(NodeEvent::ChannelClosed {
            channel_id: self.id.clone(),
            peer_id: self.peer_id.clone(),
            reason: reason.as_str().to_string(),
            uptime_ms,
        });
    }
}

impl Drop for SecureChannel {
    fn drop(&mut self) {
        // Zeroizing wipes current and retired keys
        self.retired.clear();
    }
}

/// Epoch-tagged derivation context.
fn epoch_context(epoch: u64) -> String {
    format!("sovra channel epoch {epoch}")
}

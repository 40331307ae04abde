//! Wire envelope for channel ciphertext.

use serde::{Deserialize, Serialize};

/// Authenticated-encrypted message envelope.
///
/// `nonce` and `ciphertext` are base64; `timestamp` is Unix milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelEnvelope {
    /// Channel identifier
    pub channel_id: String,
    /// Key epoch the ciphertext was produced under
    pub epoch: u64,
    /// Per-message nonce (base64, 12 bytes decoded)
    pub nonce: String,
    /// AEAD ciphertext with auth tag (base64)
    pub ciphertext: String,
    /// Envelope creation time
    pub timestamp: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_round_trip_json() {
        let envelope = ChannelEnvelope {
            channel_id: "chan-1".to_string(),
            epoch: 3,
            nonce: "AAAA".to_string(),
            ciphertext: "BBBB".to_string(),
            timestamp: 1_700_000_000_000,
        };

        let json = serde_json::to_string(&envelope).unwrap();
        let parsed: ChannelEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.channel_id, "chan-1");
        assert_eq!(parsed.epoch, 3);
    }
}

//! Graded trust levels.

use serde::{Deserialize, Serialize};

/// How much a peer's assertions are believed.
///
/// Levels are totally ordered; comparisons follow the ordinal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    Unknown,
    Low,
    Medium,
    High,
    Ultimate,
}

impl TrustLevel {
    pub fn as_u8(self) -> u8 {
        match self {
            TrustLevel::Unknown => 0,
            TrustLevel::Low => 1,
            TrustLevel::Medium => 2,
            TrustLevel::High => 3,
            TrustLevel::Ultimate => 4,
        }
    }

    /// Ordinal to level; out-of-range values clamp to `Unknown`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => TrustLevel::Low,
            2 => TrustLevel::Medium,
            3 => TrustLevel::High,
            4 => TrustLevel::Ultimate,
            _ => TrustLevel::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrustLevel::Unknown => "unknown",
            TrustLevel::Low => "low",
            TrustLevel::Medium => "medium",
            TrustLevel::High => "high",
            TrustLevel::Ultimate => "ultimate",
        }
    }
}

impl Default for TrustLevel {
    fn default() -> Self {
        TrustLevel::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering() {
        assert!(TrustLevel::Unknown < TrustLevel::Low);
        assert!(TrustLevel::Medium < TrustLevel::High);
        assert!(TrustLevel::High < TrustLevel::Ultimate);
    }

    #[test]
    fn test_u8_round_trip() {
        for level in [
            TrustLevel::Unknown,
            TrustLevel::Low,
            TrustLevel::Medium,
            TrustLevel::High,
            TrustLevel::Ultimate,
        ] {
            assert_eq!(TrustLevel::from_u8(level.as_u8()), level);
        }
        assert_eq!(TrustLevel::from_u8(99), TrustLevel::Unknown);
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&TrustLevel::Medium).unwrap(),
            "\"medium\""
        );
    }
}

//! Run identifier generation and parsing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A unique run identifier.
///
/// Format: `run_{timestamp_ms}_{random_hex}`. Identifiers created later
/// sort after earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId {
    timestamp: DateTime<Utc>,
    random: [u8; 8],
}

impl RunId {
    /// Generate a new run ID.
    pub fn new() -> Self {
        let mut random = [0u8; 8];
        random.copy_from_slice(&uuid::Uuid::new_v4().as_bytes()[..8]);

        // Truncate to milliseconds for consistent serialization
        let now = Utc::now();
        let timestamp = DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);

        Self { timestamp, random }
    }

    /// When the run started.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Parse a run ID from a string.
    pub fn parse(s: &str) -> Option<Self> {
        let (millis, random_hex) = s.strip_prefix("run_")?.split_once('_')?;

        let timestamp = DateTime::from_timestamp_millis(millis.parse().ok()?)?;
        let random_bytes = hex::decode(random_hex).ok()?;
        let random: [u8; 8] = random_bytes.try_into().ok()?;

        Some(Self { timestamp, random })
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run_{}_{}",
            self.timestamp.timestamp_millis(),
            hex::encode(self.random)
        )
    }
}

// Stored as its string form
impl Serialize for RunId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RunId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        RunId::parse(&s).ok_or_else(|| serde::de::Error::custom("invalid run ID format"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_generation() {
        let id1 = RunId::new();
        let id2 = RunId::new();

        assert_ne!(id1, id2);
        assert!(id1.to_string().starts_with("run_"));
    }

    #[test]
    fn run_id_from_string() {
        let id = RunId::new();
        let parsed = RunId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn run_id_display_format() {
        let display = RunId::new().to_string();
        let parts: Vec<&str> = display.strip_prefix("run_").unwrap().split('_').collect();
        assert_eq!(parts.len(), 2);
        assert!(parts[0].parse::<i64>().is_ok());
        assert_eq!(parts[1].len(), 16);
    }

    #[test]
    fn run_id_timestamp_is_recent() {
        let ts = RunId::new().timestamp();
        assert!(Utc::now().signed_duration_since(ts).num_seconds() < 2);
    }

    #[test]
    fn run_id_orders_by_time() {
        let earlier = RunId::parse("run_1700000000000_0000000000000000").unwrap();
        let later = RunId::parse("run_1700000000001_0000000000000000").unwrap();
        assert!(earlier < later);
    }

    #[test]
    fn run_id_serialization() {
        let id = RunId::new();
        let yaml = serde_yaml::to_string(&id).unwrap();
        let parsed: RunId = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn run_id_parse_invalid() {
        assert!(RunId::parse("invalid").is_none());
        assert!(RunId::parse("run_").is_none());
        assert!(RunId::parse("run_123").is_none());
        assert!(RunId::parse("run_abc_xyz").is_none());
        assert!(RunId::parse("run_123_abcd").is_none());
    }
}

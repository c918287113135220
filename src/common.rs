// src/common.rs

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// A 32-byte chunk address, the Blake3 hash of the chunk body.
pub type Address = [u8; 32];

/// Nanoseconds since the Unix epoch.
pub type Timestamp = i64;

/// Highest proximity order. Addresses sharing at least this many leading
/// bits with the base key all fall into the last bin.
pub const MAX_PO: u8 = 16;

/// Number of proximity bins, `0..=MAX_PO`.
pub const BIN_COUNT: usize = MAX_PO as usize + 1;

/// Proximity order of two addresses: the number of leading bits they share,
/// capped at `MAX_PO`.
pub fn proximity(one: &[u8], other: &[u8]) -> u8 {
    let bytes = ((MAX_PO as usize - 1) / 8 + 1).min(one.len()).min(other.len());
    for i in 0..bytes {
        let oxo = one[i] ^ other[i];
        if oxo != 0 {
            let po = i * 8 + oxo.leading_zeros() as usize;
            return po.min(MAX_PO as usize) as u8;
        }
    }
    MAX_PO
}

/// Current wall clock time in nanoseconds.
pub fn now_nanos() -> Timestamp {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or(Timestamp::MAX)
}

fn default_capacity() -> u64 {
    5_000_000
}
fn default_gc_target_ratio() -> f64 {
    0.9
}
fn default_gc_batch_size() -> usize {
    200
}

/// Configuration for a `LocalStore`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Overlay address of this node. Proximity bins are computed against it.
    #[serde(default, with = "hex_address")]
    pub base_key: Address,
    /// Number of gc-eligible chunks above which garbage collection is wanted.
    #[serde(default = "default_capacity")]
    pub capacity: u64,
    /// A sweep stops once the gc size drops to `capacity * gc_target_ratio`.
    #[serde(default = "default_gc_target_ratio")]
    pub gc_target_ratio: f64,
    /// Maximum number of gc index entries a single sweep touches.
    #[serde(default = "default_gc_batch_size")]
    pub gc_batch_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            base_key: [0u8; 32],
            capacity: default_capacity(),
            gc_target_ratio: default_gc_target_ratio(),
            gc_batch_size: default_gc_batch_size(),
        }
    }
}

impl StoreConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: StoreConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(StoreError::Config("capacity must be > 0".to_string()));
        }
        if self.gc_batch_size == 0 {
            return Err(StoreError::Config("gc_batch_size must be > 0".to_string()));
        }
        if !(self.gc_target_ratio > 0.0 && self.gc_target_ratio <= 1.0) {
            return Err(StoreError::Config(format!(
                "gc_target_ratio must be in (0, 1], got {}",
                self.gc_target_ratio
            )));
        }
        Ok(())
    }

    /// GC size a sweep collects down to.
    pub fn gc_target(&self) -> u64 {
        (self.capacity as f64 * self.gc_target_ratio) as u64
    }
}

mod hex_address {
    use super::Address;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(address: &Address, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(address))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Address, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(s.trim_start_matches("0x")).map_err(D::Error::custom)?;
        bytes
            .try_into()
            .map_err(|v: Vec<u8>| D::Error::custom(format!("base key must be 32 bytes, got {}", v.len())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proximity_counts_shared_leading_bits() {
        let base = [0u8; 32];
        let mut other = [0u8; 32];
        other[0] = 0b1000_0000;
        assert_eq!(proximity(&base, &other), 0);
        other[0] = 0b0000_0001;
        assert_eq!(proximity(&base, &other), 7);
        other[0] = 0;
        other[1] = 0b0010_0000;
        assert_eq!(proximity(&base, &other), 10);
    }

    #[test]
    fn proximity_is_capped() {
        let base = [0u8; 32];
        let mut other = [0u8; 32];
        other[5] = 0xff;
        assert_eq!(proximity(&base, &other), MAX_PO);
        assert_eq!(proximity(&base, &base), MAX_PO);
    }

    #[test]
    fn config_from_json_fills_defaults() {
        let config = StoreConfig::from_json(r#"{"capacity": 100}"#).unwrap();
        assert_eq!(config.capacity, 100);
        assert_eq!(config.gc_batch_size, 200);
        assert_eq!(config.gc_target(), 90);
        assert_eq!(config.base_key, [0u8; 32]);
    }

    #[test]
    fn config_parses_hex_base_key() {
        let key = "ab".repeat(32);
        let json = format!(r#"{{"baseKey": "0x{}"}}"#, key);
        let config = StoreConfig::from_json(&json).unwrap();
        assert_eq!(config.base_key, [0xab; 32]);
    }

    #[test]
    fn config_rejects_bad_values() {
        assert!(matches!(
            StoreConfig::from_json(r#"{"capacity": 0}"#),
            Err(StoreError::Config(_))
        ));
        assert!(matches!(
            StoreConfig::from_json(r#"{"gcTargetRatio": 1.5}"#),
            Err(StoreError::Config(_))
        ));
        assert!(StoreConfig::from_json(r#"{"baseKey": "abcd"}"#).is_err());
    }
}

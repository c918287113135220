// src/item.rs

use std::fmt;
use std::str::FromStr;

use crate::common::{Address, Timestamp};
use crate::error::StoreError;

/// Cross-index state of one chunk. Each index encodes a projection of these
/// fields in its key and value; fields an index does not carry stay at their
/// defaults when the item is decoded from it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Item {
    pub address: Address,
    pub data: Vec<u8>,
    pub store_timestamp: Timestamp,
    pub access_timestamp: Timestamp,
    pub bin_id: u64,
    pub pin_counter: u64,
}

impl Item {
    pub fn from_address(address: Address) -> Self {
        Item {
            address,
            ..Default::default()
        }
    }

    /// Copies non-default fields of `other` into `self`.
    pub fn merge(mut self, other: &Item) -> Self {
        if self.data.is_empty() && !other.data.is_empty() {
            self.data = other.data.clone();
        }
        if self.store_timestamp == 0 {
            self.store_timestamp = other.store_timestamp;
        }
        if self.access_timestamp == 0 {
            self.access_timestamp = other.access_timestamp;
        }
        if self.bin_id == 0 {
            self.bin_id = other.bin_id;
        }
        if self.pin_counter == 0 {
            self.pin_counter = other.pin_counter;
        }
        self
    }
}

/// Intent passed to `LocalStore::set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModeSet {
    /// Chunk was requested or stored: index it for pull and gc.
    Access,
    /// Chunk was pushed to the network: drop it from the push index.
    Sync,
    /// Drop the chunk from retrieval, pull and gc indexes.
    Remove,
    /// Increment the pin counter.
    Pin,
    /// Decrement the pin counter.
    Unpin,
}

impl ModeSet {
    pub const ALL: [ModeSet; 5] = [
        ModeSet::Access,
        ModeSet::Sync,
        ModeSet::Remove,
        ModeSet::Pin,
        ModeSet::Unpin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModeSet::Access => "access",
            ModeSet::Sync => "sync",
            ModeSet::Remove => "remove",
            ModeSet::Pin => "pin",
            ModeSet::Unpin => "unpin",
        }
    }
}

impl fmt::Display for ModeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for ModeSet {
    type Error = StoreError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        ModeSet::ALL
            .get(code as usize)
            .copied()
            .ok_or_else(|| StoreError::InvalidMode(format!("mode code {}", code)))
    }
}

impl From<ModeSet> for u8 {
    fn from(mode: ModeSet) -> u8 {
        mode as u8
    }
}

impl FromStr for ModeSet {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModeSet::ALL
            .iter()
            .copied()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| StoreError::InvalidMode(s.to_string()))
    }
}

/// Lifecycle state of a chunk, derived from index membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    /// No retrieval data record.
    Absent,
    /// Stored and not pinned. `gc_eligible` reports gc index membership.
    Indexed { gc_eligible: bool },
    /// Pinned with the given counter.
    Pinned(u64),
}

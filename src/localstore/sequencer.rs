// src/localstore/sequencer.rs

use crate::error::{Result, StoreError};
use crate::store::Uint64Vector;

/// Issues bin ids: one strictly increasing sequence per proximity bin.
pub trait BinSequencer: Send + Sync + std::fmt::Debug {
    /// Allocates and persists the next id of `bin`. The first id is 1.
    fn next_bin_id(&self, bin: u8) -> Result<u64>;

    /// Last id handed out for `bin`, 0 if none.
    fn current(&self, bin: u8) -> Result<u64>;
}

/// Sequencer backed by a persisted counter vector on the store's engine.
/// Increments are written immediately, outside of any mutation batch, so an
/// id is never reused even if the mutation that asked for it fails later.
#[derive(Debug, Clone)]
pub struct PersistedBinIds {
    counters: Uint64Vector,
}

impl PersistedBinIds {
    pub fn new(counters: Uint64Vector) -> Self {
        Self { counters }
    }
}

impl BinSequencer for PersistedBinIds {
    fn next_bin_id(&self, bin: u8) -> Result<u64> {
        self.counters.inc(bin).map_err(|source| StoreError::Sequencer {
            bin,
            source: Box::new(source),
        })
    }

    fn current(&self, bin: u8) -> Result<u64> {
        self.counters.get(bin)
    }
}

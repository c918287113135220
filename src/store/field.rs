// src/store/field.rs

use std::marker::PhantomData;
use std::sync::Arc;

use byteorder::{BigEndian, ReadBytesExt};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::engine::{Batch, KvEngine};
use crate::error::{Result, StoreError};

/// Key prefix reserved for fields; indexes use prefixes from 1 upwards.
pub(crate) const FIELD_PREFIX: u8 = 0;

fn field_key(name: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + name.len());
    key.push(FIELD_PREFIX);
    key.extend_from_slice(name.as_bytes());
    key
}

pub(crate) fn decode_u64(bytes: &[u8]) -> Result<u64> {
    if bytes.len() != 8 {
        return Err(StoreError::Decode(format!("expected 8 byte integer, got {} bytes", bytes.len())));
    }
    Ok((&bytes[..]).read_u64::<BigEndian>()?)
}

/// A single persisted `u64`, absent reads as zero.
#[derive(Debug, Clone)]
pub struct Uint64Field {
    engine: Arc<dyn KvEngine>,
    key: Vec<u8>,
}

impl Uint64Field {
    pub(crate) fn new(engine: Arc<dyn KvEngine>, name: &str) -> Self {
        Self {
            engine,
            key: field_key(name),
        }
    }

    pub fn get(&self) -> Result<u64> {
        match self.engine.get(&self.key)? {
            Some(bytes) => decode_u64(&bytes),
            None => Ok(0),
        }
    }

    pub fn put(&self, value: u64) -> Result<()> {
        self.engine.put(&self.key, &value.to_be_bytes())
    }

    pub fn put_in_batch(&self, batch: &mut Batch, value: u64) {
        batch.put(self.key.clone(), value.to_be_bytes().to_vec());
    }
}

/// A persisted array of `u64` counters addressed by a one-byte index.
#[derive(Debug, Clone)]
pub struct Uint64Vector {
    engine: Arc<dyn KvEngine>,
    name: Vec<u8>,
}

impl Uint64Vector {
    pub(crate) fn new(engine: Arc<dyn KvEngine>, name: &str) -> Self {
        Self {
            engine,
            name: field_key(name),
        }
    }

    fn key(&self, i: u8) -> Vec<u8> {
        let mut key = self.name.clone();
        key.push(i);
        key
    }

    pub fn get(&self, i: u8) -> Result<u64> {
        match self.engine.get(&self.key(i))? {
            Some(bytes) => decode_u64(&bytes),
            None => Ok(0),
        }
    }

    pub fn put(&self, i: u8, value: u64) -> Result<()> {
        self.engine.put(&self.key(i), &value.to_be_bytes())
    }

    /// Increments the counter at `i`, persists it, and returns the new value.
    pub fn inc(&self, i: u8) -> Result<u64> {
        let next = self
            .get(i)?
            .checked_add(1)
            .ok_or_else(|| StoreError::Storage(format!("counter {} overflow", i)))?;
        self.put(i, next)?;
        Ok(next)
    }
}

/// A persisted serde value, encoded with bincode.
#[derive(Debug, Clone)]
pub struct StructField<T> {
    engine: Arc<dyn KvEngine>,
    key: Vec<u8>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> StructField<T> {
    pub(crate) fn new(engine: Arc<dyn KvEngine>, name: &str) -> Self {
        Self {
            engine,
            key: field_key(name),
            _marker: PhantomData,
        }
    }

    pub fn get(&self) -> Result<Option<T>> {
        match self.engine.get(&self.key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put(&self, value: &T) -> Result<()> {
        let bytes = bincode::serialize(value)?;
        self.engine.put(&self.key, &bytes)
    }
}

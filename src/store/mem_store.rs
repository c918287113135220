// src/store/mem_store.rs

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, RwLock};

use super::engine::{Batch, BatchOp, KvEngine};
use crate::error::{Result, StoreError};

#[derive(Debug, Default)]
pub struct InMemoryEngineInner {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

/// An in-memory `KvEngine` backed by a `BTreeMap`.
///
/// Clones share the same map, so a clone handed to a second `LocalStore`
/// behaves like reopening the same database.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEngine {
    inner: Arc<RwLock<InMemoryEngineInner>>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.inner.read().map_err(poisoned)?.data.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Storage("in-memory engine lock poisoned".to_string())
}

impl KvEngine for InMemoryEngine {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let guard = self.inner.read().map_err(poisoned)?;
        Ok(guard.data.get(key).cloned())
    }

    fn has(&self, key: &[u8]) -> Result<bool> {
        let guard = self.inner.read().map_err(poisoned)?;
        Ok(guard.data.contains_key(key))
    }

    fn write_batch(&self, batch: Batch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut guard = self.inner.write().map_err(poisoned)?;
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { key, value } => {
                    guard.data.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    guard.data.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn scan(
        &self,
        prefix: &[u8],
        start: Option<&[u8]>,
        limit: Option<usize>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let from = match start {
            Some(s) if s > prefix => s.to_vec(),
            _ => prefix.to_vec(),
        };
        let guard = self.inner.read().map_err(poisoned)?;
        let entries = guard
            .data
            .range::<Vec<u8>, _>((Bound::Included(from), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .take(limit.unwrap_or(usize::MAX))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(entries)
    }
}

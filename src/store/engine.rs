// src/store/engine.rs

use crate::error::Result;

/// A single staged write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// Ordered set of writes committed as one unit by `KvEngine::write_batch`.
/// Later operations on the same key win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    ops: Vec<BatchOp>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put { key, value });
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.push(BatchOp::Delete { key });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

/// Ordered key-value engine every index of the store is mounted on.
///
/// `write_batch` must be atomic with respect to process crash: either every
/// operation of the batch becomes visible or none does.
pub trait KvEngine: Send + Sync + std::fmt::Debug + 'static {
    /// Returns `Ok(None)` if the key is absent.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn has(&self, key: &[u8]) -> Result<bool> {
        self.get(key).map(|opt| opt.is_some())
    }

    /// Writes a single key outside of any batch.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut batch = Batch::new();
        batch.put(key.to_vec(), value.to_vec());
        self.write_batch(batch)
    }

    /// Applies all operations of `batch` in order, atomically.
    fn write_batch(&self, batch: Batch) -> Result<()>;

    /// Returns entries whose key starts with `prefix`, in ascending key order,
    /// beginning at `start` (inclusive) when given. `limit` caps the result.
    fn scan(
        &self,
        prefix: &[u8],
        start: Option<&[u8]>,
        limit: Option<usize>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
}

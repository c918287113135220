// src/localstore/gc.rs

use log::{debug, trace, warn};

use super::LocalStore;
use crate::error::Result;
use crate::store::{Batch, Uint64Field};

/// Persisted count of gc index entries. Changes are staged into the same
/// batch as the index writes they account for.
#[derive(Debug, Clone)]
pub struct GcSize {
    field: Uint64Field,
}

impl GcSize {
    pub fn new(field: Uint64Field) -> Self {
        Self { field }
    }

    pub fn get(&self) -> Result<u64> {
        self.field.get()
    }

    /// Stages `current + delta` into `batch` and returns it. A zero delta
    /// stages nothing.
    pub fn apply_delta(&self, batch: &mut Batch, delta: i64) -> Result<u64> {
        let current = self.field.get()?;
        if delta == 0 {
            return Ok(current);
        }
        let next = if delta > 0 {
            current.saturating_add(delta as u64)
        } else {
            let dec = delta.unsigned_abs();
            if dec > current {
                warn!("GC size {} would drop below zero by delta {}", current, delta);
            }
            current.saturating_sub(dec)
        };
        self.field.put_in_batch(batch, next);
        Ok(next)
    }
}

/// Outcome of one garbage collection sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Chunks removed from the store.
    pub collected: usize,
    /// Pinned chunks dropped from the gc index without being removed.
    pub excluded: usize,
    /// False if the sweep hit its batch size before reaching the target.
    pub done: bool,
}

impl LocalStore {
    /// Removes the least recently accessed gc-eligible chunks until the gc
    /// size is at the configured target, or `gc_batch_size` entries were
    /// visited. Call again while `done` is false.
    pub async fn collect_garbage(&self) -> Result<GcReport> {
        let _guard = self.batch_lock.lock().await;

        let target = self.config.gc_target();
        let gc_size = self.gc_size.get()?;
        if gc_size <= target {
            trace!("GC: size {} within target {}, nothing to collect.", gc_size, target);
            return Ok(GcReport {
                done: true,
                ..GcReport::default()
            });
        }

        let batch_size = self.config.gc_batch_size;
        let candidates = self.gc.items(None, Some(batch_size))?;
        let mut report = GcReport::default();
        let mut batch = Batch::new();
        let mut removed = 0u64;

        for item in &candidates {
            if gc_size - removed <= target {
                break;
            }
            if self.gc_exclude.has(item)? {
                trace!("GC: {} is excluded, dropping from gc index.", hex::encode(item.address));
                report.excluded += 1;
            } else {
                self.retrieval_data.delete_in_batch(&mut batch, item)?;
                self.retrieval_access.delete_in_batch(&mut batch, item)?;
                self.pull.delete_in_batch(&mut batch, item)?;
                report.collected += 1;
            }
            self.gc.delete_in_batch(&mut batch, item)?;
            removed += 1;
        }

        report.done = gc_size - removed <= target || candidates.len() < batch_size;
        self.gc_size.apply_delta(&mut batch, -(removed as i64))?;
        self.shed.write_batch(batch)?;

        debug!(
            "GC: collected {} chunks, excluded {}, gc size {} -> {}, done: {}",
            report.collected,
            report.excluded,
            gc_size,
            gc_size - removed,
            report.done
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::super::IndexKind;
    use super::*;
    use crate::common::StoreConfig;
    use crate::item::{ChunkState, ModeSet};
    use crate::store::{InMemoryEngine, KvEngine, Shed};
    use std::sync::Arc;

    #[test]
    fn apply_delta_stages_new_value() {
        let engine: Arc<dyn KvEngine> = Arc::new(InMemoryEngine::new());
        let gc_size = GcSize::new(Shed::new(engine.clone()).new_uint64_field("gc-size"));

        let mut batch = Batch::new();
        assert_eq!(gc_size.apply_delta(&mut batch, 3).unwrap(), 3);
        assert_eq!(gc_size.get().unwrap(), 0, "nothing visible before commit");
        engine.write_batch(batch).unwrap();
        assert_eq!(gc_size.get().unwrap(), 3);

        let mut batch = Batch::new();
        assert_eq!(gc_size.apply_delta(&mut batch, 0).unwrap(), 3);
        assert!(batch.is_empty());

        assert_eq!(gc_size.apply_delta(&mut batch, -5).unwrap(), 0);
    }

    fn small_store(capacity: u64, gc_batch_size: usize) -> LocalStore {
        let config = StoreConfig {
            capacity,
            gc_target_ratio: 0.5,
            gc_batch_size,
            ..StoreConfig::default()
        };
        new_store(Arc::new(InMemoryEngine::new()), config)
    }

    #[tokio::test]
    async fn sweep_removes_oldest_first() {
        let store = small_store(4, 100);
        let chunks: Vec<_> = (0..6).map(chunk).collect();
        for c in &chunks {
            store.put(c).await.unwrap();
            store.set(ModeSet::Access, c.address()).await.unwrap();
        }
        // touch the first chunk again so it becomes the most recent
        store.set(ModeSet::Access, chunks[0].address()).await.unwrap();
        assert_eq!(store.gc_size().unwrap(), 6);

        let report = store.collect_garbage().await.unwrap();
        assert_eq!(report, GcReport { collected: 4, excluded: 0, done: true });
        assert_eq!(store.gc_size().unwrap(), 2);
        assert_eq!(store.index_len(IndexKind::Gc).unwrap(), 2);

        assert!(store.has(chunks[0].address()).unwrap());
        assert!(store.has(chunks[5].address()).unwrap());
        for c in &chunks[1..5] {
            assert_eq!(store.chunk_state(c.address()).unwrap(), ChunkState::Absent);
        }
        assert_eq!(store.index_len(IndexKind::Pull).unwrap(), 2);
        assert_eq!(store.index_len(IndexKind::RetrievalAccess).unwrap(), 2);
    }

    #[tokio::test]
    async fn sweep_skips_excluded_chunks() {
        let store = small_store(2, 100);
        let chunks: Vec<_> = (0..3).map(chunk).collect();
        for c in &chunks {
            store.put(c).await.unwrap();
            store.set(ModeSet::Access, c.address()).await.unwrap();
        }
        store.set(ModeSet::Pin, chunks[0].address()).await.unwrap();

        let report = store.collect_garbage().await.unwrap();
        assert_eq!(report, GcReport { collected: 1, excluded: 1, done: true });
        assert_eq!(store.gc_size().unwrap(), 1);
        assert!(store.has(chunks[0].address()).unwrap());
        assert!(!store.has(chunks[1].address()).unwrap());
        assert!(store.has(chunks[2].address()).unwrap());
    }

    #[tokio::test]
    async fn sweep_is_bounded_by_batch_size() {
        let store = small_store(2, 2);
        for c in (0..6).map(chunk) {
            store.put(&c).await.unwrap();
            store.set(ModeSet::Access, c.address()).await.unwrap();
        }

        let first = store.collect_garbage().await.unwrap();
        assert_eq!(first, GcReport { collected: 2, excluded: 0, done: false });
        let second = store.collect_garbage().await.unwrap();
        assert_eq!(second, GcReport { collected: 2, excluded: 0, done: false });
        let third = store.collect_garbage().await.unwrap();
        assert_eq!(third, GcReport { collected: 1, excluded: 0, done: true });
        let fourth = store.collect_garbage().await.unwrap();
        assert_eq!(fourth, GcReport { collected: 0, excluded: 0, done: true });
        assert_eq!(store.gc_size().unwrap(), 1);
        assert_eq!(store.index_len(IndexKind::Gc).unwrap(), 1);
    }

    #[tokio::test]
    async fn trigger_fires_at_capacity() {
        let store = small_store(2, 100);
        let trigger = store.gc_trigger();
        for c in (0..2).map(chunk) {
            store.put(&c).await.unwrap();
            store.set(ModeSet::Access, c.address()).await.unwrap();
        }
        // a stored permit makes this return immediately
        tokio::time::timeout(std::time::Duration::from_secs(1), trigger.notified())
            .await
            .unwrap();
    }
}

// src/localstore/mod.rs

pub mod gc;
pub mod mode_set;
pub(crate) mod schema;
pub mod sequencer;
pub mod subscriptions;

pub use gc::{GcReport, GcSize};
pub use sequencer::{BinSequencer, PersistedBinIds};
pub use subscriptions::{PullItem, PullNotifier};

use std::fmt;
use std::sync::Arc;

use log::debug;
use tokio::sync::{Mutex, Notify};

use crate::chunk::Chunk;
use crate::common::{Address, StoreConfig, Timestamp, now_nanos, proximity};
use crate::error::Result;
use crate::item::{ChunkState, Item};
use crate::store::{Batch, Index, KvEngine, Shed};
use schema::{
    GcCodec, GcExcludeCodec, PinCodec, PullCodec, PushCodec, RetrievalAccessCodec, RetrievalDataCodec,
};

type Clock = Arc<dyn Fn() -> Timestamp + Send + Sync>;

/// Names one of the store's indexes, for introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    RetrievalData,
    RetrievalAccess,
    Push,
    Pull,
    Gc,
    GcExclude,
    Pin,
}

/// Local chunk store: a set of indexes over one key-value engine, kept
/// mutually consistent by `set`.
pub struct LocalStore {
    shed: Shed,
    config: StoreConfig,

    retrieval_data: Index,
    retrieval_access: Index,
    push: Index,
    pull: Index,
    gc: Index,
    gc_exclude: Index,
    pin: Index,

    bin_ids: Arc<dyn BinSequencer>,
    gc_size: GcSize,

    /// Serializes every write path: mode-set, put and gc sweeps.
    batch_lock: Mutex<()>,
    pull_notifier: PullNotifier,
    gc_trigger: Arc<Notify>,
    clock: Clock,
}

impl fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalStore")
            .field("engine", self.shed.engine())
            .field("config", &self.config)
            .field("bin_ids", &self.bin_ids)
            .finish_non_exhaustive()
    }
}

impl LocalStore {
    /// Mounts the store on `engine`. Records left by an earlier store on the
    /// same engine are picked up, including bin ids and gc size.
    pub fn open(engine: Arc<dyn KvEngine>, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let mut shed = Shed::new(engine);

        let retrieval_data = shed.new_index("Address->StoreTimestamp|BinID|Data", RetrievalDataCodec)?;
        let retrieval_access = shed.new_index("Address->AccessTimestamp", RetrievalAccessCodec)?;
        let push = shed.new_index("StoreTimestamp|Address->Nil", PushCodec)?;
        let pull = shed.new_index(
            "PO|BinID|Address->Nil",
            PullCodec {
                base_key: config.base_key,
            },
        )?;
        let gc = shed.new_index("AccessTimestamp|Address->BinID", GcCodec)?;
        let gc_exclude = shed.new_index("Address->Nil", GcExcludeCodec)?;
        let pin = shed.new_index("Address->PinCounter", PinCodec)?;
        shed.check_schema()?;

        let bin_ids = Arc::new(PersistedBinIds::new(shed.new_uint64_vector("binIDs")));
        let gc_size = GcSize::new(shed.new_uint64_field("gc-size"));
        debug!("Opened local store, gc size {}", gc_size.get()?);

        Ok(LocalStore {
            shed,
            config,
            retrieval_data,
            retrieval_access,
            push,
            pull,
            gc,
            gc_exclude,
            pin,
            bin_ids,
            gc_size,
            batch_lock: Mutex::new(()),
            pull_notifier: PullNotifier::new(),
            gc_trigger: Arc::new(Notify::new()),
            clock: Arc::new(now_nanos),
        })
    }

    /// Replaces the persisted bin id sequencer.
    pub fn with_sequencer(mut self, sequencer: Arc<dyn BinSequencer>) -> Self {
        self.bin_ids = sequencer;
        self
    }

    /// Replaces the wall clock used for store and access timestamps.
    pub fn with_clock(mut self, clock: impl Fn() -> Timestamp + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub(crate) fn now(&self) -> Timestamp {
        (self.clock)()
    }

    /// Proximity bin of `address` relative to the base key.
    pub fn po(&self, address: &Address) -> u8 {
        proximity(&self.config.base_key, address)
    }

    /// Stores a chunk body and indexes it for push and pull. Returns `true`
    /// if the chunk was already present, in which case nothing changes.
    pub async fn put(&self, chunk: &Chunk) -> Result<bool> {
        let _guard = self.batch_lock.lock().await;

        let mut item = Item::from_address(*chunk.address());
        if self.retrieval_data.has(&item)? {
            return Ok(true);
        }
        let bin = self.po(&item.address);
        item.data = chunk.data().to_vec();
        item.store_timestamp = self.now();
        item.bin_id = self.next_bin_id(bin)?;

        let mut batch = Batch::new();
        self.retrieval_data.put_in_batch(&mut batch, &item)?;
        self.push.put_in_batch(&mut batch, &item)?;
        self.pull.put_in_batch(&mut batch, &item)?;
        self.shed.write_batch(batch)?;

        self.pull_notifier.notify(bin);
        Ok(false)
    }

    pub fn get(&self, address: &Address) -> Result<Option<Chunk>> {
        Ok(self
            .retrieval_data
            .get(&Item::from_address(*address))?
            .map(|item| Chunk::with_address(item.address, item.data)))
    }

    pub fn has(&self, address: &Address) -> Result<bool> {
        self.retrieval_data.has(&Item::from_address(*address))
    }

    /// Current pin counter, 0 if not pinned.
    pub fn pin_counter(&self, address: &Address) -> Result<u64> {
        Ok(self
            .pin
            .get(&Item::from_address(*address))?
            .map_or(0, |item| item.pin_counter))
    }

    pub fn is_gc_excluded(&self, address: &Address) -> Result<bool> {
        self.gc_exclude.has(&Item::from_address(*address))
    }

    /// Persisted number of gc-eligible chunks.
    pub fn gc_size(&self) -> Result<u64> {
        self.gc_size.get()
    }

    /// Signalled after a write leaves the gc size at or above capacity.
    pub fn gc_trigger(&self) -> Arc<Notify> {
        self.gc_trigger.clone()
    }

    /// Snapshot of everything the indexes know about `address`, without the
    /// chunk body. `None` if no index references it.
    pub fn item(&self, address: &Address) -> Result<Option<Item>> {
        let key = Item::from_address(*address);
        let mut found = false;
        let mut snapshot = key.clone();
        for index in [&self.retrieval_data, &self.retrieval_access, &self.pin] {
            if let Some(item) = index.get(&key)? {
                snapshot = snapshot.merge(&item);
                found = true;
            }
        }
        snapshot.data.clear();
        Ok(found.then_some(snapshot))
    }

    /// Lifecycle state derived from index membership.
    pub fn chunk_state(&self, address: &Address) -> Result<ChunkState> {
        let key = Item::from_address(*address);
        if !self.retrieval_data.has(&key)? {
            return Ok(ChunkState::Absent);
        }
        let pin_counter = self.pin_counter(address)?;
        if pin_counter > 0 {
            return Ok(ChunkState::Pinned(pin_counter));
        }
        let gc_eligible = match self.retrieval_access.get(&key)? {
            Some(accessed) => self.gc.has(&accessed)?,
            None => false,
        };
        Ok(ChunkState::Indexed { gc_eligible })
    }

    /// Entries in the given index, by full scan.
    pub fn index_len(&self, kind: IndexKind) -> Result<usize> {
        self.index(kind).count()
    }

    /// Push index entries in store order.
    pub fn push_items(&self, limit: Option<usize>) -> Result<Vec<Item>> {
        self.push.items(None, limit)
    }

    /// Gc index entries, least recently accessed first.
    pub fn gc_items(&self, limit: Option<usize>) -> Result<Vec<Item>> {
        self.gc.items(None, limit)
    }

    fn index(&self, kind: IndexKind) -> &Index {
        match kind {
            IndexKind::RetrievalData => &self.retrieval_data,
            IndexKind::RetrievalAccess => &self.retrieval_access,
            IndexKind::Push => &self.push,
            IndexKind::Pull => &self.pull,
            IndexKind::Gc => &self.gc,
            IndexKind::GcExclude => &self.gc_exclude,
            IndexKind::Pin => &self.pin,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;
    use crate::store::InMemoryEngine;

    #[tokio::test]
    async fn put_indexes_for_push_and_pull() {
        let (_, store) = default_store();
        let c = chunk(1);
        let bin = store.po(c.address());
        let mut rx = store.subscribe_pull(bin).unwrap();

        assert!(!store.put(&c).await.unwrap());
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        assert_eq!(store.get(c.address()).unwrap(), Some(c.clone()));
        assert_eq!(store.index_len(IndexKind::Push).unwrap(), 1);
        assert_eq!(store.pull_range(bin, 0, 0).unwrap()[0].bin_id, 1);
        assert_eq!(store.chunk_state(c.address()).unwrap(), ChunkState::Indexed { gc_eligible: false });

        // second put is a no-op
        assert!(store.put(&c).await.unwrap());
        assert!(!rx.has_changed().unwrap());
        assert_eq!(store.index_len(IndexKind::Pull).unwrap(), 1);
    }

    #[tokio::test]
    async fn reopen_continues_bin_ids_and_gc_size() {
        let engine = InMemoryEngine::new();
        let store = new_store(Arc::new(engine.clone()), StoreConfig::default());
        let a = chunk(1);
        store.put(&a).await.unwrap();
        store.set(crate::item::ModeSet::Access, a.address()).await.unwrap();
        drop(store);

        let reopened = new_store(Arc::new(engine), StoreConfig::default());
        assert_eq!(reopened.gc_size().unwrap(), 1);
        let mut other = *a.address();
        other[31] ^= 1; // same bin as `a`
        reopened.put(&Chunk::with_address(other, vec![7; 8])).await.unwrap();
        let bin = reopened.po(a.address());
        let ids: Vec<u64> = reopened.pull_range(bin, 0, 0).unwrap().iter().map(|p| p.bin_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn pull_and_push_queries() {
        let (_, store) = default_store();
        // all-zero base key: a leading 0x80 byte puts the address in bin 0
        let addresses: Vec<_> = (1..=4u8)
            .map(|i| {
                let mut address = [i; 32];
                address[0] = 0x80;
                address
            })
            .collect();
        for address in &addresses {
            store.put(&Chunk::with_address(*address, vec![1, 2, 3])).await.unwrap();
        }

        assert_eq!(store.last_pull_bin_id(0).unwrap(), Some(4));
        assert_eq!(store.last_pull_bin_id(5).unwrap(), None);
        let ids: Vec<u64> = store.pull_range(0, 2, 3).unwrap().iter().map(|p| p.bin_id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(store.pull_range(0, 3, 0).unwrap()[0].address, addresses[2]);
        assert!(store.pull_range(crate::common::MAX_PO + 1, 0, 0).is_err());

        let pushed: Vec<Address> = store.push_items(None).unwrap().iter().map(|i| i.address).collect();
        assert_eq!(pushed, addresses);
        store.set(crate::item::ModeSet::Sync, &addresses[0]).await.unwrap();
        assert_eq!(store.push_items(Some(1)).unwrap()[0].address, addresses[1]);
    }

    #[tokio::test]
    async fn item_snapshot_merges_indexes() {
        let (_, store) = default_store();
        let c = chunk(2);
        assert_eq!(store.item(c.address()).unwrap(), None);

        store.put(&c).await.unwrap();
        store.set(crate::item::ModeSet::Pin, c.address()).await.unwrap();
        let item = store.item(c.address()).unwrap().unwrap();
        assert_eq!(item.bin_id, 1);
        assert_eq!(item.pin_counter, 1);
        assert!(item.store_timestamp > 0);
        assert!(item.data.is_empty());
    }

    #[test]
    fn open_rejects_invalid_config() {
        let config = StoreConfig {
            capacity: 0,
            ..StoreConfig::default()
        };
        assert!(LocalStore::open(Arc::new(InMemoryEngine::new()), config).is_err());
    }
}

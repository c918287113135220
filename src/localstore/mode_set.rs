// src/localstore/mode_set.rs

use std::time::Instant;

use log::{debug, trace, warn};

use super::LocalStore;
use crate::common::Address;
use crate::error::{Result, StoreError};
use crate::item::{Item, ModeSet};
use crate::store::Batch;

/// Effects of a staged mutation that are applied around the commit.
#[derive(Debug, Default)]
struct Staged {
    gc_delta: i64,
    notify_pull: bool,
}

impl LocalStore {
    /// Updates the indexes of the chunk at `address` for `mode`.
    ///
    /// All index writes and the gc size change are committed in one batch;
    /// on error nothing is written. Calls are serialized store-wide.
    pub async fn set(&self, mode: ModeSet, address: &Address) -> Result<()> {
        let started = Instant::now();
        let result = {
            let _guard = self.batch_lock.lock().await;
            self.set_locked(mode, address)
        };
        match &result {
            Ok(()) => trace!(
                "localstore.set.{} {} took {:?}",
                mode,
                hex::encode(address),
                started.elapsed()
            ),
            Err(e) => warn!("localstore.set.{} {} failed: {}", mode, hex::encode(address), e),
        }
        result
    }

    /// Like `set`, for a numeric mode received from outside the crate.
    pub async fn set_code(&self, mode: u8, address: &Address) -> Result<()> {
        self.set(ModeSet::try_from(mode)?, address).await
    }

    fn set_locked(&self, mode: ModeSet, address: &Address) -> Result<()> {
        let mut batch = Batch::new();
        let mut item = Item::from_address(*address);

        let staged = match mode {
            ModeSet::Access => self.stage_access(&mut batch, &mut item)?,
            ModeSet::Sync => self.stage_sync(&mut batch, &mut item)?,
            ModeSet::Remove => self.stage_remove(&mut batch, &mut item)?,
            ModeSet::Pin => self.stage_pin(&mut batch, &mut item)?,
            ModeSet::Unpin => self.stage_unpin(&mut batch, &mut item)?,
        };

        let gc_size = self.gc_size.apply_delta(&mut batch, staged.gc_delta)?;
        self.shed.write_batch(batch)?;

        if staged.notify_pull {
            self.pull_notifier.notify(self.po(address));
        }
        if staged.gc_delta != 0 && gc_size >= self.config.capacity {
            self.gc_trigger.notify_one();
        }
        Ok(())
    }

    pub(super) fn next_bin_id(&self, bin: u8) -> Result<u64> {
        self.bin_ids.next_bin_id(bin).map_err(|e| match e {
            StoreError::Sequencer { .. } => e,
            other => StoreError::Sequencer {
                bin,
                source: Box::new(other),
            },
        })
    }

    /// Drops the current gc entry of `item`, if any. `item` must carry the
    /// access timestamp the entry was written with.
    fn unstage_gc(&self, batch: &mut Batch, item: &Item, staged: &mut Staged) -> Result<()> {
        if self.gc.has(item)? {
            self.gc.delete_in_batch(batch, item)?;
            staged.gc_delta -= 1;
        }
        Ok(())
    }

    // retrieval data: reuse or allocate; access: refresh; pull, gc: insert
    fn stage_access(&self, batch: &mut Batch, item: &mut Item) -> Result<Staged> {
        let mut staged = Staged::default();

        match self.retrieval_data.get(item)? {
            Some(stored) => {
                item.store_timestamp = stored.store_timestamp;
                item.bin_id = stored.bin_id;
            }
            None => {
                self.push.delete_in_batch(batch, item)?;
                item.store_timestamp = self.now();
                let bin = self.po(&item.address);
                item.bin_id = self.next_bin_id(bin)?;
                debug!(
                    "First indexing of {} in bin {} with bin id {}",
                    hex::encode(item.address),
                    bin,
                    item.bin_id
                );
            }
        }

        if let Some(accessed) = self.retrieval_access.get(item)? {
            item.access_timestamp = accessed.access_timestamp;
            self.unstage_gc(batch, item, &mut staged)?;
        }

        item.access_timestamp = self.now();
        self.retrieval_access.put_in_batch(batch, item)?;
        self.pull.put_in_batch(batch, item)?;
        staged.notify_pull = true;
        self.gc.put_in_batch(batch, item)?;
        staged.gc_delta += 1;

        Ok(staged)
    }

    // push: delete; access: refresh; gc: insert unless pinned
    fn stage_sync(&self, batch: &mut Batch, item: &mut Item) -> Result<Staged> {
        let mut staged = Staged::default();

        let Some(stored) = self.retrieval_data.get(item)? else {
            self.push.delete_in_batch(batch, item)?;
            return Ok(staged);
        };
        item.store_timestamp = stored.store_timestamp;
        item.bin_id = stored.bin_id;

        if let Some(accessed) = self.retrieval_access.get(item)? {
            item.access_timestamp = accessed.access_timestamp;
            self.unstage_gc(batch, item, &mut staged)?;
        }

        item.access_timestamp = self.now();
        self.retrieval_access.put_in_batch(batch, item)?;
        self.push.delete_in_batch(batch, item)?;

        if !self.pin.has(item)? {
            self.gc.put_in_batch(batch, item)?;
            staged.gc_delta += 1;
        }

        Ok(staged)
    }

    // retrieval data, access, pull, gc: delete
    fn stage_remove(&self, batch: &mut Batch, item: &mut Item) -> Result<Staged> {
        let mut staged = Staged::default();

        if let Some(accessed) = self.retrieval_access.get(item)? {
            item.access_timestamp = accessed.access_timestamp;
        }
        let stored = self.retrieval_data.get(item)?.ok_or(StoreError::NotFound {
            index: "retrieval data",
            address: item.address,
        })?;
        item.store_timestamp = stored.store_timestamp;
        item.bin_id = stored.bin_id;

        // deletes do not report whether the key existed
        if self.gc.has(item)? {
            staged.gc_delta = -1;
        }

        self.retrieval_data.delete_in_batch(batch, item)?;
        self.retrieval_access.delete_in_batch(batch, item)?;
        self.pull.delete_in_batch(batch, item)?;
        self.gc.delete_in_batch(batch, item)?;

        Ok(staged)
    }

    // pin: increment; gc exclude: insert on first pin
    fn stage_pin(&self, batch: &mut Batch, item: &mut Item) -> Result<Staged> {
        let existing = match self.pin.get(item)? {
            Some(pinned) => pinned.pin_counter,
            None => {
                self.gc_exclude.put_in_batch(batch, item)?;
                0
            }
        };
        item.pin_counter = existing.saturating_add(1);
        self.pin.put_in_batch(batch, item)?;
        Ok(Staged::default())
    }

    // pin: decrement, delete at zero
    fn stage_unpin(&self, batch: &mut Batch, item: &mut Item) -> Result<Staged> {
        let pinned = self.pin.get(item)?.ok_or(StoreError::NotFound {
            index: "pin",
            address: item.address,
        })?;
        if pinned.pin_counter > 1 {
            item.pin_counter = pinned.pin_counter - 1;
            self.pin.put_in_batch(batch, item)?;
        } else {
            self.pin.delete_in_batch(batch, item)?;
        }
        Ok(Staged::default())
    }
}

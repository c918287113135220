// src/store/index.rs

use std::fmt;
use std::sync::Arc;

use super::engine::{Batch, KvEngine};
use crate::error::Result;
use crate::item::Item;

/// Maps an `Item` to and from one index's keys and values.
/// Encoded keys must sort the way the index is meant to be iterated.
pub trait IndexCodec: Send + Sync + 'static {
    fn encode_key(&self, item: &Item) -> Result<Vec<u8>>;

    fn decode_key(&self, key: &[u8]) -> Result<Item>;

    /// Value-less indexes keep the default.
    fn encode_value(&self, _item: &Item) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    /// Receives the item decoded from the key and fills in value fields.
    fn decode_value(&self, item: Item, _value: &[u8]) -> Result<Item> {
        Ok(item)
    }
}

/// A named index mounted on a shared engine under a one-byte key prefix.
#[derive(Clone)]
pub struct Index {
    name: &'static str,
    prefix: u8,
    engine: Arc<dyn KvEngine>,
    codec: Arc<dyn IndexCodec>,
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Index")
            .field("name", &self.name)
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl Index {
    pub(crate) fn new(name: &'static str, prefix: u8, engine: Arc<dyn KvEngine>, codec: Arc<dyn IndexCodec>) -> Self {
        Self {
            name,
            prefix,
            engine,
            codec,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn key(&self, item: &Item) -> Result<Vec<u8>> {
        let encoded = self.codec.encode_key(item)?;
        let mut key = Vec::with_capacity(1 + encoded.len());
        key.push(self.prefix);
        key.extend_from_slice(&encoded);
        Ok(key)
    }

    fn decode(&self, key: &[u8], value: &[u8]) -> Result<Item> {
        let from_key = self.codec.decode_key(&key[1..])?;
        self.codec.decode_value(from_key, value)
    }

    /// Looks up the entry addressed by the key fields of `item`.
    /// Returns `Ok(None)` if the index has no such entry.
    pub fn get(&self, item: &Item) -> Result<Option<Item>> {
        let key = self.key(item)?;
        match self.engine.get(&key)? {
            Some(value) => self.decode(&key, &value).map(Some),
            None => Ok(None),
        }
    }

    pub fn has(&self, item: &Item) -> Result<bool> {
        let key = self.key(item)?;
        self.engine.has(&key)
    }

    pub fn put_in_batch(&self, batch: &mut Batch, item: &Item) -> Result<()> {
        let key = self.key(item)?;
        let value = self.codec.encode_value(item)?;
        batch.put(key, value);
        Ok(())
    }

    /// Stages a delete. Deleting an absent key is not an error and is not
    /// reported.
    pub fn delete_in_batch(&self, batch: &mut Batch, item: &Item) -> Result<()> {
        let key = self.key(item)?;
        batch.delete(key);
        Ok(())
    }

    /// Items whose encoded key starts with `key_prefix`, in key order,
    /// beginning at the encoded key `start` when given.
    pub fn scan(&self, key_prefix: &[u8], start: Option<&[u8]>, limit: Option<usize>) -> Result<Vec<Item>> {
        let with_prefix = |suffix: &[u8]| {
            let mut key = Vec::with_capacity(1 + suffix.len());
            key.push(self.prefix);
            key.extend_from_slice(suffix);
            key
        };
        let prefix = with_prefix(key_prefix);
        let start_key = start.map(with_prefix);

        self.engine
            .scan(&prefix, start_key.as_deref(), limit)?
            .iter()
            .map(|(k, v)| self.decode(k, v))
            .collect()
    }

    /// All items in key order, beginning at the key of `start` when given.
    pub fn items(&self, start: Option<&Item>, limit: Option<usize>) -> Result<Vec<Item>> {
        let start_key = start.map(|item| self.codec.encode_key(item)).transpose()?;
        self.scan(&[], start_key.as_deref(), limit)
    }

    /// Number of entries, by full scan.
    pub fn count(&self) -> Result<usize> {
        Ok(self.engine.scan(&[self.prefix], None, None)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::InMemoryEngine;

    struct BinIdCodec;

    impl IndexCodec for BinIdCodec {
        fn encode_key(&self, item: &Item) -> Result<Vec<u8>> {
            Ok(item.address.to_vec())
        }

        fn decode_key(&self, key: &[u8]) -> Result<Item> {
            let address = key
                .try_into()
                .map_err(|_| StoreError::Decode("bad key".to_string()))?;
            Ok(Item::from_address(address))
        }

        fn encode_value(&self, item: &Item) -> Result<Vec<u8>> {
            Ok(item.bin_id.to_be_bytes().to_vec())
        }

        fn decode_value(&self, mut item: Item, value: &[u8]) -> Result<Item> {
            let bytes: [u8; 8] = value
                .try_into()
                .map_err(|_| StoreError::Decode("bad value".to_string()))?;
            item.bin_id = u64::from_be_bytes(bytes);
            Ok(item)
        }
    }

    fn test_index(engine: Arc<dyn KvEngine>, prefix: u8) -> Index {
        Index::new("test", prefix, engine, Arc::new(BinIdCodec))
    }

    #[test]
    fn put_get_delete() {
        let engine: Arc<dyn KvEngine> = Arc::new(InMemoryEngine::new());
        let index = test_index(engine.clone(), 1);
        let item = Item {
            bin_id: 7,
            ..Item::from_address([3; 32])
        };

        assert_eq!(index.get(&item).unwrap(), None);

        let mut batch = Batch::new();
        index.put_in_batch(&mut batch, &item).unwrap();
        engine.write_batch(batch).unwrap();
        assert_eq!(index.get(&Item::from_address([3; 32])).unwrap(), Some(item.clone()));
        assert!(index.has(&item).unwrap());

        let mut batch = Batch::new();
        index.delete_in_batch(&mut batch, &item).unwrap();
        engine.write_batch(batch).unwrap();
        assert!(!index.has(&item).unwrap());
    }

    #[test]
    fn indexes_do_not_see_each_other() {
        let engine: Arc<dyn KvEngine> = Arc::new(InMemoryEngine::new());
        let first = test_index(engine.clone(), 1);
        let second = test_index(engine.clone(), 2);

        let mut batch = Batch::new();
        for i in 0..3u8 {
            first.put_in_batch(&mut batch, &Item::from_address([i; 32])).unwrap();
        }
        second.put_in_batch(&mut batch, &Item::from_address([9; 32])).unwrap();
        engine.write_batch(batch).unwrap();

        assert_eq!(first.count().unwrap(), 3);
        assert_eq!(second.count().unwrap(), 1);
        let items = first.items(Some(&Item::from_address([1; 32])), None).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].address, [1; 32]);
    }
}

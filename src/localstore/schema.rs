// src/localstore/schema.rs
//
// Key and value layouts of the localstore indexes. All integers are
// big-endian so that byte order matches numeric order.

use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::common::{Address, proximity};
use crate::error::{Result, StoreError};
use crate::item::Item;
use crate::store::IndexCodec;
use crate::store::field::decode_u64;

const ADDRESS_LEN: usize = 32;

fn decode_address(bytes: &[u8]) -> Result<Address> {
    bytes
        .try_into()
        .map_err(|_| StoreError::Decode(format!("expected {} byte address, got {} bytes", ADDRESS_LEN, bytes.len())))
}

fn read_address<R: Read>(reader: &mut R) -> Result<Address> {
    let mut address = [0u8; ADDRESS_LEN];
    reader.read_exact(&mut address)?;
    Ok(address)
}

fn expect_len(bytes: &[u8], len: usize, what: &str) -> Result<()> {
    if bytes.len() != len {
        return Err(StoreError::Decode(format!("{}: expected {} bytes, got {}", what, len, bytes.len())));
    }
    Ok(())
}

/// address -> store_timestamp | bin_id | crc32(data) | data
pub(crate) struct RetrievalDataCodec;

const RETRIEVAL_DATA_HEADER: usize = 8 + 8 + 4;

impl IndexCodec for RetrievalDataCodec {
    fn encode_key(&self, item: &Item) -> Result<Vec<u8>> {
        Ok(item.address.to_vec())
    }

    fn decode_key(&self, key: &[u8]) -> Result<Item> {
        Ok(Item::from_address(decode_address(key)?))
    }

    fn encode_value(&self, item: &Item) -> Result<Vec<u8>> {
        let mut value = Vec::with_capacity(RETRIEVAL_DATA_HEADER + item.data.len());
        value.write_i64::<BigEndian>(item.store_timestamp)?;
        value.write_u64::<BigEndian>(item.bin_id)?;
        value.write_u32::<BigEndian>(crc32fast::hash(&item.data))?;
        value.extend_from_slice(&item.data);
        Ok(value)
    }

    fn decode_value(&self, mut item: Item, value: &[u8]) -> Result<Item> {
        if value.len() < RETRIEVAL_DATA_HEADER {
            return Err(StoreError::Decode(format!(
                "retrieval data record too short: {} bytes",
                value.len()
            )));
        }
        let mut reader = Cursor::new(value);
        item.store_timestamp = reader.read_i64::<BigEndian>()?;
        item.bin_id = reader.read_u64::<BigEndian>()?;
        let checksum = reader.read_u32::<BigEndian>()?;
        let data = &value[RETRIEVAL_DATA_HEADER..];
        if crc32fast::hash(data) != checksum {
            log::warn!("Retrieval data checksum mismatch for {}", hex::encode(item.address));
            return Err(StoreError::ChecksumMismatch {
                context: format!("retrieval data of {}", hex::encode(item.address)),
            });
        }
        item.data = data.to_vec();
        Ok(item)
    }
}

/// address -> access_timestamp
pub(crate) struct RetrievalAccessCodec;

impl IndexCodec for RetrievalAccessCodec {
    fn encode_key(&self, item: &Item) -> Result<Vec<u8>> {
        Ok(item.address.to_vec())
    }

    fn decode_key(&self, key: &[u8]) -> Result<Item> {
        Ok(Item::from_address(decode_address(key)?))
    }

    fn encode_value(&self, item: &Item) -> Result<Vec<u8>> {
        Ok(item.access_timestamp.to_be_bytes().to_vec())
    }

    fn decode_value(&self, mut item: Item, value: &[u8]) -> Result<Item> {
        expect_len(value, 8, "access timestamp")?;
        item.access_timestamp = Cursor::new(value).read_i64::<BigEndian>()?;
        Ok(item)
    }
}

/// store_timestamp | address -> ()
pub(crate) struct PushCodec;

impl IndexCodec for PushCodec {
    fn encode_key(&self, item: &Item) -> Result<Vec<u8>> {
        let mut key = Vec::with_capacity(8 + ADDRESS_LEN);
        key.write_i64::<BigEndian>(item.store_timestamp)?;
        key.extend_from_slice(&item.address);
        Ok(key)
    }

    fn decode_key(&self, key: &[u8]) -> Result<Item> {
        expect_len(key, 8 + ADDRESS_LEN, "push key")?;
        let mut reader = Cursor::new(key);
        let store_timestamp = reader.read_i64::<BigEndian>()?;
        Ok(Item {
            store_timestamp,
            ..Item::from_address(read_address(&mut reader)?)
        })
    }
}

/// bin | bin_id | address -> ()
///
/// The bin is the proximity order of the address to the node's base key.
pub(crate) struct PullCodec {
    pub(crate) base_key: Address,
}

impl PullCodec {
    /// Encoded key of the first possible entry of `bin` at or after `bin_id`.
    pub(crate) fn start_key(bin: u8, bin_id: u64) -> Vec<u8> {
        let mut key = Vec::with_capacity(1 + 8);
        key.push(bin);
        key.extend_from_slice(&bin_id.to_be_bytes());
        key
    }
}

impl IndexCodec for PullCodec {
    fn encode_key(&self, item: &Item) -> Result<Vec<u8>> {
        let mut key = Vec::with_capacity(1 + 8 + ADDRESS_LEN);
        key.push(proximity(&self.base_key, &item.address));
        key.write_u64::<BigEndian>(item.bin_id)?;
        key.extend_from_slice(&item.address);
        Ok(key)
    }

    fn decode_key(&self, key: &[u8]) -> Result<Item> {
        expect_len(key, 1 + 8 + ADDRESS_LEN, "pull key")?;
        let mut reader = Cursor::new(&key[1..]);
        let bin_id = reader.read_u64::<BigEndian>()?;
        Ok(Item {
            bin_id,
            ..Item::from_address(read_address(&mut reader)?)
        })
    }
}

/// access_timestamp | address -> bin_id
pub(crate) struct GcCodec;

impl IndexCodec for GcCodec {
    fn encode_key(&self, item: &Item) -> Result<Vec<u8>> {
        let mut key = Vec::with_capacity(8 + ADDRESS_LEN);
        key.write_i64::<BigEndian>(item.access_timestamp)?;
        key.extend_from_slice(&item.address);
        Ok(key)
    }

    fn decode_key(&self, key: &[u8]) -> Result<Item> {
        expect_len(key, 8 + ADDRESS_LEN, "gc key")?;
        let mut reader = Cursor::new(key);
        let access_timestamp = reader.read_i64::<BigEndian>()?;
        Ok(Item {
            access_timestamp,
            ..Item::from_address(read_address(&mut reader)?)
        })
    }

    fn encode_value(&self, item: &Item) -> Result<Vec<u8>> {
        Ok(item.bin_id.to_be_bytes().to_vec())
    }

    fn decode_value(&self, mut item: Item, value: &[u8]) -> Result<Item> {
        item.bin_id = decode_u64(value)?;
        Ok(item)
    }
}

/// address -> ()
pub(crate) struct GcExcludeCodec;

impl IndexCodec for GcExcludeCodec {
    fn encode_key(&self, item: &Item) -> Result<Vec<u8>> {
        Ok(item.address.to_vec())
    }

    fn decode_key(&self, key: &[u8]) -> Result<Item> {
        Ok(Item::from_address(decode_address(key)?))
    }
}

/// address -> pin_counter
pub(crate) struct PinCodec;

impl IndexCodec for PinCodec {
    fn encode_key(&self, item: &Item) -> Result<Vec<u8>> {
        Ok(item.address.to_vec())
    }

    fn decode_key(&self, key: &[u8]) -> Result<Item> {
        Ok(Item::from_address(decode_address(key)?))
    }

    fn encode_value(&self, item: &Item) -> Result<Vec<u8>> {
        Ok(item.pin_counter.to_be_bytes().to_vec())
    }

    fn decode_value(&self, mut item: Item, value: &[u8]) -> Result<Item> {
        item.pin_counter = decode_u64(value)?;
        Ok(item)
    }
}

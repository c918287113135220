//! Blake3 addressing for chunk bodies.
use blake3::Hasher;

use crate::common::Address;

pub fn hash_bytes(bytes: &[u8]) -> Address {
    Hasher::new().update(bytes).finalize().into()
}

/// An immutable, content-addressed blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    address: Address,
    data: Vec<u8>,
}

impl Chunk {
    /// Builds a chunk whose address is the hash of `data`.
    pub fn new(data: Vec<u8>) -> Self {
        Self { address: hash_bytes(&data), data }
    }

    /// Builds a chunk with an externally computed address.
    pub fn with_address(address: Address, data: Vec<u8>) -> Self {
        Self { address, data }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_is_content_hash() {
        let chunk = Chunk::new(b"payload".to_vec());
        assert_eq!(*chunk.address(), hash_bytes(b"payload"));
        assert_ne!(*chunk.address(), hash_bytes(b"payload2"));
        assert_eq!(chunk.into_data(), b"payload".to_vec());
    }
}

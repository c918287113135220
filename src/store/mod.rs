// src/store/mod.rs

pub mod engine;
pub mod field;
pub mod index;
pub mod mem_store;

pub use engine::{Batch, BatchOp, KvEngine};
pub use field::{StructField, Uint64Field, Uint64Vector};
pub use index::{Index, IndexCodec};
pub use mem_store::InMemoryEngine;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Persisted record of which index owns which key prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Schema {
    indexes: Vec<String>,
}

/// Mounts indexes and fields on one engine and assigns their key prefixes.
#[derive(Debug)]
pub struct Shed {
    engine: Arc<dyn KvEngine>,
    indexes: Vec<&'static str>,
}

impl Shed {
    pub fn new(engine: Arc<dyn KvEngine>) -> Self {
        Self {
            engine,
            indexes: Vec::new(),
        }
    }

    pub fn engine(&self) -> &Arc<dyn KvEngine> {
        &self.engine
    }

    /// Registers an index. Prefixes follow registration order.
    pub fn new_index(&mut self, name: &'static str, codec: impl IndexCodec) -> Result<Index> {
        if self.indexes.contains(&name) {
            return Err(StoreError::SchemaMismatch(format!("index {} registered twice", name)));
        }
        let prefix = u8::try_from(self.indexes.len() + 1)
            .map_err(|_| StoreError::SchemaMismatch("too many indexes".to_string()))?;
        self.indexes.push(name);
        Ok(Index::new(name, prefix, self.engine.clone(), Arc::new(codec)))
    }

    pub fn new_uint64_field(&self, name: &str) -> Uint64Field {
        Uint64Field::new(self.engine.clone(), name)
    }

    pub fn new_uint64_vector(&self, name: &str) -> Uint64Vector {
        Uint64Vector::new(self.engine.clone(), name)
    }

    pub fn new_struct_field<T: Serialize + serde::de::DeserializeOwned>(&self, name: &str) -> StructField<T> {
        StructField::new(self.engine.clone(), name)
    }

    /// Persists the index layout on first use; on reopen, fails if the
    /// stored layout differs from the registered one.
    pub fn check_schema(&self) -> Result<()> {
        let field = self.new_struct_field::<Schema>("schema");
        let current = Schema {
            indexes: self.indexes.iter().map(|s| s.to_string()).collect(),
        };
        match field.get()? {
            Some(stored) if stored == current => Ok(()),
            Some(stored) => Err(StoreError::SchemaMismatch(format!(
                "stored indexes {:?}, expected {:?}",
                stored.indexes, current.indexes
            ))),
            None => field.put(&current),
        }
    }

    pub fn write_batch(&self, batch: Batch) -> Result<()> {
        self.engine.write_batch(batch)
    }
}

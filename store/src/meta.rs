//! Metadata accessors layered over the `meta` table.

use crate::{StateStore, StoreError, Table, WriteBatch};

const SCHEMA_VERSION_KEY: &str = "schema_version";

/// Schema version and other bookkeeping that doesn't belong in any
/// domain-specific table.
pub trait MetaStore {
    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Stored schema version; 0 for a fresh database.
    fn get_schema_version(&self) -> Result<u32, StoreError> {
        match self.get_meta(SCHEMA_VERSION_KEY)? {
            Some(bytes) => {
                let arr: [u8; 4] = bytes.as_slice().try_into().map_err(|_| {
                    StoreError::Corruption("schema_version has unexpected byte length".into())
                })?;
                Ok(u32::from_le_bytes(arr))
            }
            None => Ok(0),
        }
    }

    fn set_schema_version(&self, version: u32) -> Result<(), StoreError> {
        self.put_meta(SCHEMA_VERSION_KEY, &version.to_le_bytes())
    }
}

impl<S: StateStore + ?Sized> MetaStore for S {
    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.get(Table::Meta, key.as_bytes())
    }

    fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.put(Table::Meta, key.as_bytes(), value);
        self.commit(batch)
    }
}

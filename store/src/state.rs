//! The storage backend trait.

use crate::{StoreError, Table, WriteBatch};

/// A transactional key-value store partitioned into [`Table`]s.
///
/// Implementations must make [`commit`](StateStore::commit) atomic and
/// durable: after it returns `Ok`, every operation in the batch survives a
/// crash; after it returns `Err`, none of them is visible.
pub trait StateStore: Send + Sync {
    /// Read one row.
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Read every row of a table in key order.
    fn scan(&self, table: Table) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;

    /// Apply a batch in a single transaction.
    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// Number of rows in a table.
    fn count(&self, table: Table) -> Result<u64, StoreError> {
        self.scan(table).map(|rows| rows.len() as u64)
    }
}

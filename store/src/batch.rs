//! Write batching: the unit of atomic persistence.
//!
//! A batch is built up while a call stages its effects and is handed to
//! [`StateStore::commit`](crate::StateStore::commit) exactly once. Dropping a
//! batch without committing it discards every operation.

use serde::Serialize;

use crate::{encode, StoreError, Table};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOp {
    Put {
        table: Table,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        table: Table,
        key: Vec<u8>,
    },
}

impl BatchOp {
    pub fn table(&self) -> Table {
        match self {
            BatchOp::Put { table, .. } | BatchOp::Delete { table, .. } => *table,
        }
    }
}

/// Ordered list of row operations applied in one storage transaction.
///
/// Later operations on the same key win.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, table: Table, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Put {
            table,
            key: key.into(),
            value: value.into(),
        });
    }

    /// Encode `value` and stage it under `key`.
    pub fn put_encoded<T: Serialize + ?Sized>(
        &mut self,
        table: Table,
        key: impl Into<Vec<u8>>,
        value: &T,
    ) -> Result<(), StoreError> {
        let bytes = encode(value)?;
        self.put(table, key, bytes);
        Ok(())
    }

    pub fn delete(&mut self, table: Table, key: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Delete {
            table,
            key: key.into(),
        });
    }

    /// Append every operation of `other` after this batch's operations.
    pub fn extend(&mut self, other: WriteBatch) {
        self.ops.extend(other.ops);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operations_keep_insertion_order() {
        let mut batch = WriteBatch::new();
        batch.put(Table::Meta, b"a".to_vec(), b"1".to_vec());
        batch.delete(Table::Balances, b"b".to_vec());
        batch.put_encoded(Table::Supplies, b"c".to_vec(), &7u128).unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.ops()[0].table(), Table::Meta);
        assert_eq!(batch.ops()[1].table(), Table::Balances);
        assert!(matches!(batch.ops()[2], BatchOp::Put { table: Table::Supplies, .. }));
    }

    #[test]
    fn extend_appends() {
        let mut a = WriteBatch::new();
        a.put(Table::Meta, b"x".to_vec(), b"1".to_vec());
        let mut b = WriteBatch::new();
        b.put(Table::Meta, b"x".to_vec(), b"2".to_vec());
        a.extend(b);
        assert_eq!(a.len(), 2);
        assert!(matches!(&a.ops()[1], BatchOp::Put { value, .. } if value == b"2"));
    }
}

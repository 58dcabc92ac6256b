//! LMDB environment setup and the [`StateStore`] implementation.

use std::path::{Path, PathBuf};

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use wdoi_store::{BatchOp, StateStore, StoreError, Table, WriteBatch};

use crate::LmdbError;

/// Default map size: 1 GiB of address space, grown lazily by the OS.
pub const DEFAULT_MAP_SIZE: usize = 1024 * 1024 * 1024;

struct Databases {
    tokens: Database<Bytes, Bytes>,
    balances: Database<Bytes, Bytes>,
    supplies: Database<Bytes, Bytes>,
    registry: Database<Bytes, Bytes>,
    requests: Database<Bytes, Bytes>,
    pools: Database<Bytes, Bytes>,
    meta: Database<Bytes, Bytes>,
}

/// Wraps the LMDB environment and one database handle per [`Table`].
pub struct LmdbEnvironment {
    env: Env,
    dbs: Databases,
    path: PathBuf,
}

impl LmdbEnvironment {
    /// Open or create an LMDB environment at the given directory.
    pub fn open(path: &Path, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)?;

        let mut options = EnvOpenOptions::new();
        options.map_size(map_size).max_dbs(Table::ALL.len() as u32);
        // SAFETY: the environment directory is owned by this process; we never
        // open the same path twice within one process.
        let env = unsafe { options.open(path)? };

        let mut wtxn = env.write_txn()?;
        let mut create =
            |table: Table| env.create_database::<Bytes, Bytes>(&mut wtxn, Some(table.name()));
        let dbs = Databases {
            tokens: create(Table::Tokens)?,
            balances: create(Table::Balances)?,
            supplies: create(Table::Supplies)?,
            registry: create(Table::Registry)?,
            requests: create(Table::Requests)?,
            pools: create(Table::Pools)?,
            meta: create(Table::Meta)?,
        };
        wtxn.commit()?;

        tracing::info!(path = %path.display(), map_size, "opened LMDB environment");
        Ok(Self {
            env,
            dbs,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn db(&self, table: Table) -> Database<Bytes, Bytes> {
        match table {
            Table::Tokens => self.dbs.tokens,
            Table::Balances => self.dbs.balances,
            Table::Supplies => self.dbs.supplies,
            Table::Registry => self.dbs.registry,
            Table::Requests => self.dbs.requests,
            Table::Pools => self.dbs.pools,
            Table::Meta => self.dbs.meta,
        }
    }
}

impl StateStore for LmdbEnvironment {
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let val = self
            .db(table)
            .get(&rtxn, key)
            .map_err(LmdbError::from)?
            .map(|bytes| bytes.to_vec());
        Ok(val)
    }

    fn scan(&self, table: Table) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let iter = self.db(table).iter(&rtxn).map_err(LmdbError::from)?;
        let mut rows = Vec::new();
        for item in iter {
            let (key, val) = item.map_err(LmdbError::from)?;
            rows.push((key.to_vec(), val.to_vec()));
        }
        Ok(rows)
    }

    fn count(&self, table: Table) -> Result<u64, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let count = self.db(table).len(&rtxn).map_err(LmdbError::from)?;
        Ok(count)
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let ops = batch.len();
        // Dropping the txn on an early return aborts it.
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { table, key, value } => {
                    self.db(table)
                        .put(&mut wtxn, &key, &value)
                        .map_err(LmdbError::from)?;
                }
                BatchOp::Delete { table, key } => {
                    self.db(table)
                        .delete(&mut wtxn, &key)
                        .map_err(LmdbError::from)?;
                }
            }
        }
        wtxn.commit().map_err(LmdbError::from)?;
        tracing::trace!(ops, "committed write batch");
        Ok(())
    }
}

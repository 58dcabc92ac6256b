//! Nullable store: thread-safe in-memory storage for testing.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use wdoi_store::{BatchOp, StateStore, StoreError, Table, WriteBatch};

type Rows = BTreeMap<Vec<u8>, Vec<u8>>;

/// An in-memory [`StateStore`].
///
/// Commits are atomic with respect to readers (a single mutex guards every
/// table). Commits can be made to fail on demand to exercise the
/// "no partial state" guarantees of the components above.
pub struct NullStore {
    tables: Mutex<HashMap<Table, Rows>>,
    skip_commits: AtomicUsize,
    fail_commits: AtomicUsize,
    commits: AtomicU64,
}

impl NullStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            skip_commits: AtomicUsize::new(0),
            fail_commits: AtomicUsize::new(0),
            commits: AtomicU64::new(0),
        }
    }

    /// Make the next `n` commits fail with a backend error, writing nothing.
    pub fn fail_next_commits(&self, n: usize) {
        self.fail_commits_after(0, n);
    }

    /// Let `skip` commits through, then fail the following `n`.
    pub fn fail_commits_after(&self, skip: usize, n: usize) {
        self.skip_commits.store(skip, Ordering::SeqCst);
        self.fail_commits.store(n, Ordering::SeqCst);
    }

    fn lock_tables(&self) -> MutexGuard<'_, HashMap<Table, Rows>> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of successful commits so far.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }
}

impl Default for NullStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore for NullStore {
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .lock_tables()
            .get(&table)
            .and_then(|rows| rows.get(key))
            .cloned())
    }

    fn scan(&self, table: Table) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        Ok(self
            .lock_tables()
            .get(&table)
            .map(|rows| rows.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let skipped = self
            .skip_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let injected = !skipped
            && self
                .fail_commits
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
        if injected {
            return Err(StoreError::Backend("injected commit failure".into()));
        }

        let mut tables = self.lock_tables();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { table, key, value } => {
                    tables.entry(table).or_default().insert(key, value);
                }
                BatchOp::Delete { table, key } => {
                    if let Some(rows) = tables.get_mut(&table) {
                        rows.remove(&key);
                    }
                }
            }
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

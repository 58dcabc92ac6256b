//! LMDB storage backend for the wDOI workspace.
//!
//! Implements [`wdoi_store::StateStore`] using the `heed` LMDB bindings.
//! Each logical table maps to one named LMDB database within a single
//! environment, so a [`WriteBatch`](wdoi_store::WriteBatch) touching several
//! tables still commits in one LMDB write transaction.

pub mod environment;
pub mod error;
pub mod migration;

pub use environment::LmdbEnvironment;
pub use error::LmdbError;
pub use migration::{Migrator, CURRENT_SCHEMA_VERSION};

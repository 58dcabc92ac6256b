//! Abstract storage traits for the wDOI workspace.
//!
//! Every storage backend (LMDB, in-memory for testing) implements
//! [`StateStore`]. The rest of the codebase depends only on the trait.
//!
//! State is laid out as a handful of logical [`Table`]s of opaque byte keys
//! and bincode-encoded values. All mutations go through a [`WriteBatch`] that
//! the backend applies in a single transaction: either every row in the batch
//! becomes durable or none does.

pub mod batch;
pub mod codec;
pub mod error;
pub mod meta;
pub mod state;
pub mod table;

pub use batch::{BatchOp, WriteBatch};
pub use codec::{decode, encode};
pub use error::StoreError;
pub use meta::MetaStore;
pub use state::StateStore;
pub use table::Table;

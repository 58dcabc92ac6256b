//! Balance ledger.
//!
//! Maps `(token, account)` to a non-negative raw amount and tracks every
//! token's total supply. The sum of all balances of a token always equals its
//! supply. Minting and burning require a [`SupplyCapability`] issued while the
//! ledger is being wired; transfers only need the debited account's identity.
//!
//! Higher components (custody authority, liquidity pool) compose several
//! ledger operations plus their own rows into one atomic unit through
//! [`BalanceLedger::transact`].

pub mod capability;
pub mod error;
pub mod event;
pub mod ledger;
pub mod txn;

pub use capability::SupplyCapability;
pub use error::LedgerError;
pub use event::{LedgerEvent, LedgerEventKind};
pub use ledger::BalanceLedger;
pub use txn::LedgerTxn;

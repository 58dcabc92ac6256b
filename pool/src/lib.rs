//! Constant-product liquidity pool.
//!
//! A single pool trades the wrapped token against a stable token. Reserves
//! sit in the pool's own ledger account; pool shares are a ledger token the
//! pool mints and burns. Every mutating call commits its token movements and
//! the new reserve row in one ledger transaction.

pub mod error;
pub mod event;
pub mod math;
pub mod pool;

pub use error::PoolError;
pub use event::PoolEvent;
pub use pool::{
    LiquidityOutcome, LiquidityPool, PoolConfig, PoolId, PoolInfo, PoolState, SwapDirection,
    SwapOutcome,
};

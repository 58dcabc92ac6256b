//! Fundamental types for the wDOI custody bridge and liquidity pool.
//!
//! This crate defines the core types shared across every other crate in the workspace:
//! account identifiers, token identifiers and specs, request ids, fixed-point
//! amount formatting, and timestamps.

pub mod account;
pub mod amount;
pub mod error;
pub mod request;
pub mod time;
pub mod token;

pub use account::AccountId;
pub use amount::{format_units, parse_units, pow10};
pub use error::TypesError;
pub use request::RequestId;
pub use time::{Clock, SystemClock, Timestamp};
pub use token::{TokenId, TokenSpec};

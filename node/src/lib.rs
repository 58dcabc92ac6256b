//! wDOI node: composes the balance ledger, the custodial mint/burn
//! authority and the wrapped/stable liquidity pool over one state store.

pub mod config;
pub mod error;
pub mod metrics;
pub mod node;

pub use config::{GenesisConfig, GenesisCustodian, NodeConfig, StorageBackend, TokenConfig};
pub use error::NodeError;
pub use metrics::NodeMetrics;
pub use node::{NodeSummary, TokenSummary, WdoiNode};

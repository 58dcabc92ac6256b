//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use wdoi_custody::QuorumPolicy;
use wdoi_pool::math::{DEFAULT_FEE_BPS, MAX_FEE_BPS};
use wdoi_store_lmdb::environment::DEFAULT_MAP_SIZE;
use wdoi_types::{AccountId, TokenId, TokenSpec};
use wdoi_utils::LogFormat;

use crate::NodeError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Durable LMDB environment under `data_dir`.
    #[default]
    Lmdb,
    /// Throwaway in-memory state.
    Memory,
}

/// Symbol and precision of one token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub symbol: String,
    pub decimals: u8,
}

impl TokenConfig {
    fn new(symbol: &str, decimals: u8) -> Self {
        Self {
            symbol: symbol.to_string(),
            decimals,
        }
    }

    pub fn id(&self) -> TokenId {
        TokenId::new(self.symbol.clone())
    }

    pub fn spec(&self) -> TokenSpec {
        TokenSpec::new(self.id(), self.decimals)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisCustodian {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub external_ref: String,
}

/// Initial custody registry, applied only while the registry is empty.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisConfig {
    #[serde(default)]
    pub custodians: Vec<GenesisCustodian>,
    #[serde(default)]
    pub merchants: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_confirmations: Option<u32>,
}

/// Configuration for a wDOI node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Data directory for the LMDB environment.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub storage: StorageBackend,

    /// LMDB map size in bytes.
    #[serde(default = "default_map_size")]
    pub map_size: usize,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Identity allowed to administer the custody registry, the pool fee
    /// and the faucet.
    #[serde(default = "default_admin")]
    pub admin: String,

    /// Swap fee of a newly created pool, in basis points.
    #[serde(default = "default_fee_bps")]
    pub fee_bps: u16,

    #[serde(default)]
    pub quorum_policy: QuorumPolicy,

    /// Whether the admin may issue stable tokens (dev/test deployments).
    #[serde(default)]
    pub enable_faucet: bool,

    #[serde(default = "default_wrapped")]
    pub wrapped: TokenConfig,

    #[serde(default = "default_stable")]
    pub stable: TokenConfig,

    #[serde(default = "default_share")]
    pub share: TokenConfig,

    #[serde(default)]
    pub genesis: GenesisConfig,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_data_dir() -> PathBuf {
    PathBuf::from("./wdoi_data")
}

fn default_map_size() -> usize {
    DEFAULT_MAP_SIZE
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_admin() -> String {
    "admin".to_string()
}

fn default_fee_bps() -> u16 {
    DEFAULT_FEE_BPS
}

fn default_wrapped() -> TokenConfig {
    TokenConfig::new("wDOI", 18)
}

fn default_stable() -> TokenConfig {
    TokenConfig::new("USDT", 6)
}

fn default_share() -> TokenConfig {
    TokenConfig::new("wDOI-USDT-LP", 18)
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| NodeError::Config(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn admin_id(&self) -> AccountId {
        AccountId::new(self.admin.clone())
    }

    /// Reject configurations the components would refuse at start-up.
    pub fn validate(&self) -> Result<(), NodeError> {
        if !self.admin_id().is_valid() {
            return Err(NodeError::Config(format!("invalid admin id '{}'", self.admin)));
        }
        if self.fee_bps > MAX_FEE_BPS {
            return Err(NodeError::Config(format!(
                "fee_bps {} exceeds the maximum of {}",
                self.fee_bps, MAX_FEE_BPS
            )));
        }
        let tokens = [&self.wrapped, &self.stable, &self.share];
        for token in tokens {
            if !token.id().is_valid() {
                return Err(NodeError::Config(format!("invalid token symbol '{}'", token.symbol)));
            }
            if token.decimals > TokenSpec::MAX_DECIMALS {
                return Err(NodeError::Config(format!(
                    "{} has {} decimals, at most {} are supported",
                    token.symbol,
                    token.decimals,
                    TokenSpec::MAX_DECIMALS
                )));
            }
        }
        let distinct: BTreeSet<&str> = tokens.iter().map(|t| t.symbol.as_str()).collect();
        if distinct.len() != tokens.len() {
            return Err(NodeError::Config("token symbols must be distinct".into()));
        }
        self.genesis.validate()
    }
}

impl GenesisConfig {
    pub fn is_empty(&self) -> bool {
        self.custodians.is_empty() && self.merchants.is_empty()
    }

    /// Every id well-formed, no duplicates, and a threshold that fits the
    /// distinct custodians.
    pub fn validate(&self) -> Result<(), NodeError> {
        let mut custodians = BTreeSet::new();
        for custodian in &self.custodians {
            if !AccountId::new(custodian.id.clone()).is_valid() {
                return Err(NodeError::Config(format!(
                    "invalid genesis custodian id '{}'",
                    custodian.id
                )));
            }
            if !custodians.insert(custodian.id.as_str()) {
                return Err(NodeError::Config(format!(
                    "duplicate genesis custodian '{}'",
                    custodian.id
                )));
            }
        }
        let mut merchants = BTreeSet::new();
        for merchant in &self.merchants {
            if !AccountId::new(merchant.clone()).is_valid() {
                return Err(NodeError::Config(format!("invalid genesis merchant id '{merchant}'")));
            }
            if !merchants.insert(merchant.as_str()) {
                return Err(NodeError::Config(format!("duplicate genesis merchant '{merchant}'")));
            }
        }
        if let Some(n) = self.required_confirmations {
            if n == 0 || n as usize > custodians.len() {
                return Err(NodeError::Config(format!(
                    "genesis required_confirmations {} does not fit {} custodians",
                    n,
                    custodians.len()
                )));
            }
        }
        Ok(())
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            storage: StorageBackend::default(),
            map_size: default_map_size(),
            log_format: LogFormat::default(),
            log_level: default_log_level(),
            admin: default_admin(),
            fee_bps: default_fee_bps(),
            quorum_policy: QuorumPolicy::default(),
            enable_faucet: false,
            wrapped: default_wrapped(),
            stable: default_stable(),
            share: default_share(),
            genesis: GenesisConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = NodeConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        let parsed = NodeConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed, config);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = NodeConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.fee_bps, 30);
        assert_eq!(config.stable.decimals, 6);
        assert_eq!(config.share.symbol, "wDOI-USDT-LP");
        assert_eq!(config.storage, StorageBackend::Lmdb);
        assert_eq!(config.quorum_policy, QuorumPolicy::Live);
        assert!(!config.enable_faucet);
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            storage = "memory"
            quorum_policy = "snapshot"
            log_format = "json"
            fee_bps = 25

            [stable]
            symbol = "USDC"
            decimals = 6

            [genesis]
            merchants = ["m1"]
            required_confirmations = 2

            [[genesis.custodians]]
            id = "c1"
            label = "Custodian One"

            [[genesis.custodians]]
            id = "c2"
        "#;
        let config = NodeConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.storage, StorageBackend::Memory);
        assert_eq!(config.quorum_policy, QuorumPolicy::Snapshot);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.fee_bps, 25);
        assert_eq!(config.stable.symbol, "USDC");
        assert_eq!(config.wrapped.symbol, "wDOI"); // default
        assert_eq!(config.genesis.custodians.len(), 2);
        assert_eq!(config.genesis.custodians[1].label, "");
        config.validate().unwrap();
    }

    #[test]
    fn validation_catches_bad_values() {
        let mut config = NodeConfig {
            fee_bps: 1001,
            ..NodeConfig::default()
        };
        assert!(matches!(config.validate(), Err(NodeError::Config(_))));

        config.fee_bps = 30;
        config.share.symbol = "wDOI".into();
        assert!(matches!(config.validate(), Err(NodeError::Config(_))));

        config.share.symbol = "LP".into();
        config.genesis.required_confirmations = Some(1);
        assert!(matches!(config.validate(), Err(NodeError::Config(_))));
    }

    fn genesis_of(ids: &[&str], merchants: &[&str], required: u32) -> GenesisConfig {
        GenesisConfig {
            custodians: ids
                .iter()
                .map(|c| GenesisCustodian {
                    id: c.to_string(),
                    ..GenesisCustodian::default()
                })
                .collect(),
            merchants: merchants.iter().map(|m| m.to_string()).collect(),
            required_confirmations: Some(required),
        }
    }

    #[test]
    fn genesis_validation_checks_ids_and_duplicates() {
        assert!(genesis_of(&["c1", "c2", "c3"], &["m1"], 2).validate().is_ok());
        assert!(matches!(
            genesis_of(&["c1", "bad id", "c3"], &[], 2).validate(),
            Err(NodeError::Config(_))
        ));
        assert!(matches!(
            genesis_of(&["c1", "c2"], &[""], 1).validate(),
            Err(NodeError::Config(_))
        ));
        assert!(matches!(
            genesis_of(&["c1", "c2"], &["m1", "m1"], 1).validate(),
            Err(NodeError::Config(_))
        ));
        // Duplicates do not count toward the threshold.
        assert!(matches!(
            genesis_of(&["c1", "c1", "c2"], &[], 3).validate(),
            Err(NodeError::Config(_))
        ));
    }

    #[test]
    fn missing_file_returns_config_error() {
        let result = NodeConfig::from_toml_file("/nonexistent/wdoi.toml");
        assert!(matches!(result, Err(NodeError::Config(_))));
    }
}

//! The wDOI node: opens the store, wires the components and subscribes the
//! logging and metrics listeners.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use wdoi_custody::{AuthorityConfig, CustodianSeed, CustodyAuthority, CustodyEvent};
use wdoi_ledger::{BalanceLedger, LedgerEvent, SupplyCapability};
use wdoi_nullables::NullStore;
use wdoi_pool::{LiquidityPool, PoolConfig, PoolEvent, PoolInfo};
use wdoi_store::StateStore;
use wdoi_store_lmdb::{LmdbEnvironment, Migrator};
use wdoi_types::{AccountId, Clock, SystemClock, TokenId};

use crate::{NodeConfig, NodeError, NodeMetrics, StorageBackend};

#[derive(Clone, Debug, Serialize)]
pub struct TokenSummary {
    pub id: TokenId,
    pub decimals: u8,
    pub supply: u128,
    pub holders: usize,
}

/// Snapshot of the whole node, for operators.
#[derive(Clone, Debug, Serialize)]
pub struct NodeSummary {
    pub tokens: Vec<TokenSummary>,
    pub pool: PoolInfo,
    pub custodians: usize,
    pub merchants: usize,
    pub required_confirmations: u32,
    pub pending_requests: usize,
}

/// A running wDOI node.
pub struct WdoiNode {
    config: NodeConfig,
    admin: AccountId,
    ledger: Arc<BalanceLedger>,
    custody: Arc<CustodyAuthority>,
    pool: Arc<LiquidityPool>,
    faucet: SupplyCapability,
    metrics: Arc<NodeMetrics>,
}

impl WdoiNode {
    /// Open the node on the storage backend named by `config`.
    pub fn open(config: NodeConfig) -> Result<Self, NodeError> {
        config.validate()?;
        let store: Arc<dyn StateStore> = match config.storage {
            StorageBackend::Lmdb => {
                let env = LmdbEnvironment::open(&config.data_dir, config.map_size)?;
                tracing::info!(path = %env.path().display(), "opened LMDB environment");
                Arc::new(env)
            }
            StorageBackend::Memory => {
                tracing::warn!("using in-memory storage; state is lost on exit");
                Arc::new(NullStore::new())
            }
        };
        Self::with_store(config, store, Arc::new(SystemClock))
    }

    /// Build the node over an already opened store.
    pub fn with_store(
        config: NodeConfig,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, NodeError> {
        config.validate()?;
        Migrator::run(store.as_ref())?;

        let wrapped = config.wrapped.id();
        let stable = config.stable.id();
        let share = config.share.id();

        let mut ledger = BalanceLedger::open(Arc::clone(&store))?;
        for token in [&config.wrapped, &config.stable, &config.share] {
            ledger.register_token(token.spec())?;
        }
        let custody_cap = ledger.issue_supply_capability("custody", &[wrapped.clone()])?;
        let pool_cap = ledger.issue_supply_capability("pool", &[share.clone()])?;
        let faucet = ledger.issue_supply_capability("faucet", &[stable.clone()])?;
        let ledger = Arc::new(ledger);
        ledger.verify_supply()?;

        let admin = config.admin_id();
        let custody = Arc::new(CustodyAuthority::open(
            AuthorityConfig {
                admin: admin.clone(),
                token: wrapped.clone(),
                policy: config.quorum_policy,
            },
            Arc::clone(&ledger),
            custody_cap,
            Arc::clone(&store),
            Arc::clone(&clock),
        )?);
        let pool = Arc::new(LiquidityPool::open(
            PoolConfig {
                admin: admin.clone(),
                wrapped,
                stable,
                share,
                fee_bps: config.fee_bps,
            },
            Arc::clone(&ledger),
            pool_cap,
            store,
            clock,
        )?);

        let metrics = Arc::new(NodeMetrics::new());
        Self::subscribe_listeners(&ledger, &custody, &pool, &metrics);

        let node = Self {
            config,
            admin,
            ledger,
            custody,
            pool,
            faucet,
            metrics,
        };
        node.apply_genesis()?;
        node.refresh_gauges();
        Ok(node)
    }

    fn subscribe_listeners(
        ledger: &BalanceLedger,
        custody: &CustodyAuthority,
        pool: &LiquidityPool,
        metrics: &Arc<NodeMetrics>,
    ) {
        ledger.subscribe(|event: &LedgerEvent| {
            tracing::debug!(
                token = %event.token,
                kind = ?event.kind,
                from = ?event.from,
                to = ?event.to,
                amount = event.amount,
                supply = event.resulting_supply,
                commit = event.commit,
                "ledger movement"
            );
        });

        let m = Arc::clone(metrics);
        custody.subscribe(move |event: &CustodyEvent| m.observe_custody(event));

        let m = Arc::clone(metrics);
        pool.subscribe(move |event: &PoolEvent| m.observe_pool(event));
    }

    /// Seed the custody registry from the config on a fresh store, in one
    /// commit.
    fn apply_genesis(&self) -> Result<(), NodeError> {
        let genesis = &self.config.genesis;
        if genesis.is_empty() {
            return Ok(());
        }
        let custodians = genesis
            .custodians
            .iter()
            .map(|c| CustodianSeed {
                id: AccountId::new(c.id.clone()),
                label: c.label.clone(),
                external_ref: c.external_ref.clone(),
            })
            .collect();
        let merchants = genesis
            .merchants
            .iter()
            .map(|m| AccountId::new(m.clone()))
            .collect();
        let seeded = self.custody.seed_registry(
            &self.admin,
            custodians,
            merchants,
            genesis.required_confirmations,
        )?;
        if seeded {
            tracing::info!(
                custodians = genesis.custodians.len(),
                merchants = genesis.merchants.len(),
                threshold = self.custody.required_confirmations(),
                "applied custody genesis"
            );
        } else {
            tracing::debug!("custody registry already populated, skipping genesis");
        }
        Ok(())
    }

    /// Issue stable tokens. Admin only, and only with `enable_faucet`.
    pub fn faucet_stable(
        &self,
        caller: &AccountId,
        to: &AccountId,
        amount: u128,
    ) -> Result<(), NodeError> {
        if !self.config.enable_faucet {
            return Err(NodeError::FaucetDisabled);
        }
        if *caller != self.admin {
            return Err(NodeError::Unauthorized {
                caller: caller.clone(),
                action: "use the faucet",
            });
        }
        self.ledger
            .mint(&self.faucet, &self.config.stable.id(), to, amount)?;
        tracing::info!(
            %to,
            amount,
            token = %self.config.stable.symbol,
            "faucet issued stable tokens"
        );
        Ok(())
    }

    /// Count and log a failed call before handing the result back.
    pub fn track<T, E: fmt::Display>(
        &self,
        operation: &'static str,
        result: Result<T, E>,
    ) -> Result<T, E> {
        if let Err(e) = &result {
            self.metrics.rejected_calls.inc();
            tracing::warn!(operation, error = %e, "call rejected");
        }
        result
    }

    fn refresh_gauges(&self) {
        let state = self.pool.state();
        self.metrics
            .set_pool_gauges(state.reserve_wrapped, state.reserve_stable, state.share_supply);
        let pending = self.custody.pending_requests().len();
        self.metrics
            .pending_requests
            .set(i64::try_from(pending).unwrap_or(i64::MAX));
    }

    /// Prometheus text exposition of the node metrics.
    pub fn metrics_text(&self) -> Result<String, NodeError> {
        self.refresh_gauges();
        self.metrics.encode_text()
    }

    pub fn summary(&self) -> Result<NodeSummary, NodeError> {
        let mut tokens = Vec::new();
        for spec in self.ledger.tokens() {
            tokens.push(TokenSummary {
                supply: self.ledger.total_supply(&spec.id)?,
                holders: self.ledger.holders(&spec.id)?.len(),
                id: spec.id,
                decimals: spec.decimals,
            });
        }
        let registry = self.custody.registry();
        Ok(NodeSummary {
            tokens,
            pool: self.pool.get_pool_info(),
            custodians: registry.custodians.len(),
            merchants: registry.merchants.len(),
            required_confirmations: registry.required_confirmations,
            pending_requests: self.custody.pending_requests().len(),
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn admin(&self) -> &AccountId {
        &self.admin
    }

    pub fn ledger(&self) -> &Arc<BalanceLedger> {
        &self.ledger
    }

    pub fn custody(&self) -> &Arc<CustodyAuthority> {
        &self.custody
    }

    pub fn pool(&self) -> &Arc<LiquidityPool> {
        &self.pool
    }

    pub fn metrics(&self) -> &Arc<NodeMetrics> {
        &self.metrics
    }

    pub fn wrapped_token(&self) -> TokenId {
        self.config.wrapped.id()
    }

    pub fn stable_token(&self) -> TokenId {
        self.config.stable.id()
    }

    pub fn share_token(&self) -> TokenId {
        self.config.share.id()
    }
}

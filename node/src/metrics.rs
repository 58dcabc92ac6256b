//! Prometheus metrics for the wDOI node.
//!
//! [`NodeMetrics`] owns a dedicated [`Registry`]. Counters are driven by the
//! custody and pool event streams; gauges are refreshed from component state
//! before each export.

use prometheus::{
    register_int_counter_with_registry, register_int_gauge_with_registry, Encoder, IntCounter,
    IntGauge, Opts, Registry, TextEncoder,
};
use wdoi_custody::{CustodyEvent, RequestKind};
use wdoi_pool::PoolEvent;

use crate::NodeError;

/// Central collection of all node-level Prometheus metrics.
pub struct NodeMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    pub requests_created: IntCounter,
    pub confirmations: IntCounter,
    pub mints_executed: IntCounter,
    pub burns_executed: IntCounter,
    pub requests_cancelled: IntCounter,
    pub swaps: IntCounter,
    pub liquidity_added: IntCounter,
    pub liquidity_removed: IntCounter,
    /// Calls that returned an error to the caller.
    pub rejected_calls: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    pub pending_requests: IntGauge,
    pub reserve_wrapped: IntGauge,
    pub reserve_stable: IntGauge,
    pub share_supply: IntGauge,
}

fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    register_int_counter_with_registry!(Opts::new(name, help), registry)
        .expect("metric names are unique within a fresh registry")
}

fn gauge(registry: &Registry, name: &str, help: &str) -> IntGauge {
    register_int_gauge_with_registry!(Opts::new(name, help), registry)
        .expect("metric names are unique within a fresh registry")
}

/// Gauges are i64; raw 18-decimal amounts are clamped.
fn clamp(value: u128) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl NodeMetrics {
    /// Create a fresh set of metrics, all registered under a new
    /// [`Registry`].
    pub fn new() -> Self {
        let registry = Registry::new();

        let requests_created = counter(
            &registry,
            "wdoi_custody_requests_created_total",
            "Mint and burn requests opened",
        );
        let confirmations = counter(
            &registry,
            "wdoi_custody_confirmations_total",
            "Custodian confirmations recorded",
        );
        let mints_executed = counter(
            &registry,
            "wdoi_custody_mints_executed_total",
            "Mint requests executed",
        );
        let burns_executed = counter(
            &registry,
            "wdoi_custody_burns_executed_total",
            "Burn requests executed",
        );
        let requests_cancelled = counter(
            &registry,
            "wdoi_custody_requests_cancelled_total",
            "Requests cancelled before execution",
        );
        let swaps = counter(&registry, "wdoi_pool_swaps_total", "Swaps executed");
        let liquidity_added = counter(
            &registry,
            "wdoi_pool_liquidity_added_total",
            "Liquidity deposits",
        );
        let liquidity_removed = counter(
            &registry,
            "wdoi_pool_liquidity_removed_total",
            "Liquidity withdrawals",
        );
        let rejected_calls = counter(
            &registry,
            "wdoi_rejected_calls_total",
            "Calls rejected with an error",
        );

        let pending_requests = gauge(
            &registry,
            "wdoi_custody_pending_requests",
            "Requests awaiting confirmation",
        );
        let reserve_wrapped = gauge(
            &registry,
            "wdoi_pool_reserve_wrapped",
            "Wrapped-token reserve in raw units",
        );
        let reserve_stable = gauge(
            &registry,
            "wdoi_pool_reserve_stable",
            "Stable-token reserve in raw units",
        );
        let share_supply = gauge(
            &registry,
            "wdoi_pool_share_supply",
            "Outstanding pool shares in raw units",
        );

        Self {
            registry,
            requests_created,
            confirmations,
            mints_executed,
            burns_executed,
            requests_cancelled,
            swaps,
            liquidity_added,
            liquidity_removed,
            rejected_calls,
            pending_requests,
            reserve_wrapped,
            reserve_stable,
            share_supply,
        }
    }

    pub fn observe_custody(&self, event: &CustodyEvent) {
        match event {
            CustodyEvent::RequestCreated { .. } => self.requests_created.inc(),
            CustodyEvent::Confirmed { .. } => self.confirmations.inc(),
            CustodyEvent::Executed { kind, .. } => match kind {
                RequestKind::Mint => self.mints_executed.inc(),
                RequestKind::Burn => self.burns_executed.inc(),
            },
            CustodyEvent::Cancelled { .. } => self.requests_cancelled.inc(),
            _ => {}
        }
    }

    pub fn observe_pool(&self, event: &PoolEvent) {
        match event {
            PoolEvent::Swap { .. } => self.swaps.inc(),
            PoolEvent::LiquidityAdded { .. } => self.liquidity_added.inc(),
            PoolEvent::LiquidityRemoved { .. } => self.liquidity_removed.inc(),
            PoolEvent::FeeChanged { .. } => {}
        }
    }

    pub fn set_pool_gauges(&self, reserve_wrapped: u128, reserve_stable: u128, share_supply: u128) {
        self.reserve_wrapped.set(clamp(reserve_wrapped));
        self.reserve_stable.set(clamp(reserve_stable));
        self.share_supply.set(clamp(share_supply));
    }

    /// Encode every metric in the Prometheus text exposition format.
    pub fn encode_text(&self) -> Result<String, NodeError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| NodeError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| NodeError::Metrics(e.to_string()))
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

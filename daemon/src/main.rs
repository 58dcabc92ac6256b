//! wDOI daemon: opens the node state and runs one operation against it.
//!
//! Every invocation loads the configuration, opens (or creates) the state
//! under `data_dir`, performs a single command and prints its result as JSON
//! on stdout. Logs go to stderr.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use wdoi_node::{NodeConfig, StorageBackend, WdoiNode};
use wdoi_pool::SwapDirection;
use wdoi_types::{format_units, parse_units, AccountId, RequestId, TokenId};
use wdoi_utils::LogFormat;

#[derive(Parser)]
#[command(name = "wdoi", about = "wDOI custody bridge and wDOI/USDT pool")]
struct Cli {
    /// Path to a TOML configuration file. File settings are the base;
    /// CLI flags and env vars override them.
    #[arg(long, env = "WDOI_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory for the LMDB environment.
    #[arg(long, env = "WDOI_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Storage backend: "lmdb" or "memory".
    #[arg(long, env = "WDOI_STORAGE")]
    storage: Option<String>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "WDOI_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "WDOI_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Print the effective configuration as TOML.
    InitConfig,
    /// Node overview: tokens, pool, registry.
    Status,
    /// Balance of an account in one token.
    Balance {
        account: String,
        /// Token symbol; defaults to the wrapped token.
        #[arg(long)]
        token: Option<String>,
    },
    PoolInfo,
    /// Current wDOI price in stable units.
    Price,
    /// Expected output of a swap without executing it.
    Quote {
        /// "sell" trades wDOI for stable, "buy" trades stable for wDOI.
        side: Side,
        amount: String,
    },
    AddCustodian {
        #[arg(long)]
        caller: String,
        id: String,
        #[arg(long, default_value = "")]
        label: String,
        #[arg(long, default_value = "")]
        external_ref: String,
    },
    RemoveCustodian {
        #[arg(long)]
        caller: String,
        id: String,
    },
    AddMerchant {
        #[arg(long)]
        caller: String,
        id: String,
    },
    RemoveMerchant {
        #[arg(long)]
        caller: String,
        id: String,
    },
    /// Change the number of confirmations a request needs.
    SetThreshold {
        #[arg(long)]
        caller: String,
        required: u32,
    },
    RequestMint {
        #[arg(long)]
        caller: String,
        beneficiary: String,
        amount: String,
        /// DOI-side transaction reference.
        #[arg(long)]
        external_ref: String,
        #[arg(long, default_value = "")]
        custodian_ref: String,
    },
    ConfirmMint {
        #[arg(long)]
        caller: String,
        id: u64,
    },
    RequestBurn {
        #[arg(long)]
        caller: String,
        account: String,
        amount: String,
        #[arg(long)]
        external_ref: String,
        /// DOI address the released funds go to.
        #[arg(long)]
        custodian_ref: String,
    },
    ConfirmBurn {
        #[arg(long)]
        caller: String,
        id: u64,
    },
    /// Execute a request whose confirmations already meet the threshold.
    Execute {
        #[arg(long)]
        caller: String,
        id: u64,
    },
    Cancel {
        #[arg(long)]
        caller: String,
        id: u64,
    },
    /// List requests; pending only unless `--all` is given.
    Requests {
        #[arg(long)]
        all: bool,
    },
    /// Executed burns awaiting release on the DOI side.
    Releases,
    Swap {
        #[arg(long)]
        caller: String,
        side: Side,
        amount: String,
        /// Minimum acceptable output, in output token units.
        #[arg(long, default_value = "0")]
        min_out: String,
    },
    AddLiquidity {
        #[arg(long)]
        caller: String,
        wrapped: String,
        stable: String,
        #[arg(long, default_value = "0")]
        min_wrapped: String,
        #[arg(long, default_value = "0")]
        min_stable: String,
    },
    RemoveLiquidity {
        #[arg(long)]
        caller: String,
        shares: String,
        #[arg(long, default_value = "0")]
        min_wrapped: String,
        #[arg(long, default_value = "0")]
        min_stable: String,
    },
    SetFee {
        #[arg(long)]
        caller: String,
        fee_bps: u16,
    },
    /// Issue stable tokens (requires `enable_faucet`).
    Faucet {
        #[arg(long)]
        caller: String,
        to: String,
        amount: String,
    },
    /// Print Prometheus metrics.
    Metrics,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum Side {
    Sell,
    Buy,
}

impl Side {
    fn direction(self) -> SwapDirection {
        match self {
            Side::Sell => SwapDirection::WrappedToStable,
            Side::Buy => SwapDirection::StableToWrapped,
        }
    }
}

#[derive(Serialize)]
struct BalanceView {
    account: AccountId,
    token: TokenId,
    raw: u128,
    formatted: String,
}

#[derive(Serialize)]
struct PriceView {
    /// Stable per wrapped, 18-decimal fixed point.
    raw: u128,
    formatted: String,
}

#[derive(Serialize)]
struct Ack {
    ok: bool,
}

fn load_config(cli: &Cli) -> anyhow::Result<NodeConfig> {
    let mut config = match &cli.config {
        Some(path) => NodeConfig::from_toml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => NodeConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(storage) = &cli.storage {
        config.storage = match storage.to_ascii_lowercase().as_str() {
            "lmdb" => StorageBackend::Lmdb,
            "memory" => StorageBackend::Memory,
            other => anyhow::bail!("unknown storage backend {other:?}"),
        };
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.log_format =
            LogFormat::parse(format).with_context(|| format!("unknown log format {format:?}"))?;
    }
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn account(raw: &str) -> AccountId {
    AccountId::new(raw)
}

struct Units {
    wrapped: u8,
    stable: u8,
    share: u8,
}

impl Units {
    fn from_config(config: &NodeConfig) -> Self {
        Self {
            wrapped: config.wrapped.decimals,
            stable: config.stable.decimals,
            share: config.share.decimals,
        }
    }

    fn parse(&self, amount: &str, decimals: u8) -> anyhow::Result<u128> {
        parse_units(amount, decimals).with_context(|| format!("invalid amount {amount:?}"))
    }

    /// Decimals of the input and output token for a swap side.
    fn sides(&self, side: Side) -> (u8, u8) {
        match side {
            Side::Sell => (self.wrapped, self.stable),
            Side::Buy => (self.stable, self.wrapped),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    wdoi_utils::init_tracing(config.log_format, &config.log_level);

    if let Command::InitConfig = cli.command {
        config.validate()?;
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    tracing::debug!(
        data_dir = %config.data_dir.display(),
        storage = ?config.storage,
        "opening node"
    );
    let units = Units::from_config(&config);
    let node = WdoiNode::open(config)?;
    run(&node, &units, cli.command)
}

fn run(node: &WdoiNode, units: &Units, command: Command) -> anyhow::Result<()> {
    let custody = node.custody();
    let pool = node.pool();
    let ack = Ack { ok: true };

    match command {
        Command::InitConfig => {
            print!("{}", node.config().to_toml_string()?);
            Ok(())
        }
        Command::Status => print_json(&node.summary()?),
        Command::Balance { account: who, token } => {
            let token = token.map(TokenId::new).unwrap_or_else(|| node.wrapped_token());
            let spec = node
                .ledger()
                .token(&token)
                .with_context(|| format!("unknown token {token}"))?;
            let who = account(&who);
            let raw = node.ledger().balance_of(&token, &who)?;
            print_json(&BalanceView {
                account: who,
                formatted: format_units(raw, spec.decimals),
                token,
                raw,
            })
        }
        Command::PoolInfo => print_json(&pool.get_pool_info()),
        Command::Price => {
            let raw = pool.wrapped_price()?;
            print_json(&PriceView {
                raw,
                formatted: format_units(raw, 18),
            })
        }
        Command::Quote { side, amount } => {
            let (decimals_in, _) = units.sides(side);
            let amount_in = units.parse(&amount, decimals_in)?;
            let out = pool.get_amount_out(side.direction(), amount_in)?;
            print_json(&out)
        }
        Command::AddCustodian {
            caller,
            id,
            label,
            external_ref,
        } => {
            node.track(
                "add_custodian",
                custody.add_custodian(&account(&caller), account(&id), label, external_ref),
            )?;
            print_json(&ack)
        }
        Command::RemoveCustodian { caller, id } => {
            node.track(
                "remove_custodian",
                custody.remove_custodian(&account(&caller), &account(&id)),
            )?;
            print_json(&ack)
        }
        Command::AddMerchant { caller, id } => {
            node.track(
                "add_merchant",
                custody.add_merchant(&account(&caller), account(&id)),
            )?;
            print_json(&ack)
        }
        Command::RemoveMerchant { caller, id } => {
            node.track(
                "remove_merchant",
                custody.remove_merchant(&account(&caller), &account(&id)),
            )?;
            print_json(&ack)
        }
        Command::SetThreshold { caller, required } => {
            node.track(
                "set_required_confirmations",
                custody.set_required_confirmations(&account(&caller), required),
            )?;
            print_json(&ack)
        }
        Command::RequestMint {
            caller,
            beneficiary,
            amount,
            external_ref,
            custodian_ref,
        } => {
            let amount = units.parse(&amount, units.wrapped)?;
            let id = node.track(
                "request_mint",
                custody.request_mint(
                    &account(&caller),
                    account(&beneficiary),
                    amount,
                    external_ref,
                    custodian_ref,
                ),
            )?;
            print_json(&custody.request(id)?)
        }
        Command::ConfirmMint { caller, id } => {
            let outcome = node.track(
                "confirm_mint",
                custody.confirm_mint(&account(&caller), RequestId::new(id)),
            )?;
            print_json(&outcome)
        }
        Command::RequestBurn {
            caller,
            account: holder,
            amount,
            external_ref,
            custodian_ref,
        } => {
            let amount = units.parse(&amount, units.wrapped)?;
            let id = node.track(
                "request_burn",
                custody.request_burn(
                    &account(&caller),
                    account(&holder),
                    amount,
                    external_ref,
                    custodian_ref,
                ),
            )?;
            print_json(&custody.request(id)?)
        }
        Command::ConfirmBurn { caller, id } => {
            let outcome = node.track(
                "confirm_burn",
                custody.confirm_burn(&account(&caller), RequestId::new(id)),
            )?;
            print_json(&outcome)
        }
        Command::Execute { caller, id } => {
            let executed = node.track(
                "execute_ready",
                custody.execute_ready(&account(&caller), RequestId::new(id)),
            )?;
            print_json(&executed)
        }
        Command::Cancel { caller, id } => {
            node.track(
                "cancel_request",
                custody.cancel_request(&account(&caller), RequestId::new(id)),
            )?;
            print_json(&ack)
        }
        Command::Requests { all } => {
            let requests = if all {
                custody.requests()
            } else {
                custody.pending_requests()
            };
            print_json(&requests)
        }
        Command::Releases => print_json(&custody.pending_releases()),
        Command::Swap {
            caller,
            side,
            amount,
            min_out,
        } => {
            let (decimals_in, decimals_out) = units.sides(side);
            let amount_in = units.parse(&amount, decimals_in)?;
            let min_out = units.parse(&min_out, decimals_out)?;
            let outcome = node.track(
                "swap",
                pool.swap(&account(&caller), side.direction(), amount_in, min_out),
            )?;
            print_json(&outcome)
        }
        Command::AddLiquidity {
            caller,
            wrapped,
            stable,
            min_wrapped,
            min_stable,
        } => {
            let outcome = node.track(
                "add_liquidity",
                pool.add_liquidity(
                    &account(&caller),
                    units.parse(&wrapped, units.wrapped)?,
                    units.parse(&stable, units.stable)?,
                    units.parse(&min_wrapped, units.wrapped)?,
                    units.parse(&min_stable, units.stable)?,
                ),
            )?;
            print_json(&outcome)
        }
        Command::RemoveLiquidity {
            caller,
            shares,
            min_wrapped,
            min_stable,
        } => {
            let outcome = node.track(
                "remove_liquidity",
                pool.remove_liquidity(
                    &account(&caller),
                    units.parse(&shares, units.share)?,
                    units.parse(&min_wrapped, units.wrapped)?,
                    units.parse(&min_stable, units.stable)?,
                ),
            )?;
            print_json(&outcome)
        }
        Command::SetFee { caller, fee_bps } => {
            let old = node.track("set_fee_bps", pool.set_fee_bps(&account(&caller), fee_bps))?;
            tracing::info!(old, new = fee_bps, "pool fee updated");
            print_json(&ack)
        }
        Command::Faucet { caller, to, amount } => {
            let amount = units.parse(&amount, units.stable)?;
            node.track(
                "faucet",
                node.faucet_stable(&account(&caller), &account(&to), amount),
            )?;
            print_json(&ack)
        }
        Command::Metrics => {
            print!("{}", node.metrics_text()?);
            Ok(())
        }
    }
}

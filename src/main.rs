//! polyclaw
//!
//! Dashboard server and operator commands.

use anyhow::Context;
use clap::{Parser, Subcommand};
use polyclaw::{
    client::{ClobClient, PolymarketClient},
    config::Config,
    cycle::{Bankroll, CycleRequest, CycleRunner},
    dashboard::{start_dashboard, AppState},
    execution::{transports_from_config, OrderRequest, OrderSubmitter},
    ideation::{IdeationOracle, LlmOracle},
    reconcile::Reconciler,
    resolution::MarketResolver,
    storage::{BetLedger, Database},
    types::Side,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "polyclaw")]
#[command(about = "Polymarket trade-idea ledger, reconciliation and order relay")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the dashboard API
    Serve,
    /// Settle every resolved pending bet once
    Reconcile,
    /// Run one ideation cycle
    Cycle {
        /// Cycle number
        #[arg(long, default_value = "1")]
        cycle: u64,
        /// Bankroll override (defaults to ideation.default_bankroll)
        #[arg(long)]
        bankroll: Option<Decimal>,
        /// File holding the system prompt
        #[arg(long)]
        prompt_file: Option<String>,
        /// Submit live orders for ideas that carry a token id
        #[arg(long)]
        live: bool,
    },
    /// Show top markets
    Markets {
        /// Number of top markets to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Submit one order
    Trade {
        #[arg(long)]
        token_id: String,
        /// BUY / SELL (YES / NO accepted)
        #[arg(long)]
        side: String,
        /// Shares
        #[arg(long)]
        size: Decimal,
        #[arg(long)]
        price: Decimal,
    },
    /// Show wallet, exchange and position balances
    Wallet,
    /// Derive exchange API credentials from the wallet key
    DeriveKey {
        #[arg(long, default_value = "0")]
        nonce: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "polyclaw=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Reconcile => reconcile_once(config).await,
        Commands::Cycle {
            cycle,
            bankroll,
            prompt_file,
            live,
        } => run_cycle(config, cycle, bankroll, prompt_file, live).await,
        Commands::Markets { limit } => show_markets(config, limit).await,
        Commands::Trade {
            token_id,
            side,
            size,
            price,
        } => place_trade(config, token_id, &side, size, price).await,
        Commands::Wallet => show_wallet(config).await,
        Commands::DeriveKey { nonce } => derive_key(config, nonce).await,
    }
}

/// Wire every long-lived component from config
async fn build(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let polymarket = Arc::new(PolymarketClient::new(config.polymarket.clone()).await?);
    let db = Arc::new(Database::connect(&config.database.path).await?);
    let ledger: Arc<dyn BetLedger> = db;

    let resolver = Arc::new(MarketResolver::new(Arc::new(polymarket.gamma.clone())));
    let reconciler = Arc::new(Reconciler::new(resolver, ledger.clone()));
    let bankroll = Arc::new(Bankroll::new(config.ideation.default_bankroll));
    let submitter = build_submitter(config, &polymarket).await?;

    let cycles = match &config.llm {
        Some(llm) => {
            let oracle: Arc<dyn IdeationOracle> = Arc::new(LlmOracle::from_config(
                llm,
                polymarket.gamma.clone(),
                config.ideation.clone(),
            )?);
            Some(Arc::new(CycleRunner::new(
                oracle,
                ledger.clone(),
                reconciler.clone(),
                submitter.clone(),
                bankroll.clone(),
            )))
        }
        None => {
            tracing::warn!("LLM not configured, /run-cycle disabled");
            None
        }
    };

    Ok(Arc::new(AppState {
        ledger,
        reconciler,
        cycles,
        submitter,
        polymarket,
        bankroll,
    }))
}

/// Submitter when both a signer and API credentials are available
async fn build_submitter(
    config: &Config,
    polymarket: &PolymarketClient,
) -> anyhow::Result<Option<Arc<OrderSubmitter>>> {
    let (Some(signer), Some(creds)) = (
        polymarket.clob.signer().cloned(),
        polymarket.clob.credentials().await,
    ) else {
        tracing::warn!("Signer or API credentials missing, order submission disabled");
        return Ok(None);
    };

    let transports = transports_from_config(&config.execution, &config.polymarket.clob_url)?;
    let prices: Arc<ClobClient> = Arc::new(polymarket.clob.clone());

    let submitter = OrderSubmitter::new(
        signer,
        creds,
        config.polymarket.funder_address.as_deref(),
        config.polymarket.signature_type,
        transports,
    )?
    .with_price_source(prices);

    tracing::info!("Order transports: {}", submitter.transport_names().join(" -> "));
    Ok(Some(Arc::new(submitter)))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    tracing::info!("Starting polyclaw");
    let state = build(&config).await?;
    start_dashboard(state, &config.server.host, config.server.port).await?;
    Ok(())
}

async fn reconcile_once(config: Config) -> anyhow::Result<()> {
    let state = build(&config).await?;
    let summary = state.reconciler.reconcile().await?;
    let balances = state.bankroll.apply_summary(&summary);

    println!("\nChecked {} pending bets, {} resolved\n", summary.checked, summary.resolved);
    for r in &summary.results {
        println!(
            "  {:<50} {:<4} @ {:.2} -> {:<3} {:>+9.2} ({})",
            truncate(&r.market, 47),
            r.side,
            r.price,
            r.resolution,
            r.pnl,
            r.status
        );
    }
    println!(
        "\nBankroll from {:.2}: simulated {:.2}, live {:.2}",
        config.ideation.default_bankroll, balances.simulated, balances.live
    );
    Ok(())
}

async fn run_cycle(
    config: Config,
    cycle: u64,
    bankroll: Option<Decimal>,
    prompt_file: Option<String>,
    live: bool,
) -> anyhow::Result<()> {
    let state = build(&config).await?;
    let runner = state
        .cycles
        .clone()
        .context("No [llm] section configured")?;

    let system_prompt = match prompt_file {
        Some(path) => std::fs::read_to_string(shellexpand::tilde(&path).into_owned())
            .with_context(|| format!("reading prompt file {}", path))?,
        None => String::new(),
    };

    let outcome = runner
        .run(CycleRequest {
            cycle,
            bankroll,
            system_prompt,
            live,
        })
        .await?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

async fn show_markets(config: Config, limit: usize) -> anyhow::Result<()> {
    let client = PolymarketClient::new(config.polymarket).await?;
    let markets = client.gamma.get_top_markets(limit).await?;

    println!("\nTop {} Polymarket Markets:\n", limit);
    println!("{:<50} {:>8} {:>8} {:>12}", "Question", "Yes", "No", "Volume");
    println!("{}", "-".repeat(80));

    for market in markets {
        let yes = market.yes_price().unwrap_or(Decimal::ZERO);
        let no = market.no_price().unwrap_or(Decimal::ZERO);

        println!(
            "{:<50} {:>7.0}% {:>7.0}% ${:>10.0}",
            truncate(&market.question, 47),
            yes * Decimal::ONE_HUNDRED,
            no * Decimal::ONE_HUNDRED,
            market.volume
        );
    }

    Ok(())
}

async fn place_trade(
    config: Config,
    token_id: String,
    side: &str,
    size: Decimal,
    price: Decimal,
) -> anyhow::Result<()> {
    let side = Side::from_alias(side).with_context(|| format!("unknown side {:?}", side))?;
    let client = PolymarketClient::new(config.polymarket.clone()).await?;
    let submitter = build_submitter(&config, &client)
        .await?
        .context("Order submission needs polymarket.private_key and API credentials")?;

    let receipt = submitter
        .submit(OrderRequest {
            token_id,
            side,
            size,
            price,
        })
        .await?;

    println!("{}", serde_json::to_string_pretty(&receipt)?);
    Ok(())
}

async fn show_wallet(config: Config) -> anyhow::Result<()> {
    let client = PolymarketClient::new(config.polymarket).await?;
    let report = client.wallet_report().await?;

    println!("\nWallet {}\n", report.address);
    println!("EOA:        {:>12.2} USDC {:>10.4} MATIC", report.eoa.usdc, report.eoa.matic);
    if let (Some(addr), Some(proxy)) = (&report.proxy_address, &report.proxy) {
        println!("Proxy:      {:>12.2} USDC {:>10.4} MATIC ({})", proxy.usdc, proxy.matic, addr);
    }
    if let Some(collateral) = report.exchange_collateral {
        println!("Exchange:   {:>12.2} USDC", collateral);
    }
    println!("Positions:  {:>12.2} USDC", report.positions_value);
    println!("Total:      {:>12.2} USDC", report.total_usdc);
    Ok(())
}

async fn derive_key(config: Config, nonce: u64) -> anyhow::Result<()> {
    let client = PolymarketClient::new(config.polymarket).await?;
    let creds = client.clob.derive_api_key(nonce).await?;

    println!("\nAdd these to [polymarket] (or POLYCLAW__POLYMARKET__*):\n");
    println!("api_key = \"{}\"", creds.api_key);
    println!("api_secret = \"{}\"", creds.api_secret);
    println!("api_passphrase = \"{}\"", creds.api_passphrase);
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        format!("{}...", s.chars().take(max).collect::<String>())
    } else {
        s.to_string()
    }
}

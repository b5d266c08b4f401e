//! Market Bot CLI
//!
//! Commands:
//! - `create`: Fetch upcoming fixtures, format markets, submit one batch
//! - `resolve`: Reconcile expired markets against final scores
//! - `settle`: Manually resolve one market as the resolver
//! - `show`: Print markets from the ledger as JSON
//!
//! # Usage
//! ```bash
//! # Create markets for the default leagues (requires FOOTBALL_DATA_KEY, MARKET_RESOLVER_ID)
//! market_bot create --ledger data/ledger.json
//!
//! # Preview without writing
//! market_bot create --league PL --league SA --dry-run
//!
//! # One resolution scan, or every 5 minutes until Ctrl+C
//! market_bot resolve --ledger data/ledger.json
//! market_bot resolve --interval-secs 300
//!
//! # Manual settlement
//! market_bot settle --market-id 3 --option 1
//!
//! # Inspect
//! market_bot show --market-id 3
//! ```

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use truth_market::config::{
    resolver_id_from_env, ProviderCredentials, FOOTBALL_DATA_KEY_ENV, RESOLVER_ID_ENV,
};
use truth_market::fixtures::{
    fetch_fixtures_for_leagues, format_markets, FetchConfig, FootballDataClient, DEFAULT_LEAGUES,
};
use truth_market::ledger::{BalanceBook, MarketLedger, TokenTransfer};
use truth_market::oracle::{OracleConfig, ResolutionOracle};
use truth_market::submitter::BatchSubmitter;
use truth_market::{Resolution, FOOTBALL_DATA_API_BASE};

#[derive(Parser)]
#[command(name = "market_bot")]
#[command(about = "Sports prediction market creation and resolution bot")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch upcoming fixtures and create one market per fixture
    Create {
        /// Ledger snapshot file
        #[arg(long, default_value = "data/ledger.json")]
        ledger: PathBuf,

        /// Competition code(s). Defaults to PL, PD, BL1, SA, FL1.
        #[arg(long)]
        league: Vec<String>,

        /// Maximum fixtures taken per league
        #[arg(long, default_value = "2")]
        max_per_league: usize,

        /// First day of the fixture window, relative to today
        #[arg(long, default_value = "3")]
        window_start_days: i64,

        /// Last day of the fixture window, relative to today
        #[arg(long, default_value = "10")]
        window_end_days: i64,

        /// Pause between league queries in milliseconds
        #[arg(long, default_value = "6000")]
        league_delay_ms: u64,

        /// Fixture provider base URL
        #[arg(long, default_value = FOOTBALL_DATA_API_BASE)]
        api_base: String,

        /// Print the market drafts without submitting
        #[arg(long, default_value = "false")]
        dry_run: bool,
    },

    /// Resolve expired markets from final scores
    Resolve {
        /// Ledger snapshot file
        #[arg(long, default_value = "data/ledger.json")]
        ledger: PathBuf,

        /// Fixture provider base URL
        #[arg(long, default_value = FOOTBALL_DATA_API_BASE)]
        api_base: String,

        /// Repeat the scan every N seconds until Ctrl+C (0 = single scan)
        #[arg(long, default_value = "0")]
        interval_secs: u64,

        /// Timeout for a single fixture lookup
        #[arg(long, default_value = "20")]
        lookup_timeout_secs: u64,

        /// Reference time for a single scan (ISO 8601, default: now)
        #[arg(long)]
        asof: Option<String>,
    },

    /// Manually resolve one market (requires MARKET_RESOLVER_ID)
    Settle {
        /// Ledger snapshot file
        #[arg(long, default_value = "data/ledger.json")]
        ledger: PathBuf,

        #[arg(long)]
        market_id: u64,

        /// Winning option index
        #[arg(long)]
        option: usize,
    },

    /// Print markets as JSON
    Show {
        /// Ledger snapshot file
        #[arg(long, default_value = "data/ledger.json")]
        ledger: PathBuf,

        /// Single market to print (default: all)
        #[arg(long)]
        market_id: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).init();

    // Setup Ctrl+C handler
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, shutting down...");
        shutdown_clone.store(true, Ordering::Relaxed);
    });

    match cli.command {
        Commands::Create {
            ledger,
            league,
            max_per_league,
            window_start_days,
            window_end_days,
            league_delay_ms,
            api_base,
            dry_run,
        } => {
            let config = FetchConfig {
                window_start_days,
                window_end_days,
                max_per_league,
                league_delay: Duration::from_millis(league_delay_ms),
            };
            run_create(ledger, league, config, api_base, dry_run).await
        }
        Commands::Resolve { ledger, api_base, interval_secs, lookup_timeout_secs, asof } => {
            let config = OracleConfig {
                lookup_timeout: Duration::from_secs(lookup_timeout_secs),
                ..OracleConfig::default()
            };
            run_resolve(ledger, api_base, interval_secs, config, asof, shutdown).await
        }
        Commands::Settle { ledger, market_id, option } => {
            run_settle(ledger, market_id, option).await
        }
        Commands::Show { ledger, market_id } => run_show(ledger, market_id).await,
    }
}

fn load_provider_credentials() -> Result<ProviderCredentials> {
    let credentials = match ProviderCredentials::from_env() {
        Some(c) => c,
        None => {
            error!("Missing credentials. Set environment variable:");
            error!("  {}", FOOTBALL_DATA_KEY_ENV);
            anyhow::bail!("Missing credentials");
        }
    };

    if !credentials.is_valid() {
        error!("Invalid credentials - {} is empty", FOOTBALL_DATA_KEY_ENV);
        anyhow::bail!("Invalid credentials");
    }

    info!("Credentials loaded: {:?}", credentials);
    Ok(credentials)
}

fn load_resolver_id() -> Result<String> {
    match resolver_id_from_env() {
        Some(id) => Ok(id),
        None => {
            error!("Missing resolver identity. Set environment variable:");
            error!("  {}", RESOLVER_ID_ENV);
            anyhow::bail!("Missing resolver identity");
        }
    }
}

fn parse_asof(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .map_err(|e| anyhow::anyhow!("Invalid asof time '{}': {}", s, e))?
        .with_timezone(&Utc))
}

/// Balances are not persisted; the bot only creates and resolves.
fn balances() -> Arc<dyn TokenTransfer> {
    Arc::new(BalanceBook::new())
}

async fn run_create(
    ledger_path: PathBuf,
    leagues: Vec<String>,
    config: FetchConfig,
    api_base: String,
    dry_run: bool,
) -> Result<()> {
    let leagues = if leagues.is_empty() {
        DEFAULT_LEAGUES.iter().map(|s| s.to_string()).collect()
    } else {
        leagues
    };

    info!("=== Market Creator ===");
    info!("Provider: {}", api_base);
    info!("Leagues: {}", leagues.join(", "));
    info!("Window: today+{} .. today+{} days", config.window_start_days, config.window_end_days);
    info!("Max per league: {}", config.max_per_league);
    info!("Ledger: {}", ledger_path.display());
    info!("");

    let credentials = load_provider_credentials()?;
    let resolver_id = load_resolver_id()?;

    let client = FootballDataClient::with_base_url(&api_base, credentials)?;
    let now = Utc::now();

    let fixtures = fetch_fixtures_for_leagues(&client, &leagues, now.date_naive(), &config).await;
    if fixtures.is_empty() {
        warn!("No fixtures found, nothing to create");
        return Ok(());
    }

    let drafts = format_markets(&fixtures, now);
    for draft in &drafts {
        info!("  {} ({}s)", draft.question, draft.duration_secs);
    }

    if dry_run {
        info!("");
        info!("Dry run - {} markets not submitted", drafts.len());
        println!("{}", serde_json::to_string_pretty(&drafts)?);
        return Ok(());
    }

    let receipt = MarketLedger::update_file(&ledger_path, &resolver_id, balances(), |ledger| {
        Ok(BatchSubmitter::default().submit(ledger, drafts, now)?)
    })
    .await?;

    info!("");
    info!("=== Summary ===");
    info!("Markets created: {:?}", receipt.market_ids);
    info!("Gas limit: {}", receipt.gas_limit);
    info!("Gas used: {}", receipt.gas_used);
    info!("Ledger written to: {}", ledger_path.display());

    Ok(())
}

async fn run_resolve(
    ledger_path: PathBuf,
    api_base: String,
    interval_secs: u64,
    config: OracleConfig,
    asof: Option<String>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    info!("=== Resolution Oracle ===");
    info!("Provider: {}", api_base);
    info!("Ledger: {}", ledger_path.display());
    info!("Interval: {}s (0 = single scan)", interval_secs);
    info!("");

    let credentials = load_provider_credentials()?;
    let resolver_id = load_resolver_id()?;
    let fixed_asof = asof.as_deref().map(parse_asof).transpose()?;
    if fixed_asof.is_some() && interval_secs > 0 {
        anyhow::bail!("--asof can only be used with a single scan");
    }

    let client = FootballDataClient::with_base_url(&api_base, credentials)?;

    loop {
        // Scan a copy without holding the file lock; lookups can take minutes
        let ledger =
            Arc::new(MarketLedger::load_or_new(&ledger_path, &resolver_id, balances()).await?);
        let oracle = ResolutionOracle::with_config(
            ledger.clone(),
            Arc::new(client.clone()),
            resolver_id.clone(),
            config.clone(),
        );

        let asof = fixed_asof.unwrap_or_else(Utc::now);
        let report = oracle.scan(asof).await?;
        if !report.decisions.is_empty() {
            let applied =
                MarketLedger::update_file(&ledger_path, &resolver_id, balances(), |latest| {
                    report.apply_to(latest, &resolver_id)
                })
                .await?;
            info!("Wrote {} resolutions to {}", applied, ledger_path.display());
        }

        info!("");
        info!("=== Scan Summary ===");
        info!("{}", serde_json::to_string(&report)?);

        if interval_secs == 0 {
            break;
        }

        info!("Next scan in {}s (Ctrl+C to stop)", interval_secs);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(interval_secs);
        while tokio::time::Instant::now() < deadline {
            if shutdown.load(Ordering::Relaxed) {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
    }

    Ok(())
}

async fn run_settle(ledger_path: PathBuf, market_id: u64, option: usize) -> Result<()> {
    info!("=== Manual Settlement ===");
    info!("Market: #{}", market_id);
    info!("Winning option: {}", option);
    info!("");

    let resolver_id = load_resolver_id()?;
    if !tokio::fs::try_exists(&ledger_path).await.unwrap_or(false) {
        anyhow::bail!("No ledger at {}", ledger_path.display());
    }
    let resolution = MarketLedger::update_file(&ledger_path, &resolver_id, balances(), |ledger| {
        Ok(ledger.resolve_market(&resolver_id, market_id, option)?)
    })
    .await?;

    match resolution {
        Resolution::Voided => info!("Market #{} voided, bettors will be refunded", market_id),
        Resolution::Settled(s) => {
            info!("Market #{} settled on option {}", market_id, s.winning_option_index);
            info!("Winning pool: {}", s.winning_pool);
            info!("Fee: {}{}", s.fee, if s.fee_waived { " (waived)" } else { "" });
            info!("Net pot: {}", s.net_pot);
        }
    }

    Ok(())
}

async fn run_show(ledger_path: PathBuf, market_id: Option<u64>) -> Result<()> {
    let ledger = MarketLedger::load(&ledger_path, balances()).await?;
    let now = Utc::now();

    let markets = match market_id {
        Some(id) => match ledger.market(id) {
            Some(m) => vec![m],
            None => anyhow::bail!("Market #{} not found", id),
        },
        None => ledger.markets(),
    };

    let out: Vec<serde_json::Value> = markets
        .iter()
        .map(|m| {
            serde_json::json!({
                "market": m,
                "state": m.state(now),
            })
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

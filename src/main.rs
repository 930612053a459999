use anyhow::anyhow;
use clap::{Parser, Subcommand};
use signalscan::api::{BinanceFuturesClient, MarketData};
use signalscan::engine::{EngineConfig, SignalEngine, StrategySpec};
use signalscan::outcome::{backfill_high_low, reconcile_24h, OutcomeConfig};
use signalscan::scanner::{run_scanner, ScannerConfig};
use signalscan::store::{MemorySignalStore, PostgresSignalStore, SignalStore};

#[derive(Parser)]
#[command(name = "signalscan", about = "Market scanner and signal engine for USDT perpetual futures")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one scanner pass and print the ranked alerts
    Scan {
        /// Number of top-volume symbols to scan
        #[arg(long)]
        top: Option<usize>,
        /// Enable the BREAKOUT_RETEST setup
        #[arg(long)]
        enable_breakout_retest: bool,
        /// Minimum score for an ENTRY alert
        #[arg(long)]
        min_score: Option<f64>,
    },
    /// Run the active strategies and persist surviving signals
    Run {
        /// Use the in-memory store instead of Postgres
        #[arg(long)]
        dry_run: bool,
    },
    /// Close signals older than 24h with their realized outcome
    Reconcile,
    /// Fill missing high/low extremes on closed signals
    Backfill,
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "signalscan=info".to_string()),
        )
        .init();
}

fn database_url() -> String {
    std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/signalscan".to_string())
}

fn symbols_from_env() -> Option<Vec<String>> {
    let raw = std::env::var("SCAN_SYMBOLS").ok()?;
    let symbols: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();
    if symbols.is_empty() {
        None
    } else {
        Some(symbols)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let market = BinanceFuturesClient::new();

    match cli.command {
        Command::Scan {
            top,
            enable_breakout_retest,
            min_score,
        } => {
            let mut config = ScannerConfig::default();
            if let Some(top) = top {
                config.top_symbols_limit = top;
            }
            if let Some(min_score) = min_score {
                config.min_entry_score = min_score;
            }
            config.enable_breakout_retest = enable_breakout_retest;

            let outcome = run_scanner(&market, &config).await.map_err(|e| anyhow!(e))?;

            println!(
                "\nScanned {} symbols ({} errors)\n",
                outcome.symbols_scanned, outcome.errors
            );

            if outcome.entries.is_empty() {
                println!("No ENTRY alerts this pass.");
            }
            for alert in &outcome.entries {
                println!(
                    "ENTRY  {:<12} {:<5} {:<16} score {:>4.1}  entry {:.6}  stop {:.6}  t1 {:.6}  t2 {:.6}",
                    alert.symbol,
                    alert.side.as_str(),
                    alert.setup.as_str(),
                    alert.score,
                    alert.entry,
                    alert.stop,
                    alert.target1,
                    alert.target2,
                );
                println!("       reasons: {}", alert.reasons.join(", "));
            }

            if !outcome.pre_setups.is_empty() {
                println!();
            }
            for alert in &outcome.pre_setups {
                println!(
                    "WATCH  {:<12} {:<5} {:<16} score {:>4.1}  near {:.6}",
                    alert.symbol,
                    alert.side.as_str(),
                    alert.setup.as_str(),
                    alert.score,
                    alert.entry,
                );
            }
        }

        Command::Run { dry_run } => {
            let mut engine_config = EngineConfig::default();
            if let Some(symbols) = symbols_from_env() {
                engine_config.symbols = symbols;
            }
            let strategies = StrategySpec::default_set();

            if dry_run {
                let store = MemorySignalStore::new();
                let summary = run_engine(&market, &store, engine_config, &strategies).await?;
                println!(
                    "Dry run: {} signals created, {} deduped, {} errors",
                    summary.created, summary.deduped, summary.errors
                );
                for signal in store.all() {
                    println!(
                        "  {} {} ({}) entry {:.6} stop {:.6} strength {}",
                        signal.symbol,
                        signal.direction.as_str(),
                        signal.strategy,
                        signal.entry_price,
                        signal.stop_loss,
                        signal.strength
                    );
                }
            } else {
                let store = PostgresSignalStore::new(&database_url())
                    .await
                    .map_err(|e| anyhow!(e))?;
                let summary = run_engine(&market, &store, engine_config, &strategies).await?;
                println!(
                    "{} signals created, {} deduped, {} errors",
                    summary.created, summary.deduped, summary.errors
                );
            }
        }

        Command::Reconcile => {
            let store = PostgresSignalStore::new(&database_url())
                .await
                .map_err(|e| anyhow!(e))?;
            let stats = reconcile_24h(&store, &market, &OutcomeConfig::default())
                .await
                .map_err(|e| anyhow!(e))?;
            println!(
                "Reconciliation: {} signals closed, {} errors",
                stats.updated, stats.errors
            );
        }

        Command::Backfill => {
            let store = PostgresSignalStore::new(&database_url())
                .await
                .map_err(|e| anyhow!(e))?;
            let stats = backfill_high_low(&store, &market, &OutcomeConfig::default())
                .await
                .map_err(|e| anyhow!(e))?;
            println!(
                "Backfill: {} signals updated, {} errors",
                stats.updated, stats.errors
            );
        }
    }

    Ok(())
}

async fn run_engine<M: MarketData, S: SignalStore>(
    market: &M,
    store: &S,
    config: EngineConfig,
    strategies: &[StrategySpec],
) -> anyhow::Result<signalscan::engine::RunSummary> {
    let engine = SignalEngine::new(market, store, config);
    engine.run(strategies).await.map_err(|e| anyhow!(e))
}

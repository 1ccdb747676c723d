use std::sync::Arc;

use clap::{Parser, Subcommand};
use sigval_core::{AppConfig, CandleRequest, ConfigLoader, Timeframe, Venue};
use sigval_data::{DatabaseClient, Repositories};
use sigval_exchanges::{
    build_clients, ExchangeAggregator, PriceDataFacade, SymbolAvailabilityCache,
};
use sigval_factcheck::{BulkFactChecker, ConfidenceService, FactCheckOptions, RunReportFormatter};
use sigval_miner::CombinationMiner;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "sigval")]
#[command(about = "Signal validation and combination mining pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    InitDb,
    /// Fact-check unchecked signals against forward candles
    FactCheck {
        /// Restrict to one symbol (e.g. "BTC")
        #[arg(long)]
        symbol: Option<String>,
        /// Cap the number of candidate signals
        #[arg(long)]
        limit: Option<i64>,
        /// Concurrent evaluations per batch
        #[arg(long, default_value_t = 10)]
        workers: usize,
        /// Evaluate every candidate, bypassing the signal filter
        #[arg(long)]
        no_filter: bool,
    },
    /// Mine same-timeframe signal combinations
    Mine {
        /// Timeframe to mine (e.g. "1h")
        #[arg(long)]
        timeframe: String,
    },
    /// Mine cross-timeframe signal combinations
    MineCross,
    /// Recompute confidence adjustments from fact-check history
    AdjustConfidence {
        /// Restrict to one signal name
        #[arg(long)]
        signal: Option<String>,
        /// Restrict to one timeframe (requires --signal)
        #[arg(long)]
        timeframe: Option<String>,
        /// List stored adjustments instead of recomputing
        #[arg(long, conflicts_with_all = ["signal", "timeframe"])]
        list: bool,
    },
    /// List mined combinations
    Combos {
        /// Same-timeframe combos for this timeframe (omit for cross-timeframe)
        #[arg(long)]
        timeframe: Option<String>,
    },
    /// Fetch candles once through the aggregator (debug aid)
    Fetch {
        /// Symbol (e.g. "BTC")
        #[arg(long)]
        symbol: String,
        /// Timeframe (e.g. "1h")
        #[arg(long)]
        timeframe: String,
        /// Number of candles
        #[arg(long, default_value_t = 100)]
        limit: usize,
        /// Fetch from one specific venue instead of the fallback chain
        #[arg(long)]
        venue: Option<String>,
        /// Race the top priority venues instead of walking them in order
        #[arg(long, conflicts_with = "venue")]
        race: bool,
    },
    /// Current price for a symbol with venue fallback
    Price {
        /// Symbol (e.g. "BTC")
        #[arg(long)]
        symbol: String,
    },
    /// List the symbols a venue carries
    Symbols {
        /// Venue (e.g. "binance")
        #[arg(long)]
        venue: String,
    },
    /// Dump aggregator statistics and the availability snapshot
    Stats,
    /// Import signal definitions and detected signals from a JSON file
    SeedSignals {
        /// Path to the JSON file
        #[arg(long)]
        file: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::load()?;

    match cli.command {
        Commands::InitDb => run_init_db(&config).await?,
        Commands::FactCheck {
            symbol,
            limit,
            workers,
            no_filter,
        } => run_fact_check(&config, symbol, limit, workers, no_filter).await?,
        Commands::Mine { timeframe } => run_mine(&config, &timeframe).await?,
        Commands::MineCross => run_mine_cross(&config).await?,
        Commands::AdjustConfidence {
            signal,
            timeframe,
            list,
        } => {
            run_adjust_confidence(&config, signal, timeframe, list).await?;
        }
        Commands::Combos { timeframe } => run_combos(&config, timeframe).await?,
        Commands::Fetch {
            symbol,
            timeframe,
            limit,
            venue,
            race,
        } => run_fetch(&config, &symbol, &timeframe, limit, venue, race).await?,
        Commands::Price { symbol } => run_price(&config, &symbol).await?,
        Commands::Symbols { venue } => run_symbols(&config, &venue).await?,
        Commands::Stats => run_stats(&config).await?,
        Commands::SeedSignals { file } => run_seed_signals(&config, &file).await?,
    }

    Ok(())
}

/// Builds the aggregator stack: clients, rehydrated availability cache, and
/// background maintenance tasks.
async fn build_aggregator(config: &AppConfig) -> anyhow::Result<Arc<ExchangeAggregator>> {
    let availability = Arc::new(SymbolAvailabilityCache::new(
        config.cache.availability_ttl_secs,
    ));
    let restored = availability
        .load_snapshot(&config.cache.availability_snapshot_path)
        .await?;
    if restored > 0 {
        tracing::info!("restored availability for {restored} symbols");
    }

    let clients = build_clients(&config.exchanges);
    let aggregator = Arc::new(ExchangeAggregator::new(
        clients,
        &config.exchanges,
        availability,
    ));
    aggregator.spawn_background_tasks();
    Ok(aggregator)
}

async fn connect_repos(config: &AppConfig) -> anyhow::Result<Repositories> {
    let db = DatabaseClient::connect(&config.database.url, config.database.max_connections).await?;
    Ok(Repositories::new(db.pool().clone()))
}

async fn run_init_db(config: &AppConfig) -> anyhow::Result<()> {
    let db = DatabaseClient::connect(&config.database.url, config.database.max_connections).await?;
    db.init_schema().await?;
    println!("schema ready");
    Ok(())
}

async fn run_fact_check(
    config: &AppConfig,
    symbol: Option<String>,
    limit: Option<i64>,
    workers: usize,
    no_filter: bool,
) -> anyhow::Result<()> {
    let repos = connect_repos(config).await?;
    let aggregator = build_aggregator(config).await?;
    let facade = Arc::new(PriceDataFacade::with_cache_config(
        Arc::clone(&aggregator),
        &config.cache,
    ));
    facade.spawn_background_tasks();

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received; finishing the current batch");
            ctrl_c_token.cancel();
        }
    });

    let checker = BulkFactChecker::new(repos, facade, config.fact_check.clone(), cancel);
    let options = FactCheckOptions {
        symbol,
        limit,
        use_filtering: !no_filter,
        max_workers: workers,
    };
    let summary = checker.run(&options).await?;

    aggregator
        .availability()
        .save_snapshot(&config.cache.availability_snapshot_path)
        .await?;

    println!("{}", RunReportFormatter::format(&summary));
    Ok(())
}

async fn run_mine(config: &AppConfig, timeframe: &str) -> anyhow::Result<()> {
    let timeframe: Timeframe = timeframe.parse()?;
    let repos = connect_repos(config).await?;
    let miner = CombinationMiner::new(
        repos,
        config.miner.clone(),
        config.cache.summary_ttl_secs,
    );
    let report = miner.analyze_combinations(timeframe).await?;
    println!(
        "{} candidates, {} qualified, {} persisted ({} low samples, {} low accuracy){}",
        report.candidates_considered,
        report.qualified,
        report.persisted,
        report.skipped_low_samples,
        report.skipped_low_accuracy,
        if report.capped { ", capped" } else { "" }
    );
    Ok(())
}

async fn run_mine_cross(config: &AppConfig) -> anyhow::Result<()> {
    let repos = connect_repos(config).await?;
    let miner = CombinationMiner::new(
        repos,
        config.miner.clone(),
        config.cache.summary_ttl_secs,
    );
    let report = miner.analyze_cross_tf_combinations().await?;
    println!(
        "{} candidates, {} qualified, {} persisted ({} low samples, {} low accuracy){}",
        report.candidates_considered,
        report.qualified,
        report.persisted,
        report.skipped_low_samples,
        report.skipped_low_accuracy,
        if report.capped { ", capped" } else { "" }
    );
    Ok(())
}

async fn run_adjust_confidence(
    config: &AppConfig,
    signal: Option<String>,
    timeframe: Option<String>,
    list: bool,
) -> anyhow::Result<()> {
    let repos = connect_repos(config).await?;
    if list {
        let rows = repos.confidence.find_all().await?;
        println!("{} confidence adjustments", rows.len());
        for row in rows {
            println!(
                "  {}@{}: {} -> {} (accuracy {:.1}%, n={}, updated {})",
                row.signal_name,
                row.timeframe,
                row.original_confidence,
                row.adjusted_confidence,
                row.accuracy_rate,
                row.sample_size,
                row.last_updated.format("%Y-%m-%d %H:%M")
            );
        }
        return Ok(());
    }
    let service = ConfidenceService::new(repos, config.fact_check.clone());
    match (signal, timeframe) {
        (Some(signal), Some(timeframe)) => {
            match service.refresh_pair(&signal, &timeframe).await? {
                Some(record) => println!(
                    "{signal}@{timeframe}: {} -> {} (accuracy {:.1}%, n={})",
                    record.original_confidence,
                    record.adjusted_confidence,
                    record.accuracy_rate,
                    record.sample_size
                ),
                None => println!("{signal}@{timeframe}: not enough samples"),
            }
        }
        (Some(_), None) | (None, Some(_)) => {
            anyhow::bail!("--signal and --timeframe must be given together");
        }
        (None, None) => {
            let updated = service.refresh_all().await?;
            println!("updated {updated} confidence rows");
        }
    }
    Ok(())
}

async fn run_combos(config: &AppConfig, timeframe: Option<String>) -> anyhow::Result<()> {
    let repos = connect_repos(config).await?;
    match timeframe {
        Some(timeframe) => {
            let timeframe: Timeframe = timeframe.parse()?;
            let combos = repos.combos.tf_combos_for(timeframe.as_str()).await?;
            println!("{} combos on {timeframe}", combos.len());
            for combo in combos {
                println!(
                    "  {:<50} {:.1}% over {} (pf {:.2})",
                    combo.signal_names, combo.accuracy, combo.sample_count, combo.profit_factor
                );
            }
        }
        None => {
            let combos = repos.combos.cross_tf_combos().await?;
            println!("{} cross-timeframe combos", combos.len());
            for combo in combos {
                println!(
                    "  {:<50} {:.1}% over {} ({} timeframes)",
                    combo.combo_signature, combo.accuracy, combo.sample_count, combo.num_timeframes
                );
            }
        }
    }
    Ok(())
}

async fn run_fetch(
    config: &AppConfig,
    symbol: &str,
    timeframe: &str,
    limit: usize,
    venue: Option<String>,
    race: bool,
) -> anyhow::Result<()> {
    let timeframe: Timeframe = timeframe.parse()?;
    let aggregator = build_aggregator(config).await?;

    let candles = match (venue, race) {
        (Some(venue), _) => {
            let venue: Venue = venue.parse()?;
            let request = CandleRequest::new(symbol, timeframe, limit);
            aggregator.fetch_from(venue, &request).await
        }
        (None, true) => {
            let request = CandleRequest::new(symbol, timeframe, limit);
            aggregator.fetch_race(&request).await
        }
        (None, false) => {
            let facade = PriceDataFacade::with_cache_config(Arc::clone(&aggregator), &config.cache);
            facade.latest_candles(symbol, timeframe, limit).await
        }
    };

    match candles {
        Some(candles) => {
            println!("{} candles for {symbol} {timeframe}", candles.len());
            for candle in candles.iter().rev().take(10).rev() {
                println!(
                    "{}  o={} h={} l={} c={} v={}",
                    candle.timestamp,
                    candle.open,
                    candle.high,
                    candle.low,
                    candle.close,
                    candle.volume
                );
            }
            aggregator
                .availability()
                .save_snapshot(&config.cache.availability_snapshot_path)
                .await?;
        }
        None => println!("no venue could serve {symbol} {timeframe} x{limit}"),
    }
    Ok(())
}

async fn run_price(config: &AppConfig, symbol: &str) -> anyhow::Result<()> {
    let aggregator = build_aggregator(config).await?;
    match aggregator.current_price_with_fallback(symbol).await {
        Some(quote) => println!("{symbol}: {} at {}", quote.price, quote.timestamp),
        None => println!("no venue could quote {symbol}"),
    }
    Ok(())
}

async fn run_seed_signals(config: &AppConfig, file: &str) -> anyhow::Result<()> {
    let json = tokio::fs::read_to_string(file).await?;
    let seed = sigval_data::parse_seed_file(&json)?;
    let repos = connect_repos(config).await?;
    let report = sigval_data::import_seed_file(&repos, &seed).await?;
    println!(
        "seeded {} definitions and {} signals",
        report.definitions, report.signals
    );
    Ok(())
}

async fn run_symbols(config: &AppConfig, venue: &str) -> anyhow::Result<()> {
    let venue: Venue = venue.parse()?;
    let clients = build_clients(&config.exchanges);
    let client = clients
        .iter()
        .find(|c| c.venue() == venue)
        .ok_or_else(|| anyhow::anyhow!("{venue} is not in the configured priority list"))?;

    let mut symbols = client.list_symbols().await?;
    symbols.sort();
    println!("{} symbols on {venue}", symbols.len());
    for symbol in symbols.iter().take(50) {
        println!("  {symbol}");
    }
    Ok(())
}

async fn run_stats(config: &AppConfig) -> anyhow::Result<()> {
    let aggregator = build_aggregator(config).await?;
    let stats = aggregator.stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);

    let snapshot = aggregator.availability().snapshot().await;
    println!("availability entries: {}", snapshot.len());
    for (symbol, entry) in snapshot.iter().take(20) {
        println!(
            "  {symbol}: {} available, {} unavailable (checked {})",
            entry.available.len(),
            entry.unavailable.len(),
            entry.last_checked
        );
    }
    Ok(())
}

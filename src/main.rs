mod chain;
mod config;
mod data;
mod execution;
mod monitoring;
mod pipeline;
mod resolution;
#[cfg(test)]
mod testing;

use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use chain::contract::{EthersOracleMarkets, OracleMarkets};
use chain::listener::EventListener;
use chain::scanner::BackfillScanner;
use config::{Config, EnvConfig};
use data::aggregator::DataAggregator;
use data::coingecko::CoinGeckoClient;
use data::defillama::DefiLlamaClient;
use execution::guard::IdempotencyGuard;
use execution::persistence::{restore_processed, ResolutionDatabase};
use execution::retry::RetryPolicy;
use execution::submitter::TransactionSubmitter;
use monitoring::logger::CsvLogger;
use pipeline::dispatcher::Dispatcher;
use pipeline::handler::ResolutionPipeline;
use resolution::engine::InferenceEngine;
use resolution::gate::ConfidenceGate;
use resolution::gemini::GeminiClient;
use resolution::types::OddsRange;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    tracing::info!("🚀 Oracle resolver starting...");

    // Load configuration
    tracing::info!("Loading configuration...");
    let mut config = Config::load("config.toml")?;
    let env_config = EnvConfig::load()?;
    config.apply_env(&env_config)?;

    tracing::info!("Dry run mode: {}", config.system.dry_run);
    tracing::info!("Chain ID: {}", config.chain.chain_id);
    tracing::info!("Confidence threshold: {}", config.resolver.confidence_threshold);
    tracing::info!(
        "Odds range: {}-{} bps",
        config.resolver.min_odds,
        config.resolver.max_odds
    );

    // Initialize database
    tracing::info!("Initializing database: {}", config.system.database_path);
    let db = ResolutionDatabase::new(&config.system.database_path)?;

    let guard = Arc::new(IdempotencyGuard::new());
    restore_processed(&db, &guard)?;
    tracing::info!("Resolutions on record: {}", db.count_resolutions()?);

    let contract: Arc<dyn OracleMarkets> = Arc::new(EthersOracleMarkets::new(
        &env_config.rpc_url,
        &env_config.private_key,
        &env_config.oracle_markets_address,
        config.chain.chain_id,
        config.chain.confirmations,
        config.chain.confirmation_timeout(),
    )?);

    let read_policy = RetryPolicy::new(config.chain.rpc_timeout(), config.chain.rpc_max_retries);
    let data_policy = RetryPolicy::new(
        Duration::from_secs(config.data.timeout_secs),
        config.data.max_retries,
    );
    let reasoning_policy = RetryPolicy::new(
        Duration::from_secs(config.reasoning.timeout_secs),
        config.reasoning.max_retries,
    );

    let aggregator = DataAggregator::new(
        Arc::new(CoinGeckoClient::new(
            config.data.coingecko_url.clone(),
            Duration::from_secs(config.data.price_cache_ttl_secs),
        )),
        Arc::new(DefiLlamaClient::new(config.data.defillama_url.clone())),
        config.data.price_coins.clone(),
        config.data.defi_protocols.clone(),
        data_policy,
    );

    let gemini = GeminiClient::new(
        config.reasoning.base_url.clone(),
        config.reasoning.model.clone(),
        env_config.gemini_api_key.clone(),
    );
    tracing::info!("Reasoning model: {}", gemini.model());
    let engine = InferenceEngine::new(
        Arc::new(gemini),
        OddsRange::new(config.resolver.min_odds, config.resolver.max_odds),
        reasoning_policy,
    );

    let csv = if config.monitoring.csv_logging {
        tracing::info!("CSV attempt log: {}", config.monitoring.csv_log_path);
        Some(CsvLogger::new(config.monitoring.csv_log_path.clone())?)
    } else {
        None
    };

    let pipeline = Arc::new(ResolutionPipeline::new(
        Arc::clone(&contract),
        aggregator,
        engine,
        ConfidenceGate::new(config.resolver.confidence_threshold),
        TransactionSubmitter::new(
            Arc::clone(&contract),
            config.system.dry_run,
            config.chain.write_timeout(),
        ),
        Arc::clone(&guard),
        db,
        csv,
        read_policy.clone(),
    ));
    let dispatcher = Dispatcher::new(pipeline);

    let listener = EventListener::new(
        Arc::clone(&contract),
        dispatcher.clone(),
        Duration::from_secs(config.chain.event_poll_interval_secs),
        config.chain.max_block_range,
        read_policy.clone(),
    );
    let scanner = BackfillScanner::new(
        Arc::clone(&contract),
        Arc::clone(&guard),
        dispatcher,
        config.resolver.max_scan_markets,
        Duration::from_secs(config.resolver.scan_interval_secs),
        read_policy,
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(listener.run(shutdown.clone()));
    tokio::spawn(scanner.run(shutdown.clone()));

    tracing::info!("✅ Resolver initialized successfully");

    // Keep running until ctrl-c or SIGTERM
    shutdown_signal()?.await;
    tracing::info!("Shutting down...");
    // In-flight handlers are abandoned; the next start's backfill picks them up
    shutdown.cancel();
    tracing::info!("Processed markets: {}", guard.processed_count());

    Ok(())
}

/// Handlers are registered before returning so a signal sent right after
/// start-up is not missed.
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!("Failed to listen for ctrl-c: {}", e);
                }
                tracing::info!("Received ctrl-c");
            }
            _ = terminate.recv() => tracing::info!("Received SIGTERM"),
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    Ok(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
        }
    })
}

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use llm_price_watch::adapters::AdapterRegistry;
use llm_price_watch::aggregator::AggregatorClient;
use llm_price_watch::cli::Cli;
use llm_price_watch::config::Config;
use llm_price_watch::domain::Result;
use llm_price_watch::observability;
use llm_price_watch::pipeline::PricingPipeline;
use llm_price_watch::projection::BackendSync;
use llm_price_watch::scheduler::Scheduler;
use llm_price_watch::storage::{
    BackendStore, PricingStore, SqliteBackendRepository, SqliteByokRepository,
    SqliteCatalogRepository, SqliteSnapshotRepository,
};

const EXIT_CONFIG_ERROR: i32 = 1;
const EXIT_RUNTIME_ERROR: i32 = 2;

#[tokio::main]
async fn main() {
    std::process::exit(run().await);
}

async fn run() -> i32 {
    let cli = Cli::parse_args();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return EXIT_CONFIG_ERROR;
        }
    };

    observability::init_tracing(&config.logging);
    info!("llm-price-watch v{}", llm_price_watch::VERSION);

    // Store or client construction failing at startup is a deployment
    // problem, not a runtime one.
    let scheduler = match build_scheduler(&config).await {
        Ok(scheduler) => scheduler,
        Err(e) => {
            error!(error = %e, "startup failed");
            return EXIT_CONFIG_ERROR;
        }
    };

    if cli.once {
        match scheduler.run_once().await {
            Ok(()) => 0,
            Err(e) => {
                error!(error = %e, "tick failed");
                EXIT_RUNTIME_ERROR
            }
        }
    } else {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received shutdown signal");
                let _ = shutdown_tx.send(true);
            }
        });

        // Loop mode isolates tick failures internally; an error here is
        // unrecoverable.
        match scheduler.run_loop(shutdown_rx).await {
            Ok(()) => 0,
            Err(e) => {
                error!(error = %e, "scheduler loop failed");
                EXIT_RUNTIME_ERROR
            }
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => Config::from_file(path),
        None => Config::from_env(),
    }
}

async fn build_scheduler(config: &Config) -> Result<Scheduler> {
    let pricing_store = PricingStore::connect(&config.pricing_store).await?;
    pricing_store.health_check().await?;

    let catalog = Arc::new(SqliteCatalogRepository::new(pricing_store.pool().clone()));
    let snapshots = Arc::new(SqliteSnapshotRepository::new(pricing_store.pool().clone()));
    let byok = Arc::new(SqliteByokRepository::new(pricing_store.pool().clone()));

    let aggregator = Arc::new(AggregatorClient::new(&config.aggregator)?);
    let registry = Arc::new(AdapterRegistry::new(
        &config.scraping,
        Duration::from_secs(config.aggregator.request_timeout_secs),
    )?);

    let pipeline = Arc::new(PricingPipeline::new(
        aggregator,
        registry,
        catalog.clone(),
        snapshots.clone(),
        byok,
        config.filters.clone(),
        config.pipeline.clone(),
        config.scraping.enable_provider_scraping,
    ));

    let backend_sync = match &config.backend_store {
        Some(store_config) => {
            let backend_store = BackendStore::connect(store_config).await?;
            backend_store.health_check().await?;

            let backend = Arc::new(SqliteBackendRepository::new(backend_store.pool().clone()));
            Some(Arc::new(BackendSync::new(
                catalog,
                snapshots,
                backend,
                config.projection.clone(),
            )))
        }
        None => None,
    };

    Ok(Scheduler::new(
        pipeline,
        backend_sync,
        config.scheduler.clone(),
    ))
}

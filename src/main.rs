//! lifegrid CLI entry point

use anyhow::{Context, Result};
use clap::Parser;
use lifegrid::config::cli::{Cli, ExecutionMode};
use lifegrid::config::{toml::load_config, validator::validate_config, Config};
use lifegrid::coordinator::Broker;
use lifegrid::distributed::control::{self, ControlAction};
use lifegrid::distributed::{connect_workers, BrokerClient, BrokerService, Driver, WorkerService};
use lifegrid::worker::{LocalWorker, SectionClient};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.runtime.log_level)),
        )
        .init();

    validate_config(&config, cli.mode).context("Configuration validation failed")?;

    println!("lifegrid v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    runtime.block_on(async {
        match cli.mode {
            ExecutionMode::Standalone => run_standalone(config).await,
            ExecutionMode::Broker => run_broker(config).await,
            ExecutionMode::Worker => run_worker(config).await,
            ExecutionMode::Driver => run_driver(config).await,
            ExecutionMode::Control => {
                let action = cli.action.context("--mode control needs --action")?;
                run_control(config, action).await
            }
        }
    })
}

/// Broker with in-process workers on a loopback port, driven from this process
async fn run_standalone(mut config: Config) -> Result<()> {
    let workers: Vec<Arc<dyn SectionClient>> =
        LocalWorker::pool(config.broker.local_workers, config.worker.sub_workers)
            .into_iter()
            .map(|w| Arc::new(w) as Arc<dyn SectionClient>)
            .collect();
    let broker = Arc::new(Broker::new(workers, config.broker.settings())?);

    let service = BrokerService::bind("127.0.0.1:0", Arc::clone(&broker), config.broker.shutdown_grace)
        .await
        .context("Failed to bind standalone broker")?;
    config.driver.broker_addr = service.local_addr()?.to_string();
    println!(
        "Standalone broker on {} with {} local workers",
        config.driver.broker_addr, config.broker.local_workers
    );
    let service_task = tokio::spawn(service.run());

    let driven = Driver::new(config.driver).run().await;

    // The broker dies with this process either way
    if let Err(e) = broker.close().await {
        tracing::warn!(error = %e, "Failed to close standalone broker");
    }
    service_task
        .await
        .context("Broker service panicked")?
        .context("Broker service failed")?;

    driven.map(|_| ())
}

async fn run_broker(config: Config) -> Result<()> {
    println!("Connecting to {} workers", config.broker.worker_addresses.len());
    let workers = connect_workers(&config.broker.worker_addresses)
        .await
        .context("Failed to connect to workers")?;

    let broker = Arc::new(Broker::new(workers, config.broker.settings())?);
    let service = BrokerService::bind(&config.broker.listen_addr, broker, config.broker.shutdown_grace)
        .await
        .with_context(|| format!("Failed to bind broker service on {}", config.broker.listen_addr))?;

    println!("Broker listening on {}", service.local_addr()?);
    service.run().await.context("Broker service failed")?;
    println!("Broker closed");
    Ok(())
}

async fn run_worker(config: Config) -> Result<()> {
    let service = WorkerService::bind(
        &config.worker.listen_addr,
        config.worker.sub_workers,
        config.worker.shutdown_grace,
    )
    .await
    .with_context(|| format!("Failed to bind worker service on {}", config.worker.listen_addr))?;

    println!(
        "Worker listening on {} ({} sub-workers)",
        service.local_addr()?,
        config.worker.sub_workers
    );
    service.run().await.context("Worker service failed")?;
    println!("Worker closed");
    Ok(())
}

async fn run_driver(config: Config) -> Result<()> {
    Driver::new(config.driver).run().await?;
    Ok(())
}

async fn run_control(config: Config, action: ControlAction) -> Result<()> {
    let client = BrokerClient::connect(config.driver.broker_addr.as_str())
        .await
        .with_context(|| format!("Failed to connect to broker at {}", config.driver.broker_addr))?;
    control::apply(&client, action, &config.driver.output_dir).await?;
    Ok(())
}

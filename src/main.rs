use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Builder;
use tracing::info;

use resilient_fetch::cli::{Cli, Commands};
use resilient_fetch::client::ResilientClient;
use resilient_fetch::fetcher::Fetcher;
use resilient_fetch::http::HttpClient;
use resilient_fetch::registry::BreakerRegistry;

fn main() -> Result<()> {
    // I/O bound: a few threads past the core count, capped at 16
    let num_cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    let worker_threads = std::cmp::min(num_cpus + 2, 16);

    let runtime = Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let retry_config = cli.retry_config()?;
    let breaker_config = cli.breaker_config()?;

    // Backstop only; the retry executor enforces the per-attempt budget
    let http = HttpClient::new(retry_config.timeout + Duration::from_secs(1))?;
    let breakers = Arc::new(BreakerRegistry::new(breaker_config));
    let client = ResilientClient::new(http, retry_config, Arc::clone(&breakers));
    let fetcher = Fetcher::new(client, cli.concurrent_requests);

    match &cli.command {
        Commands::Get { url } => {
            info!("Fetching single URL: {}", url);
            let result = fetcher.fetch(url).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Batch {
            input_file,
            output_file,
            chunk_size,
        } => {
            info!("Processing batch from file: {:?}", input_file);
            fetcher
                .process_batch(input_file, output_file.as_ref(), *chunk_size)
                .await?;
        }
    }

    for health in breakers.snapshot() {
        info!(
            "Dependency {}: {} (failures={}, successes={})",
            health.dependency,
            health.stats.state,
            health.stats.consecutive_failures,
            health.stats.consecutive_successes
        );
    }

    Ok(())
}

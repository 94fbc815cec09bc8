use anyhow::{Context, Result};
use mcheck_client::MemcacheConnector;
use mcheck_core::config::Config;
use mcheck_core::{ConsoleReporter, Connector};
use mcheck_runner::{BenchmarkParams, CheckOptions, Checker, benchmark};
use std::sync::Arc;
use tracing::info;

pub async fn check(config: &Config) -> Result<()> {
    let connector = MemcacheConnector::new(&config.server);
    let options = CheckOptions::from(&config.check);
    info!("Checking {} (flush: {})", connector.target(), options.flush);

    // The checker blocks on I/O and sleeps for the expiry step
    let summary = tokio::task::spawn_blocking(move || -> Result<_> {
        let client = connector
            .connect()
            .with_context(|| format!("Failed to connect to {}", connector.target()))?;
        let mut reporter = ConsoleReporter::new();
        let summary = Checker::new(&client, options).run(&mut reporter)?;
        Ok(summary)
    })
    .await
    .context("Check task failed")??;

    info!(
        "{} checks passed in {:?}",
        summary.passed.len(),
        summary.elapsed
    );
    Ok(())
}

pub async fn benchmark(config: &Config) -> Result<()> {
    let connector = Arc::new(MemcacheConnector::new(&config.server));
    let params = BenchmarkParams::from(&config.benchmark);

    println!(
        "Start benchmark: target={}, workers={}, request count per worker={} (total request count={})",
        connector.target(),
        params.concurrency,
        params.requests_per_worker,
        params.total_requests()
    );

    let summary = benchmark::run(connector, params)
        .await
        .context("Benchmark failed")?;

    print!("{summary}");
    Ok(())
}

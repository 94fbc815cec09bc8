use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

mod app;

#[derive(Parser, Debug)]
#[command(author, version, about = "mcheck - memcached compatibility checker", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the server behaves like memcached
    Check {
        /// Address of the memcached server
        #[arg(short, long)]
        address: Option<String>,

        /// Flush the server before running the check
        #[arg(short, long)]
        flush: bool,
    },

    /// Run benchmarks for Set, Get and Delete
    Benchmark {
        /// Address of the memcached server
        #[arg(short, long)]
        address: Option<String>,

        /// Number of concurrent workers
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Request count per worker
        #[arg(short, long)]
        requests: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; stdout is reserved for the report
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    info!("Starting mcheck v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = if let Some(config_path) = args.config {
        mcheck_core::config::Config::load_from_path(config_path)?
    } else {
        mcheck_core::config::Config::load_or_default()
    };

    // Override with CLI arguments
    match args.command {
        Command::Check { address, flush } => {
            if let Some(address) = address {
                config.server.address = address;
            }
            config.check.flush |= flush;
            config.validate()?;
            app::check(&config).await
        }
        Command::Benchmark {
            address,
            concurrency,
            requests,
        } => {
            if let Some(address) = address {
                config.server.address = address;
            }
            if let Some(concurrency) = concurrency {
                config.benchmark.concurrency = concurrency;
            }
            if let Some(requests) = requests {
                config.benchmark.requests = requests;
            }
            config.validate()?;
            app::benchmark(&config).await
        }
    }
}

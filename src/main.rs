mod breaker;
mod cli;
mod commands;
mod crawl;

use anyhow::Result;
use clap::Parser;
use tracing::{error, warn};

// mimalloc keeps memory flat under worker-heavy loads.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use legalscout_core::AppConfig;

use crate::cli::{Cli, Commands};
use crate::crawl::{run_crawl, CrawlExit};

const EXIT_CONFIG_ERROR: i32 = 2;
const EXIT_STORAGE_UNAVAILABLE: i32 = 3;
const EXIT_BREAKER_EXHAUSTED: i32 = 4;

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config_str = std::fs::read_to_string(&cli.config).unwrap_or_else(|_| {
        warn!(path = %cli.config, "config file not found, using defaults");
        include_str!("../config/default.toml").to_string()
    });
    let mut config: AppConfig = match toml::from_str(&config_str) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };

    // Worker-count override for container deployments.
    if let Ok(v) = std::env::var("LEGALSCOUT_WORKERS") {
        match v.parse::<usize>() {
            Ok(n) if n > 0 && n <= 128 => config.crawl.workers = n,
            _ => warn!(value = %v, "ignoring invalid LEGALSCOUT_WORKERS"),
        }
    }

    match cli.command {
        Commands::Crawl { workers } => match run_crawl(config, workers).await {
            Ok(CrawlExit::Normal) => {}
            Ok(CrawlExit::StorageUnavailable) => std::process::exit(EXIT_STORAGE_UNAVAILABLE),
            Ok(CrawlExit::BreakerExhausted) => std::process::exit(EXIT_BREAKER_EXHAUSTED),
            Err(e) => {
                if is_storage_unavailable(&e) {
                    error!(error = %e, "storage unavailable");
                    std::process::exit(EXIT_STORAGE_UNAVAILABLE);
                }
                return Err(e);
            }
        },
        Commands::Enqueue { domains, source } => {
            commands::enqueue::run(config, domains, source).await?;
        }
        Commands::Status => {
            commands::status::run(config).await?;
        }
        Commands::Export {
            profile,
            format,
            output,
        } => {
            commands::export::run(config, profile, format, output).await?;
        }
        Commands::Reset { statuses } => {
            commands::reset::run(config, statuses).await?;
        }
    }

    Ok(())
}

fn is_storage_unavailable(e: &anyhow::Error) -> bool {
    matches!(
        e.downcast_ref::<legalscout_core::CrawlError>(),
        Some(legalscout_core::CrawlError::StorageUnavailable(_))
    )
}

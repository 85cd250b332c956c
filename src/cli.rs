use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "legalscout", about = "ccTLD legal-entity crawler & extractor")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process the pending queue with the worker pool
    Crawl {
        /// Override the configured worker count
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Add domains to the queue
    Enqueue {
        /// Domains (comma-separated) or a path to a file with one per line
        #[arg(short, long)]
        domains: String,

        /// Discovery source tag stored with each domain
        #[arg(short, long, default_value = "manual")]
        source: String,
    },
    /// Show queue and result counts
    Status,
    /// Export stored results to a tabular file
    Export {
        /// Export profile (strict, permissive); defaults to the config value
        #[arg(short, long)]
        profile: Option<String>,

        /// Output format (csv, jsonl)
        #[arg(short, long, default_value = "csv")]
        format: String,

        /// Output directory; defaults to the config value
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Move terminal failure statuses back to PENDING
    Reset {
        /// Statuses to reset (comma-separated); all failures when omitted
        #[arg(short, long, value_delimiter = ',')]
        statuses: Option<Vec<String>>,
    },
}

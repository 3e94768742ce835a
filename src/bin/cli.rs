//! feedwatch CLI
//!
//! Local execution entry point. Runs harvest cycles against the web
//! client with the in-memory store; server-backed document stores plug in
//! through the `DocumentStore` trait.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use feedwatch::{
    config,
    error::Result,
    models::Query,
    pipeline::Monitor,
    services::WebClient,
    storage::MemoryStore,
};

/// feedwatch - Social feed harvester
#[derive(Parser, Debug)]
#[command(name = "feedwatch", version, about = "Harvests posts and comments for monitored queries")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "feedwatch.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Discover and ingest new posts for a query
    Search {
        /// Account handle or #tag
        query: String,
    },

    /// Re-fetch stale stored posts for a query
    Update {
        /// Account handle or #tag
        query: String,

        /// Override the staleness window in days
        #[arg(long)]
        older_days: Option<u64>,
    },

    /// Re-download all posts of a query from another database
    Migrate {
        /// Account handle or #tag
        query: String,

        /// Database to take ids from
        #[arg(long)]
        from_db: String,
    },

    /// Validate the configuration file
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Command::Validate = cli.command {
        config::load_validated(&cli.config)?;
        log::info!("Configuration is valid");
        return Ok(());
    }

    let config = config::load_config(&cli.config);
    let client = Arc::new(WebClient::new(&config.crawler)?);
    let store = Arc::new(MemoryStore::new());
    let monitor = Monitor::new(client, store, config);

    match cli.command {
        Command::Search { query } => {
            monitor.search_query(&Query::parse(&query)).await?;
        }
        Command::Update { query, older_days } => {
            monitor.update_query(&Query::parse(&query), older_days).await?;
        }
        Command::Migrate { query, from_db } => {
            monitor.migrate_query(&Query::parse(&query), &from_db).await?;
        }
        Command::Validate => unreachable!("handled above"),
    }

    Ok(())
}

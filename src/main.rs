//! # Support Harness CLI (`support`)
//!
//! ## Usage
//!
//! ```bash
//! support --config ./config/support.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `support index [--force]` | Build the index, or load it when fresh |
//! | `support stats` | Print index statistics |
//! | `support search "<query>"` | Print ranked passages |
//! | `support ask "<query>"` | Answer from docs, or diagnose |
//! | `support resolve "<query>"` | Run the resolution workflow (cached) |
//! | `support serve` | Start the HTTP server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use support_harness::{config, index, logging, search, server, stats, workflow};

/// Support Harness: answer support questions from local documentation,
/// falling back to incident diagnosis.
#[derive(Parser)]
#[command(
    name = "support",
    about = "Support Harness: local documentation answers with an incident-diagnosis fallback",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/support.toml`.
    #[arg(long, global = true, default_value = "./config/support.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the local index.
    ///
    /// Reuses the persisted index when no document changed since it was
    /// written.
    Index {
        /// Rebuild even if the persisted index is fresh.
        #[arg(long)]
        force: bool,
    },

    /// Show index statistics.
    Stats,

    /// Search the local documentation.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of passages to return.
        #[arg(long)]
        k: Option<usize>,
    },

    /// Answer a question without the session cache.
    Ask {
        query: String,

        /// Number of passages to retrieve.
        #[arg(long)]
        k: Option<usize>,
    },

    /// Run the resolution workflow and print its JSON output.
    Resolve {
        query: String,

        /// Session id recorded with the request.
        #[arg(long)]
        session: Option<String>,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    logging::init_tracing(&cfg.logging.level);

    match cli.command {
        Commands::Index { force } => {
            index::run_index(&cfg, force).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Search { query, k } => {
            search::run_search(&cfg, &query, k).await?;
        }
        Commands::Ask { query, k } => {
            workflow::run_ask(&cfg, &query, k).await?;
        }
        Commands::Resolve { query, session } => {
            workflow::run_resolve(&cfg, &query, session).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

//! # groundwork CLI (`gw`)
//!
//! ## Usage
//!
//! ```bash
//! gw --config ./config/gw.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `gw init` | Create the SQLite database and run schema migrations |
//! | `gw sources` | List configured document sources and their status |
//! | `gw build` | Chunk, embed, and index documents (full rebuild) |
//! | `gw search "<query>"` | Show the chunks retrieval returns for a query |
//! | `gw ask "<question>"` | Answer a question from the knowledge base |
//! | `gw stats` | Summarize the indexed collection |
//! | `gw serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! # Index a scraped-pages file instead of the configured sources
//! gw build --json ./data/pages.json
//!
//! # Build at startup only if nothing is indexed yet
//! gw build --if-empty
//!
//! # Machine-readable answer
//! gw ask "What is the hostel fee?" --json
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use groundwork::config;
use groundwork::index::SqliteIndex;
use groundwork::sources::SourceSelector;
use groundwork::{ingest, logging, search, server, sources, stats};

/// groundwork: retrieval-augmented answers from a curated knowledge base.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Every setting has a default, so the file may be short.
#[derive(Parser)]
#[command(
    name = "gw",
    about = "groundwork: retrieval-augmented answers from a curated knowledge base",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/gw.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and its tables. Idempotent.
    Init,

    /// List configured document sources and whether they are reachable.
    Sources,

    /// Build the index from documents.
    ///
    /// Clears the collection, chunks every document, embeds the chunks in
    /// batches, and stores them. Embedding failures are reported, not fatal.
    Build {
        /// Only read one configured source: `json`, `directory`, or `catalog`.
        #[arg(long, conflicts_with = "json")]
        source: Option<String>,

        /// Read this scraped-pages JSON file instead of the configured sources.
        #[arg(long)]
        json: Option<PathBuf>,

        /// Skip the build when the collection already has entries.
        #[arg(long)]
        if_empty: bool,

        /// Show document and chunk counts without embedding or writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the chunks retrieved for a query, with similarity scores.
    Search {
        query: String,

        /// Number of chunks to return (default: `[retrieval].top_k`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Answer a question from the knowledge base.
    Ask {
        question: String,

        /// Print the full answer object as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Summarize the indexed collection.
    Stats,

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging);

    match cli.command {
        Commands::Init => {
            let index = SqliteIndex::connect(&cfg.db).await?;
            index.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Build {
            source,
            json,
            if_empty,
            dry_run,
        } => {
            let selector = match (source, json) {
                (_, Some(path)) => SourceSelector::JsonFile(path),
                (Some(name), None) => SourceSelector::Named(name),
                (None, None) => SourceSelector::All,
            };
            ingest::run_build(&cfg, &selector, if_empty, dry_run).await?;
        }
        Commands::Search { query, limit } => {
            search::run_search(&cfg, &query, limit).await?;
        }
        Commands::Ask { question, json } => {
            search::run_ask(&cfg, &question, json).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

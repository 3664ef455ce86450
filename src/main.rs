//! # Shariah Audit CLI (`audit`)
//!
//! Builds the reference index from a folder of PDFs and audits Islamic
//! finance product descriptions against it, from the command line or over
//! HTTP.
//!
//! ## Usage
//!
//! ```bash
//! audit --config ./config/audit.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `audit init` | Create the index database and schema |
//! | `audit ingest` | Rebuild the index from the PDF folder |
//! | `audit search "<query>"` | Show the reference chunks nearest a query |
//! | `audit audit "<text>"` | Audit a product description (`--clauses` for a clause-by-clause report) |
//! | `audit check "<clause>"` | Check a single clause |
//! | `audit stats` | Summarise the index |
//! | `audit serve` | Start the HTTP API server |
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`
//! (default `shariah_audit=info,tower_http=info`). A `.env` file in the
//! working directory is loaded before the configuration.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use shariah_audit::audit::Auditor;
use shariah_audit::config;
use shariah_audit::embedding::{self, EmbeddingProvider};
use shariah_audit::ingest;
use shariah_audit::migrate;
use shariah_audit::retrieve;
use shariah_audit::server;
use shariah_audit::stats;
use shariah_audit::store::VectorStore;

/// Shariah compliance auditing backed by retrieval over reference PDFs.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means built-in defaults.
#[derive(Parser)]
#[command(
    name = "audit",
    about = "Shariah compliance audit assistant for Islamic finance products",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/audit.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the index database schema. Safe to run repeatedly.
    Init,

    /// Rebuild the index from the configured PDF folder.
    ///
    /// Clears the existing index, then loads, chunks and embeds every PDF.
    /// Unreadable files are skipped with a warning.
    Ingest,

    /// Show the reference chunks most similar to a query.
    Search {
        query: String,

        /// Number of chunks to return (defaults to `retrieval.top_k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Audit a product description and print the result as JSON.
    Audit {
        /// Product description text.
        text: Option<String>,

        /// Read the product description from a file instead.
        #[arg(long, conflicts_with = "text")]
        file: Option<PathBuf>,

        /// Check each suspicious term separately instead of judging the
        /// whole description at once.
        #[arg(long)]
        clauses: bool,
    },

    /// Check a single clause and print the result as JSON.
    Check { clause: String },

    /// Summarise the index contents.
    Stats,

    /// Start the HTTP API server.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("shariah_audit=info,tower_http=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Index initialized at {}", cfg.index.db_path().display());
        }
        Commands::Ingest => {
            let embedder = embedding::create_provider(&cfg.embedding)?;
            let stats = ingest::run_ingest(&cfg, embedder.as_ref()).await?;
            ingest::print_summary(&cfg, &stats);
        }
        Commands::Search { query, k } => {
            run_search(&cfg, &query, k.unwrap_or(cfg.retrieval.top_k)).await?;
        }
        Commands::Audit {
            text,
            file,
            clauses,
        } => {
            let text = match (text, file) {
                (Some(text), _) => text,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                (None, None) => bail!("Provide the product text or --file <path>"),
            };
            let auditor = Auditor::from_config(&cfg).await?;
            let json = if clauses {
                serde_json::to_string_pretty(&auditor.audit_clauses(&text).await?)?
            } else {
                serde_json::to_string_pretty(&auditor.audit(&text).await?)?
            };
            println!("{}", json);
        }
        Commands::Check { clause } => {
            let auditor = Auditor::from_config(&cfg).await?;
            let check = auditor.check_clause(&clause).await?;
            println!("{}", serde_json::to_string_pretty(&check)?);
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

async fn run_search(cfg: &config::Config, query: &str, k: usize) -> anyhow::Result<()> {
    let embedder = embedding::create_provider(&cfg.embedding)?;
    let store = VectorStore::open(cfg).await?;
    store
        .ensure_compatible(embedder.model_name(), embedder.dims())
        .await?;
    let hits = retrieve::retrieve(&store, embedder.as_ref(), query, k).await?;
    store.close().await;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.3}] {} p.{}", i + 1, hit.score, hit.source, hit.page);
        let snippet: String = hit.text.chars().take(240).collect();
        println!("    {}", snippet.replace('\n', " "));
        println!();
    }
    Ok(())
}

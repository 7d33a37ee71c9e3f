//! # digbin CLI (`dig`)
//!
//! The `dig` binary drives the inbox: capture items, run scan passes,
//! review what the lookup found, and serve the live inbox over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! dig --config ./config/digbin.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dig init` | Create the SQLite database and run schema migrations |
//! | `dig add quick\|barcode\|cover\|import` | Capture new inbox items |
//! | `dig scan` | Run one OCR + lookup pass over due items |
//! | `dig list` | List active items, newest first |
//! | `dig show <id>` | Item detail with top candidates |
//! | `dig confirm\|retry\|undo\|unknown\|edit\|delete <id>` | Review decisions |
//! | `dig stats` | Pipeline summary |
//! | `dig serve` | HTTP server with background scanning |
//!
//! ## Examples
//!
//! ```bash
//! dig init
//! dig add barcode 0724349532522
//! dig add import ./crate-digging.jsonl
//! dig scan
//! dig list --review
//! dig confirm 3f2a... --candidate 9b1c...
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use digbin::capture::{self, Capture};
use digbin::{config, get, migrate, review, scan, server, stats};
use digbin_core::models::ExtractedFields;

/// digbin: a local-first inbox for cataloguing records.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/digbin.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "dig",
    about = "digbin: capture, identify, and review records in a local inbox",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/digbin.toml")]
    config: PathBuf,

    /// Log pipeline transitions at debug level.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it against an existing database is safe.
    Init,

    /// Capture a new inbox item.
    Add {
        #[command(subcommand)]
        source: AddSource,
    },

    /// Run one scan pass: OCR due covers, then look up due items.
    Scan {
        /// Most items handled per step (defaults to `[pipeline].batch_limit`).
        #[arg(long)]
        limit: Option<i64>,
    },

    /// List active inbox items, newest first.
    List {
        #[arg(long, default_value = "50")]
        limit: i64,

        /// Only items waiting for a human decision.
        #[arg(long)]
        review: bool,
    },

    /// Show one item with its best candidates.
    Show { id: String },

    /// Commit an item waiting in review to a candidate.
    ///
    /// Without `--candidate`, the highest-confidence snapshot is used.
    Confirm {
        id: String,

        /// Snapshot id from `dig show`.
        #[arg(long)]
        candidate: Option<String>,
    },

    /// Queue an uncommitted item for lookup right now.
    Retry { id: String },

    /// Revert a commit and send the item back to review.
    Undo { id: String },

    /// Mark an item as unidentifiable.
    Unknown { id: String },

    /// Correct an item's fields and queue it for another lookup.
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        artist: Option<String>,
        #[arg(long)]
        label: Option<String>,
        #[arg(long)]
        catalog_no: Option<String>,
    },

    /// Delete an item.
    ///
    /// Soft-deletes by default; `--purge` removes the row and its snapshots.
    Delete {
        id: String,
        #[arg(long)]
        purge: bool,
    },

    /// Show inbox statistics.
    Stats,

    /// Start the HTTP server and background scanning.
    ///
    /// Binds to `[server].bind`; scans every `[server].scan_interval_secs`.
    Serve,
}

/// Capture sources for `dig add`.
#[derive(Subcommand)]
enum AddSource {
    /// Typed title and artist.
    Quick { title: String, artist: String },
    /// Scanned barcode.
    Barcode { barcode: String },
    /// Cover photo (path or file:// URI); OCR reads it on the next scan.
    Cover { photo: String },
    /// JSON Lines file, one object per row.
    Import { file: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "digbin=debug,digbin_core=debug"
    } else {
        "digbin=info,digbin_core=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Add { source } => match source {
            AddSource::Quick { title, artist } => {
                capture::run_add(&cfg, Capture::Quick { title, artist }).await?;
            }
            AddSource::Barcode { barcode } => {
                capture::run_add(&cfg, Capture::Barcode(barcode)).await?;
            }
            AddSource::Cover { photo } => {
                capture::run_add(&cfg, Capture::Cover(photo)).await?;
            }
            AddSource::Import { file } => {
                capture::run_import(&cfg, &file).await?;
            }
        },
        Commands::Scan { limit } => {
            scan::run_scan(&cfg, limit).await?;
        }
        Commands::List { limit, review } => {
            get::run_list(&cfg, limit, review).await?;
        }
        Commands::Show { id } => {
            get::run_show(&cfg, &id).await?;
        }
        Commands::Confirm { id, candidate } => {
            review::run_confirm(&cfg, &id, candidate.as_deref()).await?;
        }
        Commands::Retry { id } => {
            review::run_retry(&cfg, &id).await?;
        }
        Commands::Undo { id } => {
            review::run_undo(&cfg, &id).await?;
        }
        Commands::Unknown { id } => {
            review::run_unknown(&cfg, &id).await?;
        }
        Commands::Edit {
            id,
            title,
            artist,
            label,
            catalog_no,
        } => {
            let fields = ExtractedFields {
                title,
                artist,
                label,
                catalog_no,
            };
            review::run_edit(&cfg, &id, fields).await?;
        }
        Commands::Delete { id, purge } => {
            review::run_delete(&cfg, &id, purge).await?;
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

//! # page-sync CLI (`pagesync`)
//!
//! ```bash
//! pagesync [--config ./config/pagesync.toml] [sync] [--dry-run]
//! pagesync init
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pagesync` | Same as `pagesync sync` |
//! | `pagesync sync` | Reconcile the store with the source once |
//! | `pagesync init` | Create the store schema (sqlite backend) |
//!
//! Exits non-zero only when configuration is invalid or the run aborts
//! before writing (source fetch or store read failure). Per-item failures
//! are logged and counted but leave the exit status at zero.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use page_sync::{config, logging, store, sync};

const DEFAULT_CONFIG: &str = "./config/pagesync.toml";

/// Reconcile knowledge-graph pages into a vector page store.
#[derive(Parser)]
#[command(name = "pagesync", version)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/pagesync.toml` when that file exists; otherwise
    /// everything comes from the environment.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Errors only.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the store with the source once.
    Sync {
        /// Show the diff without embedding or writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Create the store schema. Idempotent.
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_subscriber(logging::Verbosity::from_flags(cli.verbose, cli.quiet));

    let config_path = cli.config.clone().or_else(|| {
        let default = Path::new(DEFAULT_CONFIG);
        default.exists().then(|| default.to_path_buf())
    });
    let cfg = config::load_config(config_path.as_deref())?;

    match cli.command.unwrap_or(Commands::Sync { dry_run: false }) {
        Commands::Sync { dry_run } => {
            sync::run_sync(&cfg, dry_run).await?;
        }
        Commands::Init => {
            let store = store::create_store(&cfg.store).await?;
            store.init().await?;
            println!("Store {} initialized.", store.label());
        }
    }

    Ok(())
}

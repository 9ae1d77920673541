//! # Catalog Reconcile CLI (`recon`)
//!
//! The `recon` binary serves the upload API or reconciles a single file.
//!
//! ## Usage
//!
//! ```bash
//! recon --config ./config/recon.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `recon serve` | Start the HTTP upload server |
//! | `recon check <file>` | Reconcile a CSV file and print the report as JSON |
//! | `recon config` | Print the effective configuration as TOML |
//!
//! ## Examples
//!
//! ```bash
//! # Serve on the port from the environment
//! BACKEND_PORT=9000 recon serve
//!
//! # Reconcile a file with 200-record batches
//! recon check ./products.csv --batch-size 200
//!
//! # Fail fast on the first catalog error
//! recon check ./products.csv --sequential
//! ```

use catalog_reconcile::{check, config, logging, server};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Catalog Reconcile CLI: compares uploaded product records against an
/// external catalog.
#[derive(Parser)]
#[command(
    name = "recon",
    about = "Reconcile CSV product uploads against a paginated catalog API",
    version,
    long_about = "Splits an uploaded CSV into batches, fetches the matching catalog page \
    for each batch, and reports every record whose fields differ from the catalog or \
    that the catalog does not contain."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Optional: without it, defaults plus environment overrides apply.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP upload server.
    ///
    /// Serves `POST /upload` (concurrent), `POST /upload-seq` (sequential),
    /// and `GET /health` on `server.bind`.
    Serve,

    /// Reconcile a CSV file and print the divergence report.
    Check {
        /// CSV file with columns `id,nome,categoria,preco,estoque,fornecedor`.
        file: PathBuf,

        /// Records per batch, 1 to 1000. Invalid values fall back to the
        /// configured default.
        #[arg(long)]
        batch_size: Option<String>,

        /// Use the sequential policy: stop at the first failed batch and
        /// exit non-zero.
        #[arg(long)]
        sequential: bool,
    },

    /// Print the effective configuration (file plus environment) as TOML.
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(cli.config.as_deref())?;

    if let Commands::Config = cli.command {
        print!("{}", toml::to_string_pretty(&cfg)?);
        return Ok(());
    }

    let logger = logging::build_dispatch(&cfg.logging)?;
    logging::install(&logger)?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg, logger).await?;
        }
        Commands::Check {
            file,
            batch_size,
            sequential,
        } => {
            check::run_check(&cfg, logger, &file, batch_size.as_deref(), sequential).await?;
        }
        Commands::Config => {
            // Handled above (before logging setup)
            unreachable!()
        }
    }

    Ok(())
}

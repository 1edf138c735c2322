//! # kb-sync CLI (`kbsync`)
//!
//! The `kbsync` binary runs the two long-lived units (server supervisor and
//! ingestion monitor) and a few one-shot commands for inspecting and driving
//! a sync by hand.
//!
//! ## Usage
//!
//! ```bash
//! kbsync --config ./config/kbsync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kbsync run` | Start `serve` and `ingest` as child processes and wait |
//! | `kbsync serve` | Supervise the Open WebUI server, restarting it on crash |
//! | `kbsync ingest` | Run the monitor loop until SIGINT/SIGTERM |
//! | `kbsync sync [--folder NAME]` | Run a single cycle and print a summary |
//! | `kbsync status` | Show pending uploads per folder without changing anything |
//! | `kbsync completions <shell>` | Print shell completions |
//!
//! `OPENWEBUI_API_KEY` must be set (directly or via `.env`) for every command
//! that talks to the remote service.

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use kb_sync::config::{self, Config};
use kb_sync::lock::UnitLock;
use kb_sync::logging;
use kb_sync::monitor::Monitor;
use kb_sync::remote::OpenWebUi;
use kb_sync::scanner::Scanner;
use kb_sync::shutdown::Shutdown;
use kb_sync::status;
use kb_sync::supervisor::{self, ServerExit, ServerSupervisor};

const SERVER_UNIT: &str = "openwebui";
const INGEST_UNIT: &str = "ingestion";

/// kb-sync: keep Open WebUI knowledge bases in sync with local folders.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/kbsync.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "kbsync",
    about = "Keep Open WebUI knowledge bases in sync with local folders",
    version,
    long_about = "kbsync watches a directory of knowledge base folders. Each cycle it creates \
    missing knowledge bases, uploads files that are not yet attached, waits for Open WebUI to \
    process them, and attaches them. It can also supervise the Open WebUI server itself."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/kbsync.toml")]
    config: PathBuf,

    /// Load environment variables from this file instead of `./.env`.
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server and ingestion units and wait for both.
    ///
    /// SIGINT/SIGTERM are forwarded to both units. Exits non-zero if
    /// either unit did.
    Run,

    /// Run the Open WebUI server under supervision.
    ///
    /// The server is restarted after `server.restart_cooldown_secs` whenever
    /// it exits with a non-zero status.
    Serve,

    /// Run the monitor loop until interrupted.
    Ingest,

    /// Run a single sync cycle.
    ///
    /// Exits non-zero if any folder or file failed.
    Sync {
        /// Only sync the folder with this directory name.
        #[arg(long)]
        folder: Option<String>,
    },

    /// Show each folder's knowledge base and how many files are pending.
    ///
    /// Read-only: never creates knowledge bases or uploads files.
    Status,

    /// Print shell completions to stdout.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "kbsync", &mut std::io::stdout());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run => {
            let cfg = load(&cli)?;
            let _guard = logging::init(&cfg.logging, "kbsync")?;
            let ok = supervisor::run_units(&cli.config, cli.env_file.as_deref()).await?;
            Ok(exit_code(ok))
        }
        Commands::Serve => {
            let cfg = load(&cli)?;
            let _guard = logging::init(&cfg.logging, SERVER_UNIT)?;
            let shutdown = Shutdown::new();
            shutdown.install_signal_handlers()?;
            let _lock = UnitLock::acquire(&cfg.paths.lock_dir, SERVER_UNIT)?;

            match ServerSupervisor::from_config(&cfg.server).run(shutdown).await? {
                ServerExit::Stopped => Ok(ExitCode::SUCCESS),
                ServerExit::Finished(status) => {
                    if !status.success() {
                        tracing::error!(%status, "server ended, supervision stopped");
                    }
                    Ok(exit_code(status.success()))
                }
            }
        }
        Commands::Ingest => {
            let cfg = load(&cli)?;
            let _guard = logging::init(&cfg.logging, INGEST_UNIT)?;
            let shutdown = Shutdown::new();
            shutdown.install_signal_handlers()?;
            let monitor = build_monitor(&cfg)?;
            let _lock = UnitLock::acquire(&cfg.paths.lock_dir, INGEST_UNIT)?;

            monitor.run(shutdown).await;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Sync { folder } => {
            let cfg = load(&cli)?;
            logging::init_stderr();
            let monitor = build_monitor(&cfg)?;
            let report = monitor.run_cycle_filtered(folder.as_deref()).await?;

            if let Some(name) = folder.as_deref() {
                if report.folder(name).is_none() {
                    bail!("no folder named '{}' under {}", name, monitor.root().display());
                }
            }
            status::print_cycle_report(&report);
            Ok(exit_code(report.is_clean()))
        }
        Commands::Status => {
            let cfg = load(&cli)?;
            logging::init_stderr();
            let remote = OpenWebUi::from_config(&cfg)?;
            let scanner = Scanner::from_config(&cfg.paths)?;
            status::run_status(&remote, &scanner, &cfg.paths.root).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Environment first, so `OPENWEBUI_*` from `.env` reach the config.
fn load(cli: &Cli) -> Result<Config> {
    load_env(cli.env_file.as_deref())?;
    config::load_config(&cli.config)
}

fn build_monitor(cfg: &Config) -> Result<Monitor> {
    if !cfg.paths.root.is_dir() {
        bail!(
            "knowledge base root does not exist: {}",
            cfg.paths.root.display()
        );
    }
    let remote = Arc::new(OpenWebUi::from_config(cfg)?);
    Monitor::from_config(cfg, remote)
}

/// Load `.env` (or `--env-file`). A missing default `.env` is fine; a missing
/// explicit file is not.
fn load_env(env_file: Option<&Path>) -> Result<()> {
    match env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("cannot load env file {}", path.display()))?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }
    Ok(())
}

fn exit_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

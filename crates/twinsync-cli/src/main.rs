//! TwinSync - bidirectional file-system synchronizer
//!
//! Watches a source tree, records every change, and reconciles the
//! accumulated deltas against an independently-observed target tree to
//! produce a consistent merged state on both sides.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use futures::{SinkExt, StreamExt};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::codec::Framed;
use tracing::{error, info, warn};
use twinsync_config::Config;
use twinsync_engine::{PreferNewer, PreferSource, PreferTarget, ResolutionStrategy, Synchronizer};
use twinsync_store::{EventLog, SyncHistory};
use twinsync_types::{format_timestamp, SystemClock};

mod channel;
mod display;

use channel::{CommandCodec, CMD_DROP, CMD_SYNC};

/// TwinSync - bidirectional file-system synchronizer
#[derive(Parser)]
#[command(
    name = "twinsync",
    version = env!("CARGO_PKG_VERSION"),
    about = "Bidirectional file-system synchronizer",
    long_about = "TwinSync tracks changes on a source directory tree and reconciles them\n\
                  against an independently-observed target tree, resolving conflicts by\n\
                  priority rules and leaving both sides byte-identical."
)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "twinsync.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one synchronization pass
    Sync {
        /// Show what would be applied without modifying either tree
        #[arg(long)]
        dry_run: bool,
        /// Conflict strategy
        #[arg(long, value_enum, default_value = "prefer-newer")]
        strategy: StrategyArg,
    },
    /// Serve the command channel (SYNC / DROP) on a local socket
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:7440")]
        listen: String,
    },
    /// Show last sync time and pending event count
    Status,
}

#[derive(clap::ValueEnum, Clone, Copy)]
enum StrategyArg {
    PreferNewer,
    PreferSource,
    PreferTarget,
}

impl StrategyArg {
    fn build(self) -> Arc<dyn ResolutionStrategy> {
        match self {
            Self::PreferNewer => Arc::new(PreferNewer),
            Self::PreferSource => Arc::new(PreferSource),
            Self::PreferTarget => Arc::new(PreferTarget),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("{} {error}", style("configuration error:").red().bold());
            return ExitCode::from(2);
        }
    };
    if let Err(error) = init_logging(&config, cli.debug) {
        eprintln!("{} {error}", style("logging setup failed:").red().bold());
        return ExitCode::from(1);
    }

    info!("twinsync v{} starting", env!("CARGO_PKG_VERSION"));
    let result = match cli.command {
        Commands::Sync { dry_run, strategy } => run_sync(config, dry_run, strategy).await,
        Commands::Serve { listen } => serve(config, listen).await,
        Commands::Status => status(config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!("{error:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(config: &Config, debug: bool) -> Result<()> {
    let filter = if debug {
        "debug".to_string()
    } else {
        std::env::var("TWINSYNC_LOG").unwrap_or_else(|_| config.logging.filter.clone())
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_new(filter)?)
        .with_target(false)
        .init();
    Ok(())
}

async fn run_sync(mut config: Config, dry_run: bool, strategy: StrategyArg) -> Result<()> {
    config.sync.dry_run = config.sync.dry_run || dry_run;
    let synchronizer =
        Synchronizer::from_config(&config, Arc::new(SystemClock), strategy.build())
            .context("building synchronizer")?;
    let report = synchronizer.run().await.context("synchronization run")?;
    display::render_report(&report);
    Ok(())
}

async fn serve(config: Config, listen: String) -> Result<()> {
    let synchronizer = Arc::new(
        Synchronizer::from_config(&config, Arc::new(SystemClock), Arc::new(PreferNewer))
            .context("building synchronizer")?,
    );
    let listener = TcpListener::bind(&listen)
        .await
        .with_context(|| format!("binding command channel on {listen}"))?;
    info!("command channel listening on {listen}");

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => accepted.context("accepting connection")?,
            _ = shutdown_rx.recv() => {
                info!("shutting down command channel");
                return Ok(());
            }
        };
        info!("command connection from {peer}");

        let synchronizer = synchronizer.clone();
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut framed = Framed::new(stream, CommandCodec);
            while let Some(frame) = framed.next().await {
                let command = match frame {
                    Ok(command) => command,
                    Err(error) => {
                        warn!("bad frame from {peer}: {error}");
                        break;
                    }
                };
                match command.as_str() {
                    CMD_SYNC => {
                        let reply = match synchronizer.run().await {
                            Ok(report) => serde_json::to_string(&report)
                                .unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}")),
                            Err(error) => format!("{{\"error\":\"{error}\"}}"),
                        };
                        if framed.send(reply).await.is_err() {
                            break;
                        }
                    }
                    CMD_DROP => {
                        let _ = framed.send("BYE".to_string()).await;
                        let _ = shutdown.send(()).await;
                        break;
                    }
                    other => {
                        warn!("unknown command '{other}' from {peer}");
                        let _ = framed.send(format!("ERR unknown command '{other}'")).await;
                    }
                }
            }
        });
    }
}

async fn status(config: Config) -> Result<()> {
    let history = SyncHistory::new(config.target_layout().history_path());
    let log = EventLog::new(config.source_layout().event_log_path());

    match history.read().await? {
        Some(timestamp) => println!(
            "Last sync: {}",
            style(format_timestamp(timestamp)).green()
        ),
        None => println!("Last sync: {}", style("never").yellow()),
    }
    println!(
        "Pending source events: {}",
        style(log.len().await?).cyan()
    );
    Ok(())
}

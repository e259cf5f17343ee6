use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use sluice_client::{ApiProductExtractor, ApiSourceConfig, CsvCustomerExtractor, CsvSourceConfig};
use sluice_core::config::{interval_from_secs, resolve_path};
use sluice_core::{
    FileStagingSink, Orchestrator, Scheduler, SchedulerConfig, StagingConfig, TracingCycleReporter,
};
use sluice_db::{DatabaseOrderExtractor, DatabaseSourceConfig};

#[derive(Parser)]
#[command(name = "sluice", version, about = "Scheduled multi-source ETL intake")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run extraction cycles on a fixed delay until interrupted
    Run {
        /// Seconds between the end of one cycle and the start of the next
        /// (overrides SLUICE_INTERVAL_SECS)
        #[arg(long)]
        interval_secs: Option<i64>,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Run a single cycle and print its report as JSON
    Once {
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Staging directory (overrides SLUICE_STAGING_PATH)
    #[arg(long)]
    staging_path: Option<PathBuf>,

    /// Environment file to load; `.env` in the working directory is used if omitted
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let common = match &cli.command {
        Commands::Run { common, .. } | Commands::Once { common } => common,
    };
    let env_file = load_env_file(common.env_file.as_deref())?;

    // Setup tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("sluice=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Some(path) = &env_file {
        tracing::debug!(path = %path.display(), "Loaded environment file");
    }

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_shutdown(cancel.clone()));

    match cli.command {
        Commands::Run {
            interval_secs,
            common,
        } => {
            let orchestrator = build_orchestrator(common.staging_path.as_deref())?;
            cmd_run(orchestrator, interval_secs, env_file, cancel).await
        }
        Commands::Once { common } => {
            let orchestrator = build_orchestrator(common.staging_path.as_deref())?;
            cmd_once(&orchestrator, &cancel).await
        }
    }
}

/// Load `explicit`, or `.env` if present. Returns the file that was loaded.
fn load_env_file(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    match explicit {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("Failed to load env file: {}", path.display()))?;
            Ok(Some(path.to_path_buf()))
        }
        None => Ok(dotenvy::dotenv().ok()),
    }
}

/// Wire the file sink and every source extractor.
fn build_orchestrator(staging_override: Option<&Path>) -> Result<Orchestrator> {
    let staging = match staging_override {
        Some(path) => StagingConfig {
            base_path: resolve_path(path)?,
        },
        None => StagingConfig::from_env()?,
    };

    let csv = CsvSourceConfig::from_env().context("Invalid CSV source configuration")?;
    let db = DatabaseSourceConfig::from_env().context("Invalid database source configuration")?;
    let api = ApiSourceConfig::from_env().context("Invalid API source configuration")?;

    let api_extractor = ApiProductExtractor::new(api).context("Failed to create HTTP client")?;

    let orchestrator = Orchestrator::new(Arc::new(FileStagingSink::from_config(&staging)))
        .with_extractor(CsvCustomerExtractor::new(csv))
        .with_extractor(DatabaseOrderExtractor::new(db))
        .with_extractor(api_extractor);

    tracing::info!(
        staging = %staging.base_path.display(),
        extractors = ?orchestrator.extractor_names(),
        "Orchestrator ready"
    );

    Ok(orchestrator)
}

async fn cmd_run(
    orchestrator: Orchestrator,
    interval_secs: Option<i64>,
    env_file: Option<PathBuf>,
    cancel: CancellationToken,
) -> Result<()> {
    let interval = match interval_secs {
        Some(secs) => interval_from_secs(secs),
        None => SchedulerConfig::from_env()?.interval,
    };
    let (interval_tx, interval_rx) = watch::channel(interval);

    match env_file {
        Some(path) => spawn_interval_reload(path, interval_tx, cancel.clone()),
        None => tracing::debug!("No env file loaded, interval hot reload disabled"),
    }

    tracing::info!(interval_secs = interval.as_secs(), "Starting worker");

    let scheduler = Scheduler::new(Arc::new(orchestrator), interval_rx);
    let cycles = scheduler
        .run(cancel, &TracingCycleReporter)
        .await
        .context("Scheduler stopped with an error")?;

    tracing::info!(cycles, "Worker shut down");
    Ok(())
}

async fn cmd_once(orchestrator: &Orchestrator, cancel: &CancellationToken) -> Result<()> {
    let report = orchestrator
        .run_cycle(cancel, &TracingCycleReporter)
        .await
        .context("Cycle did not complete")?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    let failed = report.failed();
    if failed > 0 {
        anyhow::bail!("{failed} extractor(s) failed");
    }
    Ok(())
}

/// Cancel `token` on Ctrl-C or SIGTERM.
async fn cancel_on_shutdown(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
        () = token.cancelled() => return,
    }

    tracing::info!("Shutdown signal received");
    token.cancel();
}

#[cfg(unix)]
fn spawn_interval_reload(
    env_file: PathBuf,
    interval_tx: watch::Sender<Duration>,
    cancel: CancellationToken,
) {
    tokio::spawn(reload_interval_on_hangup(env_file, interval_tx, cancel));
}

#[cfg(not(unix))]
fn spawn_interval_reload(
    _env_file: PathBuf,
    _interval_tx: watch::Sender<Duration>,
    _cancel: CancellationToken,
) {
    tracing::debug!("Interval hot reload requires SIGHUP, disabled on this platform");
}

/// Re-read the interval from `env_file` on every SIGHUP.
#[cfg(unix)]
async fn reload_interval_on_hangup(
    env_file: PathBuf,
    interval_tx: watch::Sender<Duration>,
    cancel: CancellationToken,
) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(error = %e, "Interval hot reload disabled");
            return;
        }
    };

    loop {
        tokio::select! {
            received = hangup.recv() => {
                if received.is_none() {
                    return;
                }
            }
            () = cancel.cancelled() => return,
        }

        match read_interval(&env_file) {
            Ok(Some(interval)) => {
                interval_tx.send_replace(interval);
                tracing::info!(interval_secs = interval.as_secs(), "Interval reloaded");
            }
            Ok(None) => {
                tracing::info!(
                    path = %env_file.display(),
                    "SLUICE_INTERVAL_SECS not set in env file, keeping current interval"
                );
            }
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "Interval reload failed");
            }
        }
    }
}

/// Parse `SLUICE_INTERVAL_SECS` from an env file without touching the
/// process environment.
fn read_interval(env_file: &Path) -> Result<Option<Duration>> {
    let entries = dotenvy::from_path_iter(env_file)
        .with_context(|| format!("Failed to open env file: {}", env_file.display()))?;
    let mut vars = HashMap::new();
    for entry in entries {
        let (key, value) = entry.context("Malformed env file")?;
        vars.insert(key, value);
    }

    if !vars.contains_key("SLUICE_INTERVAL_SECS") {
        return Ok(None);
    }
    let config = SchedulerConfig::from_lookup(|key| vars.get(key).cloned())?;
    Ok(Some(config.interval))
}

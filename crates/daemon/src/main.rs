//! giftledger daemon entry point.
//!
//! Loads configuration, opens the configured store, starts the web server
//! and handles graceful shutdown.

mod signals;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use giftledger_core::config::AppConfig;
use giftledger_core::ledger::{BalanceLedger, LedgerSettings};
use giftledger_core::store;
use giftledger_web::WebServer;

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// giftledger HTTP service.
#[derive(Parser, Debug)]
#[command(
    name = "giftledger-daemon",
    version,
    about = "Gift-card and corporate-credit ledger service"
)]
struct Args {
    /// Path to the TOML configuration file. Built-in defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the log level from the config file (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            AppConfig::load_and_validate(path).context("failed to load configuration file")?
        }
        None => {
            let mut config = AppConfig::default();
            config.apply_env_overrides();
            config
                .validate()
                .context("configuration validation failed")?;
            config
        }
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.daemon.log_level)
        .to_string();
    let _log_guard = init_tracing(&log_level, config.daemon.log_file.as_deref())?;

    // Startup banner
    info!("========================================");
    info!("  giftledger daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("========================================");
    match &args.config {
        Some(path) => info!("Config file   : {}", path.display()),
        None => info!("Config file   : (defaults)"),
    }
    info!("Storage       : {:?}", config.storage.backend);
    info!("Data dir      : {}", config.daemon.data_dir.display());
    info!("Web listen    : {}", config.web.listen);
    info!("Tolerance     : {}", config.ledger.amount_tolerance);
    info!("Log level     : {}", log_level);
    info!("========================================");

    let handles = store::open(&config.storage, &config.daemon.data_dir)
        .context("failed to open store")?;
    let ledger = Arc::new(BalanceLedger::new(
        handles,
        LedgerSettings::from(&config.ledger),
    ));
    let companies = ledger
        .list_companies()
        .context("failed to read company store")?;
    info!("Store opened with {} companies", companies.len());

    let listen_addr = config.web.listen.clone();
    WebServer::new(config, ledger)
        .start(&listen_addr, signals::wait_for_shutdown())
        .await
        .context("web server error")?;

    info!("giftledger daemon stopped.");
    Ok(())
}

/// Install the global subscriber: stdout always, plus a daily rolling file
/// when `log_file` is set. The returned guard flushes the file writer and
/// must live until exit.
fn init_tracing(log_level: &str, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| anyhow!("log_file has no file name: {}", path.display()))?;
            std::fs::create_dir_all(dir).context("failed to create log directory")?;

            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, name));
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(file_layer)
        .init();

    Ok(guard)
}

//! safebind: Safebin file-sharing daemon
//!
//! Usage:
//!   safebind [-h host] [-p port] [-s storage_dir] [-m max_mb]
//!
//! Every flag also reads its SAFEBIN_* environment variable. Uploads are
//! encrypted with a key derived from their own content; the key only ever
//! leaves the server inside the share URL.

mod delivery;
mod respond;
mod server;
mod static_assets;
mod sweeper;
mod upload;

use anyhow::Result;
use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use safebin_core::{ServiceConfig, SHUTDOWN_GRACE};
use safebin_store::Store;

#[derive(Parser, Debug)]
#[command(
    name = "safebind",
    version,
    about = "Zero-knowledge file sharing server",
    disable_help_flag = true
)]
struct Cli {
    /// Bind address
    #[arg(short = 'h', long = "host", env = "SAFEBIN_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port
    #[arg(short = 'p', long = "port", env = "SAFEBIN_PORT", default_value_t = 8080)]
    port: u16,

    /// Storage directory
    #[arg(
        short = 's',
        long = "storage",
        env = "SAFEBIN_STORAGE",
        default_value = "./storage"
    )]
    storage: PathBuf,

    /// Max file size in MB
    #[arg(short = 'm', long = "max-mb", env = "SAFEBIN_MAX_MB", default_value_t = 512)]
    max_mb: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "SAFEBIN_LOG", default_value = "info")]
    log: String,

    /// Log format (json, text)
    #[arg(long, env = "SAFEBIN_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log, &cli.log_format);

    let config = ServiceConfig {
        host: cli.host,
        port: cli.port,
        storage_dir: cli.storage,
        max_mb: cli.max_mb,
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        storage = %config.storage_dir.display(),
        max_mb = config.max_mb,
        "safebind starting"
    );

    let store = Arc::new(Store::open(config.storage_dir.clone(), config.max_mb)?);

    let cancel = CancellationToken::new();
    let sweeper = tokio::spawn(sweeper::run(store.clone(), cancel.clone()));

    let app = server::router(store, &config);
    let listener = tokio::net::TcpListener::bind(config.addr()).await?;
    info!(addr = %config.addr(), "http: listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    if tokio::time::timeout(SHUTDOWN_GRACE, sweeper).await.is_err() {
        warn!("sweeper did not stop within the shutdown grace period");
    }
    info!("safebind stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}

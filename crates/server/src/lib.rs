use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use kestrel_core::store::aol::{self, AolWriter, SyncMode, DEFAULT_AOL_PATH};
use kestrel_core::store::{Db, StoreConfig, DEFAULT_SAMPLE_SIZE};

pub mod command;
pub mod net;
pub mod tracing_config;

use crate::tracing_config::TracingConfig;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 7379;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short = 'H', long, default_value = DEFAULT_HOST)]
    host: String,

    #[arg(short = 'P', long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Maximum number of keys before eviction kicks in (0 = unbounded)
    #[arg(long, default_value_t = 0)]
    max_keys: usize,

    /// Number of keys sampled per approximate-LRU eviction decision
    #[arg(long, default_value_t = DEFAULT_SAMPLE_SIZE)]
    sample_size: usize,

    /// Disable the append-only log entirely
    #[arg(long, default_value_t = false)]
    no_aol: bool,

    /// Path to the append-only log
    #[arg(long, default_value = DEFAULT_AOL_PATH)]
    aol_path: String,

    /// fsync cadence for the append-only log: always, everysec or no
    #[arg(long, default_value = "everysec")]
    aol_sync: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Use JSON format for logs (recommended for production)
    #[arg(long)]
    log_json: bool,
}

/// Build the store and run the server until a shutdown signal arrives.
///
/// Must be called from within a `tokio::task::LocalSet` on a current-thread
/// runtime; the whole server is single-threaded by design.
pub async fn run() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };
    TracingConfig {
        level: log_level,
        json_format: args.log_json,
        ..TracingConfig::default()
    }
    .init();

    let sync_mode: SyncMode = args.aol_sync.parse()?;

    let mut db = Db::with_config(StoreConfig {
        max_keys: args.max_keys,
        sample_size: args.sample_size,
    });

    // Reconstruct state from the log, then open it for append. A log that
    // cannot be opened is a warning, not a startup failure: the server
    // still serves reads and writes with durability off.
    let mut aol_writer = None;
    if !args.no_aol {
        if Path::new(&args.aol_path).exists() {
            info!(path = %args.aol_path, "replaying append log");
            let start = Instant::now();
            match aol::replay(Path::new(&args.aol_path), &mut db) {
                Ok(count) => info!(
                    count,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "append log replay completed"
                ),
                Err(e) => error!(error = %e, "append log replay failed"),
            }
        }

        match AolWriter::open(&args.aol_path, sync_mode) {
            Ok(writer) => {
                info!(path = %args.aol_path, mode = ?sync_mode, "append log enabled");
                aol_writer = Some(writer);
            }
            Err(e) => {
                warn!(error = %e, path = %args.aol_path,
                    "could not open append log, running with persistence disabled");
            }
        }
    }

    let db = Rc::new(RefCell::new(db));
    let aol_writer = Rc::new(RefCell::new(aol_writer));

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    tokio::task::spawn_local(async move {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
            // Keep the sender alive so the server does not shut down early.
            std::future::pending::<()>().await;
        }
        info!("received shutdown signal, initiating graceful shutdown");
        let _ = shutdown_tx.send(());
    });

    let addr = format!("{}:{}", args.host, args.port);
    info!(
        host = %args.host,
        port = args.port,
        max_keys = args.max_keys,
        "starting Kestrel server"
    );

    let server = net::Server::new(db, aol_writer);
    server.run_with_shutdown(&addr, shutdown_rx).await?;

    info!("server shutdown complete");
    Ok(())
}

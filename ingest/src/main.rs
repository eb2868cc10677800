mod cli;
mod config;
mod engine;
mod entity;
mod error;
mod signal;
mod source;
mod store;

use anyhow::{Context, Result, bail};
use clap::Parser;
use cli::Args;
use config::{IngestConfig, LogFormat};
use engine::Engine;
use error::IngestError;
use source::WgCommandSource;
use std::sync::Arc;
use store::SqliteStore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut cfg = IngestConfig::load_or_default(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config))?;
    args.apply_to(&mut cfg);
    cfg.validate().context("Invalid configuration")?;

    let _log_guard = common::init_tracing(
        cfg.log_dir.as_deref(),
        &cfg.log_file,
        &cfg.log_level,
        cfg.log_format == LogFormat::Json,
    )?;

    info!("Starting ingestion with configuration: {:?}", cfg);

    let store = SqliteStore::open(&cfg.database_path)
        .await
        .with_context(|| format!("Failed to open database {}", cfg.database_path))?;
    let source = WgCommandSource::new(&cfg.wg_command, &cfg.interface, cfg.counter_mapping);

    let cancel = CancellationToken::new();
    let (signals, mut producers) =
        signal::spawn_producers(&cfg, cancel.clone()).context("Failed to start signal producers")?;

    tokio::spawn(wait_for_shutdown(cancel.clone()));

    let engine = Engine::new(Arc::new(source), Arc::new(store), cfg.counter_mapping);
    let outcome = engine.run(cancel.clone(), signals).await;

    cancel.cancel();
    while let Some(res) = producers.join_next().await {
        if let Err(e) = res {
            warn!("Signal producer task failed: {}", e);
        }
    }

    match outcome {
        IngestError::Cancelled => {
            info!("Ingestion stopped");
            Ok(())
        }
        e => {
            error!("Ingestion terminated: {}", e);
            bail!(e)
        }
    }
}

/// Cancel on Ctrl+C, or on SIGTERM where available.
async fn wait_for_shutdown(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
    cancel.cancel();
}

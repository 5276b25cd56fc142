//! # hubhistd: hubhist daemon
//!
//! Composition root that wires all adapters together and starts the server.
//!
//! ## Responsibilities
//! - Load configuration (`hubhist.toml` and environment overrides)
//! - Install the `tracing` subscriber
//! - Open the token log storage under the configured root
//! - Construct the history service and the observation recorder
//! - Build the axum router and serve it
//! - Handle graceful shutdown (SIGTERM/SIGINT)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no history logic belongs here.

mod config;

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use hubhist_adapter_http_axum::state::AppState;
use hubhist_app::observation_bus::ObservationBus;
use hubhist_app::recorder::HistoryRecorder;
use hubhist_app::services::history_service::HistoryService;

use crate::config::Config;

/// Observations buffered per recorder before it starts lagging.
const OBSERVATION_BUS_CAPACITY: usize = 1_024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;

    let filter = EnvFilter::try_new(&config.logging.filter)
        .with_context(|| format!("invalid log filter {:?}", config.logging.filter))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Storage
    let repo = config.storage_config().build().with_context(|| {
        format!(
            "failed to open history storage at {}",
            config.storage.root.display()
        )
    })?;

    // Services
    let service = Arc::new(HistoryService::new(repo).with_options(config.history_options()));

    // Observation bus: integrations publish here, the recorder stores.
    let bus = ObservationBus::new(OBSERVATION_BUS_CAPACITY);
    let shutdown = CancellationToken::new();
    let recorder = HistoryRecorder::new(Arc::clone(&service));
    let recorder_task = tokio::spawn(recorder.run(bus.subscribe(), shutdown.clone()));

    // HTTP
    let state = AppState::from_arc(service)
        .with_observation_bus(bus.clone())
        .with_request_timeout(config.request_timeout());
    let app = hubhist_adapter_http_axum::router::build(state);

    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(%bind_addr, root = %config.storage.root.display(), "hubhistd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    shutdown.cancel();
    recorder_task.await.context("history recorder task failed")?;
    drop(bus);
    tracing::info!("hubhistd stopped");

    Ok(())
}

/// Resolve on SIGINT or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    tracing::info!("shutdown signal received");
}

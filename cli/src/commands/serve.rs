// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! `stampede serve` - run the daemon.
//!
//! Wires the full runtime: in-memory mission store, event bus, rate-limiter
//! registry, Gemini decision adapter, HTTP action backends, broadcast hub,
//! event logger, and the axum REST/websocket surface.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use stampede_core::application::{EventLogger, MissionOrchestrator};
use stampede_core::domain::store::MissionStore;
use stampede_core::infrastructure::decision::GeminiDecider;
use stampede_core::infrastructure::executor::HttpBackendFactory;
use stampede_core::infrastructure::{EventBus, InMemoryMissionStore, RateLimiterRegistry};
use stampede_core::presentation::{router, AppState, EventHub};

#[derive(Args)]
pub struct ServeArgs {
    /// Gemini API key for the decision policy
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    gemini_api_key: String,

    /// Gemini model driving agent decisions
    #[arg(long, env = "STAMPEDE_MODEL", default_value = "gemini-2.0-flash")]
    model: String,

    /// Event bus buffer depth per subscriber
    #[arg(long, env = "STAMPEDE_EVENT_BUFFER", default_value = "1000")]
    event_buffer: usize,

    /// Expose Prometheus metrics on this address (e.g. 127.0.0.1:9090)
    #[arg(long, env = "STAMPEDE_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,
}

pub async fn execute(args: ServeArgs, host: &str, port: u16) -> Result<()> {
    if let Some(addr) = args.metrics_addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(%addr, "metrics exporter listening");
    }

    let bus = EventBus::new(args.event_buffer);
    let store: Arc<dyn MissionStore> = Arc::new(InMemoryMissionStore::new());
    let limiters = Arc::new(RateLimiterRegistry::new());
    let decider = Arc::new(GeminiDecider::new(args.gemini_api_key, args.model));

    let orchestrator = Arc::new(MissionOrchestrator::new(
        store.clone(),
        decider,
        Arc::new(HttpBackendFactory),
        limiters,
        bus.clone(),
    ));
    let hub = EventHub::new(bus.clone());

    let shutdown = CancellationToken::new();
    tokio::spawn(hub.clone().run(shutdown.clone()));
    tokio::spawn(EventLogger::new(store, bus).run(shutdown.clone()));

    let app = router(AppState { orchestrator, hub });
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(%addr, "stampede daemon listening");
    println!(
        "{} {}",
        "Stampede listening on".green(),
        format!("http://{addr}").bold()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            shutdown.cancel();
        })
        .await
        .context("Server error")?;

    Ok(())
}

//! Statistics sweep service.
//!
//! Runs leader-gated sweep cycles that delete column statistics of dropped catalog
//! objects.
//!
//! ## Modes
//!
//! - **serve**: Runs cycles on an interval and exposes health, readiness, metrics
//!   and an on-demand trigger over HTTP
//! - **sweep**: Runs one cycle and prints its report as JSON
//!
//! Both modes run against in-memory collaborators loaded from a JSON fixture.
//!
//! ## Endpoints
//!
//! - `GET /health`: Liveness
//! - `GET /ready`: Readiness, with scheduler counters
//! - `GET /metrics`: Prometheus metrics
//! - `POST /sweep`: Start a cycle now (`202`), or `409` if one is running

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

mod fixture;
mod metrics;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde::Serialize;
use tokio::sync::watch;

use statsweep_core::observability::{LogFormat, init_logging};
use statsweep_gc::{CycleOutcome, SchedulerStatus, SkipReason, SweepPolicy, SweepScheduler};

use crate::fixture::Fixture;

// ============================================================================
// CLI
// ============================================================================

/// Statistics sweep service.
#[derive(Debug, Parser)]
#[command(name = "statsweep")]
#[command(about = "Deletes column statistics of dropped catalog objects")]
struct Args {
    /// Log output format (json or pretty).
    #[arg(long, env = "STATSWEEP_LOG_FORMAT", default_value = "json", global = true)]
    log_format: LogFormat,

    /// JSON fixture describing the catalog, registry and statistics tables.
    #[arg(long, env = "STATSWEEP_FIXTURE", global = true)]
    fixture: Option<PathBuf>,

    #[command(flatten)]
    policy: PolicyArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Sweep policy overrides; unset values keep their defaults.
#[derive(Debug, ClapArgs)]
struct PolicyArgs {
    /// JSON file with a full sweep policy.
    #[arg(long, env = "STATSWEEP_POLICY_FILE", global = true)]
    policy_file: Option<PathBuf>,

    /// Seconds between cycles.
    #[arg(long, env = "STATSWEEP_INTERVAL_SECS", global = true)]
    interval_secs: Option<u64>,

    /// Rows fetched per page.
    #[arg(long, env = "STATSWEEP_FETCH_LIMIT", global = true)]
    fetch_limit: Option<u64>,

    /// Pause after each fetched page, in milliseconds.
    #[arg(long, env = "STATSWEEP_FETCH_INTERVAL_MS", global = true)]
    fetch_interval_ms: Option<u64>,

    /// Maximum values per delete predicate.
    #[arg(long, env = "STATSWEEP_MAX_IN_ELEMENTS", global = true)]
    max_in_elements: Option<usize>,

    /// Classify and report without deleting.
    #[arg(long, env = "STATSWEEP_DRY_RUN", global = true)]
    dry_run: bool,
}

impl PolicyArgs {
    fn resolve(&self) -> Result<SweepPolicy> {
        let mut policy = match &self.policy_file {
            Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
            None => SweepPolicy::default(),
        };
        if let Some(v) = self.interval_secs {
            policy.interval_secs = v;
        }
        if let Some(v) = self.fetch_limit {
            policy.fetch_limit = v;
        }
        if let Some(v) = self.fetch_interval_ms {
            policy.fetch_interval_ms = v;
        }
        if let Some(v) = self.max_in_elements {
            policy.max_in_elements = v;
        }
        policy.dry_run |= self.dry_run;

        if let Some(message) = policy.validate() {
            anyhow::bail!("invalid sweep policy: {message}");
        }
        Ok(policy)
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run cycles on an interval and serve health endpoints.
    Serve {
        /// Port for the HTTP server.
        #[arg(long, env = "STATSWEEP_PORT", default_value = "8080")]
        port: u16,

        /// Seconds without a completed cycle before the leader reports unhealthy.
        ///
        /// Defaults to three cycle intervals.
        #[arg(long, env = "STATSWEEP_UNHEALTHY_THRESHOLD_SECS")]
        unhealthy_threshold_secs: Option<u64>,
    },

    /// Run one cycle and print its report.
    Sweep,
}

// ============================================================================
// Health Endpoints
// ============================================================================

#[derive(Clone)]
struct ServiceState {
    scheduler: Arc<SweepScheduler>,
    unhealthy_threshold_secs: u64,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReadyResponse {
    healthy: bool,
    #[serde(flatten)]
    status: SchedulerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

/// GET /health - Shallow liveness check.
async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// GET /ready - Readiness with scheduler counters.
async fn ready(State(state): State<Arc<ServiceState>>) -> impl IntoResponse {
    let healthy = state.scheduler.is_healthy(state.unhealthy_threshold_secs);
    let status = state.scheduler.status();

    let message = if healthy {
        None
    } else if status.completed == 0 {
        Some("Waiting for first completed sweep cycle".to_string())
    } else {
        Some(format!(
            "No completed sweep cycle in {} seconds",
            state.unhealthy_threshold_secs
        ))
    };

    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(ReadyResponse {
            healthy,
            status,
            message,
        }),
    )
}

/// POST /sweep - Start a cycle now.
///
/// Returns:
/// - `202 Accepted` if a new cycle was started
/// - `409 Conflict` if a cycle is already running
/// - `503 Service Unavailable` if this node is not the leader
async fn trigger_sweep(State(state): State<Arc<ServiceState>>) -> impl IntoResponse {
    match state.scheduler.trigger() {
        Ok(_handle) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({
                "status": "started",
                "message": "Sweep cycle triggered"
            })),
        ),
        Err(SkipReason::AlreadyRunning) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "status": "already_running",
                "message": "A sweep cycle is already in progress"
            })),
        ),
        Err(SkipReason::NotLeader) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_leader",
                "message": "This node is not the catalog leader"
            })),
        ),
    }
}

async fn shutdown_signal(tx: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
    let _ = tx.send(true);
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_format);

    let policy = args.policy.resolve()?;
    let fixture = match &args.fixture {
        Some(path) => Fixture::load(path)?,
        None => Fixture::default(),
    };
    let c = fixture.into_collaborators()?;
    let scheduler = Arc::new(SweepScheduler::new(
        c.catalog,
        c.store,
        c.registry,
        c.log,
        c.leader,
        policy.clone(),
    )?);

    match args.command {
        Commands::Serve {
            port,
            unhealthy_threshold_secs,
        } => {
            metrics::init_metrics()?;

            let unhealthy_threshold_secs =
                unhealthy_threshold_secs.unwrap_or_else(|| policy.interval_secs.saturating_mul(3));

            tracing::info!(
                port,
                interval_secs = policy.interval_secs,
                unhealthy_threshold_secs,
                dry_run = policy.dry_run,
                "Starting statistics sweep service"
            );

            let state = Arc::new(ServiceState {
                scheduler: Arc::clone(&scheduler),
                unhealthy_threshold_secs,
            });

            let router = Router::new()
                .route("/health", get(health))
                .route("/ready", get(ready))
                .route("/metrics", get(metrics::serve_metrics))
                .route("/sweep", post(trigger_sweep))
                .with_state(state);

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let sweep_loop = tokio::spawn(Arc::clone(&scheduler).run(shutdown_rx.clone()));

            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            tracing::info!(address = %addr, "Starting health server");

            let listener = tokio::net::TcpListener::bind(addr).await?;
            let mut server_shutdown = shutdown_rx;
            tokio::spawn(shutdown_signal(shutdown_tx));
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = server_shutdown.wait_for(|stop| *stop).await;
                })
                .await?;

            sweep_loop.await?;
            tracing::info!("Statistics sweep service stopped");
        }

        Commands::Sweep => {
            tracing::info!(dry_run = policy.dry_run, "Starting one-shot sweep");

            let outcome = scheduler.run_cycle().await;
            match &outcome {
                CycleOutcome::Completed(report) | CycleOutcome::Aborted(report) => {
                    println!("{}", serde_json::to_string_pretty(report)?);
                }
                CycleOutcome::Skipped { reason } => {
                    tracing::warn!(reason = %reason, "Sweep skipped");
                }
            }

            if let CycleOutcome::Aborted(_) = outcome {
                anyhow::bail!("sweep cycle aborted");
            }
            tracing::info!("Sweep complete");
        }
    }

    Ok(())
}

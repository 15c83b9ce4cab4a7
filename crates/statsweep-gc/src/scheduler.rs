//! Leader-gated, interval-driven sweep cycles.
//!
//! A cycle runs, in order:
//!
//! 1. the [`TableStatsReconciler`] over the table-level registry,
//! 2. [`SweepContext::init`], which resolves both statistics tables and snapshots
//!    the catalog (a failure here aborts the cycle before any delete),
//! 3. the [`ColumnStatsSweeper`] over `column_statistics`, then over
//!    `partition_statistics`.
//!
//! At most one cycle runs per scheduler. A trigger that arrives while a cycle is
//! running, or on a node that is not the leader, is skipped.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::Instrument;

use statsweep_core::observability::cycle_span;

use crate::catalog::CatalogService;
use crate::error::Result;
use crate::leader::LeaderGate;
use crate::policy::SweepPolicy;
use crate::reconciler::{ReconcileReport, TableStatsReconciler};
use crate::registry::{ReplicationLog, TableStatsRegistry};
use crate::snapshot::SweepContext;
use crate::store::{StatsStore, StatsTableKind};
use crate::sweeper::{ColumnStatsSweeper, SweepReport};

// ============================================================================
// Outcomes
// ============================================================================

/// Why a cycle did not start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// This node is not the catalog leader.
    NotLeader,
    /// Another cycle is still running.
    AlreadyRunning,
}

impl SkipReason {
    /// Short label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotLeader => "not_leader",
            Self::AlreadyRunning => "already_running",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything one cycle did.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    /// Cycle number, starting at 1.
    pub cycle: u64,
    /// When the cycle started.
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration in seconds.
    pub duration_secs: f64,
    /// Registry reconciliation result.
    pub reconcile: ReconcileReport,
    /// Sweep of `column_statistics`, if it ran.
    pub column_level: Option<SweepReport>,
    /// Sweep of `partition_statistics`, if it ran.
    pub partition_level: Option<SweepReport>,
    /// Errors that ended a phase early.
    pub errors: Vec<String>,
}

impl CycleReport {
    fn new(cycle: u64) -> Self {
        Self {
            cycle,
            started_at: Utc::now(),
            duration_secs: 0.0,
            reconcile: ReconcileReport::default(),
            column_level: None,
            partition_level: None,
            errors: Vec::new(),
        }
    }

    /// Both table sweeps merged into one report.
    #[must_use]
    pub fn sweep_totals(&self) -> SweepReport {
        let mut totals = SweepReport::default();
        for report in [&self.column_level, &self.partition_level]
            .into_iter()
            .flatten()
        {
            totals.merge(report.clone());
        }
        totals
    }

    /// Returns true if any phase, row or delete reported an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        let totals = self.sweep_totals();
        !self.errors.is_empty()
            || self.reconcile.has_errors()
            || !totals.errors.is_empty()
            || totals.flush.has_errors()
    }
}

/// How a cycle ended.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// The cycle ran to the end (individual phases may still report errors).
    Completed(CycleReport),
    /// Initialization failed; nothing was deleted.
    Aborted(CycleReport),
    /// The cycle did not start.
    Skipped {
        /// Why it did not start.
        reason: SkipReason,
    },
}

impl CycleOutcome {
    /// Short label for logs and metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::Aborted(_) => "aborted",
            Self::Skipped { .. } => "skipped",
        }
    }

    /// The cycle's report, unless it was skipped.
    #[must_use]
    pub const fn report(&self) -> Option<&CycleReport> {
        match self {
            Self::Completed(report) | Self::Aborted(report) => Some(report),
            Self::Skipped { .. } => None,
        }
    }
}

// ============================================================================
// Health State
// ============================================================================

#[derive(Debug, Default)]
struct SchedulerState {
    in_progress: AtomicBool,
    cycles_started: AtomicU64,
    completed: AtomicU64,
    aborted: AtomicU64,
    skipped: AtomicU64,
    last_success_ts: AtomicU64,
}

impl SchedulerState {
    fn record_success(&self) {
        let now = Utc::now().timestamp();
        self.last_success_ts
            .store(now.try_into().unwrap_or_default(), Ordering::Release);
        self.completed.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_last_success(now);
    }

    fn last_success(&self) -> Option<DateTime<Utc>> {
        let ts = self.last_success_ts.load(Ordering::Acquire);
        if ts == 0 {
            None
        } else {
            DateTime::from_timestamp(i64::try_from(ts).ok()?, 0)
        }
    }
}

/// Marks a cycle as running for as long as it is held.
struct CycleGuard {
    state: Arc<SchedulerState>,
}

impl CycleGuard {
    fn acquire(state: &Arc<SchedulerState>) -> Option<Self> {
        state
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(Self {
            state: Arc::clone(state),
        })
    }
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.state.in_progress.store(false, Ordering::Release);
    }
}

/// Point-in-time scheduler counters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    /// Whether this node is the leader.
    pub leader: bool,
    /// Whether a cycle is running.
    pub running: bool,
    /// Cycles started.
    pub cycles_started: u64,
    /// Cycles that ran to the end.
    pub completed: u64,
    /// Cycles aborted during initialization.
    pub aborted: u64,
    /// Triggers skipped.
    pub skipped: u64,
    /// When the last cycle completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<DateTime<Utc>>,
}

// ============================================================================
// Scheduler
// ============================================================================

/// Owns sweep cycles end to end.
pub struct SweepScheduler {
    catalog: Arc<dyn CatalogService>,
    store: Arc<dyn StatsStore>,
    leader: Arc<dyn LeaderGate>,
    reconciler: TableStatsReconciler,
    sweeper: ColumnStatsSweeper,
    policy: SweepPolicy,
    state: Arc<SchedulerState>,
}

impl SweepScheduler {
    /// Creates a scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`SweepError::Config`](crate::SweepError::Config) if the policy is not
    /// usable.
    pub fn new(
        catalog: Arc<dyn CatalogService>,
        store: Arc<dyn StatsStore>,
        registry: Arc<dyn TableStatsRegistry>,
        log: Arc<dyn ReplicationLog>,
        leader: Arc<dyn LeaderGate>,
        policy: SweepPolicy,
    ) -> Result<Self> {
        let sweeper = ColumnStatsSweeper::new(Arc::clone(&store), policy.clone())?;
        let reconciler = TableStatsReconciler::new(Arc::clone(&catalog), registry, log)
            .with_dry_run(policy.dry_run);
        Ok(Self {
            catalog,
            store,
            leader,
            reconciler,
            sweeper,
            policy,
            state: Arc::new(SchedulerState::default()),
        })
    }

    /// The policy cycles run with.
    #[must_use]
    pub const fn policy(&self) -> &SweepPolicy {
        &self.policy
    }

    /// Returns true while a cycle is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.in_progress.load(Ordering::Acquire)
    }

    /// Returns true if the scheduler is keeping up.
    ///
    /// A follower is always healthy. The leader is healthy once a cycle has
    /// completed within the last `unhealthy_threshold_secs`.
    #[must_use]
    pub fn is_healthy(&self, unhealthy_threshold_secs: u64) -> bool {
        if !self.leader.is_leader() {
            return true;
        }
        let last = self.state.last_success_ts.load(Ordering::Acquire);
        if last == 0 {
            return false;
        }
        let now: u64 = Utc::now().timestamp().try_into().unwrap_or_default();
        now.saturating_sub(last) < unhealthy_threshold_secs
    }

    /// Current counters.
    #[must_use]
    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            leader: self.leader.is_leader(),
            running: self.is_running(),
            cycles_started: self.state.cycles_started.load(Ordering::Relaxed),
            completed: self.state.completed.load(Ordering::Relaxed),
            aborted: self.state.aborted.load(Ordering::Relaxed),
            skipped: self.state.skipped.load(Ordering::Relaxed),
            last_success: self.state.last_success(),
        }
    }

    /// Runs one cycle now, unless it must be skipped.
    pub async fn run_cycle(&self) -> CycleOutcome {
        match self.begin() {
            Ok(guard) => self.run_guarded(guard).await,
            Err(reason) => self.skip(reason),
        }
    }

    /// Starts a cycle in the background.
    ///
    /// The running flag is taken before this returns, so a second trigger is
    /// rejected immediately.
    ///
    /// # Errors
    ///
    /// Returns the [`SkipReason`] if the cycle cannot start.
    pub fn trigger(self: &Arc<Self>) -> std::result::Result<JoinHandle<CycleOutcome>, SkipReason> {
        let guard = match self.begin() {
            Ok(guard) => guard,
            Err(reason) => {
                self.skip(reason);
                return Err(reason);
            }
        };
        let this = Arc::clone(self);
        Ok(tokio::spawn(async move { this.run_guarded(guard).await }))
    }

    /// Runs a cycle every `interval_secs` until `shutdown` turns true.
    ///
    /// The first cycle starts immediately. Shutdown is observed between cycles; a
    /// running cycle is never interrupted.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.policy.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.policy.interval_secs,
            fetch_limit = self.policy.fetch_limit,
            max_in_elements = self.policy.max_in_elements,
            dry_run = self.policy.dry_run,
            "starting sweep loop"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("sweep loop stopped");
    }

    fn begin(&self) -> std::result::Result<CycleGuard, SkipReason> {
        if !self.leader.is_leader() {
            return Err(SkipReason::NotLeader);
        }
        CycleGuard::acquire(&self.state).ok_or(SkipReason::AlreadyRunning)
    }

    fn skip(&self, reason: SkipReason) -> CycleOutcome {
        self.state.skipped.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_cycle_skipped(reason.as_str());
        tracing::debug!(reason = %reason, "sweep cycle skipped");
        CycleOutcome::Skipped { reason }
    }

    async fn run_guarded(&self, _guard: CycleGuard) -> CycleOutcome {
        let cycle = self.state.cycles_started.fetch_add(1, Ordering::Relaxed) + 1;
        self.run_phases(cycle).instrument(cycle_span(cycle)).await
    }

    async fn run_phases(&self, cycle: u64) -> CycleOutcome {
        let start = Instant::now();
        let mut report = CycleReport::new(cycle);
        tracing::info!(cycle, metric = "statsweep_cycle_started", "starting sweep cycle");

        report.reconcile = self.reconciler.reconcile().await;

        let ctx = match SweepContext::init(self.catalog.as_ref(), self.store.as_ref()).await {
            Ok(ctx) => ctx,
            Err(e) => {
                tracing::warn!(cycle, error = %e, "sweep cycle aborted");
                crate::metrics::record_error("init");
                report.errors.push(e.to_string());
                report.duration_secs = start.elapsed().as_secs_f64();
                self.state.aborted.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_cycle("aborted", report.duration_secs);
                return CycleOutcome::Aborted(report);
            }
        };

        for target in ctx.targets.in_order() {
            let result = self.sweeper.sweep(target, &ctx.snapshot).await;
            let result = match result {
                Ok(sweep) => Some(sweep),
                Err(e) => {
                    tracing::error!(
                        cycle,
                        table = %target.qualified_name(),
                        error = %e,
                        metric = "statsweep_errors_total",
                        "statistics table sweep failed"
                    );
                    report
                        .errors
                        .push(format!("sweep {}: {e}", target.qualified_name()));
                    None
                }
            };
            match target.kind() {
                StatsTableKind::ColumnLevel => report.column_level = result,
                StatsTableKind::PartitionLevel => report.partition_level = result,
            }
        }
        drop(ctx);

        report.duration_secs = start.elapsed().as_secs_f64();
        self.state.record_success();
        crate::metrics::record_cycle("completed", report.duration_secs);

        let totals = report.sweep_totals();
        tracing::info!(
            cycle,
            registry_removed = report.reconcile.removed.len(),
            rows_scanned = totals.rows_scanned,
            keys_expired = totals.keys_expired(),
            statements = totals.flush.statements_executed,
            errors = report.errors.len(),
            duration_secs = report.duration_secs,
            metric = "statsweep_cycle_completed",
            "sweep cycle completed"
        );

        CycleOutcome::Completed(report)
    }
}

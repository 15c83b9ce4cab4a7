//! Failure injection for the sweep cycle.
//!
//! # Invariants Tested
//!
//! 1. **Delete isolation**: a rejected delete never blocks the other key columns,
//!    and its rows are removed by a later cycle
//! 2. **Partial progress**: keys collected before a scan error are still flushed
//! 3. **Clean abort**: if a statistics table cannot be resolved, nothing is deleted
//! 4. **Registry isolation**: a failed removal leaves other entries reconcilable
//! 5. **Replicated removal**: an entry whose removal was not logged is restored and
//!    removed again once the log recovers

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use statsweep_core::{Error as CoreError, Result as CoreResult, TableId};
use statsweep_gc::memory::{MemoryReplicationLog, MemoryStatsStore};
use statsweep_gc::registry::{
    ReplicationLog, TableStatsDeletion, TableStatsEntry, TableStatsRegistry,
};
use statsweep_gc::store::{
    DeleteStatement, KeyColumn, StatsRow, StatsStore, StatsTableHandle, StatsTableKind,
};
use statsweep_gc::{CycleOutcome, CycleReport, TableStatsReconciler};

use common::{ORDERS, SALES_DB, World, live_row, policy, row};

// ============================================================================
// FailingStore - Configurable failure injection
// ============================================================================

/// Statistics store wrapper that injects failures into selected operations.
#[derive(Debug)]
pub struct FailingStore {
    inner: Arc<MemoryStatsStore>,
    /// Key columns whose deletes are rejected.
    fail_execute: RwLock<HashSet<KeyColumn>>,
    /// Pages served before every further fetch fails.
    fail_fetch_after: AtomicU64,
    pages_served: AtomicU64,
    /// If true, resolving any table fails (simulates an unready internal catalog).
    fail_resolve: AtomicBool,
}

impl FailingStore {
    pub fn new(inner: Arc<MemoryStatsStore>) -> Self {
        Self {
            inner,
            fail_execute: RwLock::new(HashSet::new()),
            fail_fetch_after: AtomicU64::new(u64::MAX),
            pages_served: AtomicU64::new(0),
            fail_resolve: AtomicBool::new(false),
        }
    }

    /// Reject every delete predicated on `column`.
    pub fn fail_execute(&self, column: KeyColumn) {
        self.fail_execute.write().unwrap().insert(column);
    }

    /// Serve `pages` more pages, then fail every fetch.
    pub fn fail_fetch_after(&self, pages: u64) {
        let served = self.pages_served.load(Ordering::SeqCst);
        self.fail_fetch_after.store(served + pages, Ordering::SeqCst);
    }

    /// Fail table resolution.
    pub fn fail_resolve(&self) {
        self.fail_resolve.store(true, Ordering::SeqCst);
    }

    /// Clear every injected failure.
    pub fn heal(&self) {
        self.fail_execute.write().unwrap().clear();
        self.fail_fetch_after.store(u64::MAX, Ordering::SeqCst);
        self.fail_resolve.store(false, Ordering::SeqCst);
    }

    fn injected(message: String) -> CoreError {
        CoreError::Storage {
            message,
            source: None,
        }
    }
}

#[async_trait]
impl StatsStore for FailingStore {
    async fn resolve_table(&self, name: &str) -> CoreResult<StatsTableHandle> {
        if self.fail_resolve.load(Ordering::SeqCst) {
            return Err(Self::injected(format!("Injected resolve failure: {name}")));
        }
        self.inner.resolve_table(name).await
    }

    async fn row_count(&self, table: &StatsTableHandle) -> CoreResult<u64> {
        self.inner.row_count(table).await
    }

    async fn fetch_page(
        &self,
        table: &StatsTableHandle,
        limit: u64,
        offset: u64,
    ) -> CoreResult<Vec<StatsRow>> {
        let served = self.pages_served.load(Ordering::SeqCst);
        if served >= self.fail_fetch_after.load(Ordering::SeqCst) {
            return Err(Self::injected(format!(
                "Injected read failure: {} at offset {offset}",
                table.qualified_name()
            )));
        }
        self.pages_served.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch_page(table, limit, offset).await
    }

    async fn execute(&self, statement: &DeleteStatement) -> CoreResult<()> {
        if self.fail_execute.read().unwrap().contains(&statement.column) {
            return Err(Self::injected(format!(
                "Injected delete failure: {}",
                statement.column
            )));
        }
        self.inner.execute(statement).await
    }
}

// ============================================================================
// Failing registry collaborators
// ============================================================================

/// Registry that refuses to remove selected tables.
struct StickyRegistry {
    entries: RwLock<Vec<TableStatsEntry>>,
    sticky: HashSet<TableId>,
}

impl TableStatsRegistry for StickyRegistry {
    fn list_tracked_table_ids(&self) -> CoreResult<Vec<TableId>> {
        Ok(self
            .entries
            .read()
            .unwrap()
            .iter()
            .map(|e| e.table_id)
            .collect())
    }

    fn get(&self, table_id: TableId) -> CoreResult<Option<TableStatsEntry>> {
        Ok(self
            .entries
            .read()
            .unwrap()
            .iter()
            .find(|e| e.table_id == table_id)
            .cloned())
    }

    fn remove(&self, table_id: TableId) -> CoreResult<()> {
        if self.sticky.contains(&table_id) {
            return Err(CoreError::Catalog {
                message: format!("Injected remove failure: {table_id}"),
            });
        }
        self.entries
            .write()
            .unwrap()
            .retain(|e| e.table_id != table_id);
        Ok(())
    }

    fn restore(&self, entry: TableStatsEntry) -> CoreResult<()> {
        let mut entries = self.entries.write().unwrap();
        entries.retain(|e| e.table_id != entry.table_id);
        entries.push(entry);
        Ok(())
    }
}

/// Replication log that rejects a number of appends before recovering.
struct FlakyLog {
    inner: Arc<MemoryReplicationLog>,
    failures_left: AtomicU64,
}

impl FlakyLog {
    fn new(inner: Arc<MemoryReplicationLog>, failures: u64) -> Self {
        Self {
            inner,
            failures_left: AtomicU64::new(failures),
        }
    }
}

#[async_trait]
impl ReplicationLog for FlakyLog {
    async fn append_deletion_record(&self, record: TableStatsDeletion) -> CoreResult<()> {
        let rejected = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(CoreError::Replication {
                message: format!("Injected append failure: {}", record.table_id),
            });
        }
        self.inner.append_deletion_record(record).await
    }
}

fn completed(outcome: CycleOutcome) -> CycleReport {
    match outcome {
        CycleOutcome::Completed(report) => report,
        other => panic!("expected a completed cycle, got {other:?}"),
    }
}

// ============================================================================
// Store failures
// ============================================================================

#[tokio::test]
async fn rejected_delete_does_not_block_other_columns() {
    let world = World::new();
    world.store.insert_rows(
        StatsTableKind::ColumnLevel,
        [
            row("db-gone", 0, 99, 500, -1, "c", None),
            row("tbl-gone", 0, SALES_DB, 500, -1, "c", None),
            row("col-gone", 0, SALES_DB, ORDERS, -1, "dropped", None),
            live_row("live"),
        ],
    );
    let store = Arc::new(FailingStore::new(world.store.clone()));
    store.fail_execute(KeyColumn::DbId);
    let scheduler = world.scheduler_with_store(store.clone(), policy(100, 100));

    let report = completed(scheduler.run_cycle().await);
    let totals = report.sweep_totals();
    assert_eq!(totals.flush.statements_failed, 1);
    assert_eq!(totals.flush.statements_executed, 2);
    assert!(totals.flush.errors[0].contains("db_id"));
    assert!(report.has_errors());

    let remaining: Vec<_> = world
        .store
        .rows(StatsTableKind::ColumnLevel)
        .iter()
        .map(|r| r.get(StatsRow::ID).unwrap().to_string())
        .collect();
    assert_eq!(remaining, vec!["db-gone", "live"]);

    // The next cycle retries the rejected rows.
    store.heal();
    let report = completed(scheduler.run_cycle().await);
    assert!(!report.has_errors());
    assert_eq!(
        world.store.rows(StatsTableKind::ColumnLevel),
        vec![live_row("live")]
    );
}

#[tokio::test]
async fn scan_error_flushes_collected_keys() {
    let world = World::new();
    world.store.insert_rows(
        StatsTableKind::ColumnLevel,
        [
            row("a", 0, 99, 500, -1, "c", None),
            live_row("b"),
            row("c", 0, 98, 500, -1, "c", None),
            live_row("d"),
        ],
    );
    let store = Arc::new(FailingStore::new(world.store.clone()));
    store.fail_fetch_after(1);
    let scheduler = world.scheduler_with_store(store.clone(), policy(2, 100));

    let report = completed(scheduler.run_cycle().await);
    assert!(report.column_level.is_none());
    assert!(report.errors.iter().any(|e| e.contains("column_statistics")));

    // The first page was classified and flushed before the failure.
    let executed = world.store.executed();
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0].values, vec!["99"]);
    assert_eq!(world.store.rows(StatsTableKind::ColumnLevel).len(), 3);
    assert_eq!(scheduler.status().completed, 1);
}

#[tokio::test]
async fn resolve_failure_aborts_without_deleting() {
    let world = World::new();
    world.store.insert_rows(
        StatsTableKind::ColumnLevel,
        [row("a", 0, 99, 500, -1, "c", None)],
    );
    let store = Arc::new(FailingStore::new(world.store.clone()));
    store.fail_resolve();
    let scheduler = world.scheduler_with_store(store.clone(), policy(100, 100));

    let outcome = scheduler.run_cycle().await;
    assert_eq!(outcome.label(), "aborted");
    assert!(world.store.executed().is_empty());
    assert_eq!(scheduler.status().completed, 0);
    assert!(!scheduler.is_healthy(3600));

    store.heal();
    let report = completed(scheduler.run_cycle().await);
    assert_eq!(report.sweep_totals().databases_expired, 1);
    assert!(scheduler.is_healthy(3600));
}

// ============================================================================
// Registry failures
// ============================================================================

#[tokio::test]
async fn failed_removal_does_not_block_other_entries() {
    let world = World::new();
    let registry = Arc::new(StickyRegistry {
        entries: RwLock::new(vec![
            TableStatsEntry::legacy(TableId::new(1)),
            TableStatsEntry::legacy(TableId::new(2)),
        ]),
        sticky: HashSet::from([TableId::new(1)]),
    });
    let reconciler =
        TableStatsReconciler::new(world.catalog.clone(), registry.clone(), world.log.clone());

    let report = reconciler.reconcile().await;
    assert_eq!(report.checked, 2);
    assert_eq!(report.removed, vec![TableId::new(2)]);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(
        registry.list_tracked_table_ids().unwrap(),
        vec![TableId::new(1)]
    );
    assert_eq!(
        world.log.records(),
        vec![TableStatsDeletion {
            table_id: TableId::new(2)
        }]
    );
}

#[tokio::test]
async fn append_failure_keeps_the_entry_for_the_next_pass() {
    let world = World::new();
    world.registry.track(TableStatsEntry::legacy(TableId::new(1)));
    world.registry.track(TableStatsEntry::legacy(TableId::new(2)));
    let log = Arc::new(FlakyLog::new(world.log.clone(), 1));
    let reconciler =
        TableStatsReconciler::new(world.catalog.clone(), world.registry.clone(), log);

    let report = reconciler.reconcile().await;
    assert_eq!(report.removed, vec![TableId::new(2)]);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("replication"));
    assert_eq!(
        world.registry.list_tracked_table_ids().unwrap(),
        vec![TableId::new(1)]
    );

    // The log recovered: the restored entry is removed and logged exactly once.
    let report = reconciler.reconcile().await;
    assert!(!report.has_errors());
    assert_eq!(report.removed, vec![TableId::new(1)]);
    assert!(world.registry.list_tracked_table_ids().unwrap().is_empty());
    assert_eq!(
        world.log.records(),
        vec![
            TableStatsDeletion {
                table_id: TableId::new(2)
            },
            TableStatsDeletion {
                table_id: TableId::new(1)
            },
        ]
    );
}

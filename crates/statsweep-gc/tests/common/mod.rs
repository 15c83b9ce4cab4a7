//! Shared cluster fixture for integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use statsweep_core::{CatalogId, DatabaseId, IndexId, TableId};
use statsweep_gc::catalog::{CatalogInfo, DatabaseInfo, MaterializedIndexMeta, Table, TableKind};
use statsweep_gc::memory::{
    InMemoryCatalog, InMemoryTableStatsRegistry, MemoryReplicationLog, MemoryStatsStore,
};
use statsweep_gc::store::{StatsRow, StatsStore};
use statsweep_gc::{CatalogSnapshot, StaticLeaderGate, SweepPolicy, SweepScheduler};

/// Live internal database.
pub const SALES_DB: i64 = 1;
/// Live OLAP table in [`SALES_DB`] with columns `id` and `amount`.
pub const ORDERS: i64 = 10;
/// Materialized-view index on [`ORDERS`].
pub const ORDERS_MV: i64 = 11;
/// Live view in [`SALES_DB`] with column `id`.
pub const ORDERS_VIEW: i64 = 12;
/// Live federated catalog.
pub const HIVE: i64 = 10_001;

/// A single-node cluster backed by the in-memory collaborators.
pub struct World {
    pub catalog: Arc<InMemoryCatalog>,
    pub store: Arc<MemoryStatsStore>,
    pub registry: Arc<InMemoryTableStatsRegistry>,
    pub log: Arc<MemoryReplicationLog>,
    pub leader: Arc<StaticLeaderGate>,
}

impl World {
    pub fn new() -> Self {
        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.add_catalog(CatalogInfo::external(CatalogId::new(HIVE), "hive"));
        catalog.add_database(DatabaseInfo::new(DatabaseId::new(SALES_DB), "sales"));
        catalog
            .add_table(
                DatabaseId::new(SALES_DB),
                Table::new(
                    TableId::new(ORDERS),
                    "orders",
                    TableKind::Olap,
                    &["id", "amount"],
                )
                .with_index(MaterializedIndexMeta {
                    index_id: IndexId::new(ORDERS_MV),
                    name: "orders_by_id".into(),
                    define_stmt: Some("SELECT id, SUM(amount) FROM orders GROUP BY id".into()),
                }),
            )
            .unwrap();
        catalog
            .add_table(
                DatabaseId::new(SALES_DB),
                Table::new(TableId::new(ORDERS_VIEW), "orders_v", TableKind::View, &["id"]),
            )
            .unwrap();

        Self {
            catalog,
            store: Arc::new(MemoryStatsStore::new()),
            registry: Arc::new(InMemoryTableStatsRegistry::new()),
            log: Arc::new(MemoryReplicationLog::new()),
            leader: Arc::new(StaticLeaderGate::new(true)),
        }
    }

    pub fn scheduler(&self, policy: SweepPolicy) -> SweepScheduler {
        self.scheduler_with_store(self.store.clone(), policy)
    }

    pub fn scheduler_with_store(
        &self,
        store: Arc<dyn StatsStore>,
        policy: SweepPolicy,
    ) -> SweepScheduler {
        SweepScheduler::new(
            self.catalog.clone(),
            store,
            self.registry.clone(),
            self.log.clone(),
            self.leader.clone(),
            policy,
        )
        .unwrap()
    }

    pub fn snapshot(&self) -> CatalogSnapshot {
        CatalogSnapshot::build(self.catalog.as_ref()).unwrap()
    }
}

/// Policy with no pauses and small batches.
pub fn policy(fetch_limit: u64, max_in_elements: usize) -> SweepPolicy {
    SweepPolicy {
        fetch_limit,
        max_in_elements,
        fetch_interval_ms: 0,
        ..SweepPolicy::development()
    }
}

/// A statistics row.
pub fn row(
    id: &str,
    catalog: i64,
    db: i64,
    tbl: i64,
    idx: i64,
    col: &str,
    part: Option<&str>,
) -> StatsRow {
    StatsRow::from_parts(id, catalog, db, tbl, idx, col, part)
}

/// A fully live row of `orders.id`.
pub fn live_row(id: &str) -> StatsRow {
    row(id, 0, SALES_DB, ORDERS, -1, "id", None)
}

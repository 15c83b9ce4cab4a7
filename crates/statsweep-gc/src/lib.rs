//! # statsweep-gc
//!
//! Garbage collection of column statistics whose catalog objects are gone.
//!
//! When a catalog, database, table, materialized index, column or partition is
//! dropped, the statistics collected for it stay behind in the internal statistics
//! tables. This crate finds and deletes them:
//!
//! - **Registry reconciliation**: Drops table-level stats records of missing tables
//! - **Catalog snapshot**: Indexes live catalog objects once per cycle
//! - **Column stats sweep**: Pages through the statistics tables and classifies rows
//! - **Batch deletes**: One `DELETE ... WHERE col IN (...)` per expired key column
//! - **Scheduling**: Leader-gated, interval-driven, one cycle at a time
//!
//! ## Tables
//!
//! ```text
//! __internal_schema/
//! ├── column_statistics      # id, catalog_id, db_id, tbl_id, idx_id, col_id, part_id, ...
//! └── partition_statistics   # catalog_id, db_id, tbl_id, idx_id, part_id, col_id, ...
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use statsweep_gc::leader::StaticLeaderGate;
//! use statsweep_gc::memory::{
//!     InMemoryCatalog, InMemoryTableStatsRegistry, MemoryReplicationLog, MemoryStatsStore,
//! };
//! use statsweep_gc::{CycleOutcome, SweepPolicy, SweepScheduler};
//!
//! # tokio_test::block_on(async {
//! let scheduler = SweepScheduler::new(
//!     Arc::new(InMemoryCatalog::new()),
//!     Arc::new(MemoryStatsStore::new()),
//!     Arc::new(InMemoryTableStatsRegistry::new()),
//!     Arc::new(MemoryReplicationLog::new()),
//!     Arc::new(StaticLeaderGate::default()),
//!     SweepPolicy::development(),
//! )?;
//!
//! let outcome = scheduler.run_cycle().await;
//! assert!(matches!(outcome, CycleOutcome::Completed(_)));
//! # Ok::<(), statsweep_gc::SweepError>(())
//! # })?;
//! # Ok::<(), statsweep_gc::SweepError>(())
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod catalog;
pub mod error;
pub mod executor;
pub mod keys;
pub mod leader;
pub mod memory;
pub mod metrics;
pub mod policy;
pub mod reconciler;
pub mod registry;
pub mod scheduler;
pub mod snapshot;
pub mod store;
pub mod sweeper;

// Re-export main types at crate root
pub use catalog::{CatalogService, Table, TableKind};
pub use error::{Result, SweepError};
pub use executor::{BatchDeleteExecutor, FlushReport};
pub use keys::{ExpiredKeySet, Expiry, StatsRowKey};
pub use leader::{LeaderGate, StaticLeaderGate};
pub use policy::SweepPolicy;
pub use reconciler::{ReconcileReport, TableStatsReconciler};
pub use registry::{ReplicationLog, TableStatsEntry, TableStatsRegistry};
pub use scheduler::{CycleOutcome, CycleReport, SchedulerStatus, SkipReason, SweepScheduler};
pub use snapshot::{CatalogSnapshot, SweepContext, SweepTargets};
pub use store::{DeleteStatement, KeyColumn, StatsStore, StatsTableHandle, StatsTableKind};
pub use sweeper::{ColumnStatsSweeper, SweepReport, Verdict, classify};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::catalog::{CatalogService, Table, TableKind};
    pub use crate::error::{Result, SweepError};
    pub use crate::leader::LeaderGate;
    pub use crate::policy::SweepPolicy;
    pub use crate::registry::{ReplicationLog, TableStatsRegistry};
    pub use crate::scheduler::{CycleOutcome, SweepScheduler};
    pub use crate::store::StatsStore;
}

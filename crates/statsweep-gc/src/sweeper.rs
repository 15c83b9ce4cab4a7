//! Paged scan of a statistics table.
//!
//! The sweeper walks one statistics table in fixed-size pages, classifies every row
//! against the [`CatalogSnapshot`], and hands each round's expired keys to the
//! [`BatchDeleteExecutor`].
//!
//! ## Rounds
//!
//! ```text
//! loop {
//!     expired = new key set
//!     while !expired.is_full():  next row -> classify -> insert
//!     flush(expired)
//!     stop once the table is exhausted and expired.is_empty()
//! }
//! ```
//!
//! The read offset keeps advancing across rounds. Rows that shift below it because
//! of this cycle's deletes are picked up by the next cycle.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::Instrument;

use statsweep_core::IndexId;
use statsweep_core::observability::table_span;

use crate::error::{Result, SweepError};
use crate::executor::{BatchDeleteExecutor, FlushReport};
use crate::keys::{ExpiredKeySet, Expiry, StatsRowKey};
use crate::policy::SweepPolicy;
use crate::snapshot::CatalogSnapshot;
use crate::store::{KeyColumn, StatsRow, StatsStore, StatsTableHandle};

/// Classification of one statistics row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Everything the row references still exists.
    Live,
    /// The row belongs to a live federated catalog and is left alone.
    ExternalCatalog,
    /// The row is stale at exactly one level.
    Expired(Expiry),
}

/// Classifies a row, stopping at the first level whose object no longer exists.
#[must_use]
pub fn classify(snapshot: &CatalogSnapshot, key: &StatsRowKey) -> Verdict {
    if !snapshot.contains_catalog(key.catalog_id) {
        return Verdict::Expired(Expiry::Catalog(key.catalog_id));
    }
    // Federated metadata is never fetched; only a dropped catalog expires its rows.
    if !key.catalog_id.is_internal() {
        return Verdict::ExternalCatalog;
    }
    if !snapshot.contains_database(key.db_id) {
        return Verdict::Expired(Expiry::Database(key.db_id));
    }
    let Some(table) = snapshot.table(key.table_id) else {
        return Verdict::Expired(Expiry::Table(key.table_id));
    };
    if key.index_id != IndexId::NONE && !snapshot.contains_mv_index(key.index_id) {
        return Verdict::Expired(Expiry::Index(key.index_id));
    }
    if !table.is_materialized_view_column(&key.column_id) && table.column(&key.column_id).is_none()
    {
        return Verdict::Expired(Expiry::Column(key.record_id.clone()));
    }
    if !table.kind.supports_partition_stats() {
        return Verdict::Live;
    }
    match &key.partition_id {
        None => Verdict::Live,
        Some(partition_id) => Verdict::Expired(Expiry::Partition(partition_id.clone())),
    }
}

/// Result of sweeping one statistics table.
///
/// Expired counts are distinct within a round; a key seen again in a later round
/// counts again.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    /// Rows read from the store.
    pub rows_scanned: u64,
    /// Rows that could not be parsed and were skipped.
    pub malformed_rows: u64,
    /// Rows of live federated catalogs.
    pub external_rows: u64,
    /// Distinct expired catalog ids.
    pub catalogs_expired: u64,
    /// Distinct expired database ids.
    pub databases_expired: u64,
    /// Distinct expired table ids.
    pub tables_expired: u64,
    /// Distinct expired index ids.
    pub indexes_expired: u64,
    /// Row ids of dropped columns.
    pub columns_expired: u64,
    /// Distinct expired partition ids.
    pub partitions_expired: u64,
    /// Accumulate-and-flush rounds.
    pub rounds: u64,
    /// Pages fetched.
    pub pages: u64,
    /// Delete results across all rounds.
    pub flush: FlushReport,
    /// Errors encountered (the sweep continues past row and delete errors).
    pub errors: Vec<String>,
}

impl SweepReport {
    /// Merges another report into this one.
    pub fn merge(&mut self, other: Self) {
        self.rows_scanned += other.rows_scanned;
        self.malformed_rows += other.malformed_rows;
        self.external_rows += other.external_rows;
        self.catalogs_expired += other.catalogs_expired;
        self.databases_expired += other.databases_expired;
        self.tables_expired += other.tables_expired;
        self.indexes_expired += other.indexes_expired;
        self.columns_expired += other.columns_expired;
        self.partitions_expired += other.partitions_expired;
        self.rounds += other.rounds;
        self.pages += other.pages;
        self.flush.merge(other.flush);
        self.errors.extend(other.errors);
    }

    /// Total distinct expired keys across all levels.
    #[must_use]
    pub const fn keys_expired(&self) -> u64 {
        self.catalogs_expired
            + self.databases_expired
            + self.tables_expired
            + self.indexes_expired
            + self.columns_expired
            + self.partitions_expired
    }

    fn count(&mut self, column: KeyColumn) {
        let slot = match column {
            KeyColumn::CatalogId => &mut self.catalogs_expired,
            KeyColumn::DbId => &mut self.databases_expired,
            KeyColumn::TblId => &mut self.tables_expired,
            KeyColumn::IdxId => &mut self.indexes_expired,
            KeyColumn::Id => &mut self.columns_expired,
            KeyColumn::PartId => &mut self.partitions_expired,
        };
        *slot += 1;
    }
}

/// Forward-only page reader over one statistics table.
///
/// The row count is re-read before every fetch, so rows deleted by earlier rounds
/// shorten the scan. A page that comes back empty ends the scan even if the count
/// says otherwise.
struct PageCursor<'a> {
    store: &'a dyn StatsStore,
    table: &'a StatsTableHandle,
    limit: u64,
    pause: Duration,
    offset: u64,
    pending: VecDeque<StatsRow>,
    drained: bool,
    pages: u64,
}

impl<'a> PageCursor<'a> {
    fn new(store: &'a dyn StatsStore, table: &'a StatsTableHandle, policy: &SweepPolicy) -> Self {
        Self {
            store,
            table,
            limit: policy.fetch_limit,
            pause: policy.fetch_interval(),
            offset: 0,
            pending: VecDeque::new(),
            drained: false,
            pages: 0,
        }
    }

    async fn next_row(&mut self) -> Result<Option<StatsRow>> {
        loop {
            if let Some(row) = self.pending.pop_front() {
                return Ok(Some(row));
            }
            if self.drained {
                return Ok(None);
            }
            self.fetch().await?;
        }
    }

    async fn fetch(&mut self) -> Result<()> {
        let row_count = self.store.row_count(self.table).await?;
        if self.offset >= row_count {
            self.drained = true;
            return Ok(());
        }

        let rows = self
            .store
            .fetch_page(self.table, self.limit, self.offset)
            .await?;
        self.offset = self.offset.saturating_add(self.limit);
        self.pages += 1;

        tracing::debug!(
            table = %self.table.qualified_name(),
            offset = self.offset,
            row_count,
            rows = rows.len(),
            "fetched statistics page"
        );

        if rows.is_empty() {
            self.drained = true;
        }
        self.pending.extend(rows);

        if !self.pause.is_zero() {
            tokio::time::sleep(self.pause).await;
        }
        Ok(())
    }

    fn is_exhausted(&self) -> bool {
        self.drained && self.pending.is_empty()
    }
}

/// Removes statistics rows whose catalog objects no longer exist.
pub struct ColumnStatsSweeper {
    store: Arc<dyn StatsStore>,
    executor: BatchDeleteExecutor,
    policy: SweepPolicy,
}

impl ColumnStatsSweeper {
    /// Creates a sweeper reading from and deleting through `store`.
    ///
    /// # Errors
    ///
    /// Returns [`SweepError::Config`] if the policy is not usable. A quota below
    /// [`SweepPolicy::MIN_IN_ELEMENTS`] would keep the round loop from ever finding
    /// an empty accumulation.
    pub fn new(store: Arc<dyn StatsStore>, policy: SweepPolicy) -> Result<Self> {
        if let Some(message) = policy.validate() {
            return Err(SweepError::Config { message });
        }
        let executor = BatchDeleteExecutor::new(Arc::clone(&store)).with_dry_run(policy.dry_run);
        Ok(Self {
            store,
            executor,
            policy,
        })
    }

    /// Sweeps one statistics table.
    ///
    /// Malformed rows and rejected deletes are logged and recorded in the report.
    ///
    /// # Errors
    ///
    /// Returns [`SweepError::Store`] if the table cannot be read. Keys collected
    /// before the failure are still flushed.
    pub async fn sweep(
        &self,
        target: &StatsTableHandle,
        snapshot: &CatalogSnapshot,
    ) -> Result<SweepReport> {
        self.sweep_table(target, snapshot)
            .instrument(table_span("sweep", target.qualified_name()))
            .await
    }

    async fn sweep_table(
        &self,
        target: &StatsTableHandle,
        snapshot: &CatalogSnapshot,
    ) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let mut cursor = PageCursor::new(self.store.as_ref(), target, &self.policy);

        loop {
            let mut expired = ExpiredKeySet::for_policy(&self.policy);
            let mut failure = None;

            while !expired.is_full() {
                let row = match cursor.next_row().await {
                    Ok(Some(row)) => row,
                    Ok(None) => break,
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                };
                report.rows_scanned += 1;
                Self::accumulate(&row, snapshot, &mut expired, &mut report);
            }

            report.rounds += 1;
            if !expired.has_no_keys() {
                report.flush.merge(self.executor.flush(&expired, target).await);
            }

            if let Some(e) = failure {
                crate::metrics::record_error("scan");
                report.pages = cursor.pages;
                crate::metrics::record_rows_scanned(target.qualified_name(), report.rows_scanned);
                return Err(e);
            }
            if cursor.is_exhausted() && expired.is_empty() {
                break;
            }
        }

        report.pages = cursor.pages;
        crate::metrics::record_rows_scanned(target.qualified_name(), report.rows_scanned);

        tracing::info!(
            table = %target.qualified_name(),
            rows_scanned = report.rows_scanned,
            keys_expired = report.keys_expired(),
            statements = report.flush.statements_executed,
            rounds = report.rounds,
            metric = "statsweep_table_swept",
            "statistics table swept"
        );

        Ok(report)
    }

    fn accumulate(
        row: &StatsRow,
        snapshot: &CatalogSnapshot,
        expired: &mut ExpiredKeySet,
        report: &mut SweepReport,
    ) {
        let key = match StatsRowKey::parse(row) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed statistics row");
                crate::metrics::record_error("classify");
                report.malformed_rows += 1;
                report.errors.push(e.to_string());
                return;
            }
        };

        match classify(snapshot, &key) {
            Verdict::Live => {}
            Verdict::ExternalCatalog => report.external_rows += 1,
            Verdict::Expired(expiry) => {
                let level = expiry.level();
                let column = expiry.key_column();
                tracing::trace!(record_id = %key.record_id, level, "expired statistics row");
                if expired.insert(expiry) {
                    report.count(column);
                    crate::metrics::record_key_expired(level);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogInfo, DatabaseInfo, MaterializedIndexMeta, Table, TableKind};
    use crate::memory::{InMemoryCatalog, MemoryStatsStore};
    use crate::store::StatsTableKind;
    use statsweep_core::{CatalogId, DatabaseId, TableId};

    fn snapshot() -> CatalogSnapshot {
        let catalog = InMemoryCatalog::new();
        catalog.add_catalog(CatalogInfo::external(CatalogId::new(7), "hive"));
        catalog.add_database(DatabaseInfo::new(DatabaseId::new(1), "db"));
        catalog
            .add_table(
                DatabaseId::new(1),
                Table::new(TableId::new(10), "t", TableKind::Olap, &["a", "b"]).with_index(
                    MaterializedIndexMeta {
                        index_id: IndexId::new(11),
                        name: "mv".into(),
                        define_stmt: Some("SELECT a FROM t".into()),
                    },
                ),
            )
            .unwrap();
        catalog
            .add_table(
                DatabaseId::new(1),
                Table::new(TableId::new(20), "v", TableKind::View, &["a"]),
            )
            .unwrap();
        CatalogSnapshot::build(&catalog).unwrap()
    }

    fn key(catalog: i64, db: i64, tbl: i64, idx: i64, col: &str, part: Option<&str>) -> StatsRowKey {
        StatsRowKey::parse(&StatsRow::from_parts("rid", catalog, db, tbl, idx, col, part)).unwrap()
    }

    #[test]
    fn classify_walks_levels_in_order() {
        let snap = snapshot();
        assert_eq!(
            classify(&snap, &key(5, 99, 99, 99, "zz", Some("p"))),
            Verdict::Expired(Expiry::Catalog(CatalogId::new(5)))
        );
        assert_eq!(
            classify(&snap, &key(0, 99, 99, 99, "zz", Some("p"))),
            Verdict::Expired(Expiry::Database(DatabaseId::new(99)))
        );
        assert_eq!(
            classify(&snap, &key(0, 1, 99, 99, "zz", Some("p"))),
            Verdict::Expired(Expiry::Table(TableId::new(99)))
        );
        assert_eq!(
            classify(&snap, &key(0, 1, 10, 99, "zz", Some("p"))),
            Verdict::Expired(Expiry::Index(IndexId::new(99)))
        );
        assert_eq!(
            classify(&snap, &key(0, 1, 10, -1, "zz", Some("p"))),
            Verdict::Expired(Expiry::Column("rid".into()))
        );
        assert_eq!(
            classify(&snap, &key(0, 1, 10, -1, "a", Some("p"))),
            Verdict::Expired(Expiry::Partition("p".into()))
        );
        assert_eq!(classify(&snap, &key(0, 1, 10, 11, "A", None)), Verdict::Live);
    }

    #[test]
    fn external_catalog_rows_are_never_expired() {
        let snap = snapshot();
        assert_eq!(
            classify(&snap, &key(7, 99, 99, 99, "zz", Some("p"))),
            Verdict::ExternalCatalog
        );
    }

    #[test]
    fn mv_columns_and_non_partitioned_tables_stay_live() {
        let snap = snapshot();
        assert_eq!(classify(&snap, &key(0, 1, 10, -1, "mva_SUM__b", None)), Verdict::Live);
        assert_eq!(classify(&snap, &key(0, 1, 20, -1, "a", Some("p"))), Verdict::Live);
        assert_eq!(classify(&snap, &key(0, 1, 20, -1, "mva_SUM__a", None)), Verdict::Live);
        assert_eq!(
            classify(&snap, &key(0, 1, 20, -1, "mv_a", None)),
            Verdict::Expired(Expiry::Column("rid".into()))
        );
    }

    #[tokio::test]
    async fn sweep_of_empty_table_issues_nothing() {
        let store = Arc::new(MemoryStatsStore::new());
        let sweeper = ColumnStatsSweeper::new(store.clone(), SweepPolicy::development()).unwrap();
        let target = StatsTableHandle::new(StatsTableKind::ColumnLevel);

        let report = sweeper.sweep(&target, &snapshot()).await.unwrap();
        assert_eq!(report.rows_scanned, 0);
        assert_eq!(report.rounds, 1);
        assert_eq!(report.pages, 0);
        assert!(store.executed().is_empty());
    }

    #[test]
    fn small_quota_is_rejected() {
        let result = ColumnStatsSweeper::new(
            Arc::new(MemoryStatsStore::new()),
            SweepPolicy {
                max_in_elements: 5,
                ..SweepPolicy::development()
            },
        );
        assert!(matches!(result, Err(SweepError::Config { .. })));
    }

    #[tokio::test]
    async fn malformed_rows_are_skipped() {
        let store = Arc::new(MemoryStatsStore::new());
        store.insert_rows(
            StatsTableKind::ColumnLevel,
            [
                StatsRow::new(vec![Some("bad".into())]),
                StatsRow::from_parts("r1", 0, 99, 1, -1, "a", None),
            ],
        );
        let sweeper = ColumnStatsSweeper::new(store.clone(), SweepPolicy::development()).unwrap();
        let target = StatsTableHandle::new(StatsTableKind::ColumnLevel);

        let report = sweeper.sweep(&target, &snapshot()).await.unwrap();
        assert_eq!(report.rows_scanned, 2);
        assert_eq!(report.malformed_rows, 1);
        assert_eq!(report.databases_expired, 1);
        assert_eq!(store.rows(StatsTableKind::ColumnLevel).len(), 1);
    }
}

//! Table-level statistics registry reconciliation.
//!
//! Removes registry entries for tables that no longer exist and replicates each
//! removal so followers converge. An entry is live when either:
//!
//! 1. its recorded `catalog.db.table` path resolves to a table with the same id, or
//! 2. a table with its id exists in some internal database.
//!
//! The id check in (1) matters after `REPLACE TABLE`: a new table under the old
//! name must not keep the old entry alive. Federated catalogs are never searched by
//! id, so an entry of a federated table that cannot be resolved by name is removed;
//! the next analysis recreates it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use statsweep_core::TableId;

use crate::catalog::CatalogService;
use crate::error::{Result, SweepError};
use crate::registry::{ReplicationLog, TableStatsDeletion, TableStatsEntry, TableStatsRegistry};

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// When the pass started.
    pub checked_at: DateTime<Utc>,
    /// Entries examined.
    pub checked: u64,
    /// Tables whose entries were removed (or would be, in a dry run).
    pub removed: Vec<TableId>,
    /// Per-entry errors; those entries were left in place.
    pub errors: Vec<String>,
}

impl Default for ReconcileReport {
    fn default() -> Self {
        Self {
            checked_at: Utc::now(),
            checked: 0,
            removed: Vec::new(),
            errors: Vec::new(),
        }
    }
}

impl ReconcileReport {
    /// Returns true if any errors were encountered.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Drops registry entries of tables that no longer exist.
pub struct TableStatsReconciler {
    catalog: Arc<dyn CatalogService>,
    registry: Arc<dyn TableStatsRegistry>,
    log: Arc<dyn ReplicationLog>,
    dry_run: bool,
}

impl TableStatsReconciler {
    /// Creates a reconciler.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn CatalogService>,
        registry: Arc<dyn TableStatsRegistry>,
        log: Arc<dyn ReplicationLog>,
    ) -> Self {
        Self {
            catalog,
            registry,
            log,
            dry_run: false,
        }
    }

    /// Reports removals without touching the registry or the log.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Runs one pass over every tracked table.
    ///
    /// Never fails: an entry that cannot be checked or removed is logged, recorded
    /// in the report, and retried on the next pass.
    pub async fn reconcile(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        let ids = match self.registry.list_tracked_table_ids() {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list tracked tables");
                crate::metrics::record_error("reconcile");
                report.errors.push(format!("list tracked tables: {e}"));
                return report;
            }
        };

        for id in ids {
            report.checked += 1;
            match self.reconcile_entry(id).await {
                Ok(true) => report.removed.push(id),
                Ok(false) => {}
                Err(e) => {
                    tracing::info!(table_id = %id, error = %e, "failed to reconcile table stats");
                    crate::metrics::record_error("reconcile");
                    report.errors.push(format!("table {id}: {e}"));
                }
            }
        }

        if !self.dry_run {
            crate::metrics::record_registry_removed(
                u64::try_from(report.removed.len()).unwrap_or(u64::MAX),
            );
        }

        tracing::info!(
            checked = report.checked,
            removed = report.removed.len(),
            errors = report.errors.len(),
            dry_run = self.dry_run,
            metric = "statsweep_registry_reconciled",
            "table stats registry reconciled"
        );

        report
    }

    /// Returns true if the entry was (or would be) removed.
    async fn reconcile_entry(&self, id: TableId) -> Result<bool> {
        let Some(entry) = self.registry.get(id)? else {
            return Ok(false);
        };
        if self.is_live(&entry)? {
            return Ok(false);
        }

        tracing::info!(
            table_id = %id,
            catalog = entry.catalog_name.as_deref().unwrap_or_default(),
            db = entry.db_name.as_deref().unwrap_or_default(),
            table = entry.table_name.as_deref().unwrap_or_default(),
            dry_run = self.dry_run,
            "table no longer exists, removing its table stats record"
        );
        if self.dry_run {
            return Ok(true);
        }

        self.registry.remove(id)?;
        if let Err(e) = self
            .log
            .append_deletion_record(TableStatsDeletion { table_id: id })
            .await
        {
            // Followers never saw the removal; keep the entry so the next pass retries.
            let message = match self.registry.restore(entry) {
                Ok(()) => format!("failed to log removal of table {id}, entry restored: {e}"),
                Err(restore_err) => format!(
                    "failed to log removal of table {id}: {e}; restoring the entry also failed: {restore_err}"
                ),
            };
            return Err(SweepError::Replication { message });
        }
        Ok(true)
    }

    fn is_live(&self, entry: &TableStatsEntry) -> Result<bool> {
        if let Some((catalog, db, table)) = entry.name_path() {
            match self.catalog.resolve_table_by_name(catalog, db, table) {
                Ok(Some(found)) if found.id == entry.table_id => return Ok(true),
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(catalog, db, table, error = %e, "table not found by name");
                }
            }
        }
        self.exists_in_internal_catalog(entry.table_id)
    }

    fn exists_in_internal_catalog(&self, id: TableId) -> Result<bool> {
        for db in self.catalog.list_internal_databases()? {
            if self.catalog.find_table(db.id, id)?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

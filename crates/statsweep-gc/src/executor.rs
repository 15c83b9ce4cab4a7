//! Bulk deletes of expired statistics.
//!
//! One accumulated [`ExpiredKeySet`] becomes at most one
//! `DELETE ... WHERE <column> IN (...)` per key column. Each statement stands alone:
//! a rejected delete is logged and counted, the remaining columns are still issued,
//! and the rows it would have removed are classified again on the next cycle.

use std::sync::Arc;

use serde::Serialize;

use crate::keys::ExpiredKeySet;
use crate::store::{DeleteStatement, KeyColumn, StatsStore, StatsTableHandle};

/// Result of flushing one expired-key set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlushReport {
    /// Statements the store accepted.
    pub statements_executed: u64,
    /// Values covered by accepted statements.
    pub keys_deleted: u64,
    /// Statements the store rejected.
    pub statements_failed: u64,
    /// SQL of statements rendered but not executed (dry run).
    pub rendered: Vec<String>,
    /// Errors encountered (the flush continues past each one).
    pub errors: Vec<String>,
}

impl FlushReport {
    /// Merges another report into this one.
    pub fn merge(&mut self, other: Self) {
        self.statements_executed += other.statements_executed;
        self.keys_deleted += other.keys_deleted;
        self.statements_failed += other.statements_failed;
        self.rendered.extend(other.rendered);
        self.errors.extend(other.errors);
    }

    /// Returns true if any errors were encountered.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Issues the bulk deletes for accumulated expired keys.
pub struct BatchDeleteExecutor {
    store: Arc<dyn StatsStore>,
    dry_run: bool,
}

impl BatchDeleteExecutor {
    /// Creates an executor that deletes through `store`.
    #[must_use]
    pub fn new(store: Arc<dyn StatsStore>) -> Self {
        Self {
            store,
            dry_run: false,
        }
    }

    /// Renders statements without executing them.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Builds the statements `expired` maps to on `target`, in key-column order.
    ///
    /// Columns the target table does not carry (`part_id` and `id` on the
    /// partition-level table) produce no statement.
    #[must_use]
    pub fn plan(expired: &ExpiredKeySet, target: &StatsTableHandle) -> Vec<DeleteStatement> {
        KeyColumn::ALL
            .into_iter()
            .filter(|column| column.applies_to(target.kind()))
            .filter_map(|column| {
                let values = expired.values(column);
                // Empty columns are filtered here, so construction cannot fail.
                DeleteStatement::new(target, column, values).ok()
            })
            .collect()
    }

    /// Deletes every expired key from `target`.
    ///
    /// Never fails: each statement's error is logged and recorded in the report.
    pub async fn flush(&self, expired: &ExpiredKeySet, target: &StatsTableHandle) -> FlushReport {
        let mut report = FlushReport::default();

        for statement in Self::plan(expired, target) {
            let column = statement.column;
            let values = u64::try_from(statement.values.len()).unwrap_or(u64::MAX);

            if self.dry_run {
                tracing::info!(
                    table = %target.qualified_name(),
                    column = %column,
                    values,
                    "dry run: would delete expired statistics"
                );
                report.rendered.push(statement.to_sql());
                continue;
            }

            match self.store.execute(&statement).await {
                Ok(()) => {
                    tracing::info!(
                        table = %target.qualified_name(),
                        column = %column,
                        values,
                        metric = "statsweep_deletes_executed_total",
                        "deleted expired statistics"
                    );
                    crate::metrics::record_delete(target.qualified_name(), column.as_str());
                    report.statements_executed += 1;
                    report.keys_deleted += values;
                }
                Err(e) => {
                    tracing::warn!(
                        table = %target.qualified_name(),
                        column = %column,
                        values,
                        error = %e,
                        metric = "statsweep_errors_total",
                        "failed to delete expired statistics"
                    );
                    crate::metrics::record_error("delete");
                    report.statements_failed += 1;
                    report
                        .errors
                        .push(format!("delete {}.{column}: {e}", target.qualified_name()));
                }
            }
        }

        report
    }
}

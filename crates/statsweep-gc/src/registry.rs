//! Table-level statistics registry and its replication hook.
//!
//! The registry records which tables have statistics metadata. It is held in memory
//! on every node; the leader is the only writer and replicates each removal through
//! the edit log so followers converge on the same state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use statsweep_core::{Result, TableId};

/// "This table has statistics metadata".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableStatsEntry {
    /// Id of the table when the stats were collected.
    pub table_id: TableId,
    /// Catalog name; absent on entries written by older versions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_name: Option<String>,
    /// Database name; absent on entries written by older versions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_name: Option<String>,
    /// Table name; absent on entries written by older versions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
}

impl TableStatsEntry {
    /// An entry carrying the full `catalog.db.table` path.
    #[must_use]
    pub fn named(
        table_id: TableId,
        catalog: impl Into<String>,
        db: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            table_id,
            catalog_name: Some(catalog.into()),
            db_name: Some(db.into()),
            table_name: Some(table.into()),
        }
    }

    /// A legacy entry carrying only the table id.
    #[must_use]
    pub const fn legacy(table_id: TableId) -> Self {
        Self {
            table_id,
            catalog_name: None,
            db_name: None,
            table_name: None,
        }
    }

    /// The `(catalog, db, table)` path, if every part is recorded.
    #[must_use]
    pub fn name_path(&self) -> Option<(&str, &str, &str)> {
        match (&self.catalog_name, &self.db_name, &self.table_name) {
            (Some(c), Some(d), Some(t)) => Some((c.as_str(), d.as_str(), t.as_str())),
            _ => None,
        }
    }
}

/// Replicated record of a registry removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableStatsDeletion {
    /// Removed table id.
    pub table_id: TableId,
}

/// The table-level statistics registry.
pub trait TableStatsRegistry: Send + Sync {
    /// Ids of every tracked table.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be read.
    fn list_tracked_table_ids(&self) -> Result<Vec<TableId>>;

    /// Looks up an entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be read.
    fn get(&self, table_id: TableId) -> Result<Option<TableStatsEntry>>;

    /// Removes an entry; removing an absent entry is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be written.
    fn remove(&self, table_id: TableId) -> Result<()>;

    /// Puts back an entry whose removal could not be replicated, so the next pass
    /// retries both steps. Replaces an existing entry with the same id.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be written.
    fn restore(&self, entry: TableStatsEntry) -> Result<()>;
}

/// Durable, replicated log of registry removals.
#[async_trait]
pub trait ReplicationLog: Send + Sync {
    /// Appends a deletion record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record could not be made durable.
    async fn append_deletion_record(&self, record: TableStatsDeletion) -> Result<()>;
}

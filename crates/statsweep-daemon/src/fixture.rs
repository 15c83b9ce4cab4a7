//! JSON fixtures for running the sweep without a cluster.
//!
//! A fixture describes a catalog tree, the table-level statistics registry and the
//! contents of both statistics tables. It is loaded into the in-memory
//! collaborators so a cycle can run end to end.
//!
//! ```json
//! {
//!   "catalogs": [{ "id": 10001, "name": "hive", "kind": "external" }],
//!   "databases": [{ "id": 1, "name": "sales", "tables": [
//!     { "id": 10, "name": "orders", "kind": "olap", "columns": [{ "name": "id" }] }
//!   ]}],
//!   "registry": [{ "tableId": 10, "catalogName": "internal", "dbName": "sales", "tableName": "orders" }],
//!   "columnStatistics": [["10--1-id", "0", "1", "10", "-1", "id", null]],
//!   "partitionStatistics": []
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;

use statsweep_core::DatabaseId;
use statsweep_gc::StaticLeaderGate;
use statsweep_gc::catalog::{CatalogInfo, DatabaseInfo, Table};
use statsweep_gc::memory::{
    InMemoryCatalog, InMemoryTableStatsRegistry, MemoryReplicationLog, MemoryStatsStore,
};
use statsweep_gc::registry::TableStatsEntry;
use statsweep_gc::store::{StatsRow, StatsTableKind};

/// A database and its tables.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureDatabase {
    /// Database id.
    pub id: DatabaseId,
    /// Database name.
    pub name: String,
    /// Tables of the database.
    #[serde(default)]
    pub tables: Vec<Table>,
}

/// Contents of a fixture file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    /// Federated catalogs; the internal catalog is always present.
    #[serde(default)]
    pub catalogs: Vec<CatalogInfo>,
    /// Internal databases.
    #[serde(default)]
    pub databases: Vec<FixtureDatabase>,
    /// Table-level statistics registry entries.
    #[serde(default)]
    pub registry: Vec<TableStatsEntry>,
    /// Rows of `column_statistics`.
    #[serde(default)]
    pub column_statistics: Vec<StatsRow>,
    /// Rows of `partition_statistics`.
    #[serde(default)]
    pub partition_statistics: Vec<StatsRow>,
    /// Whether this node leads the catalog.
    #[serde(default = "default_leader")]
    pub leader: bool,
}

const fn default_leader() -> bool {
    true
}

impl Default for Fixture {
    fn default() -> Self {
        Self {
            catalogs: Vec::new(),
            databases: Vec::new(),
            registry: Vec::new(),
            column_statistics: Vec::new(),
            partition_statistics: Vec::new(),
            leader: true,
        }
    }
}

/// The in-memory collaborators a fixture was loaded into.
pub struct Collaborators {
    /// Catalog tree.
    pub catalog: Arc<InMemoryCatalog>,
    /// Statistics tables.
    pub store: Arc<MemoryStatsStore>,
    /// Table-level registry.
    pub registry: Arc<InMemoryTableStatsRegistry>,
    /// Replication log.
    pub log: Arc<MemoryReplicationLog>,
    /// Leader gate.
    pub leader: Arc<StaticLeaderGate>,
}

impl Fixture {
    /// Reads a fixture from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read fixture {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse fixture {}", path.display()))
    }

    /// Loads the fixture into fresh in-memory collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if a table references an unknown database.
    pub fn into_collaborators(self) -> anyhow::Result<Collaborators> {
        let catalog = Arc::new(InMemoryCatalog::new());
        for info in self.catalogs {
            catalog.add_catalog(info);
        }
        for db in self.databases {
            let id = db.id;
            catalog.add_database(DatabaseInfo::new(id, db.name));
            for table in db.tables {
                catalog
                    .add_table(id, table)
                    .with_context(|| format!("failed to add table to database {id}"))?;
            }
        }

        let store = Arc::new(MemoryStatsStore::new());
        store.insert_rows(StatsTableKind::ColumnLevel, self.column_statistics);
        store.insert_rows(StatsTableKind::PartitionLevel, self.partition_statistics);

        Ok(Collaborators {
            catalog,
            store,
            registry: Arc::new(InMemoryTableStatsRegistry::with_entries(self.registry)),
            log: Arc::new(MemoryReplicationLog::new()),
            leader: Arc::new(StaticLeaderGate::new(self.leader)),
        })
    }
}

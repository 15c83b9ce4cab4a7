//! In-memory collaborators for testing and single-process runs.
//!
//! This module provides thread-safe, in-memory implementations of every trait the
//! sweep consumes:
//!
//! - [`InMemoryCatalog`]: [`CatalogService`]
//! - [`MemoryStatsStore`]: [`StatsStore`], applying deletes to its rows
//! - [`InMemoryTableStatsRegistry`]: [`TableStatsRegistry`]
//! - [`MemoryReplicationLog`]: [`ReplicationLog`]
//!
//! ## Limitations
//!
//! - **NOT suitable for production**: No cross-process coordination
//! - **No persistence**: All state is lost when the process exits

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use statsweep_core::{CatalogId, DatabaseId, Error, Result, TableId};

use crate::catalog::{CatalogInfo, CatalogKind, CatalogService, DatabaseInfo, Table};
use crate::registry::{ReplicationLog, TableStatsDeletion, TableStatsEntry, TableStatsRegistry};
use crate::store::{
    DeleteStatement, INTERNAL_DB_NAME, StatsRow, StatsStore, StatsTableHandle, StatsTableKind,
};

/// Converts a lock poison error to an internal error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::Internal {
        message: "lock poisoned".into(),
    }
}

// ============================================================================
// Catalog
// ============================================================================

#[derive(Debug)]
struct InMemoryDatabase {
    info: DatabaseInfo,
    tables: BTreeMap<TableId, Arc<Table>>,
}

/// In-memory catalog tree.
///
/// Starts with the internal catalog registered and no databases.
#[derive(Debug)]
pub struct InMemoryCatalog {
    catalogs: RwLock<BTreeMap<CatalogId, CatalogInfo>>,
    databases: RwLock<BTreeMap<DatabaseId, InMemoryDatabase>>,
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCatalog {
    /// Creates a catalog tree holding only the internal catalog.
    #[must_use]
    pub fn new() -> Self {
        let internal = CatalogInfo::internal();
        Self {
            catalogs: RwLock::new(BTreeMap::from([(internal.id, internal)])),
            databases: RwLock::new(BTreeMap::new()),
        }
    }

    /// Registers a catalog, replacing one with the same id.
    pub fn add_catalog(&self, info: CatalogInfo) {
        if let Ok(mut catalogs) = self.catalogs.write() {
            catalogs.insert(info.id, info);
        }
    }

    /// Drops a catalog.
    pub fn drop_catalog(&self, id: CatalogId) {
        if let Ok(mut catalogs) = self.catalogs.write() {
            catalogs.remove(&id);
        }
    }

    /// Creates an internal database, replacing one with the same id.
    pub fn add_database(&self, info: DatabaseInfo) {
        if let Ok(mut databases) = self.databases.write() {
            databases.insert(
                info.id,
                InMemoryDatabase {
                    info,
                    tables: BTreeMap::new(),
                },
            );
        }
    }

    /// Drops an internal database and its tables.
    pub fn drop_database(&self, id: DatabaseId) {
        if let Ok(mut databases) = self.databases.write() {
            databases.remove(&id);
        }
    }

    /// Creates a table, replacing one with the same id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database does not exist.
    pub fn add_table(&self, db: DatabaseId, table: Table) -> Result<()> {
        let mut databases = self.databases.write().map_err(poison_err)?;
        let database = databases
            .get_mut(&db)
            .ok_or_else(|| Error::resource_not_found("database", db))?;
        database.tables.insert(table.id, Arc::new(table));
        Ok(())
    }

    /// Drops a table.
    pub fn drop_table(&self, db: DatabaseId, table: TableId) {
        if let Ok(mut databases) = self.databases.write() {
            if let Some(database) = databases.get_mut(&db) {
                database.tables.remove(&table);
            }
        }
    }

    /// Swaps the table currently named `table.name` for `table`, the way a
    /// `REPLACE TABLE` does: same name, new id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database does not exist.
    pub fn replace_table(&self, db: DatabaseId, table: Table) -> Result<()> {
        let mut databases = self.databases.write().map_err(poison_err)?;
        let database = databases
            .get_mut(&db)
            .ok_or_else(|| Error::resource_not_found("database", db))?;
        database
            .tables
            .retain(|_, existing| !existing.name.eq_ignore_ascii_case(&table.name));
        database.tables.insert(table.id, Arc::new(table));
        Ok(())
    }
}

impl CatalogService for InMemoryCatalog {
    fn list_catalogs(&self) -> Result<Vec<CatalogInfo>> {
        let catalogs = self.catalogs.read().map_err(poison_err)?;
        Ok(catalogs.values().cloned().collect())
    }

    fn list_internal_databases(&self) -> Result<Vec<DatabaseInfo>> {
        let databases = self.databases.read().map_err(poison_err)?;
        Ok(databases.values().map(|db| db.info.clone()).collect())
    }

    fn list_tables(&self, db: DatabaseId) -> Result<Vec<Arc<Table>>> {
        let databases = self.databases.read().map_err(poison_err)?;
        Ok(databases
            .get(&db)
            .map(|database| database.tables.values().cloned().collect())
            .unwrap_or_default())
    }

    fn resolve_table_by_name(
        &self,
        catalog: &str,
        db: &str,
        table: &str,
    ) -> Result<Option<Arc<Table>>> {
        let is_internal = {
            let catalogs = self.catalogs.read().map_err(poison_err)?;
            catalogs
                .values()
                .find(|c| c.name == catalog)
                .map(|c| c.kind == CatalogKind::Internal)
        };
        // External catalogs hold no tables in memory.
        if is_internal != Some(true) {
            return Ok(None);
        }

        let databases = self.databases.read().map_err(poison_err)?;
        Ok(databases
            .values()
            .find(|d| d.info.name == db)
            .and_then(|d| {
                d.tables
                    .values()
                    .find(|t| t.name.eq_ignore_ascii_case(table))
                    .cloned()
            }))
    }

    fn find_table(&self, db: DatabaseId, table: TableId) -> Result<Option<Arc<Table>>> {
        let databases = self.databases.read().map_err(poison_err)?;
        Ok(databases
            .get(&db)
            .and_then(|database| database.tables.get(&table).cloned()))
    }
}

// ============================================================================
// Statistics store
// ============================================================================

/// In-memory statistics tables.
///
/// Starts with both tables present and empty. Executed deletes are applied to the
/// rows and recorded in execution order.
#[derive(Debug)]
pub struct MemoryStatsStore {
    tables: RwLock<HashMap<StatsTableKind, Vec<StatsRow>>>,
    executed: RwLock<Vec<DeleteStatement>>,
    pages_fetched: AtomicU64,
}

impl Default for MemoryStatsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStatsStore {
    /// Creates a store with both statistics tables present and empty.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(
                StatsTableKind::ALL
                    .into_iter()
                    .map(|kind| (kind, Vec::new()))
                    .collect(),
            ),
            executed: RwLock::new(Vec::new()),
            pages_fetched: AtomicU64::new(0),
        }
    }

    /// Appends rows to a statistics table, recreating it if it was dropped.
    pub fn insert_rows(&self, kind: StatsTableKind, rows: impl IntoIterator<Item = StatsRow>) {
        if let Ok(mut tables) = self.tables.write() {
            tables.entry(kind).or_default().extend(rows);
        }
    }

    /// Removes a statistics table so that it no longer resolves.
    pub fn drop_stats_table(&self, kind: StatsTableKind) {
        if let Ok(mut tables) = self.tables.write() {
            tables.remove(&kind);
        }
    }

    /// Current rows of a statistics table.
    #[must_use]
    pub fn rows(&self, kind: StatsTableKind) -> Vec<StatsRow> {
        self.tables
            .read()
            .ok()
            .and_then(|tables| tables.get(&kind).cloned())
            .unwrap_or_default()
    }

    /// Every delete executed so far, in order.
    #[must_use]
    pub fn executed(&self) -> Vec<DeleteStatement> {
        self.executed
            .read()
            .map(|executed| executed.clone())
            .unwrap_or_default()
    }

    /// Number of pages served.
    #[must_use]
    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched.load(Ordering::Relaxed)
    }

    fn kind_of(qualified_name: &str) -> Result<StatsTableKind> {
        qualified_name
            .strip_prefix(INTERNAL_DB_NAME)
            .and_then(|rest| rest.strip_prefix('.'))
            .and_then(StatsTableKind::from_table_name)
            .ok_or_else(|| Error::NotFound(format!("statistics table {qualified_name}")))
    }
}

#[async_trait]
impl StatsStore for MemoryStatsStore {
    async fn resolve_table(&self, name: &str) -> Result<StatsTableHandle> {
        let kind = StatsTableKind::from_table_name(name)
            .ok_or_else(|| Error::NotFound(format!("{INTERNAL_DB_NAME}.{name}")))?;
        let tables = self.tables.read().map_err(poison_err)?;
        if tables.contains_key(&kind) {
            Ok(StatsTableHandle::new(kind))
        } else {
            Err(Error::NotFound(kind.qualified_name()))
        }
    }

    async fn row_count(&self, table: &StatsTableHandle) -> Result<u64> {
        let tables = self.tables.read().map_err(poison_err)?;
        let rows = tables
            .get(&table.kind())
            .ok_or_else(|| Error::NotFound(table.qualified_name().to_string()))?;
        Ok(u64::try_from(rows.len()).unwrap_or(u64::MAX))
    }

    async fn fetch_page(
        &self,
        table: &StatsTableHandle,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<StatsRow>> {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
        let tables = self.tables.read().map_err(poison_err)?;
        let rows = tables
            .get(&table.kind())
            .ok_or_else(|| Error::NotFound(table.qualified_name().to_string()))?;
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(rows.len());
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(rows.iter().skip(start).take(limit).cloned().collect())
    }

    async fn execute(&self, statement: &DeleteStatement) -> Result<()> {
        let kind = Self::kind_of(&statement.table)?;
        {
            let mut tables = self.tables.write().map_err(poison_err)?;
            let rows = tables
                .get_mut(&kind)
                .ok_or_else(|| Error::NotFound(statement.table.clone()))?;
            let doomed: HashSet<&str> = statement.values.iter().map(String::as_str).collect();
            let position = statement.column.position();
            rows.retain(|row| row.get(position).is_none_or(|v| !doomed.contains(v)));
        }
        self.executed
            .write()
            .map_err(poison_err)?
            .push(statement.clone());
        Ok(())
    }
}

// ============================================================================
// Registry and replication log
// ============================================================================

/// In-memory table-level statistics registry.
#[derive(Debug, Default)]
pub struct InMemoryTableStatsRegistry {
    entries: RwLock<BTreeMap<TableId, TableStatsEntry>>,
}

impl InMemoryTableStatsRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding `entries`.
    #[must_use]
    pub fn with_entries(entries: impl IntoIterator<Item = TableStatsEntry>) -> Self {
        Self {
            entries: RwLock::new(entries.into_iter().map(|e| (e.table_id, e)).collect()),
        }
    }

    /// Tracks a table, replacing an existing entry.
    pub fn track(&self, entry: TableStatsEntry) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(entry.table_id, entry);
        }
    }
}

impl TableStatsRegistry for InMemoryTableStatsRegistry {
    fn list_tracked_table_ids(&self) -> Result<Vec<TableId>> {
        let entries = self.entries.read().map_err(poison_err)?;
        Ok(entries.keys().copied().collect())
    }

    fn get(&self, table_id: TableId) -> Result<Option<TableStatsEntry>> {
        let entries = self.entries.read().map_err(poison_err)?;
        Ok(entries.get(&table_id).cloned())
    }

    fn remove(&self, table_id: TableId) -> Result<()> {
        self.entries.write().map_err(poison_err)?.remove(&table_id);
        Ok(())
    }

    fn restore(&self, entry: TableStatsEntry) -> Result<()> {
        self.entries
            .write()
            .map_err(poison_err)?
            .insert(entry.table_id, entry);
        Ok(())
    }
}

/// In-memory replication log that keeps every appended record.
#[derive(Debug, Default)]
pub struct MemoryReplicationLog {
    records: RwLock<Vec<TableStatsDeletion>>,
}

impl MemoryReplicationLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record appended so far, in order.
    #[must_use]
    pub fn records(&self) -> Vec<TableStatsDeletion> {
        self.records
            .read()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ReplicationLog for MemoryReplicationLog {
    async fn append_deletion_record(&self, record: TableStatsDeletion) -> Result<()> {
        self.records.write().map_err(poison_err)?.push(record);
        Ok(())
    }
}

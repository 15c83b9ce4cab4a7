//! Point-in-time liveness index of the catalog.
//!
//! A [`CatalogSnapshot`] is built once per cycle and answers every "does this still
//! exist?" question of the sweep with a hash lookup. Objects dropped after the
//! snapshot was taken are simply seen by the next cycle; the sweep only ever deletes
//! statistics rows, so staleness never removes anything that is still live.

use std::collections::HashMap;
use std::sync::Arc;

use statsweep_core::{CatalogId, DatabaseId, IndexId, TableId};

use crate::catalog::{CatalogInfo, CatalogService, DatabaseInfo, MaterializedIndexMeta, Table};
use crate::error::{Result, SweepError};
use crate::store::{StatsStore, StatsTableHandle, StatsTableKind};

/// Immutable index of live catalogs, databases, tables and materialized indexes.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    catalogs: HashMap<CatalogId, CatalogInfo>,
    databases: HashMap<DatabaseId, DatabaseInfo>,
    tables: HashMap<TableId, Arc<Table>>,
    mv_indexes: HashMap<IndexId, MaterializedIndexMeta>,
}

impl CatalogSnapshot {
    /// Walks the catalog once and indexes everything the sweep looks up.
    ///
    /// External catalogs are recorded by id only; their databases and tables are
    /// never enumerated.
    ///
    /// # Errors
    ///
    /// Returns [`SweepError::Init`] if the catalog cannot be listed.
    pub fn build(catalog: &dyn CatalogService) -> Result<Self> {
        let catalogs = catalog
            .list_catalogs()
            .map_err(SweepError::init)?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        let mut databases = HashMap::new();
        let mut tables = HashMap::new();
        let mut mv_indexes = HashMap::new();

        for db in catalog.list_internal_databases().map_err(SweepError::init)? {
            for table in catalog.list_tables(db.id).map_err(SweepError::init)? {
                for index in table.materialized_view_indexes() {
                    mv_indexes.insert(index.index_id, index.clone());
                }
                tables.insert(table.id, table);
            }
            databases.insert(db.id, db);
        }

        let snapshot = Self {
            catalogs,
            databases,
            tables,
            mv_indexes,
        };

        tracing::debug!(
            catalogs = snapshot.catalogs.len(),
            databases = snapshot.databases.len(),
            tables = snapshot.tables.len(),
            mv_indexes = snapshot.mv_indexes.len(),
            "built catalog snapshot"
        );

        Ok(snapshot)
    }

    /// Returns true if the catalog exists.
    #[must_use]
    pub fn contains_catalog(&self, id: CatalogId) -> bool {
        self.catalogs.contains_key(&id)
    }

    /// Returns true if the internal database exists.
    #[must_use]
    pub fn contains_database(&self, id: DatabaseId) -> bool {
        self.databases.contains_key(&id)
    }

    /// Looks up a table of the internal catalog.
    #[must_use]
    pub fn table(&self, id: TableId) -> Option<&Table> {
        self.tables.get(&id).map(AsRef::as_ref)
    }

    /// Returns true if the id belongs to a materialized-view backed index.
    #[must_use]
    pub fn contains_mv_index(&self, id: IndexId) -> bool {
        self.mv_indexes.contains_key(&id)
    }

    /// Number of catalogs indexed.
    #[must_use]
    pub fn catalog_count(&self) -> usize {
        self.catalogs.len()
    }

    /// Number of internal databases indexed.
    #[must_use]
    pub fn database_count(&self) -> usize {
        self.databases.len()
    }

    /// Number of internal tables indexed.
    #[must_use]
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }
}

/// The two resolved statistics tables.
#[derive(Debug, Clone)]
pub struct SweepTargets {
    /// `column_statistics`.
    pub column_level: StatsTableHandle,
    /// `partition_statistics`.
    pub partition_level: StatsTableHandle,
}

impl SweepTargets {
    /// Resolves both statistics tables.
    ///
    /// # Errors
    ///
    /// Returns [`SweepError::Init`] if either table cannot be resolved.
    pub async fn resolve(store: &dyn StatsStore) -> Result<Self> {
        let column_level = resolve_one(store, StatsTableKind::ColumnLevel).await?;
        let partition_level = resolve_one(store, StatsTableKind::PartitionLevel).await?;
        Ok(Self {
            column_level,
            partition_level,
        })
    }

    /// Both handles in sweep order.
    #[must_use]
    pub fn in_order(&self) -> [&StatsTableHandle; 2] {
        [&self.column_level, &self.partition_level]
    }
}

async fn resolve_one(store: &dyn StatsStore, kind: StatsTableKind) -> Result<StatsTableHandle> {
    let handle = store
        .resolve_table(kind.table_name())
        .await
        .map_err(|e| SweepError::Init {
            message: format!("failed to resolve {}: {e}", kind.qualified_name()),
        })?;
    if handle.kind() != kind {
        return Err(SweepError::Init {
            message: format!(
                "store resolved {} to {}",
                kind.table_name(),
                handle.qualified_name()
            ),
        });
    }
    Ok(handle)
}

/// Everything one cycle reads from: both target tables and the catalog snapshot.
///
/// Dropping the context releases the snapshot.
#[derive(Debug)]
pub struct SweepContext {
    /// Resolved statistics tables.
    pub targets: SweepTargets,
    /// Liveness index.
    pub snapshot: CatalogSnapshot,
}

impl SweepContext {
    /// Resolves the statistics tables, then snapshots the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`SweepError::Init`] if a table cannot be resolved or the catalog
    /// cannot be listed; nothing has been deleted at that point.
    pub async fn init(catalog: &dyn CatalogService, store: &dyn StatsStore) -> Result<Self> {
        let targets = SweepTargets::resolve(store).await?;
        let snapshot = CatalogSnapshot::build(catalog)?;
        Ok(Self { targets, snapshot })
    }
}

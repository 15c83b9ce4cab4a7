//! Read-only view of the live catalog tree.
//!
//! The sweep never mutates catalog state. It only needs to enumerate what exists
//! right now, so the catalog is consumed through the narrow [`CatalogService`]
//! trait. Catalog reads are in-memory on the leader and therefore synchronous.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use statsweep_core::{CatalogId, DatabaseId, IndexId, Result, TableId};

/// Name of the catalog managed directly by this system.
pub const INTERNAL_CATALOG_NAME: &str = "internal";

/// Column name prefix used by synthetic materialized-view columns.
pub const MV_COLUMN_PREFIX: &str = "mv_";

/// Column name prefix used by synthetic materialized-view aggregate columns.
pub const MV_AGGREGATE_COLUMN_PREFIX: &str = "mva_";

/// Whether a catalog is managed here or merely federated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogKind {
    /// The internal catalog.
    Internal,
    /// A federated catalog (Hive, Iceberg, JDBC, ...).
    External,
}

/// A catalog known to the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogInfo {
    /// Catalog id.
    pub id: CatalogId,
    /// Catalog name.
    pub name: String,
    /// Internal or federated.
    pub kind: CatalogKind,
}

impl CatalogInfo {
    /// The internal catalog.
    #[must_use]
    pub fn internal() -> Self {
        Self {
            id: CatalogId::INTERNAL,
            name: INTERNAL_CATALOG_NAME.to_string(),
            kind: CatalogKind::Internal,
        }
    }

    /// A federated catalog with the given id and name.
    #[must_use]
    pub fn external(id: CatalogId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: CatalogKind::External,
        }
    }
}

/// A database of the internal catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    /// Database id.
    pub id: DatabaseId,
    /// Database name.
    pub name: String,
}

impl DatabaseInfo {
    /// Creates database metadata.
    #[must_use]
    pub fn new(id: DatabaseId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// The closed set of table kinds the catalog can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    /// Native columnar table with partitions and materialized indexes.
    Olap,
    /// Asynchronously refreshed materialized view, stored like an OLAP table.
    MaterializedView,
    /// Logical view.
    View,
    /// Table backed by an external system.
    External,
    /// System schema table.
    Schema,
}

impl TableKind {
    /// Returns true if tables of this kind have partitioned storage, and therefore
    /// partition-level statistics.
    #[must_use]
    pub const fn supports_partition_stats(self) -> bool {
        matches!(self, Self::Olap | Self::MaterializedView)
    }
}

/// A table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name; statistics rows reference columns by name.
    pub name: String,
}

impl Column {
    /// Creates a column.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Metadata of an index on a table (base index, rollup or materialized view).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializedIndexMeta {
    /// Index id.
    pub index_id: IndexId,
    /// Index name.
    pub name: String,
    /// Defining statement; present only for materialized-view backed indexes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub define_stmt: Option<String>,
}

impl MaterializedIndexMeta {
    /// Returns true if this index is backed by a materialized view definition.
    #[must_use]
    pub const fn is_materialized_view(&self) -> bool {
        self.define_stmt.is_some()
    }
}

/// A table and the parts of its schema the sweep inspects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Table id.
    pub id: TableId,
    /// Table name.
    pub name: String,
    /// Table kind.
    pub kind: TableKind,
    /// Base schema columns.
    #[serde(default)]
    pub columns: Vec<Column>,
    /// Indexes on the table.
    #[serde(default)]
    pub indexes: Vec<MaterializedIndexMeta>,
}

impl Table {
    /// Creates a table with the given columns and no indexes.
    #[must_use]
    pub fn new(id: TableId, name: impl Into<String>, kind: TableKind, columns: &[&str]) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            columns: columns.iter().map(|c| Column::new(*c)).collect(),
            indexes: Vec::new(),
        }
    }

    /// Adds an index to the table.
    #[must_use]
    pub fn with_index(mut self, index: MaterializedIndexMeta) -> Self {
        self.indexes.push(index);
        self
    }

    /// Looks up a column by name (case-insensitive, like the SQL layer).
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Returns true if `name` is a synthetic materialized-view column.
    ///
    /// `mv_` columns are only recognized on tables with materialized indexes;
    /// aggregate `mva_` columns are recognized on every table kind.
    #[must_use]
    pub fn is_materialized_view_column(&self, name: &str) -> bool {
        name.starts_with(MV_AGGREGATE_COLUMN_PREFIX)
            || (self.kind.supports_partition_stats() && name.starts_with(MV_COLUMN_PREFIX))
    }

    /// Indexes that carry a defining statement.
    pub fn materialized_view_indexes(&self) -> impl Iterator<Item = &MaterializedIndexMeta> {
        self.indexes.iter().filter(|idx| idx.is_materialized_view())
    }
}

/// Catalog collaborator consumed by the sweep.
///
/// Implementations must be cheap to call: every method is served from the
/// leader's in-memory catalog.
pub trait CatalogService: Send + Sync {
    /// Lists every catalog, internal and external.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog manager is not ready.
    fn list_catalogs(&self) -> Result<Vec<CatalogInfo>>;

    /// Lists the databases of the internal catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the internal catalog is not ready.
    fn list_internal_databases(&self) -> Result<Vec<DatabaseInfo>>;

    /// Lists the tables of an internal database.
    ///
    /// A database dropped since it was listed yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read.
    fn list_tables(&self, db: DatabaseId) -> Result<Vec<Arc<Table>>>;

    /// Resolves a table by its exact `catalog.db.table` path.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup itself fails; an unknown path is `Ok(None)`.
    fn resolve_table_by_name(
        &self,
        catalog: &str,
        db: &str,
        table: &str,
    ) -> Result<Option<Arc<Table>>>;

    /// Finds a table by id inside one internal database.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read.
    fn find_table(&self, db: DatabaseId, table: TableId) -> Result<Option<Arc<Table>>> {
        Ok(self.list_tables(db)?.into_iter().find(|t| t.id == table))
    }
}

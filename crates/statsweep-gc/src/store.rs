//! Statistics store contract.
//!
//! The statistics live in two tables of the internal database:
//!
//! ```text
//! __internal_schema.column_statistics     # table-level column stats (one row per column/partition)
//! __internal_schema.partition_statistics  # partition-level column stats
//! ```
//!
//! The sweep reads them page by page and removes rows with `DELETE ... WHERE col IN (...)`
//! predicates. Execution of reads and writes belongs to the store; this module only
//! defines the shapes exchanged with it.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use statsweep_core::{Error, Result};

/// Database holding the statistics tables.
pub const INTERNAL_DB_NAME: &str = "__internal_schema";

/// Which of the two statistics tables a handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsTableKind {
    /// `column_statistics`: table-level column stats.
    ColumnLevel,
    /// `partition_statistics`: partition-level column stats.
    PartitionLevel,
}

impl StatsTableKind {
    /// Both tables, in sweep order.
    pub const ALL: [Self; 2] = [Self::ColumnLevel, Self::PartitionLevel];

    /// Unqualified table name.
    #[must_use]
    pub const fn table_name(self) -> &'static str {
        match self {
            Self::ColumnLevel => "column_statistics",
            Self::PartitionLevel => "partition_statistics",
        }
    }

    /// Fully qualified table name.
    #[must_use]
    pub fn qualified_name(self) -> String {
        format!("{INTERNAL_DB_NAME}.{}", self.table_name())
    }

    /// Maps an unqualified table name back to its kind.
    #[must_use]
    pub fn from_table_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.table_name() == name)
    }

    /// Returns true if the table has its own `id` and `part_id` columns.
    ///
    /// The partition-level table has neither, so those predicates never apply to it.
    #[must_use]
    pub const fn supports_row_level_keys(self) -> bool {
        matches!(self, Self::ColumnLevel)
    }
}

impl fmt::Display for StatsTableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// A resolved statistics table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsTableHandle {
    kind: StatsTableKind,
    qualified_name: String,
}

impl StatsTableHandle {
    /// Creates a handle for a resolved table.
    #[must_use]
    pub fn new(kind: StatsTableKind) -> Self {
        Self {
            kind,
            qualified_name: kind.qualified_name(),
        }
    }

    /// Table kind.
    #[must_use]
    pub const fn kind(&self) -> StatsTableKind {
        self.kind
    }

    /// Fully qualified table name.
    #[must_use]
    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }
}

/// Key columns that bulk deletes are predicated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyColumn {
    /// `catalog_id`
    CatalogId,
    /// `db_id`
    DbId,
    /// `tbl_id`
    TblId,
    /// `idx_id`
    IdxId,
    /// `part_id`
    PartId,
    /// `id`
    Id,
}

impl KeyColumn {
    /// Every key column, in delete order.
    pub const ALL: [Self; 6] = [
        Self::CatalogId,
        Self::DbId,
        Self::TblId,
        Self::IdxId,
        Self::PartId,
        Self::Id,
    ];

    /// Column name in the statistics tables.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CatalogId => "catalog_id",
            Self::DbId => "db_id",
            Self::TblId => "tbl_id",
            Self::IdxId => "idx_id",
            Self::PartId => "part_id",
            Self::Id => "id",
        }
    }

    /// Position of this column in a fetched [`StatsRow`].
    #[must_use]
    pub const fn position(self) -> usize {
        match self {
            Self::Id => StatsRow::ID,
            Self::CatalogId => StatsRow::CATALOG_ID,
            Self::DbId => StatsRow::DB_ID,
            Self::TblId => StatsRow::TBL_ID,
            Self::IdxId => StatsRow::IDX_ID,
            Self::PartId => StatsRow::PART_ID,
        }
    }

    /// Returns true if deletes on this column apply to the given table.
    #[must_use]
    pub const fn applies_to(self, kind: StatsTableKind) -> bool {
        match self {
            Self::PartId | Self::Id => kind.supports_row_level_keys(),
            Self::CatalogId | Self::DbId | Self::TblId | Self::IdxId => true,
        }
    }
}

impl fmt::Display for KeyColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One fetched statistics row, projected to its key columns.
///
/// Layout: `id, catalog_id, db_id, tbl_id, idx_id, col_id, part_id`. Values are
/// strings exactly as the store returns them; `None` is SQL `NULL`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatsRow {
    values: Vec<Option<String>>,
}

impl StatsRow {
    /// Position of the `id` column.
    pub const ID: usize = 0;
    /// Position of the `catalog_id` column.
    pub const CATALOG_ID: usize = 1;
    /// Position of the `db_id` column.
    pub const DB_ID: usize = 2;
    /// Position of the `tbl_id` column.
    pub const TBL_ID: usize = 3;
    /// Position of the `idx_id` column.
    pub const IDX_ID: usize = 4;
    /// Position of the `col_id` column.
    pub const COL_ID: usize = 5;
    /// Position of the `part_id` column.
    pub const PART_ID: usize = 6;
    /// Number of projected columns.
    pub const WIDTH: usize = 7;

    /// Wraps raw column values.
    #[must_use]
    pub fn new(values: Vec<Option<String>>) -> Self {
        Self { values }
    }

    /// Builds a row from its key parts.
    #[must_use]
    pub fn from_parts(
        id: &str,
        catalog_id: i64,
        db_id: i64,
        tbl_id: i64,
        idx_id: i64,
        col_id: &str,
        part_id: Option<&str>,
    ) -> Self {
        Self::new(vec![
            Some(id.to_string()),
            Some(catalog_id.to_string()),
            Some(db_id.to_string()),
            Some(tbl_id.to_string()),
            Some(idx_id.to_string()),
            Some(col_id.to_string()),
            part_id.map(str::to_string),
        ])
    }

    /// Returns the value at `position`, or `None` for `NULL` and missing columns.
    #[must_use]
    pub fn get(&self, position: usize) -> Option<&str> {
        self.values.get(position).and_then(|v| v.as_deref())
    }

    /// Number of values in the row.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the row carries no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A bulk delete against one statistics table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteStatement {
    /// Fully qualified target table.
    pub table: String,
    /// Predicate column.
    pub column: KeyColumn,
    /// Values matched by `column IN (...)`.
    pub values: Vec<String>,
}

impl DeleteStatement {
    /// Creates a delete for `values` on `column` of `table`.
    ///
    /// # Errors
    ///
    /// Returns an error if `values` is empty; an empty `IN ()` list is not valid SQL.
    pub fn new(table: &StatsTableHandle, column: KeyColumn, values: Vec<String>) -> Result<Self> {
        if values.is_empty() {
            return Err(Error::InvalidInput(format!(
                "delete on {}.{column} has no values",
                table.qualified_name()
            )));
        }
        Ok(Self {
            table: table.qualified_name().to_string(),
            column,
            values,
        })
    }

    /// Renders the statement as SQL.
    #[must_use]
    pub fn to_sql(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DeleteStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DELETE FROM {} WHERE {} IN (", self.table, self.column)?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "'{}'", value.replace('\'', "''"))?;
        }
        f.write_str(")")
    }
}

/// Persisted statistics store consumed by the sweep.
#[async_trait]
pub trait StatsStore: Send + Sync {
    /// Resolves a statistics table of the internal database by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist or the internal catalog is not
    /// ready yet.
    async fn resolve_table(&self, name: &str) -> Result<StatsTableHandle>;

    /// Current row count of the table.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    async fn row_count(&self, table: &StatsTableHandle) -> Result<u64>;

    /// Fetches up to `limit` rows starting at `offset`, projected to key columns.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    async fn fetch_page(
        &self,
        table: &StatsTableHandle,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<StatsRow>>;

    /// Executes a bulk delete. Deleting absent keys is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the statement.
    async fn execute(&self, statement: &DeleteStatement) -> Result<()>;
}

//! Parsed statistics row keys and the quota-bounded expired-key set.

use std::collections::BTreeSet;

use statsweep_core::{CatalogId, DatabaseId, IndexId, TableId};

use crate::error::{Result, SweepError};
use crate::policy::SweepPolicy;
use crate::store::{KeyColumn, StatsRow};

/// Key of one statistics row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsRowKey {
    /// Row id (`id` column, synthesized for the partition-level table).
    pub record_id: String,
    /// Catalog the stats belong to.
    pub catalog_id: CatalogId,
    /// Database the stats belong to.
    pub db_id: DatabaseId,
    /// Table the stats belong to.
    pub table_id: TableId,
    /// Materialized index, or [`IndexId::NONE`].
    pub index_id: IndexId,
    /// Column name.
    pub column_id: String,
    /// Partition id, `None` when the row is not partition-scoped.
    pub partition_id: Option<String>,
}

impl StatsRowKey {
    /// Parses the key columns of a fetched row.
    ///
    /// # Errors
    ///
    /// Returns [`SweepError::RowParse`] if a required column is `NULL` or an id
    /// column is not numeric.
    pub fn parse(row: &StatsRow) -> Result<Self> {
        Ok(Self {
            record_id: required(row, StatsRow::ID, "id")?.to_string(),
            catalog_id: required(row, StatsRow::CATALOG_ID, "catalog_id")?.parse()?,
            db_id: required(row, StatsRow::DB_ID, "db_id")?.parse()?,
            table_id: required(row, StatsRow::TBL_ID, "tbl_id")?.parse()?,
            index_id: required(row, StatsRow::IDX_ID, "idx_id")?.parse()?,
            column_id: required(row, StatsRow::COL_ID, "col_id")?.to_string(),
            partition_id: row.get(StatsRow::PART_ID).map(str::to_string),
        })
    }
}

fn required<'a>(row: &'a StatsRow, position: usize, column: &str) -> Result<&'a str> {
    row.get(position).ok_or_else(|| SweepError::RowParse {
        message: format!("column {column} is NULL"),
    })
}

/// The metadata level at which a row was found to be stale.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expiry {
    /// The row's catalog was dropped.
    Catalog(CatalogId),
    /// The row's database was dropped.
    Database(DatabaseId),
    /// The row's table was dropped.
    Table(TableId),
    /// The row's materialized index was dropped.
    Index(IndexId),
    /// The row's column was dropped; carries the row id.
    Column(String),
    /// The row's partition is stale; carries the partition id.
    Partition(String),
}

impl Expiry {
    /// Key column a delete for this expiry is predicated on.
    #[must_use]
    pub const fn key_column(&self) -> KeyColumn {
        match self {
            Self::Catalog(_) => KeyColumn::CatalogId,
            Self::Database(_) => KeyColumn::DbId,
            Self::Table(_) => KeyColumn::TblId,
            Self::Index(_) => KeyColumn::IdxId,
            Self::Column(_) => KeyColumn::Id,
            Self::Partition(_) => KeyColumn::PartId,
        }
    }

    /// Short label for logs and metrics.
    #[must_use]
    pub const fn level(&self) -> &'static str {
        match self {
            Self::Catalog(_) => "catalog",
            Self::Database(_) => "database",
            Self::Table(_) => "table",
            Self::Index(_) => "index",
            Self::Column(_) => "column",
            Self::Partition(_) => "partition",
        }
    }
}

/// Expired keys accumulated during one sweep round.
///
/// Each category holds at most `quota` values; callers check [`is_full`] before
/// adding and flush when it reports true.
///
/// [`is_full`]: ExpiredKeySet::is_full
#[derive(Debug, Clone, Default)]
pub struct ExpiredKeySet {
    quota: usize,
    empty_id_threshold: usize,
    catalogs: BTreeSet<CatalogId>,
    databases: BTreeSet<DatabaseId>,
    tables: BTreeSet<TableId>,
    indexes: BTreeSet<IndexId>,
    partitions: BTreeSet<String>,
    record_ids: BTreeSet<String>,
}

impl ExpiredKeySet {
    /// Creates an empty set where each category holds at most `quota` values and
    /// fewer than `empty_id_threshold` raw ids still count as empty.
    #[must_use]
    pub fn new(quota: usize, empty_id_threshold: usize) -> Self {
        Self {
            quota,
            empty_id_threshold,
            ..Self::default()
        }
    }

    /// Creates an empty set bounded by the policy's delete quota.
    #[must_use]
    pub fn for_policy(policy: &SweepPolicy) -> Self {
        Self::new(policy.max_in_elements, policy.empty_id_threshold())
    }

    /// Adds an expired key. Returns true if the key was not already present.
    pub fn insert(&mut self, expiry: Expiry) -> bool {
        match expiry {
            Expiry::Catalog(id) => self.catalogs.insert(id),
            Expiry::Database(id) => self.databases.insert(id),
            Expiry::Table(id) => self.tables.insert(id),
            Expiry::Index(id) => self.indexes.insert(id),
            Expiry::Column(record_id) => self.record_ids.insert(record_id),
            Expiry::Partition(part_id) => self.partitions.insert(part_id),
        }
    }

    /// Number of values held for one key column.
    #[must_use]
    pub fn len_of(&self, column: KeyColumn) -> usize {
        match column {
            KeyColumn::CatalogId => self.catalogs.len(),
            KeyColumn::DbId => self.databases.len(),
            KeyColumn::TblId => self.tables.len(),
            KeyColumn::IdxId => self.indexes.len(),
            KeyColumn::PartId => self.partitions.len(),
            KeyColumn::Id => self.record_ids.len(),
        }
    }

    /// Values for one key column, rendered as the store persists them, in ascending order.
    #[must_use]
    pub fn values(&self, column: KeyColumn) -> Vec<String> {
        fn render<T: ToString>(set: &BTreeSet<T>) -> Vec<String> {
            set.iter().map(ToString::to_string).collect()
        }
        match column {
            KeyColumn::CatalogId => render(&self.catalogs),
            KeyColumn::DbId => render(&self.databases),
            KeyColumn::TblId => render(&self.tables),
            KeyColumn::IdxId => render(&self.indexes),
            KeyColumn::PartId => self.partitions.iter().cloned().collect(),
            KeyColumn::Id => self.record_ids.iter().cloned().collect(),
        }
    }

    /// Total number of values across all categories.
    #[must_use]
    pub fn total(&self) -> usize {
        KeyColumn::ALL.iter().map(|c| self.len_of(*c)).sum()
    }

    /// Returns true once any category has reached the quota.
    #[must_use]
    pub fn is_full(&self) -> bool {
        KeyColumn::ALL.iter().any(|c| self.len_of(*c) >= self.quota)
    }

    /// Returns true if nothing worth another sweep round was collected.
    ///
    /// Every category except the raw ids must be empty; raw ids only need to stay
    /// below the empty-id threshold.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.catalogs.is_empty()
            && self.databases.is_empty()
            && self.tables.is_empty()
            && self.indexes.is_empty()
            && self.partitions.is_empty()
            && self.record_ids.len() < self.empty_id_threshold
    }

    /// Returns true if no category holds any value.
    #[must_use]
    pub fn has_no_keys(&self) -> bool {
        self.total() == 0
    }
}

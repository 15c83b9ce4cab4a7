//! Strongly-typed identifiers for catalog objects.
//!
//! Catalog objects are addressed by signed 64-bit ids assigned by the catalog. The
//! statistics tables persist those ids as strings, so every id type parses from and
//! formats to its decimal form.
//!
//! # Example
//!
//! ```rust
//! use statsweep_core::id::{CatalogId, TableId};
//!
//! let table: TableId = "10042".parse().unwrap();
//! assert_eq!(table.get(), 10042);
//! assert!(CatalogId::INTERNAL.is_internal());
//!
//! // IDs are different types - this won't compile:
//! // let wrong: CatalogId = table;
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

macro_rules! catalog_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw catalog-assigned id.
            #[must_use]
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// Returns the raw id.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                s.trim()
                    .parse::<i64>()
                    .map(Self)
                    .map_err(|e| Error::InvalidId {
                        message: format!(concat!("invalid ", $label, " '{}': {}"), s, e),
                    })
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }
    };
}

catalog_id!(
    /// Identifier of a catalog (the internal catalog or a federated one).
    CatalogId,
    "catalog id"
);

catalog_id!(
    /// Identifier of a database inside the internal catalog.
    DatabaseId,
    "database id"
);

catalog_id!(
    /// Identifier of a table.
    TableId,
    "table id"
);

catalog_id!(
    /// Identifier of a materialized index (rollup or materialized view) on a table.
    IndexId,
    "index id"
);

impl CatalogId {
    /// The catalog managed directly by this system.
    pub const INTERNAL: Self = Self(0);

    /// Returns true for the internal catalog.
    #[must_use]
    pub const fn is_internal(self) -> bool {
        self.0 == Self::INTERNAL.0
    }
}

impl IndexId {
    /// Sentinel persisted in statistics rows that are not tied to an index.
    pub const NONE: Self = Self(-1);

    /// Returns true unless this is the [`IndexId::NONE`] sentinel.
    #[must_use]
    pub const fn is_some(self) -> bool {
        self.0 != Self::NONE.0
    }
}

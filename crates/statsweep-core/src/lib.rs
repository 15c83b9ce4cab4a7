//! # statsweep-core
//!
//! Core primitives shared by the statsweep components.
//!
//! This crate provides:
//!
//! - **Identifiers**: Strongly-typed catalog, database, table and index ids
//! - **Error Types**: Shared error definitions and result types
//! - **Observability**: Logging initialization and span helpers
//!
//! ## Example
//!
//! ```rust
//! use statsweep_core::prelude::*;
//!
//! let db: DatabaseId = "10001".parse()?;
//! assert_eq!(db.get(), 10001);
//! # Ok::<(), statsweep_core::Error>(())
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod id;
pub mod observability;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::id::{CatalogId, DatabaseId, IndexId, TableId};
    pub use crate::observability::{LogFormat, init_logging};
}

pub use error::{Error, Result};
pub use id::{CatalogId, DatabaseId, IndexId, TableId};
pub use observability::{LogFormat, init_logging};

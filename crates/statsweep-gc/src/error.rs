//! Error types for statistics garbage collection.

use thiserror::Error;

/// Result type alias for sweep operations.
pub type Result<T> = std::result::Result<T, SweepError>;

/// Errors that can occur during a sweep cycle.
///
/// Only [`SweepError::Init`] ends a cycle early. Every other variant is logged at
/// the point it happens and the sweep moves on.
#[derive(Debug, Error)]
pub enum SweepError {
    /// The statistics tables or the catalog could not be resolved.
    #[error("sweep initialization failed: {message}")]
    Init {
        /// Description of the initialization failure.
        message: String,
    },

    /// A statistics store read failed.
    #[error("statistics store error: {message}")]
    Store {
        /// Description of the store failure.
        message: String,
    },

    /// A catalog lookup failed.
    #[error("catalog error: {message}")]
    Catalog {
        /// Description of the catalog failure.
        message: String,
    },

    /// The replicated edit log rejected a record.
    #[error("replication error: {message}")]
    Replication {
        /// Description of the replication failure.
        message: String,
    },

    /// A fetched statistics row could not be parsed.
    #[error("malformed statistics row: {message}")]
    RowParse {
        /// Description of what was wrong with the row.
        message: String,
    },

    /// The sweep policy is not usable.
    #[error("invalid sweep policy: {message}")]
    Config {
        /// Description of the invalid setting.
        message: String,
    },
}

impl SweepError {
    /// Wraps any error as an initialization failure.
    #[must_use]
    pub fn init(cause: impl std::fmt::Display) -> Self {
        Self::Init {
            message: cause.to_string(),
        }
    }
}

impl From<statsweep_core::Error> for SweepError {
    fn from(err: statsweep_core::Error) -> Self {
        use statsweep_core::Error as CoreError;

        let message = err.to_string();
        match err {
            CoreError::Catalog { .. } => Self::Catalog { message },
            CoreError::Replication { .. } => Self::Replication { message },
            CoreError::InvalidId { .. } | CoreError::InvalidInput(_) => Self::RowParse { message },
            CoreError::Storage { .. }
            | CoreError::Serialization { .. }
            | CoreError::ResourceNotFound { .. }
            | CoreError::NotFound(_)
            | CoreError::Internal { .. } => Self::Store { message },
        }
    }
}

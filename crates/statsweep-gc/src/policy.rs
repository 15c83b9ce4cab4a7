//! Sweep policy configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning knobs for the statistics sweep.
///
/// # Design Principles
///
/// - **Bounded batches**: Rows are read `fetch_limit` at a time and expired keys are
///   flushed as soon as one category reaches `max_in_elements`
/// - **Cooperative throttle**: The sweep sleeps `fetch_interval_ms` between pages so
///   foreground queries keep their share of the store
/// - **Infrequent cycles**: Expired statistics are harmless until collected, so the
///   cycle interval is long
///
/// # Example
///
/// ```rust
/// use statsweep_gc::SweepPolicy;
///
/// let policy = SweepPolicy {
///     fetch_limit: 5_000,
///     ..SweepPolicy::default()
/// };
/// assert!(policy.validate().is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct SweepPolicy {
    /// Seconds between sweep cycles (e.g., 172800 = 48 hours).
    pub interval_secs: u64,

    /// Rows fetched per page.
    pub fetch_limit: u64,

    /// Pause after each fetched page, in milliseconds.
    pub fetch_interval_ms: u64,

    /// Maximum number of values in one `IN (...)` delete predicate.
    ///
    /// Also the quota of every expired-key category.
    pub max_in_elements: usize,

    /// Classify and report without deleting anything.
    pub dry_run: bool,
}

impl Default for SweepPolicy {
    fn default() -> Self {
        Self {
            interval_secs: 48 * 60 * 60,
            fetch_limit: 10_000,
            fetch_interval_ms: 500,
            max_in_elements: 10_000,
            dry_run: false,
        }
    }
}

impl SweepPolicy {
    /// Smallest usable quota: below it the raw-id "empty" threshold rounds to zero
    /// and a sweep can never terminate.
    pub const MIN_IN_ELEMENTS: usize = 10;

    /// Creates a policy suitable for development/testing.
    ///
    /// - 1 minute interval
    /// - 100 row pages
    /// - no pause between pages
    /// - 100 values per delete
    #[must_use]
    pub const fn development() -> Self {
        Self {
            interval_secs: 60,
            fetch_limit: 100,
            fetch_interval_ms: 0,
            max_in_elements: 100,
            dry_run: false,
        }
    }

    /// Creates an aggressive policy for clusters with heavy DDL churn.
    ///
    /// - 6 hour interval
    /// - 20k row pages
    /// - 100 ms pause between pages
    #[must_use]
    pub const fn aggressive() -> Self {
        Self {
            interval_secs: 6 * 60 * 60,
            fetch_limit: 20_000,
            fetch_interval_ms: 100,
            max_in_elements: 10_000,
            dry_run: false,
        }
    }

    /// Interval between cycles.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Pause after each fetched page.
    #[must_use]
    pub const fn fetch_interval(&self) -> Duration {
        Duration::from_millis(self.fetch_interval_ms)
    }

    /// Raw-id count below which an accumulation still counts as "empty".
    #[must_use]
    pub const fn empty_id_threshold(&self) -> usize {
        self.max_in_elements / 10
    }

    /// Validates the policy settings are usable.
    ///
    /// Returns an error message if validation fails.
    #[must_use]
    pub fn validate(&self) -> Option<String> {
        if self.interval_secs == 0 {
            return Some("interval_secs must be at least 1".to_string());
        }
        if self.fetch_limit == 0 {
            return Some("fetch_limit must be at least 1".to_string());
        }
        if self.max_in_elements < Self::MIN_IN_ELEMENTS {
            return Some(format!(
                "max_in_elements ({}) must be at least {}",
                self.max_in_elements,
                Self::MIN_IN_ELEMENTS
            ));
        }
        None
    }
}

//! Leader gating for the sweep scheduler.
//!
//! Only the catalog leader may delete statistics or append to the edit log. The
//! scheduler is handed a [`LeaderGate`] and queries it at the start of every cycle;
//! there is no ambient global flag.

use std::sync::atomic::{AtomicBool, Ordering};

/// Answers "is this node the catalog leader right now?".
pub trait LeaderGate: Send + Sync {
    /// Returns true if this node currently leads the catalog.
    fn is_leader(&self) -> bool;
}

/// A gate whose answer is set explicitly.
///
/// Used by single-node deployments and tests; a clustered deployment wires the
/// gate to its consensus layer instead.
///
/// ## Example
///
/// ```rust
/// use statsweep_gc::leader::{LeaderGate, StaticLeaderGate};
///
/// let gate = StaticLeaderGate::new(true);
/// assert!(gate.is_leader());
/// gate.set_leader(false);
/// assert!(!gate.is_leader());
/// ```
#[derive(Debug)]
pub struct StaticLeaderGate {
    leader: AtomicBool,
}

impl StaticLeaderGate {
    /// Creates a gate with the given initial answer.
    #[must_use]
    pub const fn new(leader: bool) -> Self {
        Self {
            leader: AtomicBool::new(leader),
        }
    }

    /// Updates the answer, e.g. on a leadership change notification.
    pub fn set_leader(&self, leader: bool) {
        let previous = self.leader.swap(leader, Ordering::AcqRel);
        if previous != leader {
            tracing::info!(leader, "leadership changed");
        }
    }
}

impl Default for StaticLeaderGate {
    fn default() -> Self {
        Self::new(true)
    }
}

impl LeaderGate for StaticLeaderGate {
    fn is_leader(&self) -> bool {
        self.leader.load(Ordering::Acquire)
    }
}

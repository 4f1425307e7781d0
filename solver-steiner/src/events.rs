//! Structured events emitted by the LP session.
//!
//! The session reports state changes after they complete. Install a
//! [`PoolObserver`] to record or forward them; the default observer writes
//! each event to the `log` facade at debug level.

use std::fmt;

/// A completed state change in the pool or the LP.
#[derive(Debug, Clone, PartialEq)]
pub enum PoolEvent<'a> {
    /// A new row was stored.
    RowAdded {
        /// Uid of the new row.
        uid: u64,
        /// Coefficient count.
        len: usize,
        /// Row was queued for the LP.
        pending: bool,
    },

    /// Garbage collection evicted rows.
    RowsEvicted {
        /// Rows removed.
        count: usize,
        /// Coefficients reclaimed.
        nonzeros: usize,
    },

    /// An integral selection contained a cycle.
    CycleFound {
        /// Vertices of the offending connected piece.
        vertices: &'a [usize],
    },

    /// A suspended node's rows and basis were reinstated.
    BasisRestored {
        /// Node id.
        node: u64,
        /// Rows reloaded.
        rows: usize,
    },

    /// Pending rows were appended to the LP.
    RowsLoaded {
        /// Rows appended.
        count: usize,
        /// Coefficients appended.
        nonzeros: usize,
    },

    /// Slack rows were removed from the LP.
    SlackRowsDeleted {
        /// Rows removed.
        count: usize,
    },

    /// The LP was rebuilt from the pool.
    LpReloaded {
        /// Row capacity of the new LP.
        row_capacity: usize,
        /// Nonzero capacity of the new LP.
        nz_capacity: usize,
    },

    /// Objective scaling was turned off to recover from an unscaling failure.
    ScalingDisabled,
}

impl fmt::Display for PoolEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolEvent::RowAdded { uid, len, pending } => write!(
                f,
                "row {} added ({} coefficients{})",
                uid,
                len,
                if *pending { ", pending" } else { "" }
            ),
            PoolEvent::RowsEvicted { count, nonzeros } => {
                write!(f, "{} rows evicted ({} nonzeros)", count, nonzeros)
            }
            PoolEvent::CycleFound { vertices } => {
                write!(f, "cycle through {} vertices: {:?}", vertices.len(), vertices)
            }
            PoolEvent::BasisRestored { node, rows } => {
                write!(f, "node {} basis restored with {} rows", node, rows)
            }
            PoolEvent::RowsLoaded { count, nonzeros } => {
                write!(f, "{} rows loaded ({} nonzeros)", count, nonzeros)
            }
            PoolEvent::SlackRowsDeleted { count } => write!(f, "{} slack rows deleted", count),
            PoolEvent::LpReloaded {
                row_capacity,
                nz_capacity,
            } => write!(
                f,
                "LP reloaded (capacity {} rows, {} nonzeros)",
                row_capacity, nz_capacity
            ),
            PoolEvent::ScalingDisabled => write!(f, "objective scaling disabled"),
        }
    }
}

/// Receiver of [`PoolEvent`]s.
pub trait PoolObserver {
    /// Called once per completed state change.
    fn on_event(&mut self, event: &PoolEvent<'_>);
}

/// Forwards events to `log::debug!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl PoolObserver for LogObserver {
    fn on_event(&mut self, event: &PoolEvent<'_>) {
        log::debug!("{}", event);
    }
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl PoolObserver for NullObserver {
    fn on_event(&mut self, _event: &PoolEvent<'_>) {}
}

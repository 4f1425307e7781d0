//! Error types for the constraint pool and its LP synchronization.
//!
//! Every variant here is an invariant violation or an engine failure.
//! Normal solver outcomes (infeasible, cut off) are reported through
//! [`LpOutcome`](crate::session::LpOutcome) instead.

use thiserror::Error;

use crate::master::LpError;

/// Errors raised by pool, synchronizer and checkpoint operations.
#[derive(Error, Debug)]
pub enum PoolError {
    /// Row could not be normalized (zero coefficient, empty row, overflow).
    #[error("Malformed row: {0}")]
    MalformedRow(String),

    /// Row slot does not exist.
    #[error("Row slot {slot} out of range (pool has {nrows} rows)")]
    RowOutOfRange { slot: usize, nrows: usize },

    /// Variable index does not exist.
    #[error("Variable {var} out of range ({nvars} variables)")]
    VarOutOfRange { var: usize, nvars: usize },

    /// A per-column vector has the wrong length.
    #[error("{what} has length {len}, expected {expected}")]
    DimensionMismatch {
        what: &'static str,
        len: usize,
        expected: usize,
    },

    /// Arena offsets no longer fit in a row handle.
    #[error("Coefficient arena exhausted: {0}")]
    ArenaExhausted(String),

    /// The LP engine and the pool disagree on the loaded row count.
    #[error("{op}: LP has {lp_rows} rows but pool records {pool_rows}")]
    OutOfSync {
        op: &'static str,
        lp_rows: usize,
        pool_rows: usize,
    },

    /// A row was found in a state the operation does not allow.
    #[error("{op}: row uid {uid} in unexpected state {state}")]
    InvalidRowState {
        op: &'static str,
        uid: u64,
        state: String,
    },

    /// A snapshot refers to a row that is no longer in the pool.
    #[error("Basis snapshot refers to missing row uid {0}")]
    MissingRow(u64),

    /// Snapshot row positions are inconsistent.
    #[error("Basis snapshot mismatch: {0}")]
    BasisMismatch(String),

    /// Node already holds a basis snapshot.
    #[error("Node {0} already holds a saved basis")]
    SnapshotExists(u64),

    /// Node has no basis snapshot to restore.
    #[error("Node {0} has no saved basis")]
    SnapshotMissing(u64),

    /// Garbage collection requested while rows are pending.
    #[error("Garbage collection with {0} pending rows")]
    PendingRowsPresent(usize),

    /// Unrecoverable numerical trouble in the LP engine.
    #[error("Numerical failure: {0}")]
    Numerical(String),

    /// Hypergraph input failed validation.
    #[error("Invalid hypergraph: {0}")]
    InvalidHypergraph(String),

    /// Internal consistency check failed.
    #[error("Internal error: {0}")]
    Internal(String),

    /// LP engine error.
    #[error("LP engine error: {0}")]
    Engine(#[from] LpError),
}

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

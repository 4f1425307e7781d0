//! The constraint pool.
//!
//! The pool owns every known row. Rows live in a [`CoefArena`], are indexed
//! by signature for deduplication, and carry LP bookkeeping: whether the row
//! is idle, pending addition to the LP, or loaded at a given LP row index.
//!
//! `lprows` holds the slots of loaded rows (in LP row order) followed by the
//! slots of pending rows. Its first `nlprows` entries always match the rows
//! in the LP engine.

pub mod arena;
mod gc;

use std::collections::HashMap;
use std::fmt;

use crate::error::{PoolError, PoolResult};
use crate::row::{self, Coef, Evaluation, Row, RowOp};

pub use arena::{ArenaMemory, CoefArena, Span};
pub use gc::GcReport;

/// LP status of a pool row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LpState {
    /// In the pool only.
    Idle,
    /// Waiting to be pushed to the LP.
    Pending,
    /// Loaded at the given LP row index.
    Loaded(usize),
}

impl fmt::Display for LpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LpState::Idle => write!(f, "idle"),
            LpState::Pending => write!(f, "pending"),
            LpState::Loaded(k) => write!(f, "loaded at {}", k),
        }
    }
}

/// Metadata of a stored row.
#[derive(Debug, Clone)]
pub struct RowHeader {
    /// Unique identifier, increasing with insertion order.
    pub uid: u64,

    /// Hash of the left-hand side.
    pub signature: u64,

    /// Relational operator.
    pub op: RowOp,

    /// Right-hand side.
    pub rhs: i64,

    /// LP status.
    pub state: LpState,

    /// Number of suspended nodes whose basis refers to this row.
    pub refc: u32,

    /// Pool iteration at which the row was last binding or violated.
    pub biter: u64,

    /// Evict and unload this row at the first opportunity.
    pub discard: bool,

    span: Span,
}

impl RowHeader {
    /// Number of coefficients.
    pub fn len(&self) -> usize {
        self.span.len()
    }

    /// True if the row has no coefficients (never the case for stored rows).
    pub fn is_empty(&self) -> bool {
        self.span.is_empty()
    }

    /// Row is loaded in the LP.
    pub fn is_loaded(&self) -> bool {
        matches!(self.state, LpState::Loaded(_))
    }
}

/// A stored row with its coefficients.
#[derive(Debug, Clone, Copy)]
pub struct RowRef<'a> {
    /// Row metadata.
    pub header: &'a RowHeader,
    /// Row coefficients, sorted by variable.
    pub coefs: &'a [Coef],
}

impl RowRef<'_> {
    /// Slack at `x`.
    pub fn slack(&self, x: &[f64]) -> f64 {
        row::slack(self.coefs, self.header.op, self.header.rhs, x)
    }

    /// Classify at `x`.
    pub fn evaluate(&self, x: &[f64], fuzz: f64) -> Evaluation {
        Evaluation::from_slack(self.slack(x), fuzz)
    }

    /// Owned copy of the row.
    pub fn to_row(&self) -> Row {
        Row::new(self.coefs.to_vec(), self.header.op, self.header.rhs)
    }
}

impl fmt::Display for RowRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        row::write_row(f, self.coefs, self.header.op, self.header.rhs)
    }
}

/// Result of [`ConstraintPool::add_row`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Row was stored at this slot.
    Inserted(usize),
    /// An identical row already exists at this slot.
    Duplicate(usize),
}

impl AddOutcome {
    /// Slot of the (new or existing) row.
    pub fn slot(self) -> usize {
        match self {
            AddOutcome::Inserted(s) | AddOutcome::Duplicate(s) => s,
        }
    }

    /// True if the row was newly stored.
    pub fn is_new(self) -> bool {
        matches!(self, AddOutcome::Inserted(_))
    }
}

/// Pool memory summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolMemory {
    /// Stored rows.
    pub rows: usize,
    /// Live coefficients.
    pub nonzeros: usize,
    /// Arena layout.
    pub arena: ArenaMemory,
}

/// Hash-indexed store of integer rows.
#[derive(Debug)]
pub struct ConstraintPool {
    nvars: usize,
    arena: CoefArena,
    rows: Vec<RowHeader>,
    index: HashMap<u64, Vec<usize>>,
    lprows: Vec<usize>,
    nlprows: usize,
    num_nz: usize,
    next_uid: u64,
    iteration: u64,
    initial_rows: usize,
    hwm_rows: usize,
    hwm_nz: usize,
}

impl ConstraintPool {
    /// Create an empty pool over `nvars` columns.
    pub fn new(nvars: usize, nz_capacity: usize) -> Self {
        Self {
            nvars,
            arena: CoefArena::new(nz_capacity),
            rows: Vec::new(),
            index: HashMap::new(),
            lprows: Vec::new(),
            nlprows: 0,
            num_nz: 0,
            next_uid: 0,
            iteration: 0,
            initial_rows: 0,
            hwm_rows: 0,
            hwm_nz: 0,
        }
    }

    /// Number of columns rows may refer to.
    pub fn nvars(&self) -> usize {
        self.nvars
    }

    /// Number of stored rows.
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Total coefficients over all stored rows.
    pub fn num_nonzeros(&self) -> usize {
        self.num_nz
    }

    /// Number of rows loaded in the LP.
    pub fn num_loaded(&self) -> usize {
        self.nlprows
    }

    /// Number of rows pending addition to the LP.
    pub fn num_pending(&self) -> usize {
        self.lprows.len() - self.nlprows
    }

    /// Slots of loaded rows, in LP row order.
    pub fn loaded_rows(&self) -> &[usize] {
        &self.lprows[..self.nlprows]
    }

    /// Slots of pending rows.
    pub fn pending_rows(&self) -> &[usize] {
        &self.lprows[self.nlprows..]
    }

    /// Uid the next inserted row will receive.
    pub fn next_uid(&self) -> u64 {
        self.next_uid
    }

    /// Number of LP solves performed over this pool.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Advance the LP solve counter.
    pub fn bump_iteration(&mut self) {
        self.iteration += 1;
    }

    /// Number of seed rows (never evicted).
    pub fn initial_rows(&self) -> usize {
        self.initial_rows
    }

    /// Mark every row stored so far as a seed row.
    pub fn freeze_initial_rows(&mut self) {
        self.initial_rows = self.rows.len();
    }

    /// Largest LP row and nonzero counts seen so far.
    pub fn high_water_marks(&self) -> (usize, usize) {
        (self.hwm_rows, self.hwm_nz)
    }

    pub(crate) fn record_high_water(&mut self, rows: usize, nonzeros: usize) {
        self.hwm_rows = self.hwm_rows.max(rows);
        self.hwm_nz = self.hwm_nz.max(nonzeros);
    }

    /// Free coefficient space in the arena's allocation head.
    pub fn arena_free(&self) -> usize {
        self.arena.head_free()
    }

    /// Header of a row.
    pub fn header(&self, slot: usize) -> PoolResult<&RowHeader> {
        self.rows.get(slot).ok_or(PoolError::RowOutOfRange {
            slot,
            nrows: self.rows.len(),
        })
    }

    /// Header and coefficients of a row.
    pub fn row(&self, slot: usize) -> PoolResult<RowRef<'_>> {
        let header = self.header(slot)?;
        Ok(RowRef {
            header,
            coefs: self.arena.get(header.span),
        })
    }

    /// Iterate over all rows in slot order.
    pub fn iter(&self) -> impl Iterator<Item = RowRef<'_>> + '_ {
        self.rows.iter().map(move |header| RowRef {
            header,
            coefs: self.arena.get(header.span),
        })
    }

    /// Locate a row by uid.
    pub fn find_uid(&self, uid: u64) -> Option<usize> {
        self.rows.binary_search_by_key(&uid, |h| h.uid).ok()
    }

    /// Fail unless every variable of `row` is a pool column.
    pub fn check_vars(&self, row: &Row) -> PoolResult<()> {
        match row.coefs.iter().find(|c| c.var >= self.nvars) {
            Some(c) => Err(PoolError::VarOutOfRange {
                var: c.var,
                nvars: self.nvars,
            }),
            None => Ok(()),
        }
    }

    /// Normalize `row` and store it unless an identical row exists.
    ///
    /// A newly stored row is marked pending when `load` is set. Duplicates
    /// leave the existing row untouched.
    pub fn add_row(&mut self, mut row: Row, load: bool) -> PoolResult<AddOutcome> {
        row.normalize()?;
        self.check_vars(&row)?;

        let signature = row.signature();
        if let Some(bucket) = self.index.get(&signature) {
            for &slot in bucket {
                let h = &self.rows[slot];
                if h.op == row.op
                    && h.rhs == row.rhs
                    && self.arena.get(h.span) == row.coefs.as_slice()
                {
                    return Ok(AddOutcome::Duplicate(slot));
                }
            }
        }

        let span = self.arena.alloc(&row.coefs)?;
        let slot = self.rows.len();
        self.rows.push(RowHeader {
            uid: self.next_uid,
            signature,
            op: row.op,
            rhs: row.rhs,
            state: LpState::Idle,
            refc: 0,
            biter: self.iteration,
            discard: false,
            span,
        });
        self.next_uid += 1;
        self.num_nz += row.coefs.len();
        self.index.entry(signature).or_default().push(slot);

        if load {
            self.mark_pending(slot)?;
        }
        Ok(AddOutcome::Inserted(slot))
    }

    /// Queue an idle row for addition to the LP.
    ///
    /// No-op for rows already pending or loaded.
    pub fn mark_pending(&mut self, slot: usize) -> PoolResult<()> {
        let nrows = self.rows.len();
        let header = self
            .rows
            .get_mut(slot)
            .ok_or(PoolError::RowOutOfRange { slot, nrows })?;
        if header.state != LpState::Idle {
            return Ok(());
        }
        header.state = LpState::Pending;
        self.lprows.push(slot);
        Ok(())
    }

    /// Classify a stored row at `x`.
    pub fn evaluate(&self, slot: usize, x: &[f64], fuzz: f64) -> PoolResult<Evaluation> {
        Ok(self.row(slot)?.evaluate(x, fuzz))
    }

    /// Flag a row for removal from the LP and the pool.
    pub fn set_discard(&mut self, slot: usize) -> PoolResult<()> {
        let nrows = self.rows.len();
        self.rows
            .get_mut(slot)
            .ok_or(PoolError::RowOutOfRange { slot, nrows })?
            .discard = true;
        Ok(())
    }

    /// Memory summary.
    pub fn memory(&self) -> PoolMemory {
        PoolMemory {
            rows: self.rows.len(),
            nonzeros: self.num_nz,
            arena: self.arena.memory(),
        }
    }

    /// Log the memory summary at debug level.
    pub fn log_memory(&self) {
        let mem = self.memory();
        log::debug!(
            "pool memory: {} rows, {} nz, {} blocks, {} free, {} wasted, {} total",
            mem.rows,
            mem.nonzeros,
            mem.arena.blocks,
            mem.arena.free,
            mem.arena.wasted,
            mem.arena.total,
        );
    }

    pub(crate) fn header_mut(&mut self, slot: usize) -> &mut RowHeader {
        &mut self.rows[slot]
    }

    pub(crate) fn set_biter(&mut self, slot: usize) {
        let iter = self.iteration;
        self.rows[slot].biter = iter;
    }

    pub(crate) fn lprows_mut(&mut self) -> &mut Vec<usize> {
        &mut self.lprows
    }

    pub(crate) fn set_num_loaded(&mut self, nlprows: usize) {
        self.nlprows = nlprows;
    }

    /// Record every pending row as loaded at its position in `lprows`.
    ///
    /// Called once the LP engine has accepted the rows. Returns the number
    /// of rows committed.
    pub(crate) fn commit_pending(&mut self) -> usize {
        let first = self.nlprows;
        for i in first..self.lprows.len() {
            let slot = self.lprows[i];
            self.rows[slot].state = LpState::Loaded(i);
        }
        self.nlprows = self.lprows.len();
        self.nlprows - first
    }

    /// Unload the loaded rows for which `unload(lp_index, header)` holds.
    ///
    /// Surviving rows keep their relative LP order and are renumbered; the
    /// pending suffix is untouched. Returns the old LP indices of the unloaded
    /// rows in ascending order.
    pub(crate) fn unload_rows<F>(&mut self, mut unload: F) -> PoolResult<Vec<usize>>
    where
        F: FnMut(usize, &RowHeader) -> bool,
    {
        let n = self.nlprows;
        let mut removed = Vec::new();
        let mut j = 0;
        for i in 0..n {
            let slot = self.lprows[i];
            let header = &mut self.rows[slot];
            if header.state != LpState::Loaded(i) {
                return Err(PoolError::InvalidRowState {
                    op: "unload_rows",
                    uid: header.uid,
                    state: header.state.to_string(),
                });
            }
            if unload(i, header) {
                header.state = LpState::Idle;
                removed.push(i);
            } else {
                header.state = LpState::Loaded(j);
                self.lprows[j] = slot;
                j += 1;
            }
        }
        self.lprows.drain(j..n);
        self.nlprows = j;
        Ok(removed)
    }

    /// Turn every loaded row back into a pending row, keeping LP order.
    pub(crate) fn unload_all_as_pending(&mut self) -> PoolResult<()> {
        for i in 0..self.nlprows {
            let slot = self.lprows[i];
            let header = &mut self.rows[slot];
            if !header.is_loaded() {
                return Err(PoolError::InvalidRowState {
                    op: "unload_all_as_pending",
                    uid: header.uid,
                    state: header.state.to_string(),
                });
            }
            header.state = LpState::Pending;
        }
        self.nlprows = 0;
        Ok(())
    }

    /// Check every structural invariant of the pool.
    pub fn verify(&self) -> PoolResult<()> {
        let fail = |msg: String| Err(PoolError::Internal(msg));

        if self.nlprows > self.lprows.len() {
            return fail(format!(
                "{} loaded rows but lprows has {}",
                self.nlprows,
                self.lprows.len()
            ));
        }

        let mut seen = vec![false; self.rows.len()];
        for (i, &slot) in self.lprows.iter().enumerate() {
            let Some(h) = self.rows.get(slot) else {
                return fail(format!("lprows[{}] = {} out of range", i, slot));
            };
            if std::mem::replace(&mut seen[slot], true) {
                return fail(format!("row {} listed twice in lprows", slot));
            }
            let expected = if i < self.nlprows {
                LpState::Loaded(i)
            } else {
                LpState::Pending
            };
            if h.state != expected {
                return fail(format!(
                    "row uid {} is {} but lprows[{}] expects {}",
                    h.uid, h.state, i, expected
                ));
            }
        }

        let mut nz = 0;
        let mut indexed = 0;
        for (slot, h) in self.rows.iter().enumerate() {
            if h.state != LpState::Idle && !seen[slot] {
                return fail(format!("row uid {} is {} but not in lprows", h.uid, h.state));
            }
            if slot > 0 && self.rows[slot - 1].uid >= h.uid {
                return fail(format!("uids out of order at slot {}", slot));
            }
            let coefs = self.arena.get(h.span);
            if row::signature(coefs) != h.signature {
                return fail(format!("row uid {} has stale signature", h.uid));
            }
            if !self
                .index
                .get(&h.signature)
                .is_some_and(|b| b.contains(&slot))
            {
                return fail(format!("row uid {} missing from index", h.uid));
            }
            nz += coefs.len();
        }
        for bucket in self.index.values() {
            indexed += bucket.len();
        }
        if indexed != self.rows.len() {
            return fail(format!(
                "index holds {} entries for {} rows",
                indexed,
                self.rows.len()
            ));
        }
        if nz != self.num_nz {
            return fail(format!("nonzero count {} but rows hold {}", self.num_nz, nz));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn le(pairs: &[(usize, i64)], rhs: i64) -> Row {
        Row::from_pairs(pairs, RowOp::Le, rhs)
    }

    #[test]
    fn test_duplicate_rows_are_stored_once() {
        let mut pool = ConstraintPool::new(4, 16);

        let first = pool.add_row(le(&[(0, 1), (1, 1)], 1), false).unwrap();
        assert!(first.is_new());

        // Same row, scaled and reordered.
        let second = pool.add_row(le(&[(1, 3), (0, 3)], 3), false).unwrap();
        assert_eq!(second, AddOutcome::Duplicate(first.slot()));
        assert_eq!(pool.num_rows(), 1);
        assert_eq!(pool.num_nonzeros(), 2);
        pool.verify().unwrap();
    }

    #[test]
    fn test_same_lhs_different_rhs_is_distinct() {
        let mut pool = ConstraintPool::new(3, 16);
        pool.add_row(le(&[(0, 1), (2, 1)], 1), false).unwrap();
        let other = pool
            .add_row(Row::from_pairs(&[(0, 1), (2, 1)], RowOp::Ge, 1), false)
            .unwrap();
        assert!(other.is_new());
        assert_eq!(pool.num_rows(), 2);
        pool.verify().unwrap();
    }

    #[test]
    fn test_add_with_load_marks_pending() {
        let mut pool = ConstraintPool::new(3, 16);
        let a = pool.add_row(le(&[(0, 1)], 1), true).unwrap().slot();
        let b = pool.add_row(le(&[(1, 1)], 1), false).unwrap().slot();

        assert_eq!(pool.pending_rows(), &[a]);
        assert_eq!(pool.header(b).unwrap().state, LpState::Idle);

        pool.mark_pending(b).unwrap();
        pool.mark_pending(b).unwrap();
        assert_eq!(pool.pending_rows(), &[a, b]);
        pool.verify().unwrap();
    }

    #[test]
    fn test_mark_pending_out_of_range() {
        let mut pool = ConstraintPool::new(2, 4);
        assert!(matches!(
            pool.mark_pending(3),
            Err(PoolError::RowOutOfRange { slot: 3, nrows: 0 })
        ));
    }

    #[test]
    fn test_variable_range_checked() {
        let mut pool = ConstraintPool::new(2, 4);
        let err = pool.add_row(le(&[(0, 1), (5, 1)], 1), false).unwrap_err();
        assert!(matches!(err, PoolError::VarOutOfRange { var: 5, nvars: 2 }));
        assert_eq!(pool.num_rows(), 0);
    }

    #[test]
    fn test_uids_increase_and_lookup() {
        let mut pool = ConstraintPool::new(5, 2);
        for v in 0..5 {
            pool.add_row(le(&[(v, 1)], 1), false).unwrap();
        }
        for v in 0..5u64 {
            assert_eq!(pool.find_uid(v), Some(v as usize));
        }
        assert_eq!(pool.find_uid(99), None);
        assert_eq!(pool.next_uid(), 5);
        assert!(pool.memory().arena.blocks > 1);
    }

    #[test]
    fn test_unload_rows_compacts_lp_order() {
        let mut pool = ConstraintPool::new(6, 32);
        let slots: Vec<usize> = (0..5)
            .map(|v| pool.add_row(le(&[(v, 1)], 1), true).unwrap().slot())
            .collect();
        assert_eq!(pool.commit_pending(), 5);
        let late = pool.add_row(le(&[(5, 1)], 1), true).unwrap().slot();

        let removed = pool.unload_rows(|i, _| i % 2 == 1).unwrap();
        assert_eq!(removed, vec![1, 3]);
        assert_eq!(pool.loaded_rows(), &[slots[0], slots[2], slots[4]]);
        assert_eq!(pool.pending_rows(), &[late]);
        assert_eq!(pool.header(slots[4]).unwrap().state, LpState::Loaded(2));
        assert_eq!(pool.header(slots[3]).unwrap().state, LpState::Idle);
        pool.verify().unwrap();
    }

    #[test]
    fn test_evaluate_stored_row() {
        let mut pool = ConstraintPool::new(2, 4);
        let slot = pool.add_row(le(&[(0, 2), (1, 2)], 2), false).unwrap().slot();
        match pool.evaluate(slot, &[0.6, 0.6], 1e-6).unwrap() {
            Evaluation::Violated { amount } => assert!((amount - 0.2).abs() < 1e-10),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(pool.row(slot).unwrap().to_string(), "x0 + x1 <= 1");
    }
}

//! Canonical integer rows.
//!
//! A row is a sparse integer linear form over component variables together
//! with a relational operator and an integer right-hand side. Before a row
//! enters the pool it is normalized: coefficients are sorted by variable,
//! duplicate variables are merged and the whole row is divided by the GCD of
//! its coefficients and right-hand side. Equivalent rows therefore have the
//! same coefficients and the same signature.

use std::fmt;

use crate::error::{PoolError, PoolResult};

/// Relational operator of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowOp {
    /// a·x <= rhs
    Le,
    /// a·x == rhs
    Eq,
    /// a·x >= rhs
    Ge,
}

impl RowOp {
    /// Operator symbol used when printing rows.
    pub fn symbol(self) -> &'static str {
        match self {
            RowOp::Le => "<=",
            RowOp::Eq => "=",
            RowOp::Ge => ">=",
        }
    }
}

/// One (variable, coefficient) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Coef {
    /// Column index.
    pub var: usize,
    /// Integer coefficient (never zero once normalized).
    pub val: i64,
}

impl Coef {
    /// Create a coefficient.
    pub fn new(var: usize, val: i64) -> Self {
        Self { var, val }
    }
}

/// An owned row, not yet stored in a pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// Sparse left-hand side.
    pub coefs: Vec<Coef>,
    /// Relational operator.
    pub op: RowOp,
    /// Right-hand side.
    pub rhs: i64,
}

/// Classification of a row against a candidate solution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Evaluation {
    /// Satisfied with slack above tolerance.
    Satisfied {
        /// Slack value.
        slack: f64,
    },
    /// Satisfied within tolerance of equality.
    Binding,
    /// Violated by more than tolerance.
    Violated {
        /// Amount of violation (positive).
        amount: f64,
    },
}

impl Evaluation {
    /// Classify a slack value.
    pub fn from_slack(slack: f64, fuzz: f64) -> Self {
        if slack > fuzz {
            Evaluation::Satisfied { slack }
        } else if slack < -fuzz {
            Evaluation::Violated { amount: -slack }
        } else {
            Evaluation::Binding
        }
    }

    /// True for [`Evaluation::Violated`].
    pub fn is_violated(&self) -> bool {
        matches!(self, Evaluation::Violated { .. })
    }
}

impl Row {
    /// Create a row from coefficients.
    pub fn new(coefs: Vec<Coef>, op: RowOp, rhs: i64) -> Self {
        Self { coefs, op, rhs }
    }

    /// Create a row from (variable, coefficient) pairs.
    pub fn from_pairs(pairs: &[(usize, i64)], op: RowOp, rhs: i64) -> Self {
        Self {
            coefs: pairs.iter().map(|&(var, val)| Coef::new(var, val)).collect(),
            op,
            rhs,
        }
    }

    /// Number of nonzero coefficients.
    pub fn len(&self) -> usize {
        self.coefs.len()
    }

    /// True if the row has no coefficients.
    pub fn is_empty(&self) -> bool {
        self.coefs.is_empty()
    }

    /// Bring the row into canonical form.
    ///
    /// Fails on an empty row or a zero coefficient.
    pub fn normalize(&mut self) -> PoolResult<()> {
        if self.coefs.is_empty() {
            return Err(PoolError::MalformedRow("row has no coefficients".into()));
        }

        self.coefs.sort_by_key(|c| c.var);

        let mut merged: Vec<Coef> = Vec::with_capacity(self.coefs.len());
        for c in self.coefs.drain(..) {
            match merged.last_mut() {
                Some(last) if last.var == c.var => {
                    last.val = last.val.checked_add(c.val).ok_or_else(|| {
                        PoolError::MalformedRow(format!("coefficient overflow on x{}", c.var))
                    })?;
                }
                _ => merged.push(c),
            }
        }

        if let Some(zero) = merged.iter().find(|c| c.val == 0) {
            return Err(PoolError::MalformedRow(format!(
                "zero coefficient on x{}",
                zero.var
            )));
        }

        let k = merged
            .iter()
            .fold(self.rhs.abs(), |k, c| gcd(k, c.val.abs()));
        if k > 1 {
            for c in &mut merged {
                c.val /= k;
            }
            self.rhs /= k;
        }

        self.coefs = merged;
        Ok(())
    }

    /// Consume and return the canonical form.
    pub fn normalized(mut self) -> PoolResult<Self> {
        self.normalize()?;
        Ok(self)
    }

    /// Hash of the left-hand side.
    pub fn signature(&self) -> u64 {
        signature(&self.coefs)
    }

    /// Slack of the row at `x` (negative when violated).
    pub fn slack(&self, x: &[f64]) -> f64 {
        slack(&self.coefs, self.op, self.rhs, x)
    }

    /// Classify the row at `x`.
    pub fn evaluate(&self, x: &[f64], fuzz: f64) -> Evaluation {
        Evaluation::from_slack(self.slack(x), fuzz)
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_row(f, &self.coefs, self.op, self.rhs)
    }
}

pub(crate) fn write_row(
    f: &mut fmt::Formatter<'_>,
    coefs: &[Coef],
    op: RowOp,
    rhs: i64,
) -> fmt::Result {
    for (i, c) in coefs.iter().enumerate() {
        let (sign, mag) = if c.val < 0 { ("-", -c.val) } else { ("+", c.val) };
        if i == 0 {
            if c.val < 0 {
                write!(f, "-")?;
            }
        } else {
            write!(f, " {} ", sign)?;
        }
        if mag != 1 {
            write!(f, "{} ", mag)?;
        }
        write!(f, "x{}", c.var)?;
    }
    write!(f, " {} {}", op.symbol(), rhs)
}

/// Slack of a stored row: rhs - a·x for <=, a·x - rhs for >=, -|a·x - rhs| for =.
pub(crate) fn slack(coefs: &[Coef], op: RowOp, rhs: i64, x: &[f64]) -> f64 {
    let sum: f64 = coefs.iter().map(|c| c.val as f64 * x[c.var]).sum();
    let rhs = rhs as f64;
    match op {
        RowOp::Le => rhs - sum,
        RowOp::Ge => sum - rhs,
        RowOp::Eq => -(sum - rhs).abs(),
    }
}

pub(crate) fn signature(coefs: &[Coef]) -> u64 {
    coefs.iter().fold(0u64, |h, c| {
        h.rotate_left(7)
            ^ (c.var as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15)
            ^ (c.val as u64).wrapping_mul(0xc2b2_ae3d_27d4_eb4f)
    })
}

fn gcd(mut a: i64, mut b: i64) -> i64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gcd_reduction() {
        let row = Row::from_pairs(&[(0, 6), (1, 9), (2, 15)], RowOp::Le, 30)
            .normalized()
            .unwrap();
        assert_eq!(row.coefs, vec![Coef::new(0, 2), Coef::new(1, 3), Coef::new(2, 5)]);
        assert_eq!(row.rhs, 10);
    }

    #[test]
    fn test_reduction_preserves_classification() {
        let raw = Row::from_pairs(&[(0, 6), (1, 9), (2, 15)], RowOp::Le, 30);
        let reduced = raw.clone().normalized().unwrap();

        let points = [
            [1.0, 1.0, 1.0],
            [0.0, 0.0, 2.0],
            [2.0, 2.0, 1.0],
            [5.0, 0.0, 0.0],
            [0.5, 1.5, 0.7],
        ];
        for x in &points {
            let a = raw.evaluate(x, FUZZ_TEST);
            let b = reduced.evaluate(x, FUZZ_TEST);
            assert_eq!(a.is_violated(), b.is_violated(), "x = {:?}", x);
            assert_eq!(
                matches!(a, Evaluation::Satisfied { .. }),
                matches!(b, Evaluation::Satisfied { .. })
            );
        }
    }

    const FUZZ_TEST: f64 = 1e-6;

    #[test]
    fn test_zero_rhs_does_not_block_reduction() {
        let row = Row::from_pairs(&[(3, 4), (1, -2)], RowOp::Eq, 0)
            .normalized()
            .unwrap();
        assert_eq!(row.coefs, vec![Coef::new(1, -1), Coef::new(3, 2)]);
        assert_eq!(row.rhs, 0);
    }

    #[test]
    fn test_duplicate_variables_merge() {
        let row = Row::from_pairs(&[(2, 1), (0, 1), (2, 1)], RowOp::Ge, 1)
            .normalized()
            .unwrap();
        assert_eq!(row.coefs, vec![Coef::new(0, 1), Coef::new(2, 2)]);
    }

    #[test]
    fn test_malformed_rows() {
        assert!(Row::from_pairs(&[], RowOp::Le, 1).normalized().is_err());
        assert!(Row::from_pairs(&[(0, 1), (1, 0)], RowOp::Le, 1)
            .normalized()
            .is_err());
        assert!(Row::from_pairs(&[(0, 1), (0, -1)], RowOp::Le, 1)
            .normalized()
            .is_err());
    }

    #[test]
    fn test_violation_amount() {
        let row = Row::from_pairs(&[(0, 1), (1, 1)], RowOp::Le, 1);

        match row.evaluate(&[0.6, 0.6], FUZZ_TEST) {
            Evaluation::Violated { amount } => assert!((amount - 0.2).abs() < 1e-10),
            other => panic!("expected violation, got {:?}", other),
        }

        match row.evaluate(&[0.4, 0.5], FUZZ_TEST) {
            Evaluation::Satisfied { slack } => assert!((slack - 0.1).abs() < 1e-10),
            other => panic!("expected slack, got {:?}", other),
        }

        assert_eq!(row.evaluate(&[0.5, 0.5], FUZZ_TEST), Evaluation::Binding);
    }

    #[test]
    fn test_equality_slack_is_never_positive() {
        let row = Row::from_pairs(&[(0, 1), (1, 1)], RowOp::Eq, 1);
        assert!(row.slack(&[0.2, 0.2]) < 0.0);
        assert!(row.slack(&[0.8, 0.8]) < 0.0);
        assert_eq!(row.evaluate(&[0.5, 0.5], FUZZ_TEST), Evaluation::Binding);
    }

    #[test]
    fn test_signature_matches_for_scaled_rows() {
        let a = Row::from_pairs(&[(4, 2), (1, 2)], RowOp::Le, 2)
            .normalized()
            .unwrap();
        let b = Row::from_pairs(&[(1, 1), (4, 1)], RowOp::Le, 1)
            .normalized()
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn test_display() {
        let row = Row::from_pairs(&[(0, 1), (2, -3)], RowOp::Ge, 1);
        assert_eq!(row.to_string(), "x0 - 3 x2 >= 1");
    }
}

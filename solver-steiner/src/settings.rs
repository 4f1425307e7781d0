//! Configuration settings for the constraint pool and the search driver.

/// Slack/violation tolerance used throughout the pool.
pub const FUZZ: f64 = 0.000001;

/// Coverage/budget mode.
///
/// Terminals may be left uncovered (each gets a `not_covered` column), and the
/// total scaled component cost is capped by a budget row.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetSettings {
    /// Budget in cost units.
    pub limit: f64,

    /// Integer scale applied to costs and the limit before rounding.
    pub scale: f64,

    /// Objective coefficient of each `not_covered` column.
    pub uncovered_penalty: f64,
}

impl BudgetSettings {
    /// Budget with the default scale of one million.
    pub fn new(limit: f64) -> Self {
        Self {
            limit,
            scale: 1_000_000.0,
            uncovered_penalty: 0.0,
        }
    }

    /// Set the objective penalty for uncovered terminals.
    pub fn with_uncovered_penalty(mut self, penalty: f64) -> Self {
        self.uncovered_penalty = penalty;
        self
    }
}

/// Constraint pool settings.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Rows with slack above this are slack; below its negation, violated.
    pub fuzz: f64,

    /// Pending coefficient count above which the largest pending rows are
    /// deferred to a later scan.
    pub prune_threshold: usize,

    /// Iterations a row must go unbound before it may be evicted.
    pub gc_grace_iterations: u64,

    /// Pool size target in coefficients (0 = 16x the live coefficients).
    pub target_pool_nonzeros: usize,

    /// Seed the pool with all non-trivial two-vertex subtour rows.
    pub seed_pool_with_2secs: bool,

    /// Minimum row capacity requested from the LP engine.
    pub min_lp_rows: usize,

    /// Minimum nonzero capacity requested from the LP engine.
    pub min_lp_nonzeros: usize,

    /// Scale the objective by a power of two before loading it.
    pub scale_objective: bool,

    /// Relative bound improvement required before slack rows are deleted
    /// while pruning pending rows.
    pub slack_improvement: f64,

    /// Coverage/budget mode (None = every vertex must be spanned).
    pub budget: Option<BudgetSettings>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            fuzz: FUZZ,
            prune_threshold: 2_000_000,
            gc_grace_iterations: 10,
            target_pool_nonzeros: 0,
            seed_pool_with_2secs: true,
            min_lp_rows: 0,
            min_lp_nonzeros: 0,
            scale_objective: true,
            slack_improvement: 0.0001,
            budget: None,
        }
    }
}

impl PoolSettings {
    /// Set the pool size target.
    pub fn with_target_pool_nonzeros(mut self, target: usize) -> Self {
        self.target_pool_nonzeros = target;
        self
    }

    /// Enable or disable two-vertex subtour seeding.
    pub fn with_2secs(mut self, seed: bool) -> Self {
        self.seed_pool_with_2secs = seed;
        self
    }

    /// Set minimum LP capacities.
    pub fn with_min_lp_capacity(mut self, rows: usize, nonzeros: usize) -> Self {
        self.min_lp_rows = rows;
        self.min_lp_nonzeros = nonzeros;
        self
    }

    /// Set the pending-row deferral threshold.
    pub fn with_prune_threshold(mut self, threshold: usize) -> Self {
        self.prune_threshold = threshold;
        self
    }

    /// Enable coverage/budget mode.
    pub fn with_budget(mut self, budget: BudgetSettings) -> Self {
        self.budget = Some(budget);
        self
    }
}

/// Node selection strategy for the search tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeSelection {
    /// Always select node with best (lowest) bound.
    #[default]
    BestBound,

    /// Depth-first search.
    DepthFirst,
}

/// Branch-and-cut settings.
#[derive(Debug, Clone)]
pub struct SearchSettings {
    /// Maximum number of nodes to explore.
    pub max_nodes: u64,

    /// A variable is integral if |x - round(x)| <= int_feas_tol.
    pub int_feas_tol: f64,

    /// Relative optimality gap tolerance.
    pub gap_tol: f64,

    /// Node selection strategy.
    pub node_selection: NodeSelection,

    /// Log progress.
    pub verbose: bool,

    /// Log every N nodes.
    pub log_freq: u64,

    /// Pool settings.
    pub pool: PoolSettings,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            max_nodes: 100_000,
            int_feas_tol: 1e-6,
            gap_tol: 1e-9,
            node_selection: NodeSelection::default(),
            verbose: false,
            log_freq: 100,
            pool: PoolSettings::default(),
        }
    }
}

impl SearchSettings {
    /// Create settings with verbose output enabled.
    pub fn verbose() -> Self {
        let mut s = Self::default();
        s.verbose = true;
        s.log_freq = 1;
        s
    }

    /// Set maximum nodes.
    pub fn with_max_nodes(mut self, nodes: u64) -> Self {
        self.max_nodes = nodes;
        self
    }

    /// Set pool settings.
    pub fn with_pool(mut self, pool: PoolSettings) -> Self {
        self.pool = pool;
        self
    }

    /// Set node selection strategy.
    pub fn with_node_selection(mut self, selection: NodeSelection) -> Self {
        self.node_selection = selection;
        self
    }
}

use std::sync::{LazyLock, RwLock};

use crate::optimize::solvers::Solver;

pub static CONFIGURATION: LazyLock<RwLock<Configuration>> =
    LazyLock::new(|| RwLock::new(Configuration::default()));

pub struct Configuration {
    /// Feasibility tolerance used when evaluating constraints
    pub tolerance: f64,
    /// Solver backend used by the orchestrator
    pub solver: Solver,
    /// Decimals kept when snapshotting stage results into parameters
    pub snapshot_decimals: u32,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            tolerance: 1e-07,
            solver: Solver::Highs,
            snapshot_decimals: 6,
        }
    }
}

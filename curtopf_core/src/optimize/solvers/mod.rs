//! Pluggable LP/MILP solver backends
use cfg_if::cfg_if;

use crate::optimize::problem::Problem;
use crate::optimize::SolveError;

#[cfg(feature = "highs")]
pub mod highs;
#[cfg(feature = "microlp")]
pub mod microlp;

/// Enum used to select the solver backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Solver {
    /// Use the HiGHS LP/MILP solver, requires the highs feature (default)
    Highs,
    /// Use the microlp pure-Rust LP solver, requires the microlp feature;
    /// continuous problems only
    Microlp,
}

/// Raw column values returned by a backend
pub struct SolverSolution {
    pub columns: Vec<f64>,
}

/// A backend that can solve a lowered [`Problem`]
pub trait SolverBackend {
    fn solve(&self, problem: &Problem) -> Result<SolverSolution, SolveError>;
}

impl Solver {
    /// Dispatch to the compiled-in backend, failing if its feature is off
    pub fn solve(&self, problem: &Problem) -> Result<SolverSolution, SolveError> {
        match self {
            Solver::Highs => {
                cfg_if! {
                    if #[cfg(feature = "highs")] {
                        highs::HighsSolver.solve(problem)
                    } else {
                        Err(SolveError::SolverUnavailable(*self))
                    }
                }
            }
            Solver::Microlp => {
                cfg_if! {
                    if #[cfg(feature = "microlp")] {
                        microlp::MicrolpSolver.solve(problem)
                    } else {
                        Err(SolveError::SolverUnavailable(*self))
                    }
                }
            }
        }
    }
}

//! Solving assembled model instances
//!
//! [`solve_instance`] refreshes constraint rows, lowers the instance, hands
//! it to the selected backend and writes solution values back onto the
//! instance's variables. When the backend reports infeasibility,
//! unboundedness or an internal failure, every active constraint is
//! evaluated against the last known variable values and the violated rows
//! are logged before the error propagates.
pub mod objective;
pub mod problem;
pub mod solvers;
pub mod variable;

use log::{debug, error};
use thiserror::Error;

use crate::configuration::CONFIGURATION;
use crate::model::expr::Relation;
use crate::model::instance::{ModelError, ModelInstance};
use crate::optimize::problem::Problem;
use crate::optimize::solvers::Solver;

/// Errors raised while solving
#[derive(Error, Debug)]
pub enum SolveError {
    /// The active constraint set admits no solution
    #[error("problem is infeasible")]
    Infeasible,
    /// The objective is unbounded under the active constraints
    #[error("problem is unbounded")]
    Unbounded,
    /// The backend failed for a reason other than the problem itself
    #[error("solver failure: {0}")]
    SolverFailure(String),
    /// The selected backend's cargo feature is not compiled in
    #[error("solver {0:?} is not available; enable its feature")]
    SolverUnavailable(Solver),
    /// The problem has binary or integer columns but the backend is LP-only
    #[error("integer variables require a mixed-integer solver")]
    IntegerUnsupported,
    /// A constraint or objective references a variable with no column
    #[error("unknown variable {0} in expression")]
    UnknownVariable(String),
    /// The instance has no objective set
    #[error("no objective set on the instance")]
    MissingObjective,
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Outcome of one successful solve. Infeasible, unbounded and halted
/// outcomes surface as [`SolveError`] instead.
#[derive(Debug, Clone, Copy)]
pub struct SolveResult {
    pub objective_value: f64,
}

/// Solve the instance's active constraints under its current objective
pub fn solve_instance(
    instance: &mut ModelInstance,
    solver: Solver,
) -> Result<SolveResult, SolveError> {
    instance.refresh_rows()?;
    let problem = Problem::from_instance(instance)?;
    debug!(
        "solving: {} columns, {} rows",
        problem.columns.len(),
        problem.rows.len()
    );
    let solution = match solver.solve(&problem) {
        Ok(solution) => solution,
        Err(error) => {
            if matches!(
                error,
                SolveError::Infeasible | SolveError::Unbounded | SolveError::SolverFailure(_)
            ) {
                error!("solve failed: {}", error);
                log_violated_constraints(instance);
            }
            return Err(error);
        }
    };
    for (spec, value) in problem.columns.iter().zip(&solution.columns) {
        spec.handle.write().unwrap().value = Some(*value);
    }
    Ok(SolveResult {
        objective_value: problem.objective_value(&solution.columns),
    })
}

/// Evaluate every active constraint row against the last known variable
/// values and log the violated ones. Unsolved variables count as zero.
fn log_violated_constraints(instance: &ModelInstance) {
    let tolerance = CONFIGURATION.read().unwrap().tolerance;
    error!("evaluating active constraints against last known values");
    for (name, block) in instance.constraint_blocks() {
        if !block.active {
            continue;
        }
        for (key, comparison) in &block.rows {
            let (terms, rel, rhs) = comparison.normalized();
            let lhs: f64 = terms
                .iter()
                .map(|term| {
                    let value = instance.value(term.var.name, &term.var.key).unwrap_or(0.0);
                    term.coef * value
                })
                .sum();
            let violated = match rel {
                Relation::Eq => (lhs - rhs).abs() > tolerance,
                Relation::Le => lhs > rhs + tolerance,
                Relation::Ge => lhs < rhs - tolerance,
            };
            if violated {
                error!(
                    "violated: {}[{}] evaluates to {} against rhs {}",
                    name, key, lhs, rhs
                );
            }
        }
    }
}

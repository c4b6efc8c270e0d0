//! microlp backend, a pure-Rust fallback for continuous problems
use microlp::{ComparisonOp, OptimizationDirection, Problem as LpProblem};

use crate::optimize::objective::ObjectiveSense;
use crate::optimize::problem::Problem;
use crate::optimize::solvers::{SolverBackend, SolverSolution};
use crate::optimize::SolveError;

pub struct MicrolpSolver;

impl SolverBackend for MicrolpSolver {
    fn solve(&self, problem: &Problem) -> Result<SolverSolution, SolveError> {
        if problem.has_integer_columns() {
            return Err(SolveError::IntegerUnsupported);
        }
        let direction = match problem.sense {
            ObjectiveSense::Minimize => OptimizationDirection::Minimize,
            ObjectiveSense::Maximize => OptimizationDirection::Maximize,
        };
        let mut lp = LpProblem::new(direction);
        let vars: Vec<microlp::Variable> = problem
            .columns
            .iter()
            .map(|spec| lp.add_var(spec.objective_coef, (spec.lower, spec.upper)))
            .collect();
        for row in &problem.rows {
            let coefs: Vec<(microlp::Variable, f64)> = row
                .coefs
                .iter()
                .map(|(column, coef)| (vars[*column], *coef))
                .collect();
            if row.lower == row.upper {
                lp.add_constraint(&coefs, ComparisonOp::Eq, row.lower);
            } else {
                if row.lower.is_finite() {
                    lp.add_constraint(&coefs, ComparisonOp::Ge, row.lower);
                }
                if row.upper.is_finite() {
                    lp.add_constraint(&coefs, ComparisonOp::Le, row.upper);
                }
            }
        }
        let solution = lp.solve().map_err(|e| match e {
            microlp::Error::Infeasible => SolveError::Infeasible,
            microlp::Error::Unbounded => SolveError::Unbounded,
            other => SolveError::SolverFailure(other.to_string()),
        })?;
        let columns = vars.iter().map(|v| solution[*v]).collect();
        Ok(SolverSolution { columns })
    }
}

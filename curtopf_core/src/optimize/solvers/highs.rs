//! HiGHS backend, the default LP/MILP solver
use highs::{HighsModelStatus, RowProblem, Sense};

use crate::optimize::objective::ObjectiveSense;
use crate::optimize::problem::Problem;
use crate::optimize::solvers::{SolverBackend, SolverSolution};
use crate::optimize::variable::VariableType;
use crate::optimize::SolveError;

pub struct HighsSolver;

impl SolverBackend for HighsSolver {
    fn solve(&self, problem: &Problem) -> Result<SolverSolution, SolveError> {
        let mut row_problem = RowProblem::default();
        let mut cols = Vec::with_capacity(problem.columns.len());
        for spec in &problem.columns {
            let col = match spec.variable_type {
                VariableType::Continuous => {
                    row_problem.add_column(spec.objective_coef, spec.lower..=spec.upper)
                }
                VariableType::Integer | VariableType::Binary => {
                    row_problem.add_integer_column(spec.objective_coef, spec.lower..=spec.upper)
                }
            };
            cols.push(col);
        }
        for row in &problem.rows {
            let coefs: Vec<(highs::Col, f64)> = row
                .coefs
                .iter()
                .map(|(column, coef)| (cols[*column], *coef))
                .collect();
            row_problem.add_row(row.lower..=row.upper, coefs);
        }
        let sense = match problem.sense {
            ObjectiveSense::Minimize => Sense::Minimise,
            ObjectiveSense::Maximize => Sense::Maximise,
        };
        let solved = row_problem
            .optimise(sense)
            .try_solve()
            .map_err(|status| SolveError::SolverFailure(format!("{:?}", status)))?;
        match solved.status() {
            HighsModelStatus::Optimal => {}
            HighsModelStatus::Infeasible => return Err(SolveError::Infeasible),
            HighsModelStatus::Unbounded | HighsModelStatus::UnboundedOrInfeasible => {
                return Err(SolveError::Unbounded)
            }
            other => return Err(SolveError::SolverFailure(format!("{:?}", other))),
        }
        let solution = solved.get_solution();
        Ok(SolverSolution {
            columns: solution.columns().to_vec(),
        })
    }
}

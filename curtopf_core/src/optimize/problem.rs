//! Lowering of a model instance to solver matrix form
//!
//! A [`Problem`] is the flat column/row view of one instance: every
//! variable referenced by an active constraint row or by the objective
//! becomes a column, every row of every *active* constraint block becomes a
//! two-sided row. Variables no active row touches are left out, so a stage
//! that ignores part of the model does not hand the backend dangling free
//! columns. Lowering assigns column indices back onto the shared
//! [`Variable`] handles so solution values can be written back after the
//! solve.
use std::sync::{Arc, RwLock};

use indexmap::{IndexMap, IndexSet};

use crate::model::expr::{Relation, VarRef};
use crate::model::instance::ModelInstance;
use crate::optimize::objective::ObjectiveSense;
use crate::optimize::variable::{Variable, VariableType};
use crate::optimize::SolveError;

/// One lowered column
pub struct ColumnSpec {
    pub id: String,
    pub variable_type: VariableType,
    pub lower: f64,
    pub upper: f64,
    pub objective_coef: f64,
    /// Shared handle into the instance, used for value write-back
    pub handle: Arc<RwLock<Variable>>,
}

/// One lowered row: lower <= sum(coef * column) <= upper
pub struct RowSpec {
    pub name: String,
    pub lower: f64,
    pub upper: f64,
    pub coefs: Vec<(usize, f64)>,
}

/// A fully lowered optimization problem
pub struct Problem {
    pub columns: Vec<ColumnSpec>,
    pub rows: Vec<RowSpec>,
    pub sense: ObjectiveSense,
    /// Constant offset of the objective, excluded from the solver matrix
    pub objective_constant: f64,
}

impl Problem {
    /// Lower the active rows and objective of an instance
    pub fn from_instance(instance: &ModelInstance) -> Result<Problem, SolveError> {
        let objective = instance.objective().ok_or(SolveError::MissingObjective)?;
        let mut referenced: IndexSet<VarRef> = IndexSet::new();
        for (_, block) in instance.constraint_blocks() {
            if !block.active {
                continue;
            }
            for comparison in block.rows.values() {
                let (terms, _, _) = comparison.normalized();
                for term in terms {
                    referenced.insert(term.var);
                }
            }
        }
        for term in &objective.expr.terms {
            referenced.insert(term.var.clone());
        }

        let mut columns = Vec::new();
        let mut index_of: IndexMap<VarRef, usize> = IndexMap::new();
        for (name, block) in instance.variable_blocks() {
            for (key, handle) in &block.members {
                let var_ref = VarRef::new(*name, key.clone());
                if !referenced.contains(&var_ref) {
                    continue;
                }
                let index = columns.len();
                {
                    let mut var = handle.write().unwrap();
                    var.index = index;
                    columns.push(ColumnSpec {
                        id: var.id.clone(),
                        variable_type: var.variable_type,
                        lower: var.lower_bound,
                        upper: var.upper_bound,
                        objective_coef: 0.0,
                        handle: handle.clone(),
                    });
                }
                index_of.insert(var_ref, index);
            }
        }

        let mut rows = Vec::new();
        for (name, block) in instance.constraint_blocks() {
            if !block.active {
                continue;
            }
            for (key, comparison) in &block.rows {
                let (terms, rel, rhs) = comparison.normalized();
                let mut coefs: IndexMap<usize, f64> = IndexMap::new();
                for term in terms {
                    let column = *index_of
                        .get(&term.var)
                        .ok_or_else(|| SolveError::UnknownVariable(format!("{:?}", term.var)))?;
                    *coefs.entry(column).or_insert(0.0) += term.coef;
                }
                let (lower, upper) = match rel {
                    Relation::Eq => (rhs, rhs),
                    Relation::Le => (f64::NEG_INFINITY, rhs),
                    Relation::Ge => (rhs, f64::INFINITY),
                };
                rows.push(RowSpec {
                    name: format!("{}[{}]", name, key),
                    lower,
                    upper,
                    coefs: coefs.into_iter().collect(),
                });
            }
        }

        let mut problem = Problem {
            columns,
            rows,
            sense: objective.sense,
            objective_constant: objective.expr.constant,
        };
        for term in &objective.expr.terms {
            let column = *index_of
                .get(&term.var)
                .ok_or_else(|| SolveError::UnknownVariable(format!("{:?}", term.var)))?;
            problem.columns[column].objective_coef += term.coef;
        }
        Ok(problem)
    }

    /// Objective value of a column assignment, constant included
    pub fn objective_value(&self, column_values: &[f64]) -> f64 {
        self.columns
            .iter()
            .zip(column_values)
            .map(|(spec, value)| spec.objective_coef * value)
            .sum::<f64>()
            + self.objective_constant
    }

    pub fn has_integer_columns(&self) -> bool {
        self.columns
            .iter()
            .any(|c| c.variable_type != VariableType::Continuous)
    }
}

//! Provides struct for representing an optimization problem's objective
use crate::model::expr::{LinExpr, VarRef};

/// Represents the Objective of an optimization problem
#[derive(Debug, Clone)]
pub struct Objective {
    /// Linear expression being optimized
    pub expr: LinExpr,
    /// Sense of the objective (maximize, or minimize), see [`ObjectiveSense`]
    pub sense: ObjectiveSense,
}

impl Objective {
    /// Create a new empty objective, with a given sense
    pub fn new(sense: ObjectiveSense) -> Self {
        Self {
            expr: LinExpr::new(),
            sense,
        }
    }

    /// Create a new empty minimization objective
    pub fn new_minimize() -> Self {
        Self::new(ObjectiveSense::Minimize)
    }

    /// Create a new empty maximization objective
    pub fn new_maximize() -> Self {
        Self::new(ObjectiveSense::Maximize)
    }

    /// Change the sense of the objective
    pub fn set_sense(&mut self, sense: ObjectiveSense) {
        self.sense = sense;
    }

    /// Add a new linear term to the objective
    pub fn add_linear_term(&mut self, var: VarRef, coefficient: f64) {
        self.expr.add_term(var, coefficient);
    }

    /// Add a constant offset to the objective
    pub fn add_constant(&mut self, value: f64) {
        self.expr.constant += value;
    }
}

/// Represents the sense of the objective, whether it should be maximized or minimized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectiveSense {
    /// The objective should be minimized
    Minimize,
    /// The objective should be maximized
    Maximize,
}

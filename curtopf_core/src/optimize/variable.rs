//! Decision variables of an assembled optimization problem
use std::fmt::{Display, Formatter};

use derive_builder::Builder;

/// A single decision variable, owned by a variable block of the model
/// instance and shared with the lowered solver problem
#[derive(Builder, Debug, Clone)]
pub struct Variable {
    /// Identifier, e.g. `Pg[G1]`
    pub id: String,
    /// Continuous or binary, see [`VariableType`]
    #[builder(default = "VariableType::Continuous")]
    pub variable_type: VariableType,
    #[builder(default = "f64::NEG_INFINITY")]
    pub lower_bound: f64,
    #[builder(default = "f64::INFINITY")]
    pub upper_bound: f64,
    /// Solution value, written back after a successful solve
    #[builder(default = "None")]
    pub value: Option<f64>,
    /// Column index assigned during lowering
    #[builder(default = "0")]
    pub index: usize,
}

impl Display for Variable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.id, self.variable_type)
    }
}

/// Represents the type of variable in an optimization problem
///
/// # Notes:
/// Not all variable types are supported for all solvers; microlp only
/// supports Continuous variables, while HiGHS supports all types
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum VariableType {
    /// Continuous variable
    Continuous,
    /// Integer variable
    Integer,
    /// Binary Variable
    Binary,
}

impl Display for VariableType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            VariableType::Continuous => write!(f, "CONTINUOUS"),
            VariableType::Integer => write!(f, "INTEGER"),
            VariableType::Binary => write!(f, "BINARY"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let var = VariableBuilder::default()
            .id("Pg[G1]".to_string())
            .build()
            .unwrap();
        assert_eq!(var.variable_type, VariableType::Continuous);
        assert_eq!(var.lower_bound, f64::NEG_INFINITY);
        assert_eq!(var.upper_bound, f64::INFINITY);
        assert!(var.value.is_none());
    }

    #[test]
    fn display_includes_type() {
        let var = VariableBuilder::default()
            .id("gamma[G1]".to_string())
            .variable_type(VariableType::Binary)
            .build()
            .unwrap();
        assert_eq!(format!("{}", var), "gamma[G1]:BINARY");
    }
}

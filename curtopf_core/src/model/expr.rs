//! Linear expressions over indexed variables
//!
//! Constraint rules build a [`Comparison`] per index key; the lowering step
//! in [`crate::optimize`] turns comparisons into solver rows.
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::model::name::ComponentName;

/// Index key of one component member
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    /// Unindexed component
    Scalar,
    /// Singly indexed, e.g. a generator name
    One(String),
    /// Doubly indexed, e.g. a (generator, group) pair
    Pair(String, String),
}

impl Key {
    pub fn one(id: impl Into<String>) -> Self {
        Key::One(id.into())
    }

    pub fn pair(a: impl Into<String>, b: impl Into<String>) -> Self {
        Key::Pair(a.into(), b.into())
    }

    /// First index position; `Scalar` has none
    pub fn first(&self) -> Option<&str> {
        match self {
            Key::Scalar => None,
            Key::One(a) => Some(a),
            Key::Pair(a, _) => Some(a),
        }
    }

    /// Second index position; only `Pair` has one
    pub fn second(&self) -> Option<&str> {
        match self {
            Key::Pair(_, b) => Some(b),
            _ => None,
        }
    }

    /// Number of index positions
    pub fn dimen(&self) -> usize {
        match self {
            Key::Scalar => 0,
            Key::One(_) => 1,
            Key::Pair(_, _) => 2,
        }
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Scalar => write!(f, "()"),
            Key::One(a) => write!(f, "{}", a),
            Key::Pair(a, b) => write!(f, "({},{})", a, b),
        }
    }
}

/// Reference to one member of an indexed variable
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VarRef {
    pub name: ComponentName,
    pub key: Key,
}

impl VarRef {
    pub fn new(name: ComponentName, key: Key) -> Self {
        VarRef { name, key }
    }

    pub fn scalar(name: ComponentName) -> Self {
        VarRef::new(name, Key::Scalar)
    }

    pub fn one(name: ComponentName, id: impl Into<String>) -> Self {
        VarRef::new(name, Key::one(id))
    }

    pub fn pair(name: ComponentName, a: impl Into<String>, b: impl Into<String>) -> Self {
        VarRef::new(name, Key::pair(a, b))
    }
}

/// One coefficient-variable product
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub var: VarRef,
    pub coef: f64,
}

/// A linear expression: sum of terms plus a constant
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LinExpr {
    pub terms: Vec<Term>,
    pub constant: f64,
}

impl LinExpr {
    pub fn new() -> Self {
        LinExpr::default()
    }

    pub fn constant(value: f64) -> Self {
        LinExpr {
            terms: Vec::new(),
            constant: value,
        }
    }

    pub fn term(var: VarRef, coef: f64) -> Self {
        LinExpr::new().plus(var, coef)
    }

    pub fn var(var: VarRef) -> Self {
        LinExpr::term(var, 1.0)
    }

    pub fn plus(mut self, var: VarRef, coef: f64) -> Self {
        self.terms.push(Term { var, coef });
        self
    }

    pub fn plus_constant(mut self, value: f64) -> Self {
        self.constant += value;
        self
    }

    pub fn add_term(&mut self, var: VarRef, coef: f64) {
        self.terms.push(Term { var, coef });
    }

    /// Relate this expression to another with equality
    pub fn eq(self, rhs: LinExpr) -> Comparison {
        Comparison {
            lhs: self,
            rel: Relation::Eq,
            rhs,
        }
    }

    /// Relate this expression to another with `<=`
    pub fn le(self, rhs: LinExpr) -> Comparison {
        Comparison {
            lhs: self,
            rel: Relation::Le,
            rhs,
        }
    }

    /// Relate this expression to another with `>=`
    pub fn ge(self, rhs: LinExpr) -> Comparison {
        Comparison {
            lhs: self,
            rel: Relation::Ge,
            rhs,
        }
    }
}

/// Comparison sense of a constraint row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Eq,
    Le,
    Ge,
}

/// One constraint row in symbolic form
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub lhs: LinExpr,
    pub rel: Relation,
    pub rhs: LinExpr,
}

impl Comparison {
    /// Move every term to the left and every constant to the right, yielding
    /// `(terms, rel, rhs_constant)` ready for solver lowering
    pub fn normalized(&self) -> (Vec<Term>, Relation, f64) {
        let mut terms = self.lhs.terms.clone();
        for term in &self.rhs.terms {
            terms.push(Term {
                var: term.var.clone(),
                coef: -term.coef,
            });
        }
        let rhs = self.rhs.constant - self.lhs.constant;
        (terms, self.rel, rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_positions() {
        let pair = Key::pair("G1", "A");
        assert_eq!(pair.first(), Some("G1"));
        assert_eq!(pair.second(), Some("A"));
        assert_eq!(Key::Scalar.first(), None);
    }

    #[test]
    fn normalization_moves_terms_left_and_constants_right() {
        // 2 pG + 1 <= pD - 3  normalizes to  2 pG - pD <= -4
        let lhs = LinExpr::term(VarRef::one(ComponentName::Pg, "G1"), 2.0).plus_constant(1.0);
        let rhs = LinExpr::var(VarRef::one(ComponentName::Pd, "D1")).plus_constant(-3.0);
        let (terms, rel, rhs_const) = lhs.le(rhs).normalized();
        assert_eq!(rel, Relation::Le);
        assert_eq!(terms.len(), 2);
        assert_eq!(terms[1].coef, -1.0);
        assert!((rhs_const - (-4.0)).abs() < 1e-12);
    }
}

//! Relational table primitives for case data
use std::fmt::{Display, Formatter};

use indexmap::IndexMap;
use thiserror::Error;

/// A single cell of a case table
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Text cell (names, group labels, policy tags)
    Str(String),
    /// Numeric cell (ratings, costs, bounds)
    Num(f64),
    /// Absent cell (e.g. a generator with no pro-rata groups)
    Null,
}

impl Value {
    pub fn str(value: impl Into<String>) -> Self {
        Value::Str(value.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_num(&self) -> Option<f64> {
        match self {
            Value::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Text form used when a cell becomes a component key
    pub fn key_text(&self) -> Option<String> {
        match self {
            Value::Str(s) => Some(s.clone()),
            Value::Num(n) => Some(format!("{}", n)),
            Value::Null => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{}", s),
            Value::Num(n) => write!(f, "{}", n),
            Value::Null => write!(f, "<null>"),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Num(value)
    }
}

/// Errors raised by the case store and the derivation helpers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaseError {
    /// A requested table is absent from the case
    #[error("table '{0}' not found in case")]
    MissingTable(String),
    /// A requested column is absent from a table
    #[error("column '{column}' not found in table '{table}'")]
    MissingColumn { table: String, column: String },
    /// A filter was built with a comparator outside the supported list
    #[error("operator '{0}' is not supported; use one of =, !=, >=, >, <=, <")]
    InvalidOperator(String),
    /// An ordering comparator was applied to a non-numeric column or literal
    #[error("column '{column}' in table '{table}' must be numeric for operator '{operator}'")]
    TypeMismatch {
        table: String,
        column: String,
        operator: String,
    },
    /// A numeric parameter was derived from a cell that is not a number
    #[error("column '{column}' in table '{table}' holds a non-numeric value")]
    NotNumeric { table: String, column: String },
    /// A numeric cell held a value the derivation cannot use
    #[error("column '{column}' in table '{table}' has invalid value {value} for '{key}'")]
    InvalidValue {
        table: String,
        column: String,
        key: String,
        value: f64,
    },
    /// A cell required for a row is null or missing
    #[error("column '{column}' in table '{table}' is empty for '{key}'")]
    EmptyCell {
        table: String,
        column: String,
        key: String,
    },
}

/// Comparison operators accepted by table filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Ge,
    Gt,
    Le,
    Lt,
}

impl CmpOp {
    /// Parse an operator string, rejecting anything outside the supported set
    pub fn parse(op: &str) -> Result<Self, CaseError> {
        match op {
            "=" => Ok(CmpOp::Eq),
            "!=" => Ok(CmpOp::Ne),
            ">=" => Ok(CmpOp::Ge),
            ">" => Ok(CmpOp::Gt),
            "<=" => Ok(CmpOp::Le),
            "<" => Ok(CmpOp::Lt),
            other => Err(CaseError::InvalidOperator(other.to_string())),
        }
    }

    /// Whether the operator requires numeric operands
    pub fn is_ordering(&self) -> bool {
        matches!(self, CmpOp::Ge | CmpOp::Gt | CmpOp::Le | CmpOp::Lt)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "!=",
            CmpOp::Ge => ">=",
            CmpOp::Gt => ">",
            CmpOp::Le => "<=",
            CmpOp::Lt => "<",
        }
    }
}

/// A row predicate comparing one column against a literal
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: CmpOp,
    pub value: Value,
}

impl Filter {
    /// Build a filter from an operator string, failing on unsupported operators
    pub fn new(column: impl Into<String>, op: &str, value: Value) -> Result<Self, CaseError> {
        Ok(Filter {
            column: column.into(),
            op: CmpOp::parse(op)?,
            value,
        })
    }

    /// Equality filter against a string literal
    pub fn eq_str(column: impl Into<String>, value: impl Into<String>) -> Self {
        Filter {
            column: column.into(),
            op: CmpOp::Eq,
            value: Value::Str(value.into()),
        }
    }

    /// Numeric filter with an operator string
    pub fn num(column: impl Into<String>, op: &str, value: f64) -> Result<Self, CaseError> {
        Filter::new(column, op, Value::Num(value))
    }
}

/// A named table of equal-length, ordered columns
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: String,
    columns: IndexMap<String, Vec<Value>>,
    rows: usize,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Table {
            name: name.into(),
            columns: IndexMap::new(),
            rows: 0,
        }
    }

    /// Add a column; all columns of a table must have the same length
    pub fn with_column(mut self, column: impl Into<String>, values: Vec<Value>) -> Self {
        if self.columns.is_empty() {
            self.rows = values.len();
        }
        assert_eq!(
            values.len(),
            self.rows,
            "all columns of a table must have equal length"
        );
        self.columns.insert(column.into(), values);
        self
    }

    pub fn with_str_column(self, column: impl Into<String>, values: &[&str]) -> Self {
        self.with_column(column, values.iter().map(|v| Value::str(*v)).collect())
    }

    pub fn with_num_column(self, column: impl Into<String>, values: &[f64]) -> Self {
        self.with_column(column, values.iter().map(|v| Value::Num(*v)).collect())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|k| k.as_str())
    }

    pub fn column(&self, column: &str) -> Result<&[Value], CaseError> {
        self.columns
            .get(column)
            .map(|c| c.as_slice())
            .ok_or_else(|| CaseError::MissingColumn {
                table: self.name.clone(),
                column: column.to_string(),
            })
    }

    pub fn cell(&self, column: &str, row: usize) -> Result<&Value, CaseError> {
        Ok(&self.column(column)?[row])
    }

    /// Keep only the rows whose indices are listed, preserving order
    pub fn retain_rows(&mut self, keep: &[usize]) {
        for values in self.columns.values_mut() {
            *values = keep.iter().map(|&i| values[i].clone()).collect();
        }
        self.rows = keep.len();
    }

    /// Row indices matching the optional filter, in table order.
    ///
    /// Ordering comparators require both the column and the literal to be
    /// numeric; null cells never match an ordering comparator.
    pub fn filtered_indices(&self, filter: Option<&Filter>) -> Result<Vec<usize>, CaseError> {
        let filter = match filter {
            Some(f) => f,
            None => return Ok((0..self.rows).collect()),
        };
        let column = self.column(&filter.column)?;

        if filter.op.is_ordering() {
            let literal = filter
                .value
                .as_num()
                .ok_or_else(|| CaseError::TypeMismatch {
                    table: self.name.clone(),
                    column: filter.column.clone(),
                    operator: filter.op.as_str().to_string(),
                })?;
            if column.iter().any(|v| !v.is_null() && v.as_num().is_none()) {
                return Err(CaseError::TypeMismatch {
                    table: self.name.clone(),
                    column: filter.column.clone(),
                    operator: filter.op.as_str().to_string(),
                });
            }
            let matched = column
                .iter()
                .enumerate()
                .filter(|(_, v)| match v.as_num() {
                    Some(n) => match filter.op {
                        CmpOp::Ge => n >= literal,
                        CmpOp::Gt => n > literal,
                        CmpOp::Le => n <= literal,
                        CmpOp::Lt => n < literal,
                        _ => unreachable!(),
                    },
                    None => false,
                })
                .map(|(i, _)| i)
                .collect();
            return Ok(matched);
        }

        let matched = column
            .iter()
            .enumerate()
            .filter(|(_, v)| match filter.op {
                CmpOp::Eq => **v == filter.value,
                CmpOp::Ne => **v != filter.value,
                _ => unreachable!(),
            })
            .map(|(i, _)| i)
            .collect();
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::new("sample")
            .with_str_column("name", &["a", "b", "c"])
            .with_num_column("x", &[5.0, -3.0, 0.0])
    }

    #[test]
    fn filter_equality() {
        let table = sample();
        let filter = Filter::eq_str("name", "b");
        assert_eq!(table.filtered_indices(Some(&filter)).unwrap(), vec![1]);
    }

    #[test]
    fn filter_ordering() {
        let table = sample();
        let filter = Filter::num("x", "<", 0.0).unwrap();
        assert_eq!(table.filtered_indices(Some(&filter)).unwrap(), vec![1]);
        let filter = Filter::num("x", ">=", 0.0).unwrap();
        assert_eq!(table.filtered_indices(Some(&filter)).unwrap(), vec![0, 2]);
    }

    #[test]
    fn unsupported_operator_rejected() {
        match CmpOp::parse("~=") {
            Err(CaseError::InvalidOperator(op)) => assert_eq!(op, "~="),
            other => panic!("expected InvalidOperator, got {:?}", other),
        }
    }

    #[test]
    fn ordering_on_text_column_rejected() {
        let table = sample();
        let filter = Filter::num("name", ">", 0.0).unwrap();
        match table.filtered_indices(Some(&filter)) {
            Err(CaseError::TypeMismatch { column, .. }) => assert_eq!(column, "name"),
            other => panic!("expected TypeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn missing_column_reported() {
        let table = sample();
        match table.column("absent") {
            Err(CaseError::MissingColumn { table, column }) => {
                assert_eq!(table, "sample");
                assert_eq!(column, "absent");
            }
            other => panic!("expected MissingColumn, got {:?}", other),
        }
    }
}

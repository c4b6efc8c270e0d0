//! Relational case data backing a dispatch model
//!
//! A [`Case`] is a named collection of tables (buses, generators, branches,
//! transformers, demands) plus the system scalars, along with the per-period
//! time series tables used to refresh mutable parameters between solves.
pub mod derive;
pub mod table;

use indexmap::IndexMap;

pub use table::{CaseError, CmpOp, Filter, Table, Value};

use crate::case::derive::num_map_of;

/// Table names the standard registry expects to find
pub mod tables {
    pub const BUS: &str = "bus";
    pub const GENERATOR: &str = "generator";
    pub const BRANCH: &str = "branch";
    pub const TRANSFORMER: &str = "transformer";
    pub const DEMAND: &str = "demand";
}

/// One network case: component tables, system scalars and time series
#[derive(Debug, Clone, Default)]
pub struct Case {
    tables: IndexMap<String, Table>,
    /// System base power in MVA; all MW quantities are divided by this
    base_power: f64,
    /// Cap on the non-synchronous share of served demand, in [0, 1]
    snsp_limit: Option<f64>,
    /// Ordered labels of the periods to dispatch
    iterations: Vec<String>,
}

impl Case {
    pub fn new(base_power: f64) -> Self {
        Case {
            base_power,
            ..Default::default()
        }
    }

    /// Insert a table, replacing any table of the same name
    pub fn insert_table(&mut self, table: Table) {
        self.tables.insert(table.name().to_string(), table);
    }

    pub fn table(&self, name: &str) -> Result<&Table, CaseError> {
        self.tables
            .get(name)
            .ok_or_else(|| CaseError::MissingTable(name.to_string()))
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn base_power(&self) -> f64 {
        self.base_power
    }

    pub fn set_base_power(&mut self, base_power: f64) {
        self.base_power = base_power;
    }

    pub fn snsp_limit(&self) -> Option<f64> {
        self.snsp_limit
    }

    pub fn set_snsp_limit(&mut self, limit: Option<f64>) {
        self.snsp_limit = limit;
    }

    pub fn set_iterations(&mut self, labels: Vec<String>) {
        self.iterations = labels;
    }

    /// Period labels to dispatch; a case with no explicit periods has one
    pub fn iteration_labels(&self) -> Vec<String> {
        if self.iterations.is_empty() {
            vec!["t0".to_string()]
        } else {
            self.iterations.clone()
        }
    }

    /// Per-component values of a time series table for one period column.
    ///
    /// Time series tables are keyed by component name with one numeric
    /// column per period label.
    pub fn ts_map(&self, ts_table: &str, period: &str) -> Result<IndexMap<String, f64>, CaseError> {
        let table = self.table(ts_table)?;
        num_map_of(table, "name", period, None)
    }

    /// Same, scaled to per-unit on the system base
    pub fn ts_map_scaled(
        &self,
        ts_table: &str,
        period: &str,
    ) -> Result<IndexMap<String, f64>, CaseError> {
        Ok(self
            .ts_map(ts_table, period)?
            .into_iter()
            .map(|(k, v)| (k, v / self.base_power))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_table_is_reported() {
        let case = Case::new(100.0);
        let err = case.table("bus").unwrap_err();
        assert!(matches!(err, CaseError::MissingTable(name) if name == "bus"));
    }

    #[test]
    fn default_iteration_label() {
        let case = Case::new(100.0);
        assert_eq!(case.iteration_labels(), vec!["t0".to_string()]);
    }

    #[test]
    fn ts_map_reads_period_column() {
        let mut case = Case::new(100.0);
        case.insert_table(
            Table::new("ts_PD")
                .with_str_column("name", &["D1", "D2"])
                .with_num_column("t1", &[80.0, 20.0])
                .with_num_column("t2", &[60.0, 10.0]),
        );
        let map = case.ts_map_scaled("ts_PD", "t2").unwrap();
        assert!((map["D1"] - 0.6).abs() < 1e-12);
        assert!((map["D2"] - 0.1).abs() < 1e-12);
    }
}

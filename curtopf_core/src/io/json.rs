//! JSON loader for dispatch cases
//!
//! A case file is a single JSON object:
//!
//! ```json
//! {
//!   "baseMVA": 100.0,
//!   "snsp_limit": 0.75,
//!   "iterations": ["t1", "t2"],
//!   "tables": {
//!     "bus": [{"name": "B1", "baseKV": 110.0, "type": 3, "zone": 1}],
//!     "ts_PD": [{"name": "D1", "t1": 80.0, "t2": 60.0}]
//!   }
//! }
//! ```
//!
//! Each table is an array of row objects. Component tables carrying a `stat`
//! column have their out-of-service rows (`stat == 0`) dropped at load time;
//! time series tables (`ts_` prefix) are kept whole.
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::case::{Case, Table, Value};
use crate::io::IoError;

// region JSON case
/// A JSON serialized case, used for reading case files
#[derive(Serialize, Deserialize)]
struct JsonCase {
    #[serde(rename = "baseMVA")]
    base_mva: f64,
    snsp_limit: Option<f64>,
    iterations: Option<Vec<String>>,
    tables: IndexMap<String, Vec<IndexMap<String, JsonValue>>>,
}

impl JsonCase {
    fn read<P: AsRef<Path>>(path: P) -> Result<JsonCase, IoError> {
        let json_data = fs::read_to_string(&path)
            .map_err(|_| IoError::FileNotFound(path.as_ref().display().to_string()))?;
        serde_json::from_str(&json_data).map_err(|e| IoError::DeserializeError(e.to_string()))
    }
}
// endregion JSON case

// region Conversions
fn cell_value(table: &str, column: &str, value: &JsonValue) -> Result<Value, IoError> {
    match value {
        JsonValue::Null => Ok(Value::Null),
        JsonValue::String(s) => Ok(Value::Str(s.clone())),
        JsonValue::Number(n) => n
            .as_f64()
            .map(Value::Num)
            .ok_or_else(|| IoError::UnsupportedValue {
                table: table.to_string(),
                column: column.to_string(),
            }),
        _ => Err(IoError::UnsupportedValue {
            table: table.to_string(),
            column: column.to_string(),
        }),
    }
}

/// Build a [`Table`] from an array of row objects.
///
/// The column set is the union of keys across all rows, in first-seen order;
/// rows missing a column contribute a null cell.
fn table_from_rows(
    name: &str,
    rows: &[IndexMap<String, JsonValue>],
) -> Result<Table, IoError> {
    let mut column_names: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !column_names.iter().any(|c| c == key) {
                column_names.push(key.clone());
            }
        }
    }
    let mut table = Table::new(name);
    for column in &column_names {
        let mut values = Vec::with_capacity(rows.len());
        for row in rows {
            values.push(match row.get(column) {
                Some(v) => cell_value(name, column, v)?,
                None => Value::Null,
            });
        }
        table = table.with_column(column.clone(), values);
    }
    Ok(table)
}

/// Drop rows whose `stat` cell is zero; tables with no `stat` column pass
/// through untouched
fn drop_out_of_service(table: &mut Table) -> Result<(), IoError> {
    if !table.has_column("stat") {
        return Ok(());
    }
    let keep: Vec<usize> = table
        .column("stat")
        .map_err(|e| IoError::DeserializeError(e.to_string()))?
        .iter()
        .enumerate()
        .filter(|(_, v)| v.as_num().map(|n| n != 0.0).unwrap_or(true))
        .map(|(i, _)| i)
        .collect();
    table.retain_rows(&keep);
    Ok(())
}
// endregion Conversions

/// Read a case from a JSON file
pub fn load_case<P: AsRef<Path>>(path: P) -> Result<Case, IoError> {
    let json_case = JsonCase::read(path)?;
    let mut case = Case::new(json_case.base_mva);
    case.set_snsp_limit(json_case.snsp_limit);
    if let Some(iterations) = json_case.iterations {
        case.set_iterations(iterations);
    }
    for (name, rows) in &json_case.tables {
        let mut table = table_from_rows(name, rows)?;
        if !name.starts_with("ts_") {
            drop_out_of_service(&mut table)?;
        }
        case.insert_table(table);
    }
    Ok(case)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(json: &str) -> Vec<IndexMap<String, JsonValue>> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn table_union_of_row_keys() {
        let rows = rows(r#"[{"name": "G1", "bid": 5.0}, {"name": "G2"}]"#);
        let table = table_from_rows("generator", &rows).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.cell("bid", 1).unwrap().is_null());
    }

    #[test]
    fn out_of_service_rows_dropped() {
        let rows = rows(r#"[{"name": "L1", "stat": 1}, {"name": "L2", "stat": 0}]"#);
        let mut table = table_from_rows("branch", &rows).unwrap();
        drop_out_of_service(&mut table).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.cell("name", 0).unwrap().as_str(), Some("L1"));
    }

    #[test]
    fn full_case_round_trip_through_tempfile() {
        let json = r#"{
            "baseMVA": 100.0,
            "snsp_limit": 0.75,
            "iterations": ["t1"],
            "tables": {
                "bus": [{"name": "B1", "type": 3}],
                "ts_PD": [{"name": "D1", "t1": 80.0}]
            }
        }"#;
        let path = std::env::temp_dir().join("curtopf_case_test.json");
        fs::write(&path, json).unwrap();
        let case = load_case(&path).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(case.base_power(), 100.0);
        assert_eq!(case.snsp_limit(), Some(0.75));
        assert_eq!(case.iteration_labels(), vec!["t1".to_string()]);
        assert!(case.has_table("bus"));
        assert!((case.ts_map("ts_PD", "t1").unwrap()["D1"] - 80.0).abs() < 1e-12);
    }

    #[test]
    fn boolean_cell_rejected() {
        let rows = rows(r#"[{"name": "G1", "synchronous": true}]"#);
        match table_from_rows("generator", &rows) {
            Err(IoError::UnsupportedValue { table, column }) => {
                assert_eq!(table, "generator");
                assert_eq!(column, "synchronous");
            }
            other => panic!("expected UnsupportedValue, got {:?}", other.map(|_| ())),
        }
    }
}

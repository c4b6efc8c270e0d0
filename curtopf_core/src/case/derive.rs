//! Pure derivation helpers mapping case tables to model primitives
//!
//! Every function here is side-effect free: it takes tables (and an optional
//! row [`Filter`]) and produces the lists, mappings and pairings the model
//! registry initializers need. Nothing in this module touches a live model.
use indexmap::IndexMap;
use log::warn;

use crate::case::table::{CaseError, Filter, Table, Value};

/// Values of one column, optionally filtered
pub fn list_of(
    table: &Table,
    column: &str,
    filter: Option<&Filter>,
) -> Result<Vec<Value>, CaseError> {
    let indices = table.filtered_indices(filter)?;
    let col = table.column(column)?;
    Ok(indices.iter().map(|&i| col[i].clone()).collect())
}

/// Text values of one column, optionally filtered; null cells are dropped
pub fn text_list_of(
    table: &Table,
    column: &str,
    filter: Option<&Filter>,
) -> Result<Vec<String>, CaseError> {
    Ok(list_of(table, column, filter)?
        .iter()
        .filter_map(|v| v.key_text())
        .collect())
}

/// Mapping from a key column to a value column.
///
/// Duplicate keys resolve last-write-wins; each override is logged since it
/// usually points at a data problem rather than an intentional shadow.
pub fn map_of(
    table: &Table,
    key_column: &str,
    value_column: &str,
    filter: Option<&Filter>,
) -> Result<IndexMap<String, Value>, CaseError> {
    let indices = table.filtered_indices(filter)?;
    let keys = table.column(key_column)?;
    let values = table.column(value_column)?;
    let mut map = IndexMap::new();
    for &i in &indices {
        let key = match keys[i].key_text() {
            Some(k) => k,
            None => continue,
        };
        if map.insert(key.clone(), values[i].clone()).is_some() {
            warn!(
                "duplicate key '{}' in table '{}' column '{}'; keeping the later row",
                key,
                table.name(),
                key_column
            );
        }
    }
    Ok(map)
}

/// Numeric mapping from a key column to a value column
pub fn num_map_of(
    table: &Table,
    key_column: &str,
    value_column: &str,
    filter: Option<&Filter>,
) -> Result<IndexMap<String, f64>, CaseError> {
    map_of(table, key_column, value_column, filter)?
        .into_iter()
        .map(|(k, v)| {
            v.as_num()
                .map(|n| (k, n))
                .ok_or_else(|| CaseError::NotNumeric {
                    table: table.name().to_string(),
                    column: value_column.to_string(),
                })
        })
        .collect()
}

/// Numeric mapping with every value divided by the system base power
pub fn scaled_map_of(
    table: &Table,
    key_column: &str,
    value_column: &str,
    base_power: f64,
    filter: Option<&Filter>,
) -> Result<IndexMap<String, f64>, CaseError> {
    Ok(num_map_of(table, key_column, value_column, filter)?
        .into_iter()
        .map(|(k, v)| (k, v / base_power))
        .collect())
}

/// Mapping from every key in `key_table` to the matching rows of `value_table`.
///
/// Keys with no matching rows map to an empty list rather than being absent;
/// constraint rules iterate these lists per key and an absent key would be an
/// error, not a skip.
pub fn complete_map(
    key_table: &Table,
    key_column: &str,
    value_table: &Table,
    value_column: &str,
    join_column: &str,
    filter: Option<&Filter>,
) -> Result<IndexMap<String, Vec<String>>, CaseError> {
    let mut map: IndexMap<String, Vec<String>> = IndexMap::new();
    for key in text_list_of(key_table, key_column, None)? {
        map.entry(key).or_default();
    }
    let indices = value_table.filtered_indices(filter)?;
    let joins = value_table.column(join_column)?;
    let values = value_table.column(value_column)?;
    for &i in &indices {
        let (join, value) = match (joins[i].key_text(), values[i].key_text()) {
            (Some(j), Some(v)) => (j, v),
            _ => continue,
        };
        map.entry(join).or_default().push(value);
    }
    Ok(map)
}

/// Distinct trimmed tokens of a comma-delimited column, in first-seen order.
/// Null cells contribute nothing.
pub fn groups_of(
    table: &Table,
    column: &str,
    filter: Option<&Filter>,
) -> Result<Vec<String>, CaseError> {
    let indices = table.filtered_indices(filter)?;
    let col = table.column(column)?;
    let mut groups: Vec<String> = Vec::new();
    for &i in &indices {
        let text = match col[i].as_str() {
            Some(t) => t,
            None => continue,
        };
        for token in text.split(',') {
            let token = token.trim();
            if !token.is_empty() && !groups.iter().any(|g| g == token) {
                groups.push(token.to_string());
            }
        }
    }
    Ok(groups)
}

/// Mapping from a row id to the trimmed tokens of its comma-delimited cell.
/// Rows with a null cell are dropped, not an error.
pub fn group_map_of(
    table: &Table,
    id_column: &str,
    comma_column: &str,
    filter: Option<&Filter>,
) -> Result<IndexMap<String, Vec<String>>, CaseError> {
    let indices = table.filtered_indices(filter)?;
    let ids = table.column(id_column)?;
    let cells = table.column(comma_column)?;
    let mut map = IndexMap::new();
    for &i in &indices {
        let id = match ids[i].key_text() {
            Some(id) => id,
            None => continue,
        };
        let text = match cells[i].as_str() {
            Some(t) => t,
            None => continue,
        };
        let tokens: Vec<String> = text
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        map.insert(id, tokens);
    }
    Ok(map)
}

/// All ordered 2-combinations within each group, sorted by the order column.
///
/// Rows are grouped by `group_column`, sorted ascending by `order_column`,
/// and each group contributes every pair `(a, b)` where `a` precedes `b` in
/// that order. Empty and singleton groups contribute nothing. Rows with a
/// null group cell are skipped.
pub fn ordered_pairs(
    table: &Table,
    id_column: &str,
    group_column: &str,
    order_column: &str,
    filter: Option<&Filter>,
) -> Result<Vec<(String, String)>, CaseError> {
    let indices = table.filtered_indices(filter)?;
    let ids = table.column(id_column)?;
    let groups = table.column(group_column)?;
    let orders = table.column(order_column)?;

    let mut by_group: IndexMap<String, Vec<(f64, String)>> = IndexMap::new();
    for &i in &indices {
        let group = match groups[i].as_str() {
            Some(g) => g.to_string(),
            None => continue,
        };
        let id = match ids[i].key_text() {
            Some(id) => id,
            None => continue,
        };
        let order = orders[i].as_num().ok_or_else(|| CaseError::NotNumeric {
            table: table.name().to_string(),
            column: order_column.to_string(),
        })?;
        by_group.entry(group).or_default().push((order, id));
    }

    let mut pairs = Vec::new();
    for members in by_group.values_mut() {
        members.sort_by(|a, b| a.0.total_cmp(&b.0));
        for i in 0..members.len() {
            for j in (i + 1)..members.len() {
                pairs.push((members[i].1.clone(), members[j].1.clone()));
            }
        }
    }
    Ok(pairs)
}

/// Flatten an id -> groups mapping into (id, group) pairs, in mapping order
pub fn flatten_pairs(map: &IndexMap<String, Vec<String>>) -> Vec<(String, String)> {
    map.iter()
        .flat_map(|(id, groups)| groups.iter().map(move |g| (id.clone(), g.clone())))
        .collect()
}

/// Mapping from a row id to the ordered tuple of the listed columns' values
/// (e.g. a line id to its (from-bus, to-bus) pair)
pub fn zipped_map(
    table: &Table,
    id_column: &str,
    columns: &[&str],
    filter: Option<&Filter>,
) -> Result<IndexMap<String, Vec<String>>, CaseError> {
    let indices = table.filtered_indices(filter)?;
    let ids = table.column(id_column)?;
    let cols: Vec<&[Value]> = columns
        .iter()
        .map(|c| table.column(c))
        .collect::<Result<_, _>>()?;
    let mut map = IndexMap::new();
    for &i in &indices {
        let id = match ids[i].key_text() {
            Some(id) => id,
            None => continue,
        };
        let tuple: Vec<String> = cols
            .iter()
            .filter_map(|col| col[i].key_text())
            .collect();
        map.insert(id, tuple);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::table::Value;

    fn buses() -> Table {
        Table::new("bus").with_str_column("name", &["B1", "B2", "B3"])
    }

    fn branches() -> Table {
        Table::new("branch")
            .with_str_column("name", &["L1"])
            .with_str_column("from_busname", &["B1"])
            .with_str_column("to_busname", &["B2"])
    }

    #[test]
    fn list_of_with_numeric_filter() {
        let table = Table::new("t")
            .with_num_column("id", &[1.0, 2.0])
            .with_num_column("x", &[5.0, -3.0]);
        let filter = Filter::num("x", "<", 0.0).unwrap();
        let ids = list_of(&table, "id", Some(&filter)).unwrap();
        assert_eq!(ids, vec![Value::Num(2.0)]);
    }

    #[test]
    fn complete_map_keeps_unmatched_keys() {
        let map = complete_map(&buses(), "name", &branches(), "name", "to_busname", None).unwrap();
        assert_eq!(map["B2"], vec!["L1".to_string()]);
        assert!(map["B1"].is_empty());
        assert!(map["B3"].is_empty(), "B3 must be present with an empty list");
    }

    #[test]
    fn map_of_last_write_wins() {
        let table = Table::new("t")
            .with_str_column("name", &["g", "g"])
            .with_num_column("v", &[1.0, 2.0]);
        let map = num_map_of(&table, "name", "v", None).unwrap();
        assert_eq!(map.len(), 1);
        assert!((map["g"] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn scaled_map_divides_by_base_power() {
        let table = Table::new("t")
            .with_str_column("name", &["g"])
            .with_num_column("PGUB", &[80.0]);
        let map = scaled_map_of(&table, "name", "PGUB", 100.0, None).unwrap();
        assert!((map["g"] - 0.8).abs() < 1e-12);
    }

    #[test]
    fn groups_split_trim_and_dedupe() {
        let table = Table::new("generator").with_column(
            "prorata_groups",
            vec![
                Value::str("A, B"),
                Value::Null,
                Value::str("B,C"),
            ],
        );
        let groups = groups_of(&table, "prorata_groups", None).unwrap();
        assert_eq!(groups, vec!["A", "B", "C"]);
    }

    #[test]
    fn group_map_drops_null_rows() {
        let table = Table::new("generator")
            .with_str_column("name", &["G1", "G2"])
            .with_column("prorata_groups", vec![Value::str("A,B"), Value::Null]);
        let map = group_map_of(&table, "name", "prorata_groups", None).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["G1"], vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn ordered_pairs_follow_position_order()  {
        let table = Table::new("generator")
            .with_str_column("name", &["G2", "G1"])
            .with_str_column("lifo_group", &["A", "A"])
            .with_num_column("lifo_position", &[2.0, 1.0]);
        let pairs = ordered_pairs(&table, "name", "lifo_group", "lifo_position", None).unwrap();
        assert_eq!(pairs, vec![("G1".to_string(), "G2".to_string())]);
    }

    #[test]
    fn ordered_pairs_singleton_group_empty() {
        let table = Table::new("generator")
            .with_str_column("name", &["G1"])
            .with_str_column("lifo_group", &["A"])
            .with_num_column("lifo_position", &[1.0]);
        let pairs = ordered_pairs(&table, "name", "lifo_group", "lifo_position", None).unwrap();
        assert!(pairs.is_empty());
    }

    #[test]
    fn flatten_pairs_preserves_order() {
        let mut map = IndexMap::new();
        map.insert("G1".to_string(), vec!["A".to_string(), "B".to_string()]);
        map.insert("G2".to_string(), vec!["B".to_string()]);
        let pairs = flatten_pairs(&map);
        assert_eq!(
            pairs,
            vec![
                ("G1".to_string(), "A".to_string()),
                ("G1".to_string(), "B".to_string()),
                ("G2".to_string(), "B".to_string()),
            ]
        );
    }

    #[test]
    fn zipped_map_orders_endpoints() {
        let map = zipped_map(&branches(), "name", &["from_busname", "to_busname"], None).unwrap();
        assert_eq!(map["L1"], vec!["B1".to_string(), "B2".to_string()]);
    }
}

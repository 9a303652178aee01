//! Drill-down / roll-up stage: groups the selected rows by the hierarchy
//! levels and reduces every measure with its declared function.

use std::collections::HashMap;

use crate::cube::coercion::CoercedMeasures;
use crate::cube::column::{Column, ColumnType};
use crate::cube::hierarchy::Hierarchy;
use crate::cube::schema::MeasureSpec;
use crate::cube::snapshot::Snapshot;
use crate::cube::{AggregateOp, SchemaError, Value};

/// One output group: the key values (one per hierarchy level) followed by
/// the reduced measures (one per declared measure).
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub key: Vec<Value>,
    /// `None` for a MEAN over a group with no present values
    pub measures: Vec<Option<f64>>,
}

/// Ordered query output. Rows are unique by key and sorted ascending by key,
/// comparing levels left to right.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub hierarchy: Hierarchy,
    pub group_columns: Vec<String>,
    pub group_types: Vec<ColumnType>,
    pub measures: Vec<MeasureSpec>,
    pub rows: Vec<ResultRow>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// `true` when the filters excluded every row; not an error
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn measure_columns(&self) -> Vec<&str> {
        self.measures.iter().map(|m| m.column.as_str()).collect()
    }

    /// Cell lookup by column name, group or measure
    pub fn value(&self, row: usize, column: &str) -> Option<Value> {
        let row = self.rows.get(row)?;
        if let Some(idx) = self.group_columns.iter().position(|c| c == column) {
            return row.key.get(idx).cloned();
        }
        let idx = self.measures.iter().position(|m| m.column == column)?;
        row.measures.get(idx).map(|v| Value::from(*v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &[Value]> {
        self.rows.iter().map(|r| r.key.as_slice())
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    sum: f64,
    count: usize,
}

impl Accumulator {
    fn update(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.sum += v;
            self.count += 1;
        }
    }

    fn finish(self, op: AggregateOp) -> Option<f64> {
        match op {
            AggregateOp::Sum => Some(self.sum),
            AggregateOp::Mean if self.count == 0 => None,
            AggregateOp::Mean => Some(self.sum / self.count as f64),
        }
    }
}

/// Groups `rows` by the levels of `hierarchy` and reduces each measure.
///
/// Accumulation follows `rows` order, so identical inputs give bit-identical
/// output. An empty `rows` gives an empty result.
///
/// # Errors
/// [`SchemaError::MissingColumn`] when a hierarchy level is absent from the
/// snapshot.
pub fn aggregate(
    snapshot: &Snapshot,
    hierarchy: Hierarchy,
    measures: &[MeasureSpec],
    coerced: &CoercedMeasures,
    rows: &[usize],
) -> Result<QueryResult, SchemaError> {
    let group_cols: Vec<(&str, &Column)> = hierarchy
        .levels()
        .iter()
        .map(|d| snapshot.get_col(d.column()).map(|col| (d.column(), col)))
        .collect::<Result<_, _>>()?;

    let mut index: HashMap<Vec<Value>, usize> = HashMap::new();
    let mut groups: Vec<(Vec<Value>, Vec<Accumulator>)> = Vec::new();

    for &row in rows {
        let key: Vec<Value> = group_cols.iter().map(|(_, col)| col.value(row)).collect();
        let slot = match index.get(&key) {
            Some(&slot) => slot,
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![Accumulator::default(); measures.len()]));
                groups.len() - 1
            }
        };

        let accumulators = &mut groups[slot].1;
        for (measure_idx, acc) in accumulators.iter_mut().enumerate() {
            acc.update(coerced.column(measure_idx).get(row).copied().flatten());
        }
    }

    groups.sort_unstable_by(|a, b| a.0.cmp(&b.0));

    let rows = groups
        .into_iter()
        .map(|(key, accumulators)| ResultRow {
            key,
            measures: accumulators
                .into_iter()
                .zip(measures)
                .map(|(acc, m)| acc.finish(m.op))
                .collect(),
        })
        .collect();

    Ok(QueryResult {
        hierarchy,
        group_columns: group_cols.iter().map(|(name, _)| name.to_string()).collect(),
        group_types: group_cols.iter().map(|(_, col)| col.column_type()).collect(),
        measures: measures.to_vec(),
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cube::coercion::coerce;

    fn snapshot() -> Snapshot {
        Snapshot::from_rows(
            &["anio", "producto", "cpi", "sv"],
            vec![
                vec![Value::Int(2024), Value::from("A"), Value::Float(1.0), Value::Int(5)],
                vec![Value::Int(2023), Value::from("B"), Value::Float(1.2), Value::Int(2)],
                vec![Value::Int(2023), Value::from("A"), Value::Float(0.8), Value::Int(1)],
                vec![Value::Int(2023), Value::from("A"), Value::Null, Value::Null],
            ],
        )
        .unwrap()
    }

    fn run(hierarchy: Hierarchy, rows: &[usize]) -> QueryResult {
        let snap = snapshot();
        let measures = vec![MeasureSpec::mean("cpi"), MeasureSpec::sum("sv")];
        let coerced = coerce(&snap, &measures).unwrap();
        aggregate(&snap, hierarchy, &measures, &coerced, rows).unwrap()
    }

    #[test]
    fn test_group_by_single_level() {
        let result = run(Hierarchy::Anio, &[0, 1, 2, 3]);
        assert_eq!(result.group_columns, vec!["anio"]);
        assert_eq!(result.group_types, vec![ColumnType::Int64]);
        assert_eq!(
            result.rows,
            vec![
                ResultRow {
                    key: vec![Value::Int(2023)],
                    measures: vec![Some(1.0), Some(3.0)],
                },
                ResultRow {
                    key: vec![Value::Int(2024)],
                    measures: vec![Some(1.0), Some(5.0)],
                },
            ]
        );
    }

    #[test]
    fn test_level_order_changes_output() {
        let snap = snapshot();
        let measures = vec![MeasureSpec::sum("sv")];
        let coerced = coerce(&snap, &measures).unwrap();
        let by_year_product =
            aggregate(&snap, Hierarchy::AnioProducto, &measures, &coerced, &[0, 1, 2]).unwrap();
        let keys: Vec<_> = by_year_product.keys().map(|k| k.to_vec()).collect();
        assert_eq!(
            keys,
            vec![
                vec![Value::Int(2023), Value::from("A")],
                vec![Value::Int(2023), Value::from("B")],
                vec![Value::Int(2024), Value::from("A")],
            ]
        );
        assert_eq!(by_year_product.group_columns, vec!["anio", "producto"]);
    }

    #[test]
    fn test_all_null_group() {
        let result = run(Hierarchy::Anio, &[3]);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].measures, vec![None, Some(0.0)]);
    }

    #[test]
    fn test_empty_rows_give_empty_result() {
        let result = run(Hierarchy::AnioProducto, &[]);
        assert!(result.is_empty());
        assert_eq!(result.measure_columns(), vec!["cpi", "sv"]);
    }

    #[test]
    fn test_missing_level_column() {
        let snap = snapshot();
        let coerced = coerce(&snap, &[]).unwrap();
        let err = aggregate(&snap, Hierarchy::Proyecto, &[], &coerced, &[0]).unwrap_err();
        assert_eq!(err, SchemaError::MissingColumn("proyecto".into()));
    }

    #[test]
    fn test_value_lookup() {
        let result = run(Hierarchy::Anio, &[0, 1, 2, 3]);
        assert_eq!(result.value(0, "anio"), Some(Value::Int(2023)));
        assert_eq!(result.value(1, "sv"), Some(Value::Float(5.0)));
        assert_eq!(result.value(0, "nope"), None);
        assert_eq!(result.value(9, "anio"), None);
    }
}

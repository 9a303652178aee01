//! Slice/dice stage: conjunctive equality filters over dimension columns.

use std::collections::BTreeMap;
use tracing::debug;

use crate::cube::SchemaError;
use crate::cube::Value;
use crate::cube::column::{Column, ColumnType};
use crate::cube::schema::Dimension;
use crate::cube::snapshot::Snapshot;

/// Sparse dimension → value map. Absent dimensions impose no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FilterSet {
    entries: BTreeMap<Dimension, Value>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets or clears (`Value::Null` / `None`) the filter on `dimension`
    pub fn set(&mut self, dimension: Dimension, value: impl Into<Value>) {
        match value.into() {
            Value::Null => {
                self.entries.remove(&dimension);
            }
            value => {
                self.entries.insert(dimension, value);
            }
        }
    }

    pub fn with(mut self, dimension: Dimension, value: impl Into<Value>) -> Self {
        self.set(dimension, value);
        self
    }

    pub fn anio(self, year: i64) -> Self {
        self.with(Dimension::Anio, year)
    }

    pub fn producto(self, product: &str) -> Self {
        self.with(Dimension::Producto, product)
    }

    pub fn proyecto(self, project: &str) -> Self {
        self.with(Dimension::Proyecto, project)
    }

    pub fn get(&self, dimension: Dimension) -> Option<&Value> {
        self.entries.get(&dimension)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dimension, &Value)> {
        self.entries.iter().map(|(d, v)| (*d, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `true` when every constraint of `self` also appears in `other`
    pub fn is_subset_of(&self, other: &FilterSet) -> bool {
        self.iter().all(|(d, v)| other.get(d) == Some(v))
    }
}

/// Indices of the rows satisfying every filter entry, in snapshot order.
///
/// An empty filter set selects every row. A value whose type differs from
/// the column type matches nothing.
///
/// # Errors
/// [`SchemaError::MissingColumn`] when a filtered dimension is absent from
/// the snapshot.
pub fn apply(snapshot: &Snapshot, filters: &FilterSet) -> Result<Vec<usize>, SchemaError> {
    let predicates: Vec<(&Column, &Value)> = filters
        .iter()
        .map(|(dim, value)| snapshot.get_col(dim.column()).map(|col| (col, value)))
        .collect::<Result<_, _>>()?;

    for (dim, value) in filters.iter() {
        if value_type(value) != Some(dim.expected_type()) {
            debug!(dimension = %dim, %value, "filter value type differs from dimension type");
        }
    }

    let rows = 0..snapshot.row_count();
    if predicates.is_empty() {
        return Ok(rows.collect());
    }

    Ok(rows
        .filter(|&i| predicates.iter().all(|(col, value)| col.matches(i, value)))
        .collect())
}

fn value_type(value: &Value) -> Option<ColumnType> {
    match value {
        Value::Null => None,
        Value::Int(_) => Some(ColumnType::Int64),
        Value::Float(_) => Some(ColumnType::Float64),
        Value::Str(_) => Some(ColumnType::Str),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> Snapshot {
        Snapshot::from_rows(
            &["anio", "producto", "cpi"],
            vec![
                vec![Value::Int(2023), Value::from("A"), Value::Float(0.8)],
                vec![Value::Int(2023), Value::from("B"), Value::Float(1.2)],
                vec![Value::Int(2024), Value::from("A"), Value::Float(1.0)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_empty_filter_is_identity() {
        assert_eq!(apply(&snapshot(), &FilterSet::new()).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_conjunction_preserves_order() {
        let snap = snapshot();
        assert_eq!(apply(&snap, &FilterSet::new().producto("A")).unwrap(), vec![0, 2]);
        assert_eq!(
            apply(&snap, &FilterSet::new().producto("A").anio(2024)).unwrap(),
            vec![2]
        );
    }

    #[test]
    fn test_no_match_is_empty_not_error() {
        assert!(apply(&snapshot(), &FilterSet::new().anio(1999)).unwrap().is_empty());
    }

    #[test]
    fn test_type_mismatch_matches_nothing() {
        let filters = FilterSet::new().with(Dimension::Anio, "2023");
        assert!(apply(&snapshot(), &filters).unwrap().is_empty());
    }

    #[test]
    fn test_value_type_against_dimension() {
        assert_eq!(value_type(&Value::Int(2023)), Some(Dimension::Anio.expected_type()));
        assert_eq!(value_type(&Value::from("A")), Some(Dimension::Producto.expected_type()));
        assert_eq!(value_type(&Value::Null), None);
    }

    #[test]
    fn test_missing_dimension_column() {
        let err = apply(&snapshot(), &FilterSet::new().proyecto("P1")).unwrap_err();
        assert_eq!(err, SchemaError::MissingColumn("proyecto".into()));
    }

    #[test]
    fn test_null_clears_entry() {
        let mut filters = FilterSet::new().anio(2023);
        filters.set(Dimension::Anio, None::<i64>);
        assert!(filters.is_empty());
    }

    #[test]
    fn test_subset() {
        let loose = FilterSet::new().anio(2023);
        let strict = FilterSet::new().anio(2023).producto("A");
        assert!(loose.is_subset_of(&strict));
        assert!(!strict.is_subset_of(&loose));
        assert!(FilterSet::new().is_subset_of(&loose));
    }
}

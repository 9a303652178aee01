use crate::cube::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Int64,
    Float64,
    Str,
}

/// Nullable typed column. Snapshot columns are never mutated after ingestion.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Int64(Vec<Option<i64>>),
    Float64(Vec<Option<f64>>),
    Str(Vec<Option<String>>),
}

impl Column {
    pub fn new(column_type: ColumnType, capacity: usize) -> Self {
        match column_type {
            ColumnType::Int64 => Column::Int64(Vec::with_capacity(capacity)),
            ColumnType::Float64 => Column::Float64(Vec::with_capacity(capacity)),
            ColumnType::Str => Column::Str(Vec::with_capacity(capacity)),
        }
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            Column::Int64(_) => ColumnType::Int64,
            Column::Float64(_) => ColumnType::Float64,
            Column::Str(_) => ColumnType::Str,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Int64(v) => v.len(),
            Column::Float64(v) => v.len(),
            Column::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Owned value at `idx`; out-of-range reads yield `Null`.
    pub fn value(&self, idx: usize) -> Value {
        match self {
            Column::Int64(v) => v.get(idx).copied().flatten().into(),
            Column::Float64(v) => v.get(idx).copied().flatten().into(),
            Column::Str(v) => v.get(idx).cloned().flatten().into(),
        }
    }

    /// Equality test against a filter value without materialising the cell.
    /// Mismatched types never match.
    pub fn matches(&self, idx: usize, target: &Value) -> bool {
        match (self, target) {
            (Column::Int64(v), Value::Int(t)) => v.get(idx).copied().flatten() == Some(*t),
            (Column::Float64(v), Value::Float(t)) => v
                .get(idx)
                .copied()
                .flatten()
                .is_some_and(|x| x.to_bits() == t.to_bits()),
            (Column::Str(v), Value::Str(t)) => {
                v.get(idx).and_then(|s| s.as_deref()) == Some(t.as_str())
            }
            _ => false,
        }
    }

    /// Re-types an Int64 column as Float64 in place. Other columns are left
    /// as they are.
    pub fn widen_to_float(&mut self) {
        let widened = match self {
            Column::Int64(v) => v.iter().map(|x| x.map(|i| i as f64)).collect(),
            _ => return,
        };
        *self = Column::Float64(widened);
    }

    /// Appends a value, widening to Float64 when ints and floats meet.
    /// Returns `false` if the value cannot be stored in this column.
    pub fn push(&mut self, value: Value) -> bool {
        if matches!((&*self, &value), (Column::Int64(_), Value::Float(_))) {
            self.widen_to_float();
        }
        match (self, value) {
            (Column::Int64(v), Value::Int(x)) => v.push(Some(x)),
            (Column::Int64(v), Value::Null) => v.push(None),
            (Column::Float64(v), Value::Float(x)) => v.push(Some(x)),
            (Column::Float64(v), Value::Int(x)) => v.push(Some(x as f64)),
            (Column::Float64(v), Value::Null) => v.push(None),
            (Column::Str(v), Value::Str(x)) => v.push(Some(x)),
            (Column::Str(v), Value::Null) => v.push(None),
            _ => return false,
        }
        true
    }

    /// Moves the contents of `other` onto the end of `self`. Int64 and
    /// Float64 columns meet as Float64; strings only join strings.
    pub fn append(&mut self, other: &mut Column) -> bool {
        match (self.column_type(), other.column_type()) {
            (ColumnType::Int64, ColumnType::Float64) => self.widen_to_float(),
            (ColumnType::Float64, ColumnType::Int64) => other.widen_to_float(),
            _ => {}
        }
        match (self, other) {
            (Column::Int64(a), Column::Int64(b)) => a.append(b),
            (Column::Float64(a), Column::Float64(b)) => a.append(b),
            (Column::Str(a), Column::Str(b)) => a.append(b),
            _ => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_widens_int_into_float_column() {
        let mut col = Column::new(ColumnType::Float64, 2);
        assert!(col.push(Value::Int(3)));
        assert!(col.push(Value::Null));
        assert_eq!(col, Column::Float64(vec![Some(3.0), None]));
        assert!(!col.push(Value::from("x")));
    }

    #[test]
    fn test_push_float_widens_int_column() {
        let mut col = Column::new(ColumnType::Int64, 3);
        assert!(col.push(Value::Int(1)));
        assert!(col.push(Value::Null));
        assert!(col.push(Value::Float(1.5)));
        assert_eq!(col, Column::Float64(vec![Some(1.0), None, Some(1.5)]));
    }

    #[test]
    fn test_append_mixed_numeric_chunks() {
        let mut ints = Column::Int64(vec![Some(1), Some(2)]);
        let mut floats = Column::Float64(vec![Some(0.5)]);
        assert!(ints.append(&mut floats));
        assert_eq!(ints, Column::Float64(vec![Some(1.0), Some(2.0), Some(0.5)]));

        let mut floats = Column::Float64(vec![Some(0.5)]);
        let mut ints = Column::Int64(vec![Some(3)]);
        assert!(floats.append(&mut ints));
        assert_eq!(floats, Column::Float64(vec![Some(0.5), Some(3.0)]));

        let mut names = Column::Str(vec![Some("A".into())]);
        assert!(!names.append(&mut Column::Int64(vec![Some(1)])));
    }

    #[test]
    fn test_matches_is_type_strict() {
        let years = Column::Int64(vec![Some(2023), None]);
        assert!(years.matches(0, &Value::Int(2023)));
        assert!(!years.matches(0, &Value::Float(2023.0)));
        assert!(!years.matches(1, &Value::Int(2023)));
        assert!(!years.matches(5, &Value::Int(2023)));
    }

    #[test]
    fn test_value_reads_null_for_missing_cells() {
        let names = Column::Str(vec![Some("A".to_string()), None]);
        assert_eq!(names.value(0), Value::from("A"));
        assert_eq!(names.value(1), Value::Null);
        assert_eq!(names.value(9), Value::Null);
    }
}

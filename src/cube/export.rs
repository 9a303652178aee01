//! Conversions of a [`QueryResult`] for downstream consumers: JSON records for
//! API/dashboard layers and Arrow chunks for columnar ones.

use arrow2::{
    array::{Array, Float64Array, Int64Array, MutableUtf8Array, Utf8Array},
    chunk::Chunk,
    datatypes::{DataType, Field, Schema},
};
use serde_json::{Map, Number, Value as JsonValue};
use std::sync::Arc;

use crate::cube::Value;
use crate::cube::aggregation::QueryResult;
use crate::cube::column::ColumnType;

fn to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Int(v) => JsonValue::from(*v),
        Value::Float(v) => float_to_json(Some(*v)),
        Value::Str(v) => JsonValue::String(v.clone()),
    }
}

/// Non-finite floats have no JSON form and become null
fn float_to_json(value: Option<f64>) -> JsonValue {
    value
        .and_then(Number::from_f64)
        .map_or(JsonValue::Null, JsonValue::Number)
}

impl QueryResult {
    /// One JSON object per row: group columns first, then measures, in
    /// declaration order.
    pub fn to_records(&self) -> Vec<Map<String, JsonValue>> {
        self.rows
            .iter()
            .map(|row| {
                let mut record = Map::with_capacity(self.group_columns.len() + self.measures.len());
                for (name, value) in self.group_columns.iter().zip(&row.key) {
                    record.insert(name.clone(), to_json(value));
                }
                for (measure, value) in self.measures.iter().zip(&row.measures) {
                    record.insert(measure.column.clone(), float_to_json(*value));
                }
                record
            })
            .collect()
    }

    /// Arrow schema and a single chunk holding every result row.
    pub fn to_arrow(&self) -> (Schema, Chunk<Arc<dyn Array>>) {
        let mut fields: Vec<Field> = self
            .group_columns
            .iter()
            .zip(&self.group_types)
            .map(|(name, column_type)| {
                let dtype = match column_type {
                    ColumnType::Int64 => DataType::Int64,
                    ColumnType::Float64 => DataType::Float64,
                    ColumnType::Str => DataType::Utf8,
                };
                Field::new(name, dtype, true)
            })
            .collect();
        fields.extend(
            self.measures
                .iter()
                .map(|m| Field::new(&m.column, DataType::Float64, true)),
        );

        let mut arrays: Vec<Arc<dyn Array>> = self
            .group_types
            .iter()
            .enumerate()
            .map(|(level, column_type)| {
                let cells = self.rows.iter().map(|r| &r.key[level]);
                match column_type {
                    ColumnType::Int64 => {
                        let values: Vec<Option<i64>> = cells
                            .map(|v| match v {
                                Value::Int(x) => Some(*x),
                                _ => None,
                            })
                            .collect();
                        Arc::new(Int64Array::from(values)) as Arc<dyn Array>
                    }
                    ColumnType::Float64 => {
                        let values: Vec<Option<f64>> = cells
                            .map(|v| match v {
                                Value::Float(x) => Some(*x),
                                _ => None,
                            })
                            .collect();
                        Arc::new(Float64Array::from(values)) as Arc<dyn Array>
                    }
                    ColumnType::Str => {
                        let mut arr = MutableUtf8Array::<i32>::with_capacity(self.rows.len());
                        for value in cells {
                            match value {
                                Value::Str(s) => arr.push(Some(s.as_str())),
                                _ => arr.push::<&str>(None),
                            }
                        }
                        let array: Utf8Array<i32> = arr.into();
                        Arc::new(array) as Arc<dyn Array>
                    }
                }
            })
            .collect();

        arrays.extend((0..self.measures.len()).map(|idx| {
            let values: Vec<Option<f64>> = self.rows.iter().map(|r| r.measures[idx]).collect();
            Arc::new(Float64Array::from(values)) as Arc<dyn Array>
        }));

        (Schema::from(fields), Chunk::new(arrays))
    }
}

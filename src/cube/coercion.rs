//! Type coercion stage: widens every declared measure column to `f64`.
//!
//! The result is a per-query view; the snapshot itself is never touched.

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::cube::SchemaError;
use crate::cube::column::Column;
use crate::cube::schema::MeasureSpec;
use crate::cube::snapshot::Snapshot;

/// Measure values widened to `f64`, one column per declared measure in
/// declaration order. `None` marks an absent value.
#[derive(Debug, Clone, PartialEq)]
pub struct CoercedMeasures {
    columns: Vec<Vec<Option<f64>>>,
}

impl CoercedMeasures {
    pub fn column(&self, measure_idx: usize) -> &[Option<f64>] {
        &self.columns[measure_idx]
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Casts each declared measure column to `f64`.
///
/// # Errors
/// [`SchemaError::MissingColumn`] for a declared measure absent from the
/// snapshot, [`SchemaError::NonNumericMeasure`] for a string cell that does
/// not parse as a number.
pub fn coerce(
    snapshot: &Snapshot,
    measures: &[MeasureSpec],
) -> Result<CoercedMeasures, SchemaError> {
    let sources = measures
        .iter()
        .map(|m| snapshot.get_col(&m.column).map(|col| (m.column.as_str(), col)))
        .collect::<Result<Vec<_>, _>>()?;

    // Collected before short-circuiting so the reported error does not
    // depend on thread scheduling.
    let results: Vec<Result<Vec<Option<f64>>, SchemaError>> = sources
        .par_iter()
        .map(|(name, col)| widen(name, col))
        .collect();

    let columns = results.into_iter().collect::<Result<Vec<_>, _>>()?;
    Ok(CoercedMeasures { columns })
}

fn widen(name: &str, column: &Column) -> Result<Vec<Option<f64>>, SchemaError> {
    match column {
        Column::Float64(values) => Ok(values.clone()),
        Column::Int64(values) => Ok(values.iter().map(|v| v.map(|x| x as f64)).collect()),
        Column::Str(values) => values
            .iter()
            .enumerate()
            .map(|(row, v)| match v.as_deref().map(str::trim) {
                None | Some("") => Ok(None),
                Some(s) => fast_float::parse::<f64, _>(s).map(Some).map_err(|_| {
                    SchemaError::NonNumericMeasure {
                        column: name.to_string(),
                        row,
                        value: s.to_string(),
                    }
                }),
            })
            .collect(),
    }
}

//! Schema contract: the fixed dimension set, the declared measures and the
//! aggregation function of each measure.

use std::fmt;

use crate::cube::AggregateOp;
use crate::cube::column::ColumnType;
use crate::cube::snapshot::Snapshot;

/// Closed set of dimension columns a cube can be grouped or filtered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Dimension {
    /// Completion year (integer)
    Anio,
    /// Product line (string)
    Producto,
    /// Project identifier (string)
    Proyecto,
}

impl Dimension {
    pub const ALL: [Dimension; 3] = [Dimension::Anio, Dimension::Producto, Dimension::Proyecto];

    /// Normalised (lower-case) snapshot column name
    pub fn column(self) -> &'static str {
        match self {
            Dimension::Anio => "anio",
            Dimension::Producto => "producto",
            Dimension::Proyecto => "proyecto",
        }
    }

    /// Scalar type filter values are expected to carry
    pub fn expected_type(self) -> ColumnType {
        match self {
            Dimension::Anio => ColumnType::Int64,
            Dimension::Producto | Dimension::Proyecto => ColumnType::Str,
        }
    }

    pub fn from_column(name: &str) -> Option<Dimension> {
        Dimension::ALL
            .into_iter()
            .find(|d| d.column().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// A measure column paired with its reduction function
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MeasureSpec {
    pub column: String,
    pub op: AggregateOp,
}

impl MeasureSpec {
    pub fn new(column: &str, op: AggregateOp) -> Self {
        MeasureSpec {
            column: column.trim().to_lowercase(),
            op,
        }
    }

    pub fn mean(column: &str) -> Self {
        Self::new(column, AggregateOp::Mean)
    }

    pub fn sum(column: &str) -> Self {
        Self::new(column, AggregateOp::Sum)
    }
}

/// Declared dimensions and measures. Immutable once handed to a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaContract {
    dimensions: Vec<Dimension>,
    measures: Vec<MeasureSpec>,
}

impl SchemaContract {
    pub fn new(dimensions: Vec<Dimension>, measures: Vec<MeasureSpec>) -> Self {
        SchemaContract {
            dimensions,
            measures,
        }
    }

    /// Production EVM and quality KPI contract
    pub fn kpi() -> Self {
        SchemaContract::new(
            Dimension::ALL.to_vec(),
            vec![
                MeasureSpec::mean("cpi_index_promedio"),
                MeasureSpec::mean("spi_index_promedio"),
                MeasureSpec::sum("schedule_variance_sum"),
                MeasureSpec::mean("densidad_defectos_promedio"),
            ],
        )
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn measures(&self) -> &[MeasureSpec] {
        &self.measures
    }

    pub fn measure_columns(&self) -> Vec<&str> {
        self.measures.iter().map(|m| m.column.as_str()).collect()
    }

    /// Declared columns absent from `snapshot`, dimensions first
    pub fn missing_columns(&self, snapshot: &Snapshot) -> Vec<String> {
        self.dimensions
            .iter()
            .map(|d| d.column())
            .chain(self.measures.iter().map(|m| m.column.as_str()))
            .filter(|name| !snapshot.has_column(name))
            .map(str::to_string)
            .collect()
    }
}

impl Default for SchemaContract {
    fn default() -> Self {
        Self::kpi()
    }
}

/// Completeness check of a snapshot against a contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub row_count: usize,
    pub min_rows: usize,
    pub missing_columns: Vec<String>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.row_count >= self.min_rows && self.missing_columns.is_empty()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.row_count < self.min_rows {
            writeln!(
                f,
                "FAILED: {} rows, fewer than the {} expected",
                self.row_count, self.min_rows
            )?;
        } else {
            writeln!(f, "PASSED: {} rows", self.row_count)?;
        }
        if self.missing_columns.is_empty() {
            write!(f, "PASSED: all declared columns present")
        } else {
            write!(
                f,
                "FAILED: missing columns: {}",
                self.missing_columns.join(", ")
            )
        }
    }
}

pub fn validate_snapshot(
    snapshot: &Snapshot,
    contract: &SchemaContract,
    min_rows: usize,
) -> ValidationReport {
    ValidationReport {
        row_count: snapshot.row_count(),
        min_rows,
        missing_columns: contract.missing_columns(snapshot),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cube::Value;

    #[test]
    fn test_kpi_contract() {
        let contract = SchemaContract::kpi();
        assert_eq!(contract.dimensions().len(), 3);
        assert_eq!(
            contract.measure_columns(),
            vec![
                "cpi_index_promedio",
                "spi_index_promedio",
                "schedule_variance_sum",
                "densidad_defectos_promedio"
            ]
        );
        assert_eq!(contract.measures()[2].op, AggregateOp::Sum);
    }

    #[test]
    fn test_measure_names_are_normalised() {
        assert_eq!(MeasureSpec::mean("  CPI ").column, "cpi");
    }

    #[test]
    fn test_dimension_from_column() {
        assert_eq!(Dimension::from_column("Anio"), Some(Dimension::Anio));
        assert_eq!(Dimension::from_column("region"), None);
    }

    #[test]
    fn test_missing_columns() {
        let snapshot = Snapshot::from_rows(
            &["Anio", "CPI"],
            vec![vec![Value::Int(2023), Value::Float(0.8)]],
        )
        .unwrap();
        let contract = SchemaContract::new(
            vec![Dimension::Anio, Dimension::Producto],
            vec![MeasureSpec::mean("cpi"), MeasureSpec::sum("sv")],
        );
        assert_eq!(contract.missing_columns(&snapshot), vec!["producto", "sv"]);

        let report = validate_snapshot(&snapshot, &contract, 1);
        assert!(!report.passed());
        assert_eq!(report.row_count, 1);
    }

    #[test]
    fn test_validation_min_rows() {
        let snapshot = Snapshot::from_rows(&["anio"], vec![vec![Value::Int(2023)]]).unwrap();
        let contract = SchemaContract::new(vec![Dimension::Anio], vec![]);
        assert!(validate_snapshot(&snapshot, &contract, 1).passed());

        let report = validate_snapshot(&snapshot, &contract, 10);
        assert!(!report.passed());
        assert!(report.to_string().starts_with("FAILED: 1 rows"));
    }
}

use std::cmp::Ordering;
use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;
use thiserror::Error;

pub mod aggregation;
pub mod coercion;
pub mod column;
pub mod export;
pub mod filter;
pub mod hierarchy;
pub mod schema;
pub mod service;
pub mod snapshot;

/// Error type used across the crate
#[derive(Debug, Error)]
pub enum CubeError {
    /// The requested grouping key is not registered
    #[error("invalid hierarchy {key:?}, use one of: {}", .valid.join(", "))]
    InvalidHierarchy { key: String, valid: Vec<String> },

    /// The snapshot violates the schema contract
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Construction or refresh with a zero-row snapshot
    #[error("cube base snapshot cannot be empty")]
    EmptyBase,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Snapshot contract violations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("missing column: {0}")]
    MissingColumn(String),

    #[error("measure column {column:?} holds non-numeric value {value:?} at row {row}")]
    NonNumericMeasure {
        column: String,
        row: usize,
        value: String,
    },

    #[error("duplicate column after normalisation: {0}")]
    DuplicateColumn(String),

    #[error("row {row} has {found} fields, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("column {0:?} mixes string and numeric values")]
    MixedColumnTypes(String),
}

pub type CubeResult<T> = Result<T, CubeError>;

/// Outcome of a CSV snapshot load
#[derive(Debug, Default)]
pub struct ParseSummary {
    pub rows_processed: usize,
    pub errors: Vec<ParseError>,
}

/// A row skipped during CSV ingestion
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    /// 1-based line number in the source file
    pub row: usize,
    pub column: String,
    pub value: String,
    pub error: Option<String>,
}

/// Scalar cell value (owned)
#[derive(Debug, Clone)]
pub enum Value {
    /// Absent value
    Null,
    /// Integer column
    Int(i64),
    /// Float column
    Float(f64),
    /// String column
    Str(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Int(_) | Value::Float(_) => 1,
            Value::Str(_) => 2,
        }
    }
}

// Equality is same-variant only: Int(2023) never equals Float(2023.0) or Str("2023").
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Int(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::Str(v) => v.hash(state),
        }
    }
}

/// Null first, then numbers compared numerically, then strings.
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).total_cmp(b).then(Ordering::Less),
            (Value::Float(a), Value::Int(b)) => a.total_cmp(&(*b as f64)).then(Ordering::Greater),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Measure reduction functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateOp {
    /// Arithmetic mean of the non-null values
    Mean,
    /// Sum of the non-null values
    Sum,
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateOp::Mean => write!(f, "mean"),
            AggregateOp::Sum => write!(f, "sum"),
        }
    }
}

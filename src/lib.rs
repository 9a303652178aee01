//! # olap-cube
//!
//! `olap-cube` is an in-memory OLAP query engine over a pre-aggregated KPI
//! fact table. It supports:
//!
//! - Immutable columnar snapshots, loaded from memory-mapped CSV or built
//!   from rows, with column names normalised once at ingestion
//! - Registered hierarchies (single and composite groupings)
//! - Slice/dice equality filters over a closed set of dimensions
//! - Drill-down/roll-up re-aggregation of MEAN and SUM measures
//! - Deterministic, key-sorted results
//! - Lock-free concurrent queries with atomic snapshot refresh
//! - LRU caching of query results per snapshot generation
//!
//! # Example
//!
//! ```rust
//! use olap_cube::{CubeQueryService, FilterSet, MeasureSpec, SchemaContract, Snapshot, Value};
//! use olap_cube::cube::schema::Dimension;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let snapshot = Snapshot::from_rows(
//!         &["Anio", "Producto", "CPI"],
//!         vec![
//!             vec![Value::Int(2023), Value::from("A"), Value::Float(0.8)],
//!             vec![Value::Int(2023), Value::from("B"), Value::Float(1.2)],
//!             vec![Value::Int(2024), Value::from("A"), Value::Float(1.0)],
//!         ],
//!     )?;
//!     let contract = SchemaContract::new(
//!         vec![Dimension::Anio, Dimension::Producto],
//!         vec![MeasureSpec::mean("cpi")],
//!     );
//!     let service = CubeQueryService::new(snapshot, contract)?;
//!
//!     // Roll up to years
//!     let by_year = service.query("Anio", &FilterSet::new())?;
//!     assert_eq!(by_year.rows[0].measures, vec![Some(1.0)]);
//!
//!     // Slice on a product
//!     let product_a = service.query("Anio", &FilterSet::new().producto("A"))?;
//!     for record in product_a.to_records() {
//!         println!("{}", serde_json::Value::Object(record));
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod cube;
pub mod telemetry;

pub use cube::aggregation::{QueryResult, ResultRow};
pub use cube::filter::FilterSet;
pub use cube::hierarchy::{Hierarchy, HierarchyRegistry};
pub use cube::schema::{MeasureSpec, SchemaContract};
pub use cube::service::{CubeQueryService, QueryRequest};
pub use cube::snapshot::Snapshot;
pub use cube::{AggregateOp, CubeError, CubeResult, SchemaError, Value};

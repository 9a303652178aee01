use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cube::aggregation::{QueryResult, aggregate};
use crate::cube::coercion::coerce;
use crate::cube::filter::{self, FilterSet};
use crate::cube::hierarchy::{Hierarchy, HierarchyRegistry};
use crate::cube::schema::SchemaContract;
use crate::cube::snapshot::Snapshot;
use crate::cube::{CubeError, CubeResult};

/// Default number of cached query results
pub const DEFAULT_CACHE_CAPACITY: usize = 128;

/// A grouping key plus optional slice/dice filters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryRequest {
    pub hierarchy: String,
    pub filters: FilterSet,
}

impl QueryRequest {
    pub fn new(hierarchy: &str) -> Self {
        QueryRequest {
            hierarchy: hierarchy.to_string(),
            filters: FilterSet::new(),
        }
    }

    pub fn with_filters(mut self, filters: FilterSet) -> Self {
        self.filters = filters;
        self
    }
}

#[derive(Hash, Eq, PartialEq, Clone)]
struct QueryKey {
    generation: u64,
    hierarchy: Hierarchy,
    filters: FilterSet,
}

#[derive(Debug)]
struct QueryCache {
    cache: Mutex<LruCache<QueryKey, Arc<QueryResult>>>,
}

impl QueryCache {
    fn new(capacity: NonZeroUsize) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn get(&self, key: &QueryKey) -> Option<Arc<QueryResult>> {
        self.cache.lock().get(key).cloned()
    }

    fn put(&self, key: QueryKey, value: Arc<QueryResult>) {
        self.cache.lock().put(key, value);
    }

    fn clear(&self) {
        self.cache.lock().clear();
    }
}

/// The snapshot currently served, tagged with the refresh that installed it
#[derive(Debug, Clone)]
struct Active {
    snapshot: Arc<Snapshot>,
    generation: u64,
}

/// Query engine over one immutable snapshot.
///
/// Queries clone the active `Arc<Snapshot>` under a short read lock and then
/// run without any lock held; [`refresh`](Self::refresh) swaps the `Arc`
/// under the write lock. A query therefore sees either the old snapshot or
/// the new one in full.
///
/// # Examples
///
/// ```rust
/// use olap_cube::{CubeQueryService, FilterSet, MeasureSpec, SchemaContract, Snapshot, Value};
/// use olap_cube::cube::schema::Dimension;
///
/// let snapshot = Snapshot::from_rows(
///     &["anio", "producto", "cpi"],
///     vec![
///         vec![Value::Int(2023), Value::from("A"), Value::Float(0.8)],
///         vec![Value::Int(2024), Value::from("A"), Value::Float(1.0)],
///     ],
/// )
/// .unwrap();
/// let contract = SchemaContract::new(
///     vec![Dimension::Anio, Dimension::Producto],
///     vec![MeasureSpec::mean("cpi")],
/// );
/// let service = CubeQueryService::new(snapshot, contract).unwrap();
/// let result = service.query("Anio", &FilterSet::new().producto("A")).unwrap();
/// assert_eq!(result.len(), 2);
/// ```
#[derive(Debug)]
pub struct CubeQueryService {
    contract: SchemaContract,
    registry: HierarchyRegistry,
    active: RwLock<Active>,
    cache: Option<QueryCache>,
}

impl CubeQueryService {
    /// Creates a service with the default result cache.
    ///
    /// # Errors
    /// [`CubeError::EmptyBase`] if `snapshot` has no rows.
    pub fn new(snapshot: impl Into<Arc<Snapshot>>, contract: SchemaContract) -> CubeResult<Self> {
        Self::with_cache_capacity(snapshot, contract, DEFAULT_CACHE_CAPACITY)
    }

    /// Creates a service caching up to `capacity` results; `0` disables
    /// caching.
    ///
    /// # Errors
    /// [`CubeError::EmptyBase`] if `snapshot` has no rows.
    pub fn with_cache_capacity(
        snapshot: impl Into<Arc<Snapshot>>,
        contract: SchemaContract,
        capacity: usize,
    ) -> CubeResult<Self> {
        let snapshot = snapshot.into();
        if snapshot.is_empty() {
            warn!("refusing to build cube over an empty snapshot");
            return Err(CubeError::EmptyBase);
        }

        warn_missing_columns(&contract, &snapshot);
        info!(
            rows = snapshot.row_count(),
            columns = snapshot.headers().len(),
            measures = contract.measures().len(),
            cache_capacity = capacity,
            "cube snapshot loaded"
        );

        Ok(CubeQueryService {
            contract,
            registry: HierarchyRegistry::new(),
            active: RwLock::new(Active {
                snapshot,
                generation: 0,
            }),
            cache: NonZeroUsize::new(capacity).map(QueryCache::new),
        })
    }

    /// Runs the resolve → coerce → filter → aggregate pipeline.
    ///
    /// An empty result means no rows matched `filters`; it is not an error.
    ///
    /// # Errors
    /// [`CubeError::InvalidHierarchy`] for an unregistered key,
    /// [`CubeError::Schema`] when the snapshot lacks a declared column or a
    /// measure is not numeric.
    pub fn query(&self, hierarchy: &str, filters: &FilterSet) -> CubeResult<Arc<QueryResult>> {
        let hierarchy = self.registry.resolve(hierarchy)?;
        let active = self.active.read().clone();

        let key = QueryKey {
            generation: active.generation,
            hierarchy,
            filters: filters.clone(),
        };
        if let Some(hit) = self.cache.as_ref().and_then(|c| c.get(&key)) {
            debug!(%hierarchy, filters = filters.len(), rows = hit.len(), "cube query cache hit");
            return Ok(hit);
        }

        let snapshot = active.snapshot.as_ref();
        let coerced = coerce(snapshot, self.contract.measures())?;
        let selected = filter::apply(snapshot, filters)?;
        let result = Arc::new(aggregate(
            snapshot,
            hierarchy,
            self.contract.measures(),
            &coerced,
            &selected,
        )?);

        debug!(
            %hierarchy,
            filters = filters.len(),
            rows_in = snapshot.row_count(),
            rows_selected = selected.len(),
            groups = result.len(),
            generation = active.generation,
            "cube query"
        );

        if let Some(cache) = &self.cache {
            cache.put(key, Arc::clone(&result));
        }
        Ok(result)
    }

    /// Same as [`query`](Self::query) for a prepared request
    pub fn execute(&self, request: &QueryRequest) -> CubeResult<Arc<QueryResult>> {
        self.query(&request.hierarchy, &request.filters)
    }

    /// Valid hierarchy keys in registration order
    pub fn list_hierarchies(&self) -> Vec<&'static str> {
        self.registry.keys()
    }

    /// Atomically replaces the active snapshot and returns the new generation.
    ///
    /// # Errors
    /// [`CubeError::EmptyBase`] if `snapshot` has no rows; the previous
    /// snapshot stays active.
    pub fn refresh(&self, snapshot: impl Into<Arc<Snapshot>>) -> CubeResult<u64> {
        let snapshot = snapshot.into();
        if snapshot.is_empty() {
            warn!(
                generation = self.generation(),
                "rejected refresh with empty snapshot, keeping current one"
            );
            return Err(CubeError::EmptyBase);
        }
        warn_missing_columns(&self.contract, &snapshot);

        let rows = snapshot.row_count();
        let generation = {
            let mut active = self.active.write();
            active.generation += 1;
            active.snapshot = snapshot;
            active.generation
        };
        if let Some(cache) = &self.cache {
            cache.clear();
        }

        info!(rows, generation, "cube snapshot refreshed");
        Ok(generation)
    }

    /// The snapshot currently served
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.active.read().snapshot)
    }

    /// Number of successful refreshes since construction
    pub fn generation(&self) -> u64 {
        self.active.read().generation
    }

    pub fn contract(&self) -> &SchemaContract {
        &self.contract
    }

    pub fn registry(&self) -> &HierarchyRegistry {
        &self.registry
    }
}

fn warn_missing_columns(contract: &SchemaContract, snapshot: &Snapshot) {
    let missing = contract.missing_columns(snapshot);
    if !missing.is_empty() {
        warn!(?missing, "snapshot lacks declared columns, affected queries will fail");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cube::Value;
    use crate::cube::schema::{Dimension, MeasureSpec};

    fn contract() -> SchemaContract {
        SchemaContract::new(
            vec![Dimension::Anio, Dimension::Producto],
            vec![MeasureSpec::mean("cpi")],
        )
    }

    fn snapshot(cpi_2024: f64) -> Snapshot {
        Snapshot::from_rows(
            &["anio", "producto", "cpi"],
            vec![
                vec![Value::Int(2023), Value::from("A"), Value::Float(0.8)],
                vec![Value::Int(2023), Value::from("B"), Value::Float(1.2)],
                vec![Value::Int(2024), Value::from("A"), Value::Float(cpi_2024)],
            ],
        )
        .unwrap()
    }

    fn empty() -> Snapshot {
        Snapshot::from_rows(&["anio", "producto", "cpi"], vec![]).unwrap()
    }

    #[test]
    fn test_new_rejects_empty_snapshot() {
        assert!(matches!(
            CubeQueryService::new(empty(), contract()),
            Err(CubeError::EmptyBase)
        ));
    }

    #[test]
    fn test_query_pipeline() {
        let service = CubeQueryService::new(snapshot(1.0), contract()).unwrap();
        let result = service.query("Anio", &FilterSet::new()).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.rows[0].measures, vec![Some(1.0)]);
    }

    #[test]
    fn test_cache_hit_returns_same_result() {
        let service = CubeQueryService::new(snapshot(1.0), contract()).unwrap();
        let filters = FilterSet::new().producto("A");
        let first = service.query("Anio", &filters).unwrap();
        let second = service.query(" Anio ", &filters).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_cache_disabled() {
        let service =
            CubeQueryService::with_cache_capacity(snapshot(1.0), contract(), 0).unwrap();
        let first = service.query("Anio", &FilterSet::new()).unwrap();
        let second = service.query("Anio", &FilterSet::new()).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first, second);
    }

    #[test]
    fn test_refresh_swaps_snapshot_and_invalidates_cache() {
        let service = CubeQueryService::new(snapshot(1.0), contract()).unwrap();
        let before = service.query("Anio", &FilterSet::new()).unwrap();
        assert_eq!(before.value(1, "cpi"), Some(Value::Float(1.0)));

        assert_eq!(service.refresh(snapshot(3.0)).unwrap(), 1);
        let after = service.query("Anio", &FilterSet::new()).unwrap();
        assert_eq!(after.value(1, "cpi"), Some(Value::Float(3.0)));
        assert_eq!(service.generation(), 1);
    }

    #[test]
    fn test_refresh_rejects_empty_and_keeps_previous() {
        let service = CubeQueryService::new(snapshot(1.0), contract()).unwrap();
        let previous = service.snapshot();
        assert!(matches!(service.refresh(empty()), Err(CubeError::EmptyBase)));
        assert!(Arc::ptr_eq(&previous, &service.snapshot()));
        assert_eq!(service.generation(), 0);
    }

    #[test]
    fn test_execute_request() {
        let service = CubeQueryService::new(snapshot(1.0), contract()).unwrap();
        let request = QueryRequest::new("Anio_Producto").with_filters(FilterSet::new().anio(2023));
        let result = service.execute(&request).unwrap();
        assert_eq!(result.group_columns, vec!["anio", "producto"]);
        assert_eq!(result.len(), 2);
    }
}

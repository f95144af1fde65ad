use crate::{
    Adjacency, CircularDependencyAlert, DependencyEdge, GraphSnapshot, Result, Service, Subgraph,
    TraversalDepth, TraversalDirection,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Persisted services, edges and cycle alerts.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Immutable point-in-time view; one analysis works on exactly one.
    async fn snapshot(&self) -> Result<Arc<GraphSnapshot>>;

    async fn get_service(&self, business_id: &str) -> Result<Option<Service>>;

    async fn subgraph(
        &self,
        start: &str,
        direction: TraversalDirection,
        max_depth: TraversalDepth,
        include_stale: bool,
    ) -> Result<Subgraph>;

    async fn full_adjacency_snapshot(&self) -> Result<Adjacency>;

    /// Idempotent upsert keyed by business id and by (source, target).
    /// Returns the version of the resulting snapshot.
    async fn upsert_batch(&self, services: Vec<Service>, edges: Vec<DependencyEdge>)
        -> Result<u64>;

    /// Like [`GraphStore::upsert_batch`], but only applied while the store is
    /// still at `expected_version`; otherwise fails with
    /// `SloGraphError::VersionConflict` and writes nothing.
    async fn upsert_batch_at(
        &self,
        expected_version: u64,
        services: Vec<Service>,
        edges: Vec<DependencyEdge>,
    ) -> Result<u64>;

    async fn list_alerts(&self) -> Result<Vec<CircularDependencyAlert>>;

    async fn upsert_alerts(&self, alerts: Vec<CircularDependencyAlert>) -> Result<()>;
}

/// Observed availability per service.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Availability ratio over `lookback`, or `None` when no data exists.
    async fn get_availability(&self, business_id: &str, lookback: Duration)
        -> Result<Option<f64>>;
}

use crate::GraphTraversal;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use slograph_core::{
    Adjacency, CircularDependencyAlert, DependencyEdge, GraphSnapshot, GraphStore, Result,
    Service, SloGraphError, Subgraph, TraversalDepth, TraversalDirection,
};
use std::sync::Arc;
use tracing::{debug, info};

/// In-process graph store built on RCU-style snapshot publication.
///
/// Readers load the current `Arc<GraphSnapshot>` without locking. Writers are
/// serialized by `write_lock`, derive the next snapshot from the current one
/// and swap it in, so a reader never observes a half-applied batch.
#[derive(Debug)]
pub struct InMemoryGraphStore {
    current: ArcSwap<GraphSnapshot>,
    write_lock: Mutex<()>,
    traversal: GraphTraversal,
}

impl Default for InMemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::from_snapshot(GraphSnapshot::empty())
    }

    pub fn from_snapshot(snapshot: GraphSnapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(snapshot),
            write_lock: Mutex::new(()),
            traversal: GraphTraversal::new(),
        }
    }

    /// Current snapshot without going through the async trait.
    pub fn load(&self) -> Arc<GraphSnapshot> {
        self.current.load_full()
    }

    /// Flags every edge not observed within `threshold` of `now` as stale.
    /// Returns the number of edges newly flagged.
    pub fn mark_stale(&self, now: DateTime<Utc>, threshold: Duration) -> Result<usize> {
        let mut flagged = 0;
        let version = self.commit(|snapshot| {
            let (next, count) = snapshot.with_stale_marked(now, threshold);
            flagged = count;
            Ok(next)
        })?;
        info!(flagged, version, "stale edges marked");
        Ok(flagged)
    }

    /// Serializes writers and publishes the snapshot produced by `apply`.
    /// Nothing is published when `apply` fails.
    fn commit<F>(&self, apply: F) -> Result<u64>
    where
        F: FnOnce(&GraphSnapshot) -> Result<GraphSnapshot>,
    {
        let _guard = self.write_lock.lock();
        let current = self.current.load();
        let next = apply(&current)?;
        let version = next.version();
        self.current.store(Arc::new(next));
        Ok(version)
    }

    fn apply_batch(
        &self,
        expected_version: Option<u64>,
        services: Vec<Service>,
        edges: Vec<DependencyEdge>,
    ) -> Result<u64> {
        Self::validate_batch(&services, &edges)?;
        let service_count = services.len();
        let edge_count = edges.len();
        let version = self.commit(move |snapshot| {
            if let Some(expected) = expected_version {
                if snapshot.version() != expected {
                    return Err(SloGraphError::VersionConflict {
                        expected,
                        actual: snapshot.version(),
                    });
                }
            }
            for edge in &edges {
                let known = |id: &str| {
                    snapshot.contains_service(id) || services.iter().any(|s| s.business_id == id)
                };
                if !known(&edge.source) || !known(&edge.target) {
                    return Err(SloGraphError::validation(format!(
                        "edge {} references an unknown service",
                        edge.key()
                    )));
                }
            }
            Ok(snapshot.with_batch(services, edges))
        })?;
        debug!(services = service_count, edges = edge_count, version, "batch upserted");
        Ok(version)
    }

    fn validate_batch(services: &[Service], edges: &[DependencyEdge]) -> Result<()> {
        for service in services {
            service.validate()?;
        }
        for edge in edges {
            edge.validate()?;
        }
        Ok(())
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn snapshot(&self) -> Result<Arc<GraphSnapshot>> {
        Ok(self.load())
    }

    async fn get_service(&self, business_id: &str) -> Result<Option<Service>> {
        Ok(self.current.load().service(business_id).cloned())
    }

    async fn subgraph(
        &self,
        start: &str,
        direction: TraversalDirection,
        max_depth: TraversalDepth,
        include_stale: bool,
    ) -> Result<Subgraph> {
        let snapshot = self.load();
        self.traversal
            .subgraph(&snapshot, start, direction, max_depth, include_stale)
    }

    async fn full_adjacency_snapshot(&self) -> Result<Adjacency> {
        Ok(self.current.load().non_stale_adjacency())
    }

    async fn upsert_batch(
        &self,
        services: Vec<Service>,
        edges: Vec<DependencyEdge>,
    ) -> Result<u64> {
        self.apply_batch(None, services, edges)
    }

    async fn upsert_batch_at(
        &self,
        expected_version: u64,
        services: Vec<Service>,
        edges: Vec<DependencyEdge>,
    ) -> Result<u64> {
        self.apply_batch(Some(expected_version), services, edges)
    }

    async fn list_alerts(&self) -> Result<Vec<CircularDependencyAlert>> {
        Ok(self.current.load().alerts().to_vec())
    }

    async fn upsert_alerts(&self, alerts: Vec<CircularDependencyAlert>) -> Result<()> {
        self.commit(move |snapshot| Ok(snapshot.with_alerts(alerts)))?;
        Ok(())
    }
}

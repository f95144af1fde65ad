use crate::{ConflictRecord, EdgeMergeResolver, MergeDecision, ObservationBatch};
use serde::{Deserialize, Serialize};
use slograph_core::{DependencyEdge, DiscoverySource, GraphStore, Result, Service, SloGraphError};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Merge-and-commit rounds before an ingest gives up on a busy store.
const MAX_COMMIT_ATTEMPTS: u32 = 8;

/// One discovery run: declared services plus the edges it observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionBatch {
    pub source: DiscoverySource,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub edges: Vec<DependencyEdge>,
}

impl IngestionBatch {
    pub fn new(source: DiscoverySource) -> Self {
        Self {
            source,
            services: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn with_service(mut self, service: Service) -> Self {
        self.services.push(service);
        self
    }

    pub fn with_edge(mut self, edge: DependencyEdge) -> Self {
        self.edges.push(edge);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestionReport {
    pub source: Option<DiscoverySource>,
    pub version: u64,
    pub services_declared: usize,
    pub inserted: usize,
    pub refreshed: usize,
    pub overridden: usize,
    pub retained: usize,
    pub conflicts: Vec<ConflictRecord>,
    pub placeholders: Vec<String>,
}

/// Drives ingestion batches through merge resolution into a [`GraphStore`].
pub struct GraphIngestor<S: GraphStore + ?Sized> {
    store: Arc<S>,
    resolver: EdgeMergeResolver,
}

impl<S: GraphStore + ?Sized> GraphIngestor<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            resolver: EdgeMergeResolver::new(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Validates, merges and persists one batch. Nothing is written unless
    /// every service and edge in the batch is valid.
    ///
    /// The merge runs against a snapshot and is committed only while the
    /// store is still at that snapshot's version; when another writer got in
    /// between, the batch is merged again against the newer snapshot.
    pub async fn ingest(&self, batch: IngestionBatch) -> Result<IngestionReport> {
        for service in &batch.services {
            service.validate()?;
        }
        let observations = ObservationBatch {
            source: batch.source,
            edges: batch.edges,
        };

        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let snapshot = self.store.snapshot().await?;
            let outcome = self.resolver.resolve(&observations, snapshot.edge_index())?;

            // later declarations of the same id win, keeping the stored identity
            let mut services: BTreeMap<String, Service> = BTreeMap::new();
            for declared in &batch.services {
                let service = match snapshot.service(&declared.business_id) {
                    Some(existing) => existing.redeclared(declared.clone()),
                    None => declared.clone(),
                };
                services.insert(service.business_id.clone(), service);
            }
            let services_declared = services.len();

            let edges = outcome.edges();
            let placeholders: BTreeSet<String> = edges
                .iter()
                .flat_map(|e| [&e.source, &e.target])
                .filter(|id| !snapshot.contains_service(id) && !services.contains_key(*id))
                .cloned()
                .collect();
            for id in &placeholders {
                services.insert(id.clone(), Service::placeholder(id.clone()));
            }

            let version = match self
                .store
                .upsert_batch_at(snapshot.version(), services.into_values().collect(), edges)
                .await
            {
                Ok(version) => version,
                Err(SloGraphError::VersionConflict { expected, actual }) => {
                    debug!(attempt, expected, actual, "store moved during merge, retrying");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let report = IngestionReport {
                source: Some(observations.source),
                version,
                services_declared,
                inserted: outcome.count(|d| matches!(d, MergeDecision::Insert { .. })),
                refreshed: outcome.count(|d| matches!(d, MergeDecision::Refresh { .. })),
                overridden: outcome.count(|d| matches!(d, MergeDecision::Override { .. })),
                retained: outcome.count(|d| matches!(d, MergeDecision::Retain { .. })),
                conflicts: outcome.conflicts,
                placeholders: placeholders.into_iter().collect(),
            };
            info!(
                source = %observations.source,
                version,
                inserted = report.inserted,
                refreshed = report.refreshed,
                overridden = report.overridden,
                retained = report.retained,
                placeholders = report.placeholders.len(),
                "ingestion batch applied"
            );
            return Ok(report);
        }

        Err(SloGraphError::Storage(format!(
            "{} batch not committed after {} attempts against a changing store",
            observations.source, MAX_COMMIT_ATTEMPTS
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryGraphStore;
    use async_trait::async_trait;
    use slograph_core::{
        Adjacency, CircularDependencyAlert, CriticalityTier, DependencyCriticality, EdgeKey,
        GraphSnapshot, Subgraph, TraversalDepth, TraversalDirection,
    };
    use std::time::Duration;

    fn ingestor() -> GraphIngestor<InMemoryGraphStore> {
        GraphIngestor::new(Arc::new(InMemoryGraphStore::new()))
    }

    #[tokio::test]
    async fn unknown_endpoints_become_placeholders() {
        let ingestor = ingestor();
        let report = ingestor
            .ingest(
                IngestionBatch::new(DiscoverySource::Mesh)
                    .with_service(Service::new("checkout"))
                    .with_edge(DependencyEdge::new("checkout", "payments", DiscoverySource::Mesh)),
            )
            .await
            .unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.placeholders, vec!["payments"]);

        let payments = ingestor.store().get_service("payments").await.unwrap().unwrap();
        assert!(payments.discovered);
        let checkout = ingestor.store().get_service("checkout").await.unwrap().unwrap();
        assert!(!checkout.discovered);
    }

    #[tokio::test]
    async fn declaration_replaces_placeholder_and_keeps_id() {
        let ingestor = ingestor();
        ingestor
            .ingest(
                IngestionBatch::new(DiscoverySource::Trace)
                    .with_service(Service::new("a"))
                    .with_edge(DependencyEdge::new("a", "b", DiscoverySource::Trace)),
            )
            .await
            .unwrap();
        let placeholder = ingestor.store().get_service("b").await.unwrap().unwrap();

        ingestor
            .ingest(
                IngestionBatch::new(DiscoverySource::Manual)
                    .with_service(Service::new("b").with_tier(CriticalityTier::Tier1)),
            )
            .await
            .unwrap();
        let declared = ingestor.store().get_service("b").await.unwrap().unwrap();
        assert_eq!(declared.id, placeholder.id);
        assert!(!declared.discovered);
        assert_eq!(declared.tier, CriticalityTier::Tier1);
    }

    #[tokio::test]
    async fn invalid_batch_writes_nothing() {
        let ingestor = ingestor();
        let err = ingestor
            .ingest(
                IngestionBatch::new(DiscoverySource::Mesh)
                    .with_service(Service::new("a"))
                    .with_edge(DependencyEdge::new("a", "b", DiscoverySource::Mesh))
                    .with_edge(DependencyEdge::new("a", "a", DiscoverySource::Mesh)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SloGraphError::Validation(_)));
        let snapshot = ingestor.store().snapshot().await.unwrap();
        assert_eq!(snapshot.service_count(), 0);
        assert_eq!(snapshot.version(), 0);
    }

    #[tokio::test]
    async fn conflicts_are_reported() {
        let ingestor = ingestor();
        ingestor
            .ingest(
                IngestionBatch::new(DiscoverySource::Manual)
                    .with_edge(DependencyEdge::new("a", "b", DiscoverySource::Manual)),
            )
            .await
            .unwrap();
        let report = ingestor
            .ingest(
                IngestionBatch::new(DiscoverySource::Platform)
                    .with_edge(DependencyEdge::new("a", "b", DiscoverySource::Platform)),
            )
            .await
            .unwrap();
        assert_eq!(report.retained, 1);
        assert_eq!(report.conflicts.len(), 1);
        assert!(report.placeholders.is_empty());
    }

    /// Store whose snapshot reads take a while to come back, leaving a window
    /// for another writer to commit.
    struct SlowReads {
        inner: Arc<InMemoryGraphStore>,
        delay: Duration,
    }

    #[async_trait]
    impl GraphStore for SlowReads {
        async fn snapshot(&self) -> Result<Arc<GraphSnapshot>> {
            let snapshot = self.inner.snapshot().await?;
            tokio::time::sleep(self.delay).await;
            Ok(snapshot)
        }

        async fn get_service(&self, business_id: &str) -> Result<Option<Service>> {
            self.inner.get_service(business_id).await
        }

        async fn subgraph(
            &self,
            start: &str,
            direction: TraversalDirection,
            max_depth: TraversalDepth,
            include_stale: bool,
        ) -> Result<Subgraph> {
            self.inner.subgraph(start, direction, max_depth, include_stale).await
        }

        async fn full_adjacency_snapshot(&self) -> Result<Adjacency> {
            self.inner.full_adjacency_snapshot().await
        }

        async fn upsert_batch(&self, services: Vec<Service>, edges: Vec<DependencyEdge>) -> Result<u64> {
            self.inner.upsert_batch(services, edges).await
        }

        async fn upsert_batch_at(
            &self,
            expected_version: u64,
            services: Vec<Service>,
            edges: Vec<DependencyEdge>,
        ) -> Result<u64> {
            self.inner.upsert_batch_at(expected_version, services, edges).await
        }

        async fn list_alerts(&self) -> Result<Vec<CircularDependencyAlert>> {
            self.inner.list_alerts().await
        }

        async fn upsert_alerts(&self, alerts: Vec<CircularDependencyAlert>) -> Result<()> {
            self.inner.upsert_alerts(alerts).await
        }
    }

    #[tokio::test]
    async fn manual_edge_committed_mid_merge_is_not_overwritten() {
        let inner = Arc::new(InMemoryGraphStore::new());
        let slow = GraphIngestor::new(Arc::new(SlowReads {
            inner: Arc::clone(&inner),
            delay: Duration::from_millis(100),
        }));
        let fast = GraphIngestor::new(Arc::clone(&inner));

        let trace = slow.ingest(
            IngestionBatch::new(DiscoverySource::Trace)
                .with_edge(DependencyEdge::new("a", "b", DiscoverySource::Trace).with_timeout_ms(900)),
        );
        let manual = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            fast.ingest(
                IngestionBatch::new(DiscoverySource::Manual).with_edge(
                    DependencyEdge::new("a", "b", DiscoverySource::Manual)
                        .with_criticality(DependencyCriticality::Soft)
                        .with_timeout_ms(250),
                ),
            )
            .await
        };
        let (trace_report, manual_report) = tokio::join!(trace, manual);
        let trace_report = trace_report.unwrap();
        let manual_report = manual_report.unwrap();

        assert_eq!(manual_report.inserted, 1);
        assert_eq!(trace_report.inserted, 0);
        assert_eq!(trace_report.retained, 1);
        assert_eq!(trace_report.conflicts.len(), 1);
        assert!(trace_report.version > manual_report.version);

        let stored = inner.load().edge(&EdgeKey::new("a", "b")).cloned().unwrap();
        assert_eq!(stored.discovery_source, DiscoverySource::Manual);
        assert_eq!(stored.timeout_ms, Some(250));
        assert_eq!(stored.criticality, DependencyCriticality::Soft);
    }
}

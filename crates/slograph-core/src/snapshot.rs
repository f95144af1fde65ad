use crate::{
    CircularDependencyAlert, DependencyEdge, EdgeKey, Service, TraversalDepth, TraversalDirection,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Service id to the ids it depends on, restricted to non-stale edges.
pub type Adjacency = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubgraphNode {
    pub business_id: String,
    /// Smallest hop count at which the node was reached.
    pub depth: u32,
    pub reached_via: TraversalDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subgraph {
    pub root: String,
    pub direction: TraversalDirection,
    pub max_depth: TraversalDepth,
    pub nodes: Vec<SubgraphNode>,
    pub edges: Vec<DependencyEdge>,
}

impl Subgraph {
    pub fn node_ids(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.business_id.as_str()).collect()
    }

    pub fn contains(&self, business_id: &str) -> bool {
        self.nodes.iter().any(|n| n.business_id == business_id)
    }
}

/// Immutable point-in-time view of the persisted graph.
///
/// Writers never mutate a published snapshot; they derive the next version
/// with [`GraphSnapshot::with_batch`] and friends.
#[derive(Debug, Clone, Default)]
pub struct GraphSnapshot {
    version: u64,
    services: HashMap<String, Service>,
    edges: HashMap<EdgeKey, DependencyEdge>,
    outgoing: HashMap<String, BTreeSet<EdgeKey>>,
    incoming: HashMap<String, BTreeSet<EdgeKey>>,
    alerts: Vec<CircularDependencyAlert>,
}

impl GraphSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn service(&self, business_id: &str) -> Option<&Service> {
        self.services.get(business_id)
    }

    pub fn contains_service(&self, business_id: &str) -> bool {
        self.services.contains_key(business_id)
    }

    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.services.values()
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    pub fn edge(&self, key: &EdgeKey) -> Option<&DependencyEdge> {
        self.edges.get(key)
    }

    pub fn edges(&self) -> impl Iterator<Item = &DependencyEdge> {
        self.edges.values()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Existing edges keyed by (source, target), as consumed by edge merging.
    pub fn edge_index(&self) -> &HashMap<EdgeKey, DependencyEdge> {
        &self.edges
    }

    pub fn alerts(&self) -> &[CircularDependencyAlert] {
        &self.alerts
    }

    /// Edges leaving `business_id` (its dependencies), ordered by target.
    pub fn outgoing_edges(&self, business_id: &str, include_stale: bool) -> Vec<&DependencyEdge> {
        self.collect_edges(self.outgoing.get(business_id), include_stale)
    }

    /// Edges entering `business_id` (its dependents), ordered by source.
    pub fn incoming_edges(&self, business_id: &str, include_stale: bool) -> Vec<&DependencyEdge> {
        self.collect_edges(self.incoming.get(business_id), include_stale)
    }

    fn collect_edges(
        &self,
        keys: Option<&BTreeSet<EdgeKey>>,
        include_stale: bool,
    ) -> Vec<&DependencyEdge> {
        keys.into_iter()
            .flatten()
            .filter_map(|k| self.edges.get(k))
            .filter(|e| include_stale || !e.is_stale)
            .collect()
    }

    pub fn has_any_edge(&self, business_id: &str, include_stale: bool) -> bool {
        !self.outgoing_edges(business_id, include_stale).is_empty()
            || !self.incoming_edges(business_id, include_stale).is_empty()
    }

    /// Adjacency over non-stale edges. Every known service appears as a key.
    pub fn non_stale_adjacency(&self) -> Adjacency {
        let mut adjacency: Adjacency = self
            .services
            .keys()
            .map(|id| (id.clone(), Vec::new()))
            .collect();
        for edge in self.edges.values().filter(|e| !e.is_stale) {
            adjacency
                .entry(edge.source.clone())
                .or_default()
                .push(edge.target.clone());
        }
        for targets in adjacency.values_mut() {
            targets.sort();
        }
        adjacency
    }

    /// Next version with the services and edges upserted. Services are
    /// replaced wholesale by business id, edges by (source, target).
    pub fn with_batch(&self, services: Vec<Service>, edges: Vec<DependencyEdge>) -> Self {
        let mut next = self.clone();
        next.version = self.version + 1;
        for service in services {
            next.services.insert(service.business_id.clone(), service);
        }
        for edge in edges {
            let key = edge.key();
            next.outgoing
                .entry(edge.source.clone())
                .or_default()
                .insert(key.clone());
            next.incoming
                .entry(edge.target.clone())
                .or_default()
                .insert(key.clone());
            next.edges.insert(key, edge);
        }
        next
    }

    /// Next version with alerts upserted by id.
    pub fn with_alerts(&self, alerts: Vec<CircularDependencyAlert>) -> Self {
        let mut next = self.clone();
        next.version = self.version + 1;
        for alert in alerts {
            match next.alerts.iter_mut().find(|a| a.id == alert.id) {
                Some(existing) => *existing = alert,
                None => next.alerts.push(alert),
            }
        }
        next
    }

    /// Next version with every edge unobserved for longer than `threshold`
    /// flagged stale. Returns the snapshot and the number of edges flagged.
    pub fn with_stale_marked(&self, now: DateTime<Utc>, threshold: Duration) -> (Self, usize) {
        let mut next = self.clone();
        next.version = self.version + 1;
        let mut flagged = 0;
        for edge in next.edges.values_mut() {
            if !edge.is_stale && now - edge.last_observed_at > threshold {
                edge.is_stale = true;
                flagged += 1;
            }
        }
        (next, flagged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DiscoverySource;

    fn svc(id: &str) -> Service {
        Service::new(id)
    }

    #[test]
    fn batch_upsert_bumps_version_and_indexes_edges() {
        let base = GraphSnapshot::empty();
        let next = base.with_batch(
            vec![svc("a"), svc("b")],
            vec![DependencyEdge::new("a", "b", DiscoverySource::Manual)],
        );
        assert_eq!(base.version(), 0);
        assert_eq!(next.version(), 1);
        assert_eq!(next.outgoing_edges("a", false).len(), 1);
        assert_eq!(next.incoming_edges("b", false).len(), 1);
        assert!(next.has_any_edge("b", false));
        assert_eq!(base.edge_count(), 0);
    }

    #[test]
    fn adjacency_excludes_stale_edges() {
        let snap = GraphSnapshot::empty().with_batch(
            vec![svc("a"), svc("b"), svc("c")],
            vec![
                DependencyEdge::new("a", "b", DiscoverySource::Mesh),
                DependencyEdge::new("a", "c", DiscoverySource::Mesh).stale(),
            ],
        );
        let adjacency = snap.non_stale_adjacency();
        assert_eq!(adjacency["a"], vec!["b".to_string()]);
        assert!(adjacency["c"].is_empty());
        assert_eq!(snap.outgoing_edges("a", true).len(), 2);
    }

    #[test]
    fn stale_marking_uses_threshold() {
        let now = Utc::now();
        let snap = GraphSnapshot::empty().with_batch(
            vec![svc("a"), svc("b"), svc("c")],
            vec![
                DependencyEdge::new("a", "b", DiscoverySource::Mesh)
                    .observed_at(now - Duration::hours(48)),
                DependencyEdge::new("a", "c", DiscoverySource::Mesh).observed_at(now),
            ],
        );
        let (next, flagged) = snap.with_stale_marked(now, Duration::hours(24));
        assert_eq!(flagged, 1);
        assert!(next.edge(&EdgeKey::new("a", "b")).unwrap().is_stale);
        assert!(!next.edge(&EdgeKey::new("a", "c")).unwrap().is_stale);
    }
}

use crate::{CycleDetector, StronglyConnectedComponent};
use chrono::{DateTime, Utc};
use serde::Serialize;
use slograph_core::{
    cycle_key, Adjacency, CircularDependencyAlert, GraphStore, Result, SloGraphError,
};
use std::collections::{BTreeSet, HashMap, VecDeque};
use tracing::{info, warn};
use uuid::Uuid;

/// Result of matching freshly detected components against stored alerts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AlertReconciliation {
    /// Alerts for cycles with no active alert yet.
    pub opened: Vec<CircularDependencyAlert>,
    /// Existing open/acknowledged alerts whose cycle is still present.
    pub active: Vec<CircularDependencyAlert>,
    /// Active alerts whose cycle was not detected in this run.
    pub cleared: Vec<Uuid>,
}

impl AlertReconciliation {
    /// Cycles present in this run, whether newly alerted or already tracked.
    pub fn detected_cycles(&self) -> usize {
        self.opened.len() + self.active.len()
    }
}

/// Shortest closed cycle through the smallest member of `component`,
/// restricted to edges inside the component.
pub fn shortest_cycle(
    adjacency: &Adjacency,
    component: &StronglyConnectedComponent,
) -> Result<Vec<String>> {
    let start = component
        .members
        .first()
        .ok_or_else(|| SloGraphError::internal("empty strongly connected component"))?;
    let members: BTreeSet<&str> = component.members.iter().map(String::as_str).collect();

    let mut parent: HashMap<&str, &str> = HashMap::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    queue.push_back(start.as_str());

    while let Some(current) = queue.pop_front() {
        let Some(targets) = adjacency.get(current) else {
            continue;
        };
        for target in targets.iter().map(String::as_str) {
            if !members.contains(target) {
                continue;
            }
            if target == start {
                let mut cycle = vec![current.to_string()];
                let mut node = current;
                while let Some(&prev) = parent.get(node) {
                    cycle.push(prev.to_string());
                    node = prev;
                }
                cycle.reverse();
                return Ok(cycle);
            }
            if target != start && !parent.contains_key(target) {
                parent.insert(target, current);
                queue.push_back(target);
            }
        }
    }

    Err(SloGraphError::internal(format!(
        "component {:?} has no cycle through {}",
        component.members, start
    )))
}

/// Deduplicates cycle alerts across detection runs by canonical member set.
#[derive(Debug, Default, Clone, Copy)]
pub struct CycleAlertReconciler;

impl CycleAlertReconciler {
    pub fn new() -> Self {
        Self
    }

    pub fn reconcile(
        &self,
        adjacency: &Adjacency,
        components: &[StronglyConnectedComponent],
        existing: &[CircularDependencyAlert],
        now: DateTime<Utc>,
    ) -> Result<AlertReconciliation> {
        let active_by_key: HashMap<String, &CircularDependencyAlert> = existing
            .iter()
            .filter(|a| a.is_active())
            .map(|a| (a.key(), a))
            .collect();

        let mut outcome = AlertReconciliation::default();
        let mut detected_keys: BTreeSet<String> = BTreeSet::new();

        for component in components {
            let key = cycle_key(&component.members);
            detected_keys.insert(key.clone());
            match active_by_key.get(&key) {
                Some(alert) => outcome.active.push((*alert).clone()),
                None => {
                    let cycle = shortest_cycle(adjacency, component)?;
                    let alert =
                        CircularDependencyAlert::open(component.members.clone(), cycle, now)?;
                    warn!(cycle = ?alert.cycle, "circular dependency detected");
                    outcome.opened.push(alert);
                }
            }
        }

        outcome.cleared = active_by_key
            .iter()
            .filter(|(key, _)| !detected_keys.contains(*key))
            .map(|(_, alert)| alert.id)
            .collect();
        outcome.cleared.sort();

        Ok(outcome)
    }
}

/// Detects cycles on the store's current snapshot and persists any newly
/// opened alerts.
pub async fn refresh_cycle_alerts<S>(store: &S, now: DateTime<Utc>) -> Result<AlertReconciliation>
where
    S: GraphStore + ?Sized,
{
    let snapshot = store.snapshot().await?;
    let adjacency = snapshot.non_stale_adjacency();
    let components = CycleDetector::new().detect(&adjacency)?;
    let outcome =
        CycleAlertReconciler::new().reconcile(&adjacency, &components, snapshot.alerts(), now)?;

    if !outcome.opened.is_empty() {
        store.upsert_alerts(outcome.opened.clone()).await?;
    }
    info!(
        opened = outcome.opened.len(),
        active = outcome.active.len(),
        cleared = outcome.cleared.len(),
        "cycle alerts reconciled"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryGraphStore;
    use slograph_core::{DependencyEdge, DiscoverySource, Service};

    fn adjacency(edges: &[(&str, &str)]) -> Adjacency {
        let mut adj = Adjacency::new();
        for (s, t) in edges {
            adj.entry(s.to_string()).or_default().push(t.to_string());
            adj.entry(t.to_string()).or_default();
        }
        adj
    }

    #[test]
    fn shortest_cycle_starts_at_smallest_member() {
        let adj = adjacency(&[("c", "a"), ("a", "b"), ("b", "c"), ("b", "a")]);
        let components = CycleDetector::new().detect(&adj).unwrap();
        let cycle = shortest_cycle(&adj, &components[0]).unwrap();
        assert_eq!(cycle, vec!["a", "b"]);
    }

    #[test]
    fn reconcile_dedups_across_runs() {
        let adj = adjacency(&[("x", "y"), ("y", "z"), ("z", "x")]);
        let components = CycleDetector::new().detect(&adj).unwrap();
        let reconciler = CycleAlertReconciler::new();
        let now = Utc::now();

        let first = reconciler.reconcile(&adj, &components, &[], now).unwrap();
        assert_eq!(first.opened.len(), 1);
        assert_eq!(first.opened[0].cycle, vec!["x", "y", "z"]);

        let second = reconciler
            .reconcile(&adj, &components, &first.opened, now)
            .unwrap();
        assert!(second.opened.is_empty());
        assert_eq!(second.active.len(), 1);
    }

    #[test]
    fn resolved_alert_is_superseded_and_missing_cycle_cleared() {
        let adj = adjacency(&[("x", "y"), ("y", "x")]);
        let components = CycleDetector::new().detect(&adj).unwrap();
        let reconciler = CycleAlertReconciler::new();
        let now = Utc::now();

        let mut resolved = reconciler.reconcile(&adj, &components, &[], now).unwrap().opened;
        resolved[0].resolve(now).unwrap();
        let again = reconciler.reconcile(&adj, &components, &resolved, now).unwrap();
        assert_eq!(again.opened.len(), 1);
        assert_eq!(again.detected_cycles(), 1);

        let gone = reconciler.reconcile(&adj, &[], &again.opened, now).unwrap();
        assert_eq!(gone.cleared, vec![again.opened[0].id]);
    }

    #[tokio::test]
    async fn resolved_alerts_are_not_counted_as_detected() {
        let store = InMemoryGraphStore::new();
        store
            .upsert_batch(
                vec![Service::new("x"), Service::new("y")],
                vec![
                    DependencyEdge::new("x", "y", DiscoverySource::Trace),
                    DependencyEdge::new("y", "x", DiscoverySource::Trace),
                ],
            )
            .await
            .unwrap();
        let now = Utc::now();
        let first = refresh_cycle_alerts(&store, now).await.unwrap();
        let mut resolved = first.opened[0].clone();
        resolved.resolve(now).unwrap();
        store.upsert_alerts(vec![resolved]).await.unwrap();

        let second = refresh_cycle_alerts(&store, now).await.unwrap();
        assert_eq!(store.list_alerts().await.unwrap().len(), 2);
        assert_eq!(second.detected_cycles(), 1);
    }
}

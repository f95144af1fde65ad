use serde::{Deserialize, Serialize};
use slograph_core::{DependencyEdge, DiscoverySource, EdgeKey, Result, SloGraphError};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// Largest confidence gain repeated observations can add.
pub const MAX_OBSERVATION_BOOST: f64 = 0.10;
const BOOST_PER_DECADE: f64 = 0.05;

/// Base confidence of `source` plus a logarithmic boost for repeated
/// observations, capped at +0.10 and at 1.0 overall.
pub fn compute_confidence(source: DiscoverySource, observation_count: u32) -> f64 {
    let boost = if observation_count <= 1 {
        0.0
    } else {
        (BOOST_PER_DECADE * f64::from(observation_count).log10()).min(MAX_OBSERVATION_BOOST)
    };
    (source.base_confidence() + boost).min(1.0)
}

/// Newly observed edges, all produced by one discovery source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationBatch {
    pub source: DiscoverySource,
    pub edges: Vec<DependencyEdge>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub key: EdgeKey,
    pub losing_source: DiscoverySource,
    pub winning_source: DiscoverySource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum MergeDecision {
    /// No edge existed for the key.
    Insert { edge: DependencyEdge },
    /// Same source observed the edge again.
    Refresh { edge: DependencyEdge },
    /// The observation outranked the existing edge and replaced its attributes.
    Override {
        edge: DependencyEdge,
        replaced: DiscoverySource,
    },
    /// The existing edge outranked the observation; only its timestamp moved.
    Retain {
        edge: DependencyEdge,
        rejected: DiscoverySource,
    },
}

impl MergeDecision {
    pub fn edge(&self) -> &DependencyEdge {
        match self {
            MergeDecision::Insert { edge }
            | MergeDecision::Refresh { edge }
            | MergeDecision::Override { edge, .. }
            | MergeDecision::Retain { edge, .. } => edge,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeOutcome {
    pub decisions: Vec<MergeDecision>,
    pub conflicts: Vec<ConflictRecord>,
}

impl MergeOutcome {
    /// Final edge per key, ready to persist. Later decisions for the same key
    /// supersede earlier ones.
    pub fn edges(&self) -> Vec<DependencyEdge> {
        let mut latest: BTreeMap<EdgeKey, &DependencyEdge> = BTreeMap::new();
        for decision in &self.decisions {
            let edge = decision.edge();
            latest.insert(edge.key(), edge);
        }
        latest.into_values().cloned().collect()
    }

    pub fn count(&self, pred: impl Fn(&MergeDecision) -> bool) -> usize {
        self.decisions.iter().filter(|d| pred(d)).count()
    }
}

/// Reconciles observed edges against the existing edge index. Pure: it only
/// returns decisions, persisting them is the caller's job.
#[derive(Debug, Default, Clone, Copy)]
pub struct EdgeMergeResolver;

impl EdgeMergeResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(
        &self,
        batch: &ObservationBatch,
        existing: &HashMap<EdgeKey, DependencyEdge>,
    ) -> Result<MergeOutcome> {
        self.validate(batch)?;

        let mut working: HashMap<EdgeKey, DependencyEdge> = HashMap::new();
        let mut outcome = MergeOutcome::default();

        for observed in &batch.edges {
            let key = observed.key();
            let mut incoming = observed.clone();
            incoming.confidence_score =
                compute_confidence(incoming.discovery_source, incoming.observation_count);
            incoming.is_stale = false;

            let current = working.get(&key).or_else(|| existing.get(&key));
            let decision = match current {
                None => MergeDecision::Insert { edge: incoming },
                Some(current) if current.discovery_source == incoming.discovery_source => {
                    incoming.id = current.id;
                    MergeDecision::Refresh { edge: incoming }
                }
                Some(current) if incoming.discovery_source.outranks(current.discovery_source) => {
                    let replaced = current.discovery_source;
                    incoming.id = current.id;
                    outcome.conflicts.push(ConflictRecord {
                        key: key.clone(),
                        losing_source: replaced,
                        winning_source: incoming.discovery_source,
                    });
                    debug!(edge = %key, winner = %incoming.discovery_source, loser = %replaced, "observation overrides existing edge");
                    MergeDecision::Override {
                        edge: incoming,
                        replaced,
                    }
                }
                Some(current) => {
                    let mut kept = current.clone();
                    kept.last_observed_at = kept.last_observed_at.max(incoming.last_observed_at);
                    kept.is_stale = false;
                    outcome.conflicts.push(ConflictRecord {
                        key: key.clone(),
                        losing_source: incoming.discovery_source,
                        winning_source: kept.discovery_source,
                    });
                    debug!(edge = %key, winner = %kept.discovery_source, loser = %incoming.discovery_source, "existing edge retained");
                    MergeDecision::Retain {
                        edge: kept,
                        rejected: incoming.discovery_source,
                    }
                }
            };

            working.insert(key, decision.edge().clone());
            outcome.decisions.push(decision);
        }

        info!(
            source = %batch.source,
            observed = batch.edges.len(),
            conflicts = outcome.conflicts.len(),
            "merged observation batch"
        );
        Ok(outcome)
    }

    /// Rejects the whole batch before any decision is produced.
    fn validate(&self, batch: &ObservationBatch) -> Result<()> {
        for edge in &batch.edges {
            edge.validate()?;
            if edge.discovery_source != batch.source {
                return Err(SloGraphError::validation(format!(
                    "edge {} reports source {} inside a {} batch",
                    edge.key(),
                    edge.discovery_source,
                    batch.source
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use slograph_core::{CommunicationMode, DependencyCriticality};

    fn index(edges: Vec<DependencyEdge>) -> HashMap<EdgeKey, DependencyEdge> {
        edges.into_iter().map(|e| (e.key(), e)).collect()
    }

    #[test]
    fn confidence_boost_is_logarithmic_and_capped() {
        assert_eq!(compute_confidence(DiscoverySource::Trace, 1), 0.85);
        assert_eq!(compute_confidence(DiscoverySource::Trace, 0), 0.85);
        let ten = compute_confidence(DiscoverySource::Trace, 10);
        assert!((ten - 0.90).abs() < 1e-12);
        let huge = compute_confidence(DiscoverySource::Platform, 1_000_000);
        assert!((huge - 0.85).abs() < 1e-12);
        assert_eq!(compute_confidence(DiscoverySource::Manual, 500), 1.0);
        assert!(compute_confidence(DiscoverySource::Mesh, 100) <= 1.0);
    }

    #[test]
    fn inserts_unknown_edges() {
        let batch = ObservationBatch {
            source: DiscoverySource::Mesh,
            edges: vec![DependencyEdge::new("a", "b", DiscoverySource::Mesh)],
        };
        let outcome = EdgeMergeResolver::new().resolve(&batch, &HashMap::new()).unwrap();
        assert!(matches!(outcome.decisions[0], MergeDecision::Insert { .. }));
        assert!(outcome.conflicts.is_empty());
    }

    #[test]
    fn same_source_refresh_preserves_identity_and_clears_stale() {
        let old = DependencyEdge::new("a", "b", DiscoverySource::Trace)
            .observed_at(Utc::now() - Duration::days(5))
            .stale();
        let now = Utc::now();
        let batch = ObservationBatch {
            source: DiscoverySource::Trace,
            edges: vec![DependencyEdge::new("a", "b", DiscoverySource::Trace).observed_at(now)],
        };
        let outcome = EdgeMergeResolver::new()
            .resolve(&batch, &index(vec![old.clone()]))
            .unwrap();
        let edge = outcome.decisions[0].edge();
        assert!(matches!(outcome.decisions[0], MergeDecision::Refresh { .. }));
        assert_eq!(edge.id, old.id);
        assert_eq!(edge.last_observed_at, now);
        assert!(!edge.is_stale);
    }

    #[test]
    fn manual_wins_over_trace_in_both_orders() {
        let manual = DependencyEdge::new("a", "b", DiscoverySource::Manual)
            .with_criticality(DependencyCriticality::Soft)
            .with_mode(CommunicationMode::Async)
            .with_timeout_ms(250);
        let trace = DependencyEdge::new("a", "b", DiscoverySource::Trace).with_timeout_ms(900);

        // trace observed against an existing manual edge
        let outcome = EdgeMergeResolver::new()
            .resolve(
                &ObservationBatch {
                    source: DiscoverySource::Trace,
                    edges: vec![trace.clone()],
                },
                &index(vec![manual.clone()]),
            )
            .unwrap();
        let kept = outcome.decisions[0].edge();
        assert!(matches!(outcome.decisions[0], MergeDecision::Retain { .. }));
        assert_eq!(kept.discovery_source, DiscoverySource::Manual);
        assert_eq!(kept.criticality, DependencyCriticality::Soft);
        assert_eq!(kept.timeout_ms, Some(250));
        assert_eq!(
            outcome.conflicts,
            vec![ConflictRecord {
                key: EdgeKey::new("a", "b"),
                losing_source: DiscoverySource::Trace,
                winning_source: DiscoverySource::Manual,
            }]
        );

        // manual observed against an existing trace edge
        let outcome = EdgeMergeResolver::new()
            .resolve(
                &ObservationBatch {
                    source: DiscoverySource::Manual,
                    edges: vec![manual.clone()],
                },
                &index(vec![trace.clone()]),
            )
            .unwrap();
        let winner = outcome.decisions[0].edge();
        assert!(matches!(outcome.decisions[0], MergeDecision::Override { .. }));
        assert_eq!(winner.id, trace.id);
        assert_eq!(winner.discovery_source, DiscoverySource::Manual);
        assert_eq!(winner.timeout_ms, Some(250));
        assert_eq!(outcome.conflicts[0].losing_source, DiscoverySource::Trace);
    }

    #[test]
    fn invalid_edge_rejects_whole_batch() {
        let batch = ObservationBatch {
            source: DiscoverySource::Mesh,
            edges: vec![
                DependencyEdge::new("a", "b", DiscoverySource::Mesh),
                DependencyEdge::new("c", "c", DiscoverySource::Mesh),
            ],
        };
        let err = EdgeMergeResolver::new().resolve(&batch, &HashMap::new());
        assert!(matches!(err, Err(SloGraphError::Validation(_))));
    }

    #[test]
    fn mixed_source_batch_is_rejected() {
        let batch = ObservationBatch {
            source: DiscoverySource::Mesh,
            edges: vec![DependencyEdge::new("a", "b", DiscoverySource::Trace)],
        };
        assert!(EdgeMergeResolver::new().resolve(&batch, &HashMap::new()).is_err());
    }

    #[test]
    fn duplicate_keys_in_one_batch_fold_into_one_edge() {
        let first = DependencyEdge::new("a", "b", DiscoverySource::Platform);
        let second = DependencyEdge::new("a", "b", DiscoverySource::Platform).with_timeout_ms(10);
        let outcome = EdgeMergeResolver::new()
            .resolve(
                &ObservationBatch {
                    source: DiscoverySource::Platform,
                    edges: vec![first.clone(), second],
                },
                &HashMap::new(),
            )
            .unwrap();
        let edges = outcome.edges();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].id, first.id);
        assert_eq!(edges[0].timeout_ms, Some(10));
    }
}

use crate::{
    Bottleneck, BudgetInput, BufferBranch, CompositeAvailabilityEngine, CompositeInput,
    Contribution, DependencyInput, DependencyRisk, ErrorBudgetAnalyzer, ErrorBudgetSummary,
    ExternalBufferComputer, FeasibilityChecker, FeasibilityWarning, RiskFactor, Supernode,
};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use slograph_core::{
    ensure_ratio, ensure_slo_target, AnalysisConfig, CommunicationMode, DependencyCriticality,
    GraphSnapshot, GraphStore, Result, SloGraphError, TelemetrySource, TraversalDepth,
    TraversalDirection,
};
use slograph_graph::{CycleDetector, GraphTraversal, StronglyConnectedComponent};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub service: String,
    pub slo_target_pct: f64,
    pub lookback: Duration,
}

impl AnalysisRequest {
    pub fn new(service: impl Into<String>, slo_target_pct: f64, lookback: Duration) -> Self {
        Self {
            service: service.into(),
            slo_target_pct,
            lookback,
        }
    }

    /// Request using the configured default target and lookback.
    pub fn with_defaults(service: impl Into<String>, config: &AnalysisConfig) -> Self {
        Self::new(service, config.default_slo_target, config.lookback())
    }
}

/// Where a resolved availability came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AvailabilityProvenance {
    Telemetry,
    ExternalBuffer { branch: BufferBranch },
    /// Telemetry was missing, failed or timed out.
    Fallback { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedAvailability {
    pub business_id: String,
    pub availability: f64,
    pub provenance: AvailabilityProvenance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyCounts {
    pub total: usize,
    pub hard_sync: usize,
    pub soft: usize,
    pub degraded: usize,
    #[serde(rename = "async")]
    pub asynchronous: usize,
    pub external: usize,
    pub redundant: usize,
    pub in_cycles: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintAnalysisResult {
    pub service: String,
    pub slo_target_pct: f64,
    pub snapshot_version: u64,
    pub composite_bound: f64,
    pub feasible: bool,
    pub bottleneck: Option<Bottleneck>,
    pub contributions: Vec<Contribution>,
    pub risks: Vec<DependencyRisk>,
    pub risk_factors: Vec<RiskFactor>,
    pub error_budget: ErrorBudgetSummary,
    pub feasibility_warning: Option<FeasibilityWarning>,
    pub supernodes: Vec<Supernode>,
    pub cycles: Vec<StronglyConnectedComponent>,
    pub dependency_counts: DependencyCounts,
    pub availabilities: Vec<ResolvedAvailability>,
}

/// Produces a [`ConstraintAnalysisResult`] for one service from a single
/// pinned graph snapshot. Read-only; holds no per-request state.
pub struct ConstraintAnalyzer<S: GraphStore + ?Sized, T: TelemetrySource + ?Sized> {
    store: Arc<S>,
    telemetry: Arc<T>,
    config: AnalysisConfig,
    traversal: GraphTraversal,
    detector: CycleDetector,
    engine: CompositeAvailabilityEngine,
    buffer: ExternalBufferComputer,
    budget: ErrorBudgetAnalyzer,
    feasibility: FeasibilityChecker,
}

impl<S, T> ConstraintAnalyzer<S, T>
where
    S: GraphStore + ?Sized,
    T: TelemetrySource + ?Sized,
{
    pub fn new(store: Arc<S>, telemetry: Arc<T>, config: AnalysisConfig) -> Self {
        Self {
            store,
            telemetry,
            config,
            traversal: GraphTraversal::new(),
            detector: CycleDetector::new(),
            engine: CompositeAvailabilityEngine::new(),
            buffer: ExternalBufferComputer::new(),
            budget: ErrorBudgetAnalyzer::new(),
            feasibility: FeasibilityChecker::new(),
        }
    }

    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<ConstraintAnalysisResult> {
        ensure_slo_target(request.slo_target_pct)?;
        let snapshot = self.store.snapshot().await?;
        let service = request.service.as_str();

        if !snapshot.contains_service(service) {
            return Err(SloGraphError::NotFound(service.to_string()));
        }
        if !snapshot.has_any_edge(service, false) {
            return Err(SloGraphError::NoDependencies(service.to_string()));
        }

        let direct = self.traversal.subgraph(
            &snapshot,
            service,
            TraversalDirection::Downstream,
            TraversalDepth::new(1)?,
            false,
        )?;
        let dependency_edges: Vec<_> = direct
            .edges
            .iter()
            .filter(|e| e.source == service)
            .collect();

        let components = self.detector.detect(&snapshot.non_stale_adjacency())?;
        let touching: Vec<StronglyConnectedComponent> = components
            .into_iter()
            .filter(|c| {
                c.contains(service) || dependency_edges.iter().any(|e| c.contains(&e.target))
            })
            .collect();

        let mut ids: BTreeSet<&str> = BTreeSet::new();
        ids.insert(service);
        ids.extend(dependency_edges.iter().map(|e| e.target.as_str()));
        ids.extend(touching.iter().flat_map(|c| c.members.iter().map(String::as_str)));

        let resolved = self
            .resolve_all(&snapshot, ids.into_iter().collect(), request.lookback)
            .await?;
        let availability: HashMap<&str, f64> = resolved
            .iter()
            .map(|r| (r.business_id.as_str(), r.availability))
            .collect();
        let lookup = |id: &str| -> Result<f64> {
            availability.get(id).copied().ok_or_else(|| {
                SloGraphError::internal(format!("availability of {} was not resolved", id))
            })
        };

        let dependencies = dependency_edges
            .iter()
            .map(|e| {
                Ok(DependencyInput {
                    business_id: e.target.clone(),
                    availability: lookup(&e.target)?,
                    communication_mode: e.communication_mode,
                    criticality: e.criticality,
                    redundancy_group: e.redundancy_group.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let self_availability = lookup(service)?;

        let composite = self.engine.compose(&CompositeInput {
            target: service.to_string(),
            self_availability,
            dependencies: dependencies.clone(),
            components: touching.clone(),
            member_availability: resolved
                .iter()
                .map(|r| (r.business_id.clone(), r.availability))
                .collect(),
        })?;

        let budget_inputs: Vec<BudgetInput> = dependencies
            .iter()
            .map(|d| BudgetInput {
                business_id: d.business_id.clone(),
                availability: d.availability,
                in_composite: d.is_serial(),
            })
            .collect();
        let budget = self
            .budget
            .analyze(self_availability, &budget_inputs, request.slo_target_pct)?;
        let counts = Self::count(&snapshot, &dependencies, &touching);
        let warning = self.feasibility.check(
            composite.bound,
            request.slo_target_pct,
            counts.hard_sync,
        )?;

        info!(
            service,
            version = snapshot.version(),
            bound = composite.bound,
            target = request.slo_target_pct,
            feasible = warning.is_none(),
            "constraint analysis complete"
        );

        Ok(ConstraintAnalysisResult {
            service: service.to_string(),
            slo_target_pct: request.slo_target_pct,
            snapshot_version: snapshot.version(),
            composite_bound: composite.bound,
            feasible: warning.is_none(),
            bottleneck: composite.bottleneck,
            contributions: composite.contributions,
            risks: budget.risks,
            risk_factors: composite.risk_factors,
            error_budget: budget.summary,
            feasibility_warning: warning,
            supernodes: composite.supernodes,
            cycles: touching,
            dependency_counts: counts,
            availabilities: resolved,
        })
    }

    /// Resolves every id concurrently, at most `max_concurrent_lookups` at a
    /// time, and joins them all before returning.
    async fn resolve_all(
        &self,
        snapshot: &GraphSnapshot,
        ids: Vec<&str>,
        lookback: Duration,
    ) -> Result<Vec<ResolvedAvailability>> {
        let mut resolved = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(self.config.max_concurrent_lookups.max(1)) {
            let batch = join_all(chunk.iter().map(|id| self.resolve(snapshot, id, lookback))).await;
            for result in batch {
                resolved.push(result?);
            }
        }
        Ok(resolved)
    }

    async fn resolve(
        &self,
        snapshot: &GraphSnapshot,
        business_id: &str,
        lookback: Duration,
    ) -> Result<ResolvedAvailability> {
        let observed = self.observe(business_id, lookback).await;
        let service = snapshot.service(business_id);

        if let Some(service) = service.filter(|s| s.is_external()) {
            let external = self
                .buffer
                .compute(observed.as_ref().ok().copied(), service.published_sla)?;
            return Ok(ResolvedAvailability {
                business_id: business_id.to_string(),
                availability: external.effective,
                provenance: AvailabilityProvenance::ExternalBuffer {
                    branch: external.branch,
                },
                explanation: Some(external.explanation),
            });
        }

        Ok(match observed {
            Ok(availability) => ResolvedAvailability {
                business_id: business_id.to_string(),
                availability,
                provenance: AvailabilityProvenance::Telemetry,
                explanation: None,
            },
            Err(reason) => {
                let fallback = self.config.fallback_availability;
                warn!(
                    service = business_id,
                    fallback,
                    reason = %reason,
                    "telemetry unavailable, using fallback availability"
                );
                ResolvedAvailability {
                    business_id: business_id.to_string(),
                    availability: fallback,
                    explanation: Some(format!("{}; assuming {}", reason, fallback)),
                    provenance: AvailabilityProvenance::Fallback { reason },
                }
            }
        })
    }

    /// Observed availability, or the reason none is usable.
    async fn observe(&self, business_id: &str, lookback: Duration) -> std::result::Result<f64, String> {
        let timeout = self.config.telemetry_timeout();
        let lookup = self.telemetry.get_availability(business_id, lookback);
        match tokio::time::timeout(timeout, lookup).await {
            Ok(Ok(Some(value))) => match ensure_ratio("observed availability", value) {
                Ok(value) => {
                    debug!(service = business_id, value, "telemetry resolved");
                    Ok(value)
                }
                Err(e) => Err(e.to_string()),
            },
            Ok(Ok(None)) => Err("no telemetry recorded".to_string()),
            Ok(Err(e)) => Err(format!("telemetry lookup failed: {}", e)),
            Err(_) => Err(format!("telemetry lookup timed out after {:?}", timeout)),
        }
    }

    fn count(
        snapshot: &GraphSnapshot,
        dependencies: &[DependencyInput],
        cycles: &[StronglyConnectedComponent],
    ) -> DependencyCounts {
        let mut counts = DependencyCounts {
            total: dependencies.len(),
            ..Default::default()
        };
        for dep in dependencies {
            if dep.is_serial() {
                counts.hard_sync += 1;
            }
            match dep.criticality {
                DependencyCriticality::Soft => counts.soft += 1,
                DependencyCriticality::Degraded => counts.degraded += 1,
                DependencyCriticality::Hard => {}
            }
            if dep.communication_mode == CommunicationMode::Async {
                counts.asynchronous += 1;
            }
            if snapshot
                .service(&dep.business_id)
                .is_some_and(|s| s.is_external())
            {
                counts.external += 1;
            }
            if dep.redundancy_group.is_some() {
                counts.redundant += 1;
            }
            if cycles.iter().any(|c| c.contains(&dep.business_id)) {
                counts.in_cycles += 1;
            }
        }
        counts
    }
}

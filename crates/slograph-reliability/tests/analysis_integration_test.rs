use approx::assert_relative_eq;
use slograph_core::{
    AnalysisConfig, CommunicationMode, DependencyCriticality, DependencyEdge, DiscoverySource,
    Service,
};
use slograph_graph::{GraphIngestor, IngestionBatch, InMemoryGraphStore};
use slograph_reliability::{
    AnalysisRequest, AvailabilityProvenance, ConstraintAnalyzer, InMemoryTelemetry, RiskTier,
    UnitKind,
};
use std::sync::Arc;
use std::time::Duration;

async fn checkout_graph() -> Arc<InMemoryGraphStore> {
    let store = Arc::new(InMemoryGraphStore::new());
    let ingestor = GraphIngestor::new(Arc::clone(&store));
    ingestor
        .ingest(
            IngestionBatch::new(DiscoverySource::Manual)
                .with_service(Service::new("checkout"))
                .with_service(Service::new("orders-db"))
                .with_service(Service::new("cache-a"))
                .with_service(Service::new("cache-b"))
                .with_service(Service::new("email"))
                .with_service(Service::external("psp", Some(0.9999)))
                .with_edge(DependencyEdge::new("checkout", "orders-db", DiscoverySource::Manual))
                .with_edge(
                    DependencyEdge::new("checkout", "cache-a", DiscoverySource::Manual)
                        .with_redundancy_group("cache"),
                )
                .with_edge(
                    DependencyEdge::new("checkout", "cache-b", DiscoverySource::Manual)
                        .with_redundancy_group("cache"),
                )
                .with_edge(
                    DependencyEdge::new("checkout", "email", DiscoverySource::Manual)
                        .with_mode(CommunicationMode::Async)
                        .with_criticality(DependencyCriticality::Soft),
                )
                .with_edge(DependencyEdge::new("checkout", "psp", DiscoverySource::Manual)),
        )
        .await
        .unwrap();
    store
}

fn telemetry() -> Arc<InMemoryTelemetry> {
    let telemetry = InMemoryTelemetry::new();
    telemetry.record("checkout", 0.9999).unwrap();
    telemetry.record("orders-db", 0.995).unwrap();
    telemetry.record("cache-a", 0.99).unwrap();
    telemetry.record("cache-b", 0.99).unwrap();
    telemetry.record("email", 0.9).unwrap();
    Arc::new(telemetry)
}

#[tokio::test]
async fn test_full_constraint_analysis() {
    let analyzer = ConstraintAnalyzer::new(checkout_graph().await, telemetry(), AnalysisConfig::default());
    let result = analyzer
        .analyze(&AnalysisRequest::new("checkout", 99.9, Duration::from_secs(30 * 86_400)))
        .await
        .unwrap();

    let expected = 0.9999 * 0.995 * 0.9999 * 0.9989;
    assert_relative_eq!(result.composite_bound, expected, epsilon = 1e-12);
    assert!(!result.feasible);

    let bottleneck = result.bottleneck.as_ref().unwrap();
    assert_eq!(bottleneck.label, "orders-db");

    let counts = &result.dependency_counts;
    assert_eq!(counts.total, 5);
    assert_eq!(counts.hard_sync, 4);
    assert_eq!(counts.soft, 1);
    assert_eq!(counts.asynchronous, 1);
    assert_eq!(counts.external, 1);
    assert_eq!(counts.redundant, 2);
    assert_eq!(counts.in_cycles, 0);

    assert!(result
        .contributions
        .iter()
        .any(|c| c.kind == UnitKind::RedundancyGroup && c.label == "group:cache"));
    assert_eq!(result.risk_factors.len(), 1);
    assert_eq!(result.risk_factors[0].business_id, "email");

    let db_risk = result.risks.iter().find(|r| r.business_id == "orders-db").unwrap();
    assert_eq!(db_risk.risk_tier, RiskTier::High);
    assert!(result.error_budget.high_risk.contains(&"orders-db".to_string()));

    let warning = result.feasibility_warning.as_ref().unwrap();
    // orders-db, cache-a, cache-b and psp are hard sync dependencies
    assert_relative_eq!(
        warning.required_dependency_availability,
        1.0 - 0.001 / 5.0,
        epsilon = 1e-12
    );

    let psp = result.availabilities.iter().find(|a| a.business_id == "psp").unwrap();
    assert!(matches!(psp.provenance, AvailabilityProvenance::ExternalBuffer { .. }));
}

#[tokio::test]
async fn test_cycle_through_target_is_contracted() {
    let store = Arc::new(InMemoryGraphStore::new());
    GraphIngestor::new(Arc::clone(&store))
        .ingest(
            IngestionBatch::new(DiscoverySource::Trace)
                .with_edge(DependencyEdge::new("a", "b", DiscoverySource::Trace))
                .with_edge(DependencyEdge::new("b", "c", DiscoverySource::Trace))
                .with_edge(DependencyEdge::new("c", "a", DiscoverySource::Trace))
                .with_edge(DependencyEdge::new("a", "d", DiscoverySource::Trace)),
        )
        .await
        .unwrap();

    let telemetry = InMemoryTelemetry::new();
    for (id, a) in [("a", 0.9999), ("b", 0.999), ("c", 0.99), ("d", 0.9995)] {
        telemetry.record(id, a).unwrap();
    }
    let analyzer = ConstraintAnalyzer::new(store, Arc::new(telemetry), AnalysisConfig::default());
    let result = analyzer
        .analyze(&AnalysisRequest::new("a", 98.0, Duration::from_secs(86_400)))
        .await
        .unwrap();

    assert_eq!(result.cycles.len(), 1);
    assert_eq!(result.supernodes[0].weakest_member, "c");
    assert_relative_eq!(result.composite_bound, 0.99 * 0.9995, epsilon = 1e-12);
    assert_eq!(result.dependency_counts.in_cycles, 1);
    assert!(result.feasible);
}

#[tokio::test]
async fn test_result_serializes_to_json() {
    let analyzer = ConstraintAnalyzer::new(checkout_graph().await, telemetry(), AnalysisConfig::default());
    let result = analyzer
        .analyze(&AnalysisRequest::new("checkout", 99.0, Duration::from_secs(86_400)))
        .await
        .unwrap();
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["service"], "checkout");
    assert!(json["dependency_counts"]["async"].is_number());
}

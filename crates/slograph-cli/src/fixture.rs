use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use slograph_core::IngestionConfig;
use slograph_graph::{GraphIngestor, IngestionBatch, IngestionReport, InMemoryGraphStore};
use slograph_reliability::InMemoryTelemetry;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Staleness windows are capped at about a century.
const MAX_STALE_HOURS: i64 = 24 * 365 * 100;

/// Graph file consumed by every command: ingestion batches applied in order,
/// plus observed availability per service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphFixture {
    #[serde(default)]
    pub batches: Vec<IngestionBatch>,
    #[serde(default)]
    pub telemetry: HashMap<String, f64>,
}

impl GraphFixture {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read graph file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse graph file {}", path.display()))
    }
}

pub struct LoadedGraph {
    pub store: Arc<InMemoryGraphStore>,
    pub telemetry: Arc<InMemoryTelemetry>,
    pub reports: Vec<IngestionReport>,
    pub stale_edges: usize,
}

/// Ingests every batch into a fresh store, then flags edges older than the
/// configured staleness window.
pub async fn build(fixture: GraphFixture, ingestion: &IngestionConfig) -> Result<LoadedGraph> {
    let store = Arc::new(InMemoryGraphStore::new());
    let ingestor = GraphIngestor::new(Arc::clone(&store));

    let mut reports = Vec::with_capacity(fixture.batches.len());
    for (i, batch) in fixture.batches.into_iter().enumerate() {
        let report = ingestor
            .ingest(batch)
            .await
            .with_context(|| format!("Failed to ingest batch {}", i + 1))?;
        reports.push(report);
    }

    let hours = i64::try_from(ingestion.stale_after_hours)
        .unwrap_or(MAX_STALE_HOURS)
        .min(MAX_STALE_HOURS);
    let threshold = Duration::hours(hours);
    let stale_edges = store
        .mark_stale(Utc::now(), threshold)
        .context("Failed to mark stale edges")?;

    let telemetry = InMemoryTelemetry::from_map(fixture.telemetry)
        .context("Invalid telemetry in graph file")?;

    info!(
        batches = reports.len(),
        services = store.load().service_count(),
        stale_edges,
        "graph loaded"
    );
    Ok(LoadedGraph {
        store,
        telemetry: Arc::new(telemetry),
        reports,
        stale_edges,
    })
}

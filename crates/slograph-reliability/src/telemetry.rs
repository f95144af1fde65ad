use async_trait::async_trait;
use dashmap::DashMap;
use slograph_core::{ensure_ratio, Result, TelemetrySource};
use std::collections::HashMap;
use std::time::Duration;

/// Map-backed [`TelemetrySource`]; the lookback window is ignored.
#[derive(Debug, Default)]
pub struct InMemoryTelemetry {
    availability: DashMap<String, f64>,
}

impl InMemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(values: HashMap<String, f64>) -> Result<Self> {
        let telemetry = Self::new();
        for (id, value) in values {
            telemetry.record(id, value)?;
        }
        Ok(telemetry)
    }

    pub fn record(&self, business_id: impl Into<String>, availability: f64) -> Result<()> {
        ensure_ratio("observed availability", availability)?;
        self.availability.insert(business_id.into(), availability);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.availability.len()
    }

    pub fn is_empty(&self) -> bool {
        self.availability.is_empty()
    }
}

#[async_trait]
impl TelemetrySource for InMemoryTelemetry {
    async fn get_availability(&self, business_id: &str, _lookback: Duration) -> Result<Option<f64>> {
        Ok(self.availability.get(business_id).map(|v| *v))
    }
}

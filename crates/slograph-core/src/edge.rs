use crate::validation::{ensure_business_id, ensure_ratio};
use crate::{
    CommunicationMode, DependencyCriticality, DiscoverySource, EdgeId, Result, SloGraphError,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lookup key of an edge after merge: at most one edge per (source, target).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
    pub source: String,
    pub target: String,
}

impl EdgeKey {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(default)]
    pub backoff_ms: u64,
}

/// Directed dependency: `source` depends on `target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyEdge {
    #[serde(default = "EdgeId::new_v4")]
    pub id: EdgeId,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub communication_mode: CommunicationMode,
    #[serde(default)]
    pub criticality: DependencyCriticality,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
    pub discovery_source: DiscoverySource,
    /// Recomputed on merge; any reported value is advisory.
    #[serde(default)]
    pub confidence_score: f64,
    #[serde(default = "default_observation_count")]
    pub observation_count: u32,
    #[serde(default = "Utc::now")]
    pub last_observed_at: DateTime<Utc>,
    #[serde(default)]
    pub is_stale: bool,
    /// Edges sharing a tag are alternate paths to an equivalent capability.
    #[serde(default)]
    pub redundancy_group: Option<String>,
}

fn default_observation_count() -> u32 {
    1
}

impl DependencyEdge {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        discovery_source: DiscoverySource,
    ) -> Self {
        Self {
            id: EdgeId::new_v4(),
            source: source.into(),
            target: target.into(),
            communication_mode: CommunicationMode::Sync,
            criticality: DependencyCriticality::Hard,
            protocol: None,
            timeout_ms: None,
            retry_policy: None,
            discovery_source,
            confidence_score: discovery_source.base_confidence(),
            observation_count: 1,
            last_observed_at: Utc::now(),
            is_stale: false,
            redundancy_group: None,
        }
    }

    pub fn with_mode(mut self, mode: CommunicationMode) -> Self {
        self.communication_mode = mode;
        self
    }

    pub fn with_criticality(mut self, criticality: DependencyCriticality) -> Self {
        self.criticality = criticality;
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_retry_policy(mut self, max_attempts: u32, backoff_ms: u64) -> Self {
        self.retry_policy = Some(RetryPolicy {
            max_attempts,
            backoff_ms,
        });
        self
    }

    pub fn with_observations(mut self, count: u32) -> Self {
        self.observation_count = count;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence_score = confidence;
        self
    }

    pub fn observed_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_observed_at = at;
        self
    }

    pub fn with_redundancy_group(mut self, group: impl Into<String>) -> Self {
        self.redundancy_group = Some(group.into());
        self
    }

    pub fn stale(mut self) -> Self {
        self.is_stale = true;
        self
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey::new(self.source.clone(), self.target.clone())
    }

    /// Hard and synchronous: counted in the serial availability product.
    pub fn is_serial(&self) -> bool {
        self.criticality == DependencyCriticality::Hard
            && self.communication_mode == CommunicationMode::Sync
    }

    pub fn validate(&self) -> Result<()> {
        ensure_business_id(&self.source)?;
        ensure_business_id(&self.target)?;
        if self.source == self.target {
            return Err(SloGraphError::validation(format!(
                "self-loop edge on '{}'",
                self.source
            )));
        }
        ensure_ratio("confidence_score", self.confidence_score)?;
        if self.timeout_ms == Some(0) {
            return Err(SloGraphError::validation(format!(
                "edge {} has a non-positive timeout",
                self.key()
            )));
        }
        if let Some(policy) = &self.retry_policy {
            if policy.max_attempts == 0 {
                return Err(SloGraphError::validation(format!(
                    "edge {} retry policy needs at least one attempt",
                    self.key()
                )));
            }
        }
        Ok(())
    }
}

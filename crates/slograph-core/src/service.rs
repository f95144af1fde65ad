use crate::validation::{ensure_business_id, ensure_ratio};
use crate::{CriticalityTier, Result, ServiceClassification, ServiceId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A service in the fleet, keyed by its stable business identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    #[serde(default = "ServiceId::new_v4")]
    pub id: ServiceId,
    pub business_id: String,
    #[serde(default)]
    pub classification: ServiceClassification,
    #[serde(default)]
    pub tier: CriticalityTier,
    #[serde(default)]
    pub owner_team: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Auto-created from an edge reference rather than declared.
    #[serde(default)]
    pub discovered: bool,
    /// Self-reported SLA ratio; only meaningful for external services.
    #[serde(default)]
    pub published_sla: Option<f64>,
}

impl Service {
    pub fn new(business_id: impl Into<String>) -> Self {
        Self {
            id: ServiceId::new_v4(),
            business_id: business_id.into(),
            classification: ServiceClassification::Internal,
            tier: CriticalityTier::default(),
            owner_team: None,
            metadata: BTreeMap::new(),
            discovered: false,
            published_sla: None,
        }
    }

    /// Placeholder for a service only known through an edge reference.
    pub fn placeholder(business_id: impl Into<String>) -> Self {
        Self {
            discovered: true,
            ..Self::new(business_id)
        }
    }

    pub fn external(business_id: impl Into<String>, published_sla: Option<f64>) -> Self {
        Self {
            classification: ServiceClassification::External,
            published_sla,
            ..Self::new(business_id)
        }
    }

    pub fn with_tier(mut self, tier: CriticalityTier) -> Self {
        self.tier = tier;
        self
    }

    pub fn with_owner(mut self, team: impl Into<String>) -> Self {
        self.owner_team = Some(team.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_external(&self) -> bool {
        self.classification == ServiceClassification::External
    }

    pub fn validate(&self) -> Result<()> {
        ensure_business_id(&self.business_id)?;
        if let Some(sla) = self.published_sla {
            ensure_ratio("published_sla", sla)?;
        }
        Ok(())
    }

    /// Replaces every attribute with the declared one while keeping the
    /// internal identifier stable.
    pub fn redeclared(&self, declared: Service) -> Service {
        Service {
            id: self.id,
            ..declared
        }
    }
}

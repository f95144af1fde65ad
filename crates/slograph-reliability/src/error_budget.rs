use serde::{Deserialize, Serialize};
use slograph_core::{ensure_ratio, ensure_slo_target, Result};
use std::fmt;

/// Consumption percent reported when the target leaves no budget at all.
pub const UNBOUNDED_CONSUMPTION_PCT: f64 = 999_999.99;

pub const MINUTES_PER_MONTH: f64 = 30.0 * 24.0 * 60.0;

const MODERATE_THRESHOLD_PCT: f64 = 20.0;
const HIGH_THRESHOLD_PCT: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskTier {
    Low,
    Moderate,
    High,
}

impl RiskTier {
    pub fn from_consumption_pct(pct: f64) -> Self {
        if pct > HIGH_THRESHOLD_PCT {
            RiskTier::High
        } else if pct >= MODERATE_THRESHOLD_PCT {
            RiskTier::Moderate
        } else {
            RiskTier::Low
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskTier::Low => "LOW",
            RiskTier::Moderate => "MODERATE",
            RiskTier::High => "HIGH",
        };
        write!(f, "{}", s)
    }
}

/// Budget consumption of one dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyRisk {
    pub business_id: String,
    pub availability: f64,
    /// Fraction of the target's budget this dependency alone burns; 1.0 is 100%.
    pub consumption_ratio: f64,
    pub consumption_pct: f64,
    pub risk_tier: RiskTier,
    /// False for soft, degraded or async dependencies reported as risk factors.
    pub in_composite: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetInput {
    pub business_id: String,
    pub availability: f64,
    pub in_composite: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBudgetSummary {
    pub slo_target_pct: f64,
    pub monthly_budget_minutes: f64,
    pub self_consumption_pct: f64,
    pub high_risk: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBudgetReport {
    pub risks: Vec<DependencyRisk>,
    pub summary: ErrorBudgetSummary,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorBudgetAnalyzer;

impl ErrorBudgetAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// `(1 - a) / (1 - T/100)`, expressed as a ratio. A target of 100%
    /// yields the sentinel unless the dependency is perfectly available.
    pub fn consumption_ratio(availability: f64, slo_target_pct: f64) -> f64 {
        let unavailability = 1.0 - availability;
        let budget = 1.0 - slo_target_pct / 100.0;
        if unavailability <= 0.0 {
            0.0
        } else if budget <= 0.0 {
            UNBOUNDED_CONSUMPTION_PCT / 100.0
        } else {
            unavailability / budget
        }
    }

    pub fn monthly_budget_minutes(slo_target_pct: f64) -> f64 {
        (1.0 - slo_target_pct / 100.0) * MINUTES_PER_MONTH
    }

    pub fn assess(
        &self,
        business_id: &str,
        availability: f64,
        slo_target_pct: f64,
        in_composite: bool,
    ) -> Result<DependencyRisk> {
        ensure_ratio("dependency availability", availability)?;
        ensure_slo_target(slo_target_pct)?;
        let ratio = Self::consumption_ratio(availability, slo_target_pct);
        // tiers are decided on the exact value; only the reported percent is rounded
        Ok(DependencyRisk {
            business_id: business_id.to_string(),
            availability,
            consumption_ratio: ratio,
            consumption_pct: to_pct(ratio),
            risk_tier: RiskTier::from_consumption_pct(ratio * 100.0),
            in_composite,
        })
    }

    pub fn analyze(
        &self,
        self_availability: f64,
        dependencies: &[BudgetInput],
        slo_target_pct: f64,
    ) -> Result<ErrorBudgetReport> {
        ensure_slo_target(slo_target_pct)?;
        ensure_ratio("target availability", self_availability)?;

        let risks = dependencies
            .iter()
            .map(|d| self.assess(&d.business_id, d.availability, slo_target_pct, d.in_composite))
            .collect::<Result<Vec<_>>>()?;
        let high_risk = risks
            .iter()
            .filter(|r| r.risk_tier == RiskTier::High)
            .map(|r| r.business_id.clone())
            .collect();

        Ok(ErrorBudgetReport {
            summary: ErrorBudgetSummary {
                slo_target_pct,
                monthly_budget_minutes: Self::monthly_budget_minutes(slo_target_pct),
                self_consumption_pct: to_pct(Self::consumption_ratio(
                    self_availability,
                    slo_target_pct,
                )),
                high_risk,
            },
            risks,
        })
    }
}

/// Percent rounded to two decimals.
fn to_pct(ratio: f64) -> f64 {
    ((ratio * 100.0) * 100.0).round() / 100.0
}

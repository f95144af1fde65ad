use serde::{Deserialize, Serialize};
use slograph_core::{ensure_ratio, ensure_slo_target, Result};
use tracing::debug;

/// Absorbs rounding in `T / 100` so a bound equal to the target is feasible.
const TOLERANCE: f64 = 1e-12;

/// Emitted when the requested target exceeds what the dependency chain can
/// deliver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeasibilityWarning {
    pub slo_target_pct: f64,
    pub composite_bound: f64,
    /// Percentage points between the target and the bound.
    pub gap_pct: f64,
    /// Availability each serial dependency would need for the target to hold.
    pub required_dependency_availability: f64,
    pub explanation: String,
    pub remediation: Vec<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FeasibilityChecker;

impl FeasibilityChecker {
    pub fn new() -> Self {
        Self
    }

    /// Splits the target's budget evenly across itself and `serial_deps`
    /// dependencies: `1 - (1 - T/100) / (N + 1)`.
    pub fn required_availability(slo_target_pct: f64, serial_deps: usize) -> f64 {
        if serial_deps == 0 {
            return slo_target_pct / 100.0;
        }
        1.0 - (1.0 - slo_target_pct / 100.0) / (serial_deps as f64 + 1.0)
    }

    /// `None` when the bound meets the target.
    pub fn check(
        &self,
        composite_bound: f64,
        slo_target_pct: f64,
        serial_deps: usize,
    ) -> Result<Option<FeasibilityWarning>> {
        ensure_ratio("composite bound", composite_bound)?;
        ensure_slo_target(slo_target_pct)?;

        if composite_bound + TOLERANCE >= slo_target_pct / 100.0 {
            debug!(composite_bound, slo_target_pct, "target is feasible");
            return Ok(None);
        }

        let bound_pct = composite_bound * 100.0;
        let gap_pct = slo_target_pct - bound_pct;
        let required = Self::required_availability(slo_target_pct, serial_deps);
        let relaxed = (bound_pct * 10_000.0).floor() / 10_000.0;

        let explanation = format!(
            "target {}% exceeds the achievable bound {:.4}% by {:.4} points; with {} serial \
             dependencies each would need {:.6} availability",
            slo_target_pct, bound_pct, gap_pct, serial_deps, required
        );
        let remediation = vec![
            "add redundant paths for the weakest hard dependencies".to_string(),
            "convert hard or synchronous dependencies to soft or asynchronous where the \
             workflow tolerates it"
                .to_string(),
            format!("relax the target to at most {:.4}%", relaxed),
        ];

        Ok(Some(FeasibilityWarning {
            slo_target_pct,
            composite_bound,
            gap_pct,
            required_dependency_availability: required,
            explanation,
            remediation,
        }))
    }
}

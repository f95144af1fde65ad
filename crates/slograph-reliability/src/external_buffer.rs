use serde::{Deserialize, Serialize};
use slograph_core::{ensure_ratio, Result};

/// Published unavailability is multiplied by this factor before it is
/// trusted; a vendor claiming 99.99% is treated as 99.89%.
pub const PUBLISHED_SLA_PENALTY: f64 = 11.0;

/// Assumed availability of an external dependency with no data at all.
pub const EXTERNAL_DEFAULT_AVAILABILITY: f64 = 0.999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferBranch {
    /// Both observed and adjusted published values; the lower one wins.
    ObservedAndPublished,
    ObservedOnly,
    PublishedOnly,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalAvailability {
    pub effective: f64,
    pub adjusted_published: Option<f64>,
    pub branch: BufferBranch,
    pub explanation: String,
}

/// Discounts vendor-published SLAs and reconciles them with observed data.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExternalBufferComputer;

impl ExternalBufferComputer {
    pub fn new() -> Self {
        Self
    }

    /// `max(0, 1 - (1 - p) * 11)`
    pub fn adjust_published(published: f64) -> f64 {
        (1.0 - (1.0 - published) * PUBLISHED_SLA_PENALTY).max(0.0)
    }

    pub fn compute(
        &self,
        observed: Option<f64>,
        published_sla: Option<f64>,
    ) -> Result<ExternalAvailability> {
        if let Some(o) = observed {
            ensure_ratio("observed availability", o)?;
        }
        if let Some(p) = published_sla {
            ensure_ratio("published SLA", p)?;
        }
        let adjusted = published_sla.map(Self::adjust_published);

        let (effective, branch, explanation) = match (observed, adjusted, published_sla) {
            (Some(o), Some(a), Some(p)) => {
                let effective = o.min(a);
                let chosen = if o <= a { "observed" } else { "adjusted published" };
                (
                    effective,
                    BufferBranch::ObservedAndPublished,
                    format!(
                        "observed {} vs published {} adjusted to {}; using {} {}",
                        pct(o),
                        pct(p),
                        pct(a),
                        chosen,
                        pct(effective)
                    ),
                )
            }
            (Some(o), _, _) => (
                o,
                BufferBranch::ObservedOnly,
                format!("no published SLA; using observed {}", pct(o)),
            ),
            (None, Some(a), Some(p)) => (
                a,
                BufferBranch::PublishedOnly,
                format!(
                    "no telemetry; published {} adjusted to {} (unavailability x{})",
                    pct(p),
                    pct(a),
                    PUBLISHED_SLA_PENALTY
                ),
            ),
            _ => (
                EXTERNAL_DEFAULT_AVAILABILITY,
                BufferBranch::Default,
                format!(
                    "no telemetry and no published SLA; assuming {}",
                    pct(EXTERNAL_DEFAULT_AVAILABILITY)
                ),
            ),
        };

        Ok(ExternalAvailability {
            effective,
            adjusted_published: adjusted,
            branch,
            explanation,
        })
    }
}

fn pct(ratio: f64) -> String {
    format!("{:.2}%", ratio * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn published_only_is_discounted() {
        let result = ExternalBufferComputer::new().compute(None, Some(0.9999)).unwrap();
        assert_relative_eq!(result.effective, 0.9989, epsilon = 1e-9);
        assert_eq!(result.branch, BufferBranch::PublishedOnly);
        assert!(result.explanation.contains("99.89%"));
    }

    #[test]
    fn observed_below_adjusted_wins() {
        let result = ExternalBufferComputer::new()
            .compute(Some(0.9960), Some(0.9999))
            .unwrap();
        assert_relative_eq!(result.effective, 0.9960, epsilon = 1e-9);
        assert_eq!(result.branch, BufferBranch::ObservedAndPublished);
    }

    #[test]
    fn adjusted_below_observed_wins() {
        let result = ExternalBufferComputer::new()
            .compute(Some(0.99999), Some(0.999))
            .unwrap();
        assert_relative_eq!(result.effective, 0.989, epsilon = 1e-9);
    }

    #[test]
    fn weak_published_sla_clamps_to_zero() {
        assert_eq!(ExternalBufferComputer::adjust_published(0.5), 0.0);
    }

    #[test]
    fn fallbacks() {
        let computer = ExternalBufferComputer::new();
        let observed = computer.compute(Some(0.95), None).unwrap();
        assert_eq!(observed.branch, BufferBranch::ObservedOnly);
        assert_eq!(observed.effective, 0.95);

        let none = computer.compute(None, None).unwrap();
        assert_eq!(none.branch, BufferBranch::Default);
        assert_eq!(none.effective, EXTERNAL_DEFAULT_AVAILABILITY);
    }

    #[test]
    fn out_of_range_inputs_are_rejected() {
        assert!(ExternalBufferComputer::new().compute(Some(1.2), None).is_err());
        assert!(ExternalBufferComputer::new().compute(None, Some(-0.1)).is_err());
    }
}

use serde::{Deserialize, Serialize};
use slograph_core::{
    ensure_ratio, CommunicationMode, DependencyCriticality, Result, SloGraphError,
};
use slograph_graph::StronglyConnectedComponent;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// A direct dependency of the target with its resolved availability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyInput {
    pub business_id: String,
    pub availability: f64,
    pub communication_mode: CommunicationMode,
    pub criticality: DependencyCriticality,
    pub redundancy_group: Option<String>,
}

impl DependencyInput {
    pub fn hard_sync(business_id: impl Into<String>, availability: f64) -> Self {
        Self {
            business_id: business_id.into(),
            availability,
            communication_mode: CommunicationMode::Sync,
            criticality: DependencyCriticality::Hard,
            redundancy_group: None,
        }
    }

    pub fn with_criticality(mut self, criticality: DependencyCriticality) -> Self {
        self.criticality = criticality;
        self
    }

    pub fn with_mode(mut self, mode: CommunicationMode) -> Self {
        self.communication_mode = mode;
        self
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.redundancy_group = Some(group.into());
        self
    }

    /// Hard and synchronous: multiplied into the bound.
    pub fn is_serial(&self) -> bool {
        self.criticality == DependencyCriticality::Hard
            && self.communication_mode == CommunicationMode::Sync
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositeInput {
    pub target: String,
    pub self_availability: f64,
    pub dependencies: Vec<DependencyInput>,
    /// Strongly connected components touching the target or its dependencies.
    pub components: Vec<StronglyConnectedComponent>,
    /// Availability of component members that are not direct dependencies.
    pub member_availability: HashMap<String, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Target,
    Supernode,
    RedundancyGroup,
    Dependency,
}

/// One factor of the serial product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub label: String,
    pub kind: UnitKind,
    pub members: Vec<String>,
    pub availability: f64,
    /// Share of the summed unavailability of all units, in [0, 1].
    pub unavailability_share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bottleneck {
    pub label: String,
    pub kind: UnitKind,
    pub availability: f64,
    pub unavailability_share: f64,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub business_id: String,
    pub availability: f64,
    pub criticality: DependencyCriticality,
    pub communication_mode: CommunicationMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supernode {
    pub members: Vec<String>,
    pub weakest_member: String,
    pub availability: f64,
    pub contains_target: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeResult {
    pub bound: f64,
    pub contributions: Vec<Contribution>,
    pub bottleneck: Option<Bottleneck>,
    /// Soft, degraded or async dependencies excluded from the bound.
    pub risk_factors: Vec<RiskFactor>,
    pub supernodes: Vec<Supernode>,
}

struct Unit {
    label: String,
    kind: UnitKind,
    members: Vec<String>,
    availability: f64,
}

/// Folds a classified dependency chain into an achievable availability
/// bound: cycles are contracted first, then redundancy groups, then the
/// serial product is taken.
#[derive(Debug, Default, Clone, Copy)]
pub struct CompositeAvailabilityEngine;

impl CompositeAvailabilityEngine {
    pub fn new() -> Self {
        Self
    }

    /// `1 - prod(1 - a_i)`
    pub fn parallel(availabilities: &[f64]) -> f64 {
        1.0 - availabilities.iter().map(|a| 1.0 - a).product::<f64>()
    }

    pub fn compose(&self, input: &CompositeInput) -> Result<CompositeResult> {
        Self::validate(input)?;

        let (serial, risk_factors): (Vec<&DependencyInput>, Vec<&DependencyInput>) =
            input.dependencies.iter().partition(|d| d.is_serial());
        let risk_factors: Vec<RiskFactor> = risk_factors
            .into_iter()
            .map(|d| RiskFactor {
                business_id: d.business_id.clone(),
                availability: d.availability,
                criticality: d.criticality,
                communication_mode: d.communication_mode,
            })
            .collect();

        let availability_of = |id: &str| -> Option<f64> {
            if id == input.target {
                return Some(input.self_availability);
            }
            input
                .dependencies
                .iter()
                .find(|d| d.business_id == id)
                .map(|d| d.availability)
                .or_else(|| input.member_availability.get(id).copied())
        };

        let mut supernodes = Vec::new();
        let mut units = Vec::new();

        // target, contracted with its component when it sits on a cycle
        let target_component = input.components.iter().find(|c| c.contains(&input.target));
        match target_component {
            Some(component) => {
                let supernode = Self::supernode(component, true, &availability_of)?;
                units.push(Unit {
                    label: input.target.clone(),
                    kind: UnitKind::Target,
                    members: supernode.members.clone(),
                    availability: supernode.availability,
                });
                supernodes.push(supernode);
            }
            None => units.push(Unit {
                label: input.target.clone(),
                kind: UnitKind::Target,
                members: vec![input.target.clone()],
                availability: input.self_availability,
            }),
        }

        let mut by_component: BTreeMap<usize, Vec<&DependencyInput>> = BTreeMap::new();
        let mut by_group: BTreeMap<&str, Vec<&DependencyInput>> = BTreeMap::new();
        let mut singles: Vec<&DependencyInput> = Vec::new();

        for dep in serial {
            if target_component.is_some_and(|c| c.contains(&dep.business_id)) {
                continue;
            }
            if let Some(idx) = input
                .components
                .iter()
                .position(|c| c.contains(&dep.business_id))
            {
                by_component.entry(idx).or_default().push(dep);
            } else if let Some(group) = dep.redundancy_group.as_deref() {
                by_group.entry(group).or_default().push(dep);
            } else {
                singles.push(dep);
            }
        }

        for idx in by_component.keys() {
            let component = &input.components[*idx];
            let supernode = Self::supernode(component, false, &availability_of)?;
            units.push(Unit {
                label: format!("cycle[{}]", supernode.members.join(",")),
                kind: UnitKind::Supernode,
                members: supernode.members.clone(),
                availability: supernode.availability,
            });
            supernodes.push(supernode);
        }

        for (group, deps) in by_group {
            let availabilities: Vec<f64> = deps.iter().map(|d| d.availability).collect();
            let mut members: Vec<String> = deps.iter().map(|d| d.business_id.clone()).collect();
            members.sort();
            units.push(Unit {
                label: format!("group:{}", group),
                kind: UnitKind::RedundancyGroup,
                members,
                availability: Self::parallel(&availabilities),
            });
        }

        for dep in singles {
            units.push(Unit {
                label: dep.business_id.clone(),
                kind: UnitKind::Dependency,
                members: vec![dep.business_id.clone()],
                availability: dep.availability,
            });
        }

        units[1..].sort_by(|a, b| a.label.cmp(&b.label));

        let bound = units.iter().map(|u| u.availability).product::<f64>();
        let total_unavailability: f64 = units.iter().map(|u| 1.0 - u.availability).sum();

        let contributions: Vec<Contribution> = units
            .into_iter()
            .map(|u| {
                let share = if total_unavailability > 0.0 {
                    (1.0 - u.availability) / total_unavailability
                } else {
                    0.0
                };
                Contribution {
                    label: u.label,
                    kind: u.kind,
                    members: u.members,
                    availability: u.availability,
                    unavailability_share: share,
                }
            })
            .collect();

        let bottleneck = contributions
            .iter()
            .filter(|c| c.kind != UnitKind::Target && c.unavailability_share > 0.0)
            .fold(None::<&Contribution>, |best, c| match best {
                Some(b) if b.unavailability_share >= c.unavailability_share => Some(b),
                _ => Some(c),
            })
            .map(|c| Bottleneck {
                label: c.label.clone(),
                kind: c.kind,
                availability: c.availability,
                unavailability_share: c.unavailability_share,
                note: format!(
                    "{} at {:.4}% accounts for {:.1}% of the composite unavailability",
                    c.label,
                    c.availability * 100.0,
                    c.unavailability_share * 100.0
                ),
            });

        debug!(
            target = %input.target,
            bound,
            units = contributions.len(),
            risk_factors = risk_factors.len(),
            "composite availability computed"
        );

        Ok(CompositeResult {
            bound,
            contributions,
            bottleneck,
            risk_factors,
            supernodes,
        })
    }

    /// Contracts a component to its weakest member.
    fn supernode(
        component: &StronglyConnectedComponent,
        contains_target: bool,
        availability_of: &dyn Fn(&str) -> Option<f64>,
    ) -> Result<Supernode> {
        let mut weakest: Option<(&String, f64)> = None;
        for member in &component.members {
            let Some(a) = availability_of(member) else {
                continue;
            };
            if weakest.map_or(true, |(_, w)| a < w) {
                weakest = Some((member, a));
            }
        }
        let (weakest_member, availability) = weakest.ok_or_else(|| {
            SloGraphError::internal(format!(
                "no availability known for any member of cycle {:?}",
                component.members
            ))
        })?;
        Ok(Supernode {
            members: component.members.clone(),
            weakest_member: weakest_member.clone(),
            availability,
            contains_target,
        })
    }

    fn validate(input: &CompositeInput) -> Result<()> {
        ensure_ratio("target availability", input.self_availability)?;
        for dep in &input.dependencies {
            ensure_ratio(&format!("availability of {}", dep.business_id), dep.availability)?;
        }
        for (id, a) in &input.member_availability {
            ensure_ratio(&format!("availability of {}", id), *a)?;
        }
        Ok(())
    }
}

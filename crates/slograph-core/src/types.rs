use crate::{Result, SloGraphError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type ServiceId = Uuid;
pub type EdgeId = Uuid;

/// Traversal depth bounds accepted by [`TraversalDepth`].
pub const MIN_TRAVERSAL_DEPTH: u32 = 1;
pub const MAX_TRAVERSAL_DEPTH: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServiceClassification {
    #[default]
    Internal,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CriticalityTier {
    Tier1,
    Tier2,
    #[default]
    Tier3,
    Tier4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CommunicationMode {
    #[default]
    Sync,
    Async,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DependencyCriticality {
    #[default]
    Hard,
    Soft,
    Degraded,
}

/// Mechanism that produced an observed edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoverySource {
    Manual,
    Mesh,
    Trace,
    Platform,
}

struct SourceProfile {
    source: DiscoverySource,
    base_confidence: f64,
}

/// Discovery sources ordered from highest to lowest priority. Adding a source
/// means adding one row here.
const SOURCE_PROFILES: [SourceProfile; 4] = [
    SourceProfile {
        source: DiscoverySource::Manual,
        base_confidence: 1.0,
    },
    SourceProfile {
        source: DiscoverySource::Mesh,
        base_confidence: 0.95,
    },
    SourceProfile {
        source: DiscoverySource::Trace,
        base_confidence: 0.85,
    },
    SourceProfile {
        source: DiscoverySource::Platform,
        base_confidence: 0.75,
    },
];

impl DiscoverySource {
    fn rank(self) -> usize {
        SOURCE_PROFILES
            .iter()
            .position(|p| p.source == self)
            .unwrap_or(SOURCE_PROFILES.len())
    }

    /// All sources, highest priority first.
    pub fn all() -> impl Iterator<Item = DiscoverySource> {
        SOURCE_PROFILES.iter().map(|p| p.source)
    }

    /// Priority rank where a larger number wins.
    pub fn priority(self) -> u8 {
        (SOURCE_PROFILES.len() - self.rank()) as u8
    }

    pub fn base_confidence(self) -> f64 {
        SOURCE_PROFILES
            .get(self.rank())
            .map(|p| p.base_confidence)
            .unwrap_or(0.0)
    }

    pub fn outranks(self, other: DiscoverySource) -> bool {
        self.priority() > other.priority()
    }
}

impl fmt::Display for DiscoverySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiscoverySource::Manual => "manual",
            DiscoverySource::Mesh => "mesh",
            DiscoverySource::Trace => "trace",
            DiscoverySource::Platform => "platform",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for DiscoverySource {
    type Err = SloGraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "manual" => Ok(DiscoverySource::Manual),
            "mesh" => Ok(DiscoverySource::Mesh),
            "trace" => Ok(DiscoverySource::Trace),
            "platform" => Ok(DiscoverySource::Platform),
            other => Err(SloGraphError::validation(format!(
                "unknown discovery source '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraversalDirection {
    Upstream,
    Downstream,
    Both,
}

impl fmt::Display for TraversalDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TraversalDirection::Upstream => "upstream",
            TraversalDirection::Downstream => "downstream",
            TraversalDirection::Both => "both",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for TraversalDirection {
    type Err = SloGraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "upstream" => Ok(TraversalDirection::Upstream),
            "downstream" => Ok(TraversalDirection::Downstream),
            "both" => Ok(TraversalDirection::Both),
            other => Err(SloGraphError::validation(format!(
                "unknown traversal direction '{}'",
                other
            ))),
        }
    }
}

/// Validated traversal depth in `1..=10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct TraversalDepth(u32);

impl TraversalDepth {
    pub fn new(depth: u32) -> Result<Self> {
        if !(MIN_TRAVERSAL_DEPTH..=MAX_TRAVERSAL_DEPTH).contains(&depth) {
            return Err(SloGraphError::validation(format!(
                "traversal depth {} outside {}..={}",
                depth, MIN_TRAVERSAL_DEPTH, MAX_TRAVERSAL_DEPTH
            )));
        }
        Ok(Self(depth))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl From<TraversalDepth> for u32 {
    fn from(depth: TraversalDepth) -> Self {
        depth.0
    }
}

impl TryFrom<u32> for TraversalDepth {
    type Error = SloGraphError;

    fn try_from(value: u32) -> Result<Self> {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    #[default]
    Open,
    Acknowledged,
    Resolved,
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertStatus::Open => "open",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_priority_order() {
        let ordered: Vec<_> = DiscoverySource::all().collect();
        assert_eq!(
            ordered,
            vec![
                DiscoverySource::Manual,
                DiscoverySource::Mesh,
                DiscoverySource::Trace,
                DiscoverySource::Platform
            ]
        );
        assert!(DiscoverySource::Manual.outranks(DiscoverySource::Trace));
        assert!(DiscoverySource::Mesh.outranks(DiscoverySource::Platform));
        assert!(!DiscoverySource::Trace.outranks(DiscoverySource::Mesh));
        assert!(!DiscoverySource::Trace.outranks(DiscoverySource::Trace));
    }

    #[test]
    fn discovery_base_confidence() {
        assert_eq!(DiscoverySource::Manual.base_confidence(), 1.0);
        assert_eq!(DiscoverySource::Mesh.base_confidence(), 0.95);
        assert_eq!(DiscoverySource::Trace.base_confidence(), 0.85);
        assert_eq!(DiscoverySource::Platform.base_confidence(), 0.75);
    }

    #[test]
    fn traversal_depth_bounds() {
        assert!(TraversalDepth::new(0).is_err());
        assert!(TraversalDepth::new(11).is_err());
        assert_eq!(TraversalDepth::new(1).unwrap().get(), 1);
        assert_eq!(TraversalDepth::new(10).unwrap().get(), 10);
    }

    #[test]
    fn parse_enums() {
        assert_eq!(
            "MESH".parse::<DiscoverySource>().unwrap(),
            DiscoverySource::Mesh
        );
        assert!("carrier-pigeon".parse::<DiscoverySource>().is_err());
        assert_eq!(
            "both".parse::<TraversalDirection>().unwrap(),
            TraversalDirection::Both
        );
    }
}

use crate::{AlertStatus, Result, SloGraphError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Rotates a closed cycle so that it starts at its lexicographically smallest
/// member. The closing edge back to the first member is implicit.
pub fn canonical_rotation(cycle: &[String]) -> Vec<String> {
    let Some(start) = cycle
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.cmp(b))
        .map(|(i, _)| i)
    else {
        return Vec::new();
    };
    cycle[start..]
        .iter()
        .chain(cycle[..start].iter())
        .cloned()
        .collect()
}

/// Deduplication key of a cycle: its sorted member set.
pub fn cycle_key<'a, I>(members: I) -> String
where
    I: IntoIterator<Item = &'a String>,
{
    let mut sorted: Vec<&String> = members.into_iter().collect();
    sorted.sort();
    sorted.dedup();
    sorted
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("|")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircularDependencyAlert {
    pub id: Uuid,
    /// Sorted members of the strongly connected component.
    pub members: Vec<String>,
    /// One closed cycle through the component, canonically rotated.
    pub cycle: Vec<String>,
    pub status: AlertStatus,
    pub detected_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CircularDependencyAlert {
    pub fn open(members: Vec<String>, cycle: Vec<String>, now: DateTime<Utc>) -> Result<Self> {
        let mut members = members;
        members.sort();
        members.dedup();
        if members.len() < 2 {
            return Err(SloGraphError::validation(
                "a circular dependency needs at least two services",
            ));
        }
        if cycle.len() < 2 || cycle.iter().any(|c| members.binary_search(c).is_err()) {
            return Err(SloGraphError::validation(format!(
                "cycle {:?} is not drawn from component {:?}",
                cycle, members
            )));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            members,
            cycle: canonical_rotation(&cycle),
            status: AlertStatus::Open,
            detected_at: now,
            updated_at: now,
        })
    }

    pub fn key(&self) -> String {
        cycle_key(&self.members)
    }

    pub fn is_active(&self) -> bool {
        self.status != AlertStatus::Resolved
    }

    pub fn acknowledge(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(AlertStatus::Acknowledged, now)
    }

    pub fn resolve(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(AlertStatus::Resolved, now)
    }

    fn transition(&mut self, next: AlertStatus, now: DateTime<Utc>) -> Result<()> {
        let allowed = matches!(
            (self.status, next),
            (AlertStatus::Open, AlertStatus::Acknowledged)
                | (AlertStatus::Open, AlertStatus::Resolved)
                | (AlertStatus::Acknowledged, AlertStatus::Resolved)
        );
        if !allowed {
            return Err(SloGraphError::validation(format!(
                "alert {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}

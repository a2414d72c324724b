//! `RunId`/`StepId` newtypes wrapping [`Uuid`], replacing bare strings for
//! run and step identity (teacher convention: ids are `Uuid`, e.g.
//! `domain/error.rs::TaskError::NotFound(Uuid)`).
//!
//! A `StepId` minted from a human-readable name (`from_name`) is derived
//! deterministically via UUID v5, so the same goal name always maps to the
//! same id and on-disk checkpoint filenames (`<stepId>.json`) stay stable
//! across runs. A `StepId` minted for a one-off instance (`random`, used for
//! sub-agent spawns) is a fresh v4.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

const STEP_NAMESPACE: Uuid = Uuid::from_bytes([
    0x76, 0x69, 0x67, 0x69, 0x6c, 0x2d, 0x73, 0x74, 0x65, 0x70, 0x2d, 0x6e, 0x73, 0x00, 0x00, 0x00,
]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(Uuid);

impl StepId {
    pub fn from_name(name: &str) -> Self {
        Self(Uuid::new_v5(&STEP_NAMESPACE, name.as_bytes()))
    }

    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StepId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_name_maps_to_same_step_id() {
        assert_eq!(StepId::from_name("goal-draft"), StepId::from_name("goal-draft"));
        assert_ne!(StepId::from_name("goal-draft"), StepId::from_name("goal-review"));
    }

    #[test]
    fn random_step_ids_differ() {
        assert_ne!(StepId::random(), StepId::random());
    }

    #[test]
    fn display_parse_round_trips() {
        let id = StepId::from_name("goal-draft");
        let parsed: StepId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}

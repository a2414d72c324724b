//! The workflow runner's terminal result (spec §3, §6).

use serde::{Deserialize, Serialize};

use super::variables::VariableMap;
use std::collections::BTreeMap;

/// Terminal status of a `Run`. No other exit codes are part of the contract
/// (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum RunStatus {
    Running,
    Complete,
    Failed,
}

/// What `Workflow Runner::run` returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub status: RunStatus,
    pub outputs: VariableMap,
    pub iteration_counts: BTreeMap<String, u32>,
    /// Goal name -> final iteration count when a converge goal exhausted its
    /// limit without converging (spec §4.3).
    #[serde(default)]
    pub failed_to_converge: BTreeMap<String, u32>,
    pub error: Option<String>,
}

impl RunResult {
    pub fn complete(outputs: VariableMap, iteration_counts: BTreeMap<String, u32>) -> Self {
        Self {
            status: RunStatus::Complete,
            outputs,
            iteration_counts,
            failed_to_converge: BTreeMap::new(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Failed,
            outputs: VariableMap::new(),
            iteration_counts: BTreeMap::new(),
            failed_to_converge: BTreeMap::new(),
            error: Some(error.into()),
        }
    }
}

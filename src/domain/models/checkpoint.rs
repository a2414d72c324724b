//! Checkpoint records: the four-phase audit trail for a single step
//! (spec §3, "Checkpoint").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::StepId;

/// What kind of step a checkpoint was recorded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepType {
    Goal,
    Agent,
    Subagent,
}

/// COMMIT's self-reported confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// The supervisor's verdict (spec §4.2, SUPERVISE).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Verdict {
    Continue,
    Reorient { correction: String },
    Pause { question: String },
}

/// COMMIT phase output: the model's declared interpretation and plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreRecord {
    pub step_id: StepId,
    pub step_type: StepType,
    pub instruction: String,
    pub interpretation: String,
    pub scope_in: Vec<String>,
    pub scope_out: Vec<String>,
    pub approach: String,
    pub tools_planned: Vec<String>,
    pub predicted_output: String,
    pub confidence: Confidence,
    pub assumptions: Vec<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// POST phase output: the model's self-assessment after EXECUTE.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostRecord {
    pub actual_output: String,
    pub tools_used: Vec<String>,
    pub met_commitment: bool,
    pub deviations: Vec<String>,
    pub concerns: Vec<String>,
    pub unexpected: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// A deterministic reconcile trigger (spec §4.2 table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileTrigger {
    ConcernsRaised,
    CommitmentNotMet,
    ScopeDeviation,
    UnexpectedResults,
    LowConfidence,
    ExcessAssumptions,
}

/// RECONCILE phase output: deterministic, no model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileRecord {
    pub triggers: Vec<ReconcileTrigger>,
    pub supervise: bool,
    pub timestamp: DateTime<Utc>,
}

/// SUPERVISE phase output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuperviseRecord {
    pub verdict: Verdict,
    pub timestamp: DateTime<Utc>,
}

/// The four optional sub-records for one step id. Records are additive:
/// later phases never erase earlier ones for the same step (spec §3
/// invariant).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default)]
    pub pre: Option<PreRecord>,
    #[serde(default)]
    pub post: Option<PostRecord>,
    #[serde(default)]
    pub reconcile: Option<ReconcileRecord>,
    #[serde(default)]
    pub supervise: Option<SuperviseRecord>,
}

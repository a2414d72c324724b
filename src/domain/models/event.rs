//! Session events: the append-only, ordered event stream (spec §3, §4.9).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The fixed event-type enum (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    System,
    User,
    Assistant,
    ToolCall,
    ToolResult,
    GoalStart,
    GoalEnd,
    PhaseCommit,
    PhaseExecute,
    PhaseReconcile,
    PhaseSupervise,
    Checkpoint,
    SecurityBlock,
    SecurityStatic,
    SecurityTriage,
    SecuritySupervisor,
    SecurityDecision,
    SubAgentStart,
    SubAgentEnd,
    Warning,
}

/// One entry in the session's append-only event stream.
///
/// When the session's debug flag is off, `content` is stripped before the
/// event is persisted -- this is the PII-redaction posture for non-debug
/// runs (spec §4.9). `metadata` (model, token counts, timing, verdicts,
/// trust) is always kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub step: Option<String>,
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

//! The COMMIT phase: ask the model to declare its plan as JSON before
//! EXECUTE runs (spec §4.2). Best-effort -- it never blocks the goal.

use chrono::Utc;
use serde::Deserialize;

use crate::domain::models::checkpoint::{Confidence, PreRecord, StepType};
use crate::domain::models::ids::StepId;
use crate::domain::ports::model_provider::{ChatMessage, ChatRequest, ModelProvider};

use super::extract_json_object;

#[derive(Debug, Deserialize, Default)]
struct CommitFields {
    #[serde(default)]
    interpretation: String,
    #[serde(default)]
    scope_in: Vec<String>,
    #[serde(default)]
    scope_out: Vec<String>,
    #[serde(default)]
    approach: String,
    #[serde(default)]
    tools_planned: Vec<String>,
    #[serde(default)]
    predicted_output: String,
    #[serde(default = "medium_confidence")]
    confidence: Confidence,
    #[serde(default)]
    assumptions: Vec<String>,
}

fn medium_confidence() -> Confidence {
    Confidence::Medium
}

fn prompt_for(instruction: &str) -> String {
    format!(
        "Before starting, declare your plan. Respond with JSON only, matching exactly this shape:\n\
         {{\"interpretation\": string, \"scope_in\": [string], \"scope_out\": [string], \
         \"approach\": string, \"tools_planned\": [string], \"predicted_output\": string, \
         \"confidence\": \"high\"|\"medium\"|\"low\", \"assumptions\": [string]}}\n\n\
         Task:\n{instruction}"
    )
}

fn default_record(step_id: StepId, step_type: StepType, instruction: &str, confidence: Confidence) -> PreRecord {
    PreRecord {
        step_id,
        step_type,
        instruction: instruction.to_string(),
        interpretation: String::new(),
        scope_in: Vec::new(),
        scope_out: Vec::new(),
        approach: String::new(),
        tools_planned: Vec::new(),
        predicted_output: String::new(),
        confidence,
        assumptions: Vec::new(),
        timestamp: Utc::now(),
        metadata: serde_json::Value::Null,
    }
}

/// Run COMMIT. On a transport error, default confidence to low; on an
/// unparseable response, default to medium. Either way the phase continues
/// (spec §4.2: "commit is best-effort, not a gate").
pub async fn run(provider: &dyn ModelProvider, step_id: StepId, step_type: StepType, instruction: &str) -> PreRecord {
    let request = ChatRequest { messages: vec![ChatMessage::user(prompt_for(instruction))], tools: vec![] };
    match provider.chat(request).await {
        Ok(response) => match extract_json_object(&response.content).and_then(|json| serde_json::from_str::<CommitFields>(json).ok()) {
            Some(fields) => PreRecord {
                step_id,
                step_type,
                instruction: instruction.to_string(),
                interpretation: fields.interpretation,
                scope_in: fields.scope_in,
                scope_out: fields.scope_out,
                approach: fields.approach,
                tools_planned: fields.tools_planned,
                predicted_output: fields.predicted_output,
                confidence: fields.confidence,
                assumptions: fields.assumptions,
                timestamp: Utc::now(),
                metadata: serde_json::Value::Null,
            },
            None => default_record(step_id, step_type, instruction, Confidence::Medium),
        },
        Err(_) => default_record(step_id, step_type, instruction, Confidence::Low),
    }
}

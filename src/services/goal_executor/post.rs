//! The POST phase: ask the model to self-assess after EXECUTE (spec §4.2).

use chrono::Utc;
use serde::Deserialize;

use crate::domain::error::Degradation;
use crate::domain::models::checkpoint::PostRecord;
use crate::domain::ports::model_provider::{ChatMessage, ChatRequest, ModelProvider};

use super::extract_json_object;

#[derive(Debug, Deserialize, Default)]
struct PostFields {
    #[serde(default = "met_by_default")]
    met_commitment: bool,
    #[serde(default)]
    deviations: Vec<String>,
    #[serde(default)]
    concerns: Vec<String>,
    #[serde(default)]
    unexpected: Vec<String>,
}

fn met_by_default() -> bool {
    true
}

fn prompt_for(actual_output: &str) -> String {
    format!(
        "Assess your own result. Respond with JSON only, matching exactly this shape:\n\
         {{\"met_commitment\": bool, \"deviations\": [string], \"concerns\": [string], \"unexpected\": [string]}}\n\n\
         Result:\n{actual_output}"
    )
}

/// Run POST. On a transport error, record a concern and `met_commitment =
/// false`; on an unparseable response, default to the optimistic
/// `met_commitment = true` (spec §4.2).
pub async fn run(provider: &dyn ModelProvider, actual_output: &str, tools_used: Vec<String>) -> PostRecord {
    let request = ChatRequest { messages: vec![ChatMessage::user(prompt_for(actual_output))], tools: vec![] };
    match provider.chat(request).await {
        Ok(response) => {
            let fields = extract_json_object(&response.content)
                .and_then(|json| serde_json::from_str::<PostFields>(json).ok())
                .unwrap_or_else(|| PostFields {
                    met_commitment: true,
                    deviations: Vec::new(),
                    concerns: Vec::new(),
                    unexpected: Vec::new(),
                });
            PostRecord {
                actual_output: actual_output.to_string(),
                tools_used,
                met_commitment: fields.met_commitment,
                deviations: fields.deviations,
                concerns: fields.concerns,
                unexpected: fields.unexpected,
                timestamp: Utc::now(),
            }
        }
        Err(e) => PostRecord {
            actual_output: actual_output.to_string(),
            tools_used,
            met_commitment: false,
            deviations: Vec::new(),
            concerns: vec![format!("self-assessment call failed: {e}")],
            unexpected: Vec::new(),
            timestamp: Utc::now(),
        },
    }
}

/// Check `output` against a goal's/agent's declared structured-output
/// fields, if any (spec §7: "goal declared outputs but response not JSON ->
/// log a warning event; do not fail"). Returns `None` when no fields are
/// declared, or when the output is a JSON object carrying every declared
/// field.
pub fn validate_structured_output(output: &str, declared_fields: &[String]) -> Option<Degradation> {
    if declared_fields.is_empty() {
        return None;
    }

    let Some(json) = extract_json_object(output) else {
        return Some(Degradation::StructuredOutputParse(format!(
            "declared fields {declared_fields:?} but response contained no JSON object"
        )));
    };

    let parsed: serde_json::Value = match serde_json::from_str(json) {
        Ok(v) => v,
        Err(e) => return Some(Degradation::StructuredOutputParse(format!("response JSON did not parse: {e}"))),
    };

    let Some(object) = parsed.as_object() else {
        return Some(Degradation::StructuredOutputParse("response JSON was not an object".to_string()));
    };
    let missing: Vec<&str> = declared_fields
        .iter()
        .map(String::as_str)
        .filter(|name| !object.contains_key(*name))
        .collect();

    if missing.is_empty() {
        None
    } else {
        Some(Degradation::StructuredOutputParse(format!("response JSON is missing declared fields: {missing:?}")))
    }
}

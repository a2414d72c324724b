//! The SUPERVISE phase: a structured prompt asking for one of
//! `CONTINUE` / `REORIENT: <correction>` / `PAUSE: <question>` (spec §4.2).

use crate::domain::error::VigilResult;
use crate::domain::models::checkpoint::{PostRecord, PreRecord, ReconcileTrigger, Verdict};
use crate::domain::ports::model_provider::{ChatMessage, ChatRequest, ModelProvider};

fn prompt_for(
    goal_name: &str,
    pre: &PreRecord,
    post: &PostRecord,
    triggers: &[ReconcileTrigger],
    decision_trail: &[(String, String)],
) -> String {
    let trail = decision_trail
        .iter()
        .map(|(step, interpretation)| format!("- {step}: {interpretation}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are supervising goal `{goal_name}`.\n\n\
         Original plan:\n  interpretation: {}\n  approach: {}\n  confidence: {:?}\n  assumptions: {:?}\n\n\
         Outcome:\n  output: {}\n  met_commitment: {}\n  deviations: {:?}\n  concerns: {:?}\n  unexpected: {:?}\n\n\
         Triggers raised: {triggers:?}\n\n\
         Decision trail so far:\n{trail}\n\n\
         Reply with exactly one of:\n\
         CONTINUE\n\
         REORIENT: <correction to apply>\n\
         PAUSE: <question for a human>",
        pre.interpretation,
        pre.approach,
        pre.confidence,
        pre.assumptions,
        post.actual_output,
        post.met_commitment,
        post.deviations,
        post.concerns,
        post.unexpected,
    )
}

/// Parse the first line starting with one of the three verdict tokens.
/// Unparseable responses default to CONTINUE (spec §4.2).
fn parse_verdict(text: &str) -> Verdict {
    for line in text.lines() {
        let line = line.trim();
        if line == "CONTINUE" {
            return Verdict::Continue;
        }
        if let Some(correction) = line.strip_prefix("REORIENT:") {
            return Verdict::Reorient { correction: correction.trim().to_string() };
        }
        if let Some(question) = line.strip_prefix("PAUSE:") {
            return Verdict::Pause { question: question.trim().to_string() };
        }
    }
    Verdict::Continue
}

pub async fn run(
    provider: &dyn ModelProvider,
    goal_name: &str,
    pre: &PreRecord,
    post: &PostRecord,
    triggers: &[ReconcileTrigger],
    decision_trail: &[(String, String)],
) -> VigilResult<Verdict> {
    let prompt = prompt_for(goal_name, pre, post, triggers, decision_trail);
    let request = ChatRequest { messages: vec![ChatMessage::user(prompt)], tools: vec![] };
    let response = provider.chat(request).await?;
    Ok(parse_verdict(&response.content))
}

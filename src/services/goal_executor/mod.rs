//! Four-phase goal state machine: COMMIT → EXECUTE → POST → RECONCILE →
//! SUPERVISE (spec §4.2). RECONCILE/SUPERVISE run only for supervised
//! goals (or, for SUPERVISE, whenever human input is required).

mod commit;
pub mod execute;
mod post;
mod reconcile;
mod supervise;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info_span, warn, Instrument};

use crate::domain::error::{VigilError, VigilResult};
use crate::domain::models::checkpoint::{StepType, Verdict};
use crate::domain::models::event::EventType;
use crate::domain::models::ids::StepId;
use crate::domain::ports::human_input::HumanInputChannel;
use crate::domain::ports::model_provider::ModelProvider;
use crate::domain::ports::security::AgentContext;
use crate::services::checkpoint_store::CheckpointStore;
use crate::services::context_builder::PromptContext;
use crate::services::convergence_loop::ConvergenceLoop;
use crate::services::event_logger::SessionEventLogger;
use crate::services::tool_dispatcher::{ToolDispatcher, ToolRegistry};

const DEFAULT_HUMAN_INPUT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Extract the first balanced `{...}` object from free-form model text,
/// tolerating a surrounding markdown code fence or commentary.
pub(super) fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0i32;
    for (offset, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// What `GoalExecutor::run` produces for one goal: its final text output,
/// whether its last iteration made any tool call (LOOP's convergence
/// signal, spec §4.1), and whether a converge goal exhausted its limit.
pub struct GoalOutcome {
    pub output: String,
    pub tool_call_made: bool,
    pub failed_to_converge: Option<u32>,
}

/// Everything one invocation of the four-phase machine needs beyond the
/// goal definition itself.
pub struct PhaseRequest<'a> {
    pub step_id: StepId,
    pub step_type: StepType,
    pub instruction: String,
    pub system_prompt: Option<&'a str>,
    pub tools: &'a ToolRegistry,
    pub prompt_ctx: PromptContext,
    pub agent_ctx: AgentContext,
    pub supervised: bool,
    pub human_required: bool,
    pub converge: Option<u32>,
    /// `Some(name)` for a sub-agent: a PAUSE verdict becomes a fatal error
    /// naming the agent instead of waiting on a human channel (spec §4.5).
    pub subagent_name: Option<String>,
    /// Output field names the goal/agent declared (spec §7): if non-empty,
    /// POST's output is checked against them and a mismatch degrades to a
    /// warning event rather than failing the goal.
    pub structured_output_fields: Vec<String>,
}

pub struct GoalExecutor {
    provider: Arc<dyn ModelProvider>,
    dispatcher: Arc<ToolDispatcher>,
    checkpoints: Arc<CheckpointStore>,
    events: Arc<SessionEventLogger>,
    human_input: Option<Arc<dyn HumanInputChannel>>,
    human_input_timeout: Duration,
}

impl GoalExecutor {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        dispatcher: Arc<ToolDispatcher>,
        checkpoints: Arc<CheckpointStore>,
        events: Arc<SessionEventLogger>,
        human_input: Option<Arc<dyn HumanInputChannel>>,
    ) -> Self {
        Self {
            provider,
            dispatcher,
            checkpoints,
            events,
            human_input,
            human_input_timeout: DEFAULT_HUMAN_INPUT_TIMEOUT,
        }
    }

    pub fn with_human_input_timeout(mut self, timeout: Duration) -> Self {
        self.human_input_timeout = timeout;
        self
    }

    fn decision_trail_interpretations(
        trail: &[(StepId, crate::domain::models::checkpoint::Checkpoint)],
    ) -> Vec<(String, String)> {
        trail
            .iter()
            .filter_map(|(step, checkpoint)| {
                checkpoint.pre.as_ref().map(|pre| (step.to_string(), pre.interpretation.clone()))
            })
            .collect()
    }

    /// Run the full four-phase machine for one step.
    pub async fn run(&self, req: PhaseRequest<'_>, cancel: CancellationToken) -> VigilResult<GoalOutcome> {
        let span = info_span!("goal_executor.run", step_id = %req.step_id, step_type = ?req.step_type);
        self.run_inner(req, cancel).instrument(span).await
    }

    async fn run_inner(&self, req: PhaseRequest<'_>, cancel: CancellationToken) -> VigilResult<GoalOutcome> {
        let PhaseRequest {
            step_id,
            step_type,
            instruction,
            system_prompt,
            tools,
            prompt_ctx,
            agent_ctx,
            supervised,
            human_required,
            converge,
            subagent_name,
            structured_output_fields,
        } = req;

        // COMMIT
        let pre = commit::run(self.provider.as_ref(), step_id, step_type, &instruction).await;
        self.checkpoints.save_pre(&step_id, pre.clone()).await?;
        self.events
            .log(
                EventType::PhaseCommit,
                Some(agent_ctx.goal.clone()),
                Some(step_id.to_string()),
                agent_ctx.agent_role.clone(),
                None,
                None,
                Some(pre.interpretation.clone()),
                serde_json::json!({"confidence": pre.confidence}),
            )
            .await;

        // EXECUTE (or the converge loop in its place)
        let convergence_loop = ConvergenceLoop::new(self.provider.clone(), self.dispatcher.clone());
        let (mut output, mut tool_call_made, tools_used, mut failed_to_converge) = match converge {
            Some(limit) => {
                let outcome = convergence_loop
                    .run(limit, prompt_ctx.clone(), system_prompt, tools, agent_ctx.clone(), cancel.clone())
                    .await?;
                if !outcome.converged {
                    warn!(step_id = %step_id, limit, "converge goal exhausted its limit without converging");
                }
                let failed = (!outcome.converged).then_some(outcome.history.len() as u32);
                (outcome.final_output, outcome.tool_call_made, Vec::new(), failed)
            }
            None => {
                let outcome = execute::run(
                    self.provider.as_ref(),
                    &self.dispatcher,
                    tools,
                    system_prompt,
                    prompt_ctx.render(),
                    agent_ctx.clone(),
                    cancel.clone(),
                )
                .await?;
                (outcome.output, outcome.tool_call_made, outcome.tools_used, None)
            }
        };

        self.events
            .log(
                EventType::PhaseExecute,
                Some(agent_ctx.goal.clone()),
                Some(step_id.to_string()),
                agent_ctx.agent_role.clone(),
                None,
                None,
                Some(output.clone()),
                serde_json::Value::Null,
            )
            .await;

        // POST
        let post = post::run(self.provider.as_ref(), &output, tools_used).await;
        self.checkpoints.save_post(&step_id, post.clone()).await?;

        if let Some(degradation) = post::validate_structured_output(&output, &structured_output_fields) {
            self.events
                .log(
                    EventType::Warning,
                    Some(agent_ctx.goal.clone()),
                    Some(step_id.to_string()),
                    agent_ctx.agent_role.clone(),
                    None,
                    None,
                    Some(degradation.to_string()),
                    serde_json::Value::Null,
                )
                .await;
        }

        if !supervised && !human_required {
            return Ok(GoalOutcome { output, tool_call_made, failed_to_converge });
        }

        // RECONCILE
        let reconcile = reconcile::run(&pre, &post);
        self.checkpoints.save_reconcile(&step_id, reconcile.clone()).await?;
        self.events
            .log(
                EventType::PhaseReconcile,
                Some(agent_ctx.goal.clone()),
                Some(step_id.to_string()),
                agent_ctx.agent_role.clone(),
                None,
                None,
                None,
                serde_json::json!({"triggers": reconcile.triggers, "supervise": reconcile.supervise}),
            )
            .await;

        if !reconcile.supervise && !human_required {
            return Ok(GoalOutcome { output, tool_call_made, failed_to_converge });
        }

        // SUPERVISE
        let trail = self.checkpoints.get_decision_trail().await;
        let decision_trail = Self::decision_trail_interpretations(&trail);
        let verdict = supervise::run(self.provider.as_ref(), &agent_ctx.goal, &pre, &post, &reconcile.triggers, &decision_trail).await?;
        self.checkpoints
            .save_supervise(&step_id, crate::domain::models::checkpoint::SuperviseRecord { verdict: verdict.clone(), timestamp: chrono::Utc::now() })
            .await?;
        self.events
            .log(
                EventType::PhaseSupervise,
                Some(agent_ctx.goal.clone()),
                Some(step_id.to_string()),
                agent_ctx.agent_role.clone(),
                None,
                None,
                None,
                serde_json::json!({"verdict": verdict}),
            )
            .await;

        let resolved_verdict = self.resolve_pause(verdict, subagent_name.as_deref(), human_required).await?;

        match resolved_verdict {
            Verdict::Continue => Ok(GoalOutcome { output, tool_call_made, failed_to_converge }),
            Verdict::Reorient { correction } => {
                let reoriented = match converge {
                    Some(_) => {
                        convergence_loop
                            .run_reoriented(prompt_ctx, Vec::new(), correction, system_prompt, tools, agent_ctx, cancel)
                            .await?
                    }
                    None => {
                        let mut corrected_ctx = prompt_ctx;
                        corrected_ctx.correction = Some(correction);
                        let outcome = execute::run(
                            self.provider.as_ref(),
                            &self.dispatcher,
                            tools,
                            system_prompt,
                            corrected_ctx.render(),
                            agent_ctx,
                            cancel,
                        )
                        .await?;
                        tool_call_made = outcome.tool_call_made;
                        outcome.output
                    }
                };
                output = reoriented;
                failed_to_converge = None;
                Ok(GoalOutcome { output, tool_call_made, failed_to_converge })
            }
            Verdict::Pause { .. } => unreachable!("resolve_pause never returns Pause"),
        }
    }

    /// Resolve a (possibly PAUSE) verdict down to CONTINUE or REORIENT.
    ///
    /// Sub-agents never wait on a human channel: a PAUSE there is terminal
    /// (spec §4.5). At the top level, PAUSE waits on the configured human
    /// channel up to the timeout; on timeout with `human_required` it fails
    /// terminally (spec §4.2, §7), otherwise it asks the model to pick a
    /// conservative fallback between CONTINUE and REORIENT.
    async fn resolve_pause(&self, verdict: Verdict, subagent_name: Option<&str>, human_required: bool) -> VigilResult<Verdict> {
        let Verdict::Pause { question } = verdict else { return Ok(verdict) };

        if let Some(name) = subagent_name {
            return Err(VigilError::SupervisionFatal(format!(
                "sub-agent `{name}` supervisor paused for human input, which sub-agents cannot request: {question}"
            )));
        }

        let Some(channel) = &self.human_input else {
            return self.autonomous_fallback(&question).await;
        };

        match channel.wait(&question, self.human_input_timeout).await {
            Some(answer) => Ok(Verdict::Reorient { correction: answer }),
            None if human_required => Err(VigilError::SupervisionFatal(format!(
                "human-required PAUSE timed out waiting for an answer: {question}"
            ))),
            None => self.autonomous_fallback(&question).await,
        }
    }

    async fn autonomous_fallback(&self, question: &str) -> VigilResult<Verdict> {
        use crate::domain::ports::model_provider::{ChatMessage, ChatRequest};
        let prompt = format!(
            "A supervisor paused with this question, but no human answer is available: \"{question}\".\n\
             Choose the conservative path. Reply with exactly one of:\nCONTINUE\nREORIENT: <correction>"
        );
        let request = ChatRequest { messages: vec![ChatMessage::user(prompt)], tools: vec![] };
        let response = self.provider.chat(request).await?;
        let text = response.content.trim();
        if let Some(correction) = text.strip_prefix("REORIENT:") {
            Ok(Verdict::Reorient { correction: correction.trim().to_string() })
        } else {
            Ok(Verdict::Continue)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_balanced_json_from_surrounding_text() {
        let text = "Sure, here you go:\n```json\n{\"a\": 1, \"b\": {\"c\": 2}}\n```\nThanks!";
        let extracted = extract_json_object(text).unwrap();
        assert_eq!(extracted, "{\"a\": 1, \"b\": {\"c\": 2}}");
    }

    #[test]
    fn returns_none_without_braces() {
        assert!(extract_json_object("no json here").is_none());
    }
}

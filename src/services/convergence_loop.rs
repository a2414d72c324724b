//! Iterative refinement for goals marked `converge` (spec §4.3).
//!
//! Replaces a plain EXECUTE with a bounded loop: each iteration sees the
//! prior iterations' outputs under `<convergence-history>` plus an
//! explicit instruction to answer `CONVERGED` once further refinement
//! would not help.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::domain::error::VigilResult;
use crate::domain::ports::model_provider::ModelProvider;
use crate::domain::ports::security::AgentContext;
use crate::services::context_builder::{PromptContext, CONVERGENCE_INSTRUCTION};
use crate::services::goal_executor::execute;
use crate::services::tool_dispatcher::{ToolDispatcher, ToolRegistry};

pub struct ConvergenceOutcome {
    pub final_output: String,
    pub converged: bool,
    pub history: Vec<(u32, String)>,
    pub tool_call_made: bool,
}

pub struct ConvergenceLoop {
    provider: Arc<dyn ModelProvider>,
    dispatcher: Arc<ToolDispatcher>,
}

impl ConvergenceLoop {
    pub fn new(provider: Arc<dyn ModelProvider>, dispatcher: Arc<ToolDispatcher>) -> Self {
        Self { provider, dispatcher }
    }

    /// Run up to `limit` iterations. `base_ctx` supplies everything except
    /// the per-iteration history/iteration fields, which are overwritten
    /// each pass.
    pub async fn run(
        &self,
        limit: u32,
        base_ctx: PromptContext,
        system_prompt: Option<&str>,
        tools: &ToolRegistry,
        agent_ctx: AgentContext,
        cancel: CancellationToken,
    ) -> VigilResult<ConvergenceOutcome> {
        let mut history: Vec<(u32, String)> = Vec::new();
        let mut final_output = String::new();
        let mut converged = false;
        let mut tool_call_made = false;

        for i in 1..=limit {
            let mut ctx = base_ctx.clone();
            ctx.convergence_history = history.clone();
            ctx.current_goal_iteration = Some(i);
            ctx.convergence_instruction = Some(CONVERGENCE_INSTRUCTION.to_string());

            let outcome = execute::run(
                self.provider.as_ref(),
                &self.dispatcher,
                tools,
                system_prompt,
                ctx.render(),
                agent_ctx.clone(),
                cancel.clone(),
            )
            .await?;
            tool_call_made = outcome.tool_call_made;

            if outcome.output.trim() == "CONVERGED" {
                converged = true;
                break;
            }
            final_output = outcome.output.clone();
            history.push((i, outcome.output));
        }

        Ok(ConvergenceOutcome { final_output, converged, history, tool_call_made })
    }

    /// One further iteration appending a supervisor correction, run after a
    /// REORIENT verdict (spec §4.3: "adds one further iteration with the
    /// correction appended"). Not itself re-supervised.
    pub async fn run_reoriented(
        &self,
        mut ctx: PromptContext,
        history: Vec<(u32, String)>,
        correction: String,
        system_prompt: Option<&str>,
        tools: &ToolRegistry,
        agent_ctx: AgentContext,
        cancel: CancellationToken,
    ) -> VigilResult<String> {
        ctx.convergence_history = history;
        ctx.correction = Some(correction);
        ctx.convergence_instruction = Some(CONVERGENCE_INSTRUCTION.to_string());
        let outcome = execute::run(
            self.provider.as_ref(),
            &self.dispatcher,
            tools,
            system_prompt,
            ctx.render(),
            agent_ctx,
            cancel,
        )
        .await?;
        Ok(outcome.output)
    }
}

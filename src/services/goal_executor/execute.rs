//! The EXECUTE phase: call the model with the available tool set, dispatch
//! any requested tool calls, and repeat until a tool-call-free response
//! (spec §4.2 EXECUTE). Shared by plain goals, converge-goal iterations,
//! and sub-agents.

use tokio_util::sync::CancellationToken;

use crate::domain::error::VigilResult;
use crate::domain::ports::model_provider::{ChatMessage, ChatRequest, ModelProvider};
use crate::domain::ports::security::AgentContext;
use crate::services::tool_dispatcher::{ToolDispatcher, ToolRegistry};

/// Result of one EXECUTE run: the final text output, whether any tool call
/// was made (used by LOOP's convergence test, spec §4.1), and the tool
/// names actually invoked (fed into POST's `toolsUsed`).
pub struct ExecuteOutcome {
    pub output: String,
    pub tool_call_made: bool,
    pub tools_used: Vec<String>,
}

pub async fn run(
    provider: &dyn ModelProvider,
    dispatcher: &ToolDispatcher,
    tools: &ToolRegistry,
    system_prompt: Option<&str>,
    initial_prompt: String,
    ctx: AgentContext,
    cancel: CancellationToken,
) -> VigilResult<ExecuteOutcome> {
    let mut messages = Vec::new();
    if let Some(sp) = system_prompt {
        messages.push(ChatMessage::system(sp));
    }
    messages.push(ChatMessage::user(initial_prompt));

    let mut tools_used = Vec::new();
    let mut tool_call_made = false;
    let tool_defs = tools.tool_defs();

    loop {
        let request = ChatRequest { messages: messages.clone(), tools: tool_defs.clone() };
        let response = provider.chat(request).await?;

        if !response.has_tool_calls() {
            return Ok(ExecuteOutcome { output: response.content, tool_call_made, tools_used });
        }

        tool_call_made = true;
        messages.push(ChatMessage::assistant(response.content.clone()));
        for call in &response.tool_calls {
            tools_used.push(call.name.clone());
        }
        let results = dispatcher.dispatch(response.tool_calls, ctx.clone(), cancel.clone()).await;
        messages.extend(results);
    }
}

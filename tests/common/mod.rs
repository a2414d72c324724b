//! Shared fixtures for the integration tests: a scripted `ModelProvider`
//! fake and small `Tool` fakes, in the teacher's `tests/common`/`tests/helpers`
//! style.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use vigil::domain::error::VigilError;
use vigil::domain::ports::model_provider::{
    ChatRequest, ChatResponse, ModelProvider, ProviderFactory, Role,
};
use vigil::domain::ports::human_input::HumanInputChannel;
use vigil::domain::ports::tool::{Tool, ToolResult};

fn text_response(text: impl Into<String>) -> ChatResponse {
    ChatResponse {
        content: text.into(),
        tool_calls: Vec::new(),
        model: "mock".into(),
        input_tokens: 0,
        output_tokens: 0,
        thinking: None,
    }
}

/// A `ModelProvider` fake that recognizes the four phase prompts by their
/// fixed opening text (`commit.rs`/`post.rs`/`supervise.rs` each use one)
/// and answers from a per-phase scripted queue, falling back to a
/// best-effort default once a queue runs dry. EXECUTE calls (anything that
/// isn't COMMIT/POST/SUPERVISE) are answered from the `execute` queue and
/// can carry tool calls.
#[derive(Default)]
pub struct ScriptedProvider {
    execute: Mutex<VecDeque<ChatResponse>>,
    post: Mutex<VecDeque<String>>,
    supervise: Mutex<VecDeque<String>>,
    /// Every request's rendered user prompt, in call order, for assertions
    /// about what the goal executor actually sent the model.
    pub seen_prompts: Mutex<Vec<String>>,
    /// Every request's tool list, in call order, for sub-agent depth
    /// assertions.
    pub seen_tool_names: Mutex<Vec<Vec<String>>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_execute_text(self, replies: impl IntoIterator<Item = &'static str>) -> Self {
        *self.execute.lock().unwrap() = replies.into_iter().map(text_response).collect();
        self
    }

    pub fn with_execute_responses(self, replies: Vec<ChatResponse>) -> Self {
        *self.execute.lock().unwrap() = replies.into();
        self
    }

    pub fn with_post_text(self, replies: impl IntoIterator<Item = &'static str>) -> Self {
        *self.post.lock().unwrap() = replies.into_iter().map(String::from).collect();
        self
    }

    pub fn with_supervise_verdicts(self, verdicts: impl IntoIterator<Item = &'static str>) -> Self {
        *self.supervise.lock().unwrap() = verdicts.into_iter().map(String::from).collect();
        self
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, VigilError> {
        let last = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        self.seen_tool_names
            .lock()
            .unwrap()
            .push(request.tools.iter().map(|t| t.name.clone()).collect());

        if last.contains("declare your plan") {
            return Ok(text_response("{}"));
        }
        if last.contains("Assess your own result") {
            let mut q = self.post.lock().unwrap();
            let text = q.pop_front().unwrap_or_else(|| "{}".to_string());
            return Ok(text_response(text));
        }
        if last.contains("You are supervising goal") {
            let mut q = self.supervise.lock().unwrap();
            let verdict = q.pop_front().unwrap_or_else(|| "CONTINUE".to_string());
            return Ok(text_response(verdict));
        }

        self.seen_prompts.lock().unwrap().push(last);
        let mut q = self.execute.lock().unwrap();
        Ok(q.pop_front().unwrap_or_else(|| text_response("")))
    }
}

/// Resolves every profile to the same scripted provider -- sub-agent
/// capability profiles are not exercised by these tests.
pub struct SingleProviderFactory(pub Arc<dyn ModelProvider>);

impl ProviderFactory for SingleProviderFactory {
    fn get_provider(&self, _profile_name: Option<&str>) -> Arc<dyn ModelProvider> {
        self.0.clone()
    }
}

/// A tool that sleeps `delay_ms` then returns its own name -- used to prove
/// the dispatcher re-sorts parallel results back to request order
/// regardless of completion order.
pub struct DelayTool {
    pub tool_name: String,
    pub delay_ms: u64,
}

#[async_trait]
impl Tool for DelayTool {
    fn name(&self) -> &str {
        &self.tool_name
    }

    fn description(&self) -> &str {
        "test-only delay tool"
    }

    fn parameters(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _args: Value) -> ToolResult {
        tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        Ok(self.tool_name.clone())
    }
}

/// A human-input channel that is configured but never answers -- every
/// `wait` times out. Used to exercise the human-required PAUSE timeout path
/// distinctly from the no-channel-configured pre-flight failure.
pub struct NeverAnswersChannel;

#[async_trait]
impl HumanInputChannel for NeverAnswersChannel {
    async fn wait(&self, _question: &str, _timeout: Duration) -> Option<String> {
        None
    }
}

use vigil::domain::models::workflow::{Agent, Goal, Step, StepKind, Workflow};

/// A workflow with one RUN step containing a single goal, everything else
/// at its default (not supervised, not converging, no agents).
pub fn single_goal_workflow(goal_name: &str, goal: Goal) -> Workflow {
    Workflow {
        name: "test-workflow".into(),
        inputs: Vec::new(),
        steps: vec![Step { kind: StepKind::Run, goals: vec![goal_name.into()], limit: None }],
        goals: vec![goal],
        agents: Vec::new(),
    }
}

pub fn plain_goal(name: &str) -> Goal {
    Goal {
        name: name.into(),
        outcome_template: format!("Produce the result for {name}."),
        structured_output_fields: Vec::new(),
        using_agent: Vec::new(),
        converge: false,
        convergence_limit: None,
        supervised: false,
        human_required: false,
    }
}

pub fn agent(name: &str, system_prompt: &str) -> Agent {
    Agent { name: name.into(), system_prompt: system_prompt.into(), output_fields: Vec::new(), capability_profile: None }
}

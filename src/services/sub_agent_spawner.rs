//! Depth-1 sub-agent spawning: both the static `usingAgent` list and the
//! dynamic `spawn_agent` tool share this implementation (spec §4.5).

use std::sync::Arc;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::domain::error::VigilResult;
use crate::domain::models::checkpoint::StepType;
use crate::domain::models::event::EventType;
use crate::domain::models::ids::StepId;
use crate::domain::models::workflow::Agent;
use crate::domain::ports::model_provider::{ChatMessage, ChatRequest, ModelProvider, ProviderFactory};
use crate::domain::ports::security::AgentContext;
use crate::services::checkpoint_store::CheckpointStore;
use crate::services::context_builder::{CompletedGoal, SubAgentEnvelope};
use crate::services::event_logger::SessionEventLogger;
use crate::services::goal_executor::{GoalExecutor, PhaseRequest};
use crate::services::tool_dispatcher::ToolDispatcher;

/// Tool names withheld from every sub-agent, enforcing depth = 1 (spec
/// §4.5: "the parent's tool set minus `spawn_agent` and `spawn_agents`").
const SPAWN_TOOL_NAMES: [&str; 2] = ["spawn_agent", "spawn_agents"];

/// One unit of sub-agent work, shared by the static and dynamic spawn
/// paths.
pub struct AgentTask {
    pub parent_goal: String,
    pub task: String,
    pub context: Vec<CompletedGoal>,
    pub correction: Option<String>,
    /// Whether the parent goal is supervised -- sub-agents inherit this
    /// (spec §4.5: "otherwise only EXECUTE runs").
    pub supervised: bool,
}

pub struct SubAgentSpawner {
    provider_factory: Arc<dyn ProviderFactory>,
    dispatcher: Arc<ToolDispatcher>,
    checkpoints: Arc<CheckpointStore>,
    events: Arc<SessionEventLogger>,
}

impl SubAgentSpawner {
    pub fn new(
        provider_factory: Arc<dyn ProviderFactory>,
        dispatcher: Arc<ToolDispatcher>,
        checkpoints: Arc<CheckpointStore>,
        events: Arc<SessionEventLogger>,
    ) -> Self {
        Self { provider_factory, dispatcher, checkpoints, events }
    }

    /// Run one sub-agent and return its raw output text.
    async fn run_one(&self, agent: &Agent, task: &AgentTask, cancel: CancellationToken) -> VigilResult<String> {
        self.events
            .log(
                EventType::SubAgentStart,
                Some(task.parent_goal.clone()),
                None,
                Some(agent.name.clone()),
                None,
                None,
                None,
                serde_json::Value::Null,
            )
            .await;

        let provider: Arc<dyn ModelProvider> = self.provider_factory.get_provider(agent.capability_profile.as_deref());
        let depth1_registry = self.dispatcher.registry().without(&SPAWN_TOOL_NAMES);
        let depth1_dispatcher = Arc::new(self.dispatcher.with_registry(depth1_registry));

        let envelope = SubAgentEnvelope {
            role: agent.name.clone(),
            parent_goal: task.parent_goal.clone(),
            task: task.task.clone(),
            context: task.context.clone(),
            correction: task.correction.clone(),
        };

        let step_id = StepId::random();
        let agent_ctx = AgentContext { goal: task.parent_goal.clone(), agent_role: Some(agent.name.clone()) };

        let executor = GoalExecutor::new(provider, depth1_dispatcher.clone(), self.checkpoints.clone(), self.events.clone(), None);

        let request = PhaseRequest {
            step_id,
            step_type: StepType::Subagent,
            instruction: task.task.clone(),
            system_prompt: Some(agent.system_prompt.as_str()),
            tools: depth1_dispatcher.registry(),
            prompt_ctx: crate::services::context_builder::PromptContext {
                workflow_name: task.parent_goal.clone(),
                current_goal_id: agent.name.clone(),
                current_goal_description: envelope.render(),
                correction: task.correction.clone(),
                ..Default::default()
            },
            agent_ctx,
            supervised: task.supervised,
            human_required: false,
            converge: None,
            subagent_name: Some(agent.name.clone()),
            structured_output_fields: agent.output_fields.clone(),
        };

        let outcome = executor.run(request, cancel).await?;

        self.events
            .log(
                EventType::SubAgentEnd,
                Some(task.parent_goal.clone()),
                None,
                Some(agent.name.clone()),
                None,
                None,
                None,
                serde_json::Value::Null,
            )
            .await;

        Ok(outcome.output)
    }

    /// Run `agents` in parallel and, for N>1, synthesise their outputs into
    /// one coherent answer (spec §4.5). For N==1, the lone output is
    /// returned directly.
    pub async fn run_agents(&self, agents: &[Agent], task: AgentTask, cancel: CancellationToken) -> VigilResult<String> {
        if agents.len() == 1 {
            return self.run_one(&agents[0], &task, cancel).await;
        }

        let outputs = join_all(agents.iter().map(|agent| {
            let task_ref = &task;
            let cancel = cancel.clone();
            async move { self.run_one(agent, task_ref, cancel).await.map(|out| (agent.name.clone(), out)) }
        }))
        .await
        .into_iter()
        .collect::<VigilResult<Vec<_>>>()?;

        self.synthesize(&outputs).await
    }

    async fn synthesize(&self, outputs: &[(String, String)]) -> VigilResult<String> {
        let body = outputs
            .iter()
            .map(|(name, output)| format!("## {name}\n{output}"))
            .collect::<Vec<_>>()
            .join("\n\n");
        let provider = self.provider_factory.get_provider(None);
        let request = ChatRequest {
            messages: vec![
                ChatMessage::system("Synthesize these into a coherent answer."),
                ChatMessage::user(body),
            ],
            tools: vec![],
        };
        let response = provider.chat(request).await?;
        Ok(response.content)
    }
}

/// The built-in `spawn_agent` tool, bound to one goal's parent context. A
/// fresh instance is built per EXECUTE call so it can carry that call's
/// known agents and completed-goal context.
///
/// The call is not linked to the parent goal's cancellation token -- the
/// `Tool` contract (spec §6) has no cancellation parameter, so a dynamic
/// spawn runs to completion or failure on its own.
pub struct SpawnAgentTool {
    spawner: Arc<SubAgentSpawner>,
    available_agents: Vec<Agent>,
    parent_goal: String,
    context: Vec<CompletedGoal>,
    supervised: bool,
}

impl SpawnAgentTool {
    pub fn new(
        spawner: Arc<SubAgentSpawner>,
        available_agents: Vec<Agent>,
        parent_goal: String,
        context: Vec<CompletedGoal>,
        supervised: bool,
    ) -> Self {
        Self { spawner, available_agents, parent_goal, context, supervised }
    }
}

#[async_trait::async_trait]
impl crate::domain::ports::tool::Tool for SpawnAgentTool {
    fn name(&self) -> &str {
        "spawn_agent"
    }

    fn description(&self) -> &str {
        "Spawn a named sub-agent to perform a focused task and return its output."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "agent": {"type": "string", "description": "Name of the agent to spawn"},
                "task": {"type": "string", "description": "Task description for the sub-agent"},
            },
            "required": ["agent", "task"],
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String, String> {
        let agent_name = args.get("agent").and_then(|v| v.as_str()).ok_or("missing `agent` argument")?;
        let task_text = args.get("task").and_then(|v| v.as_str()).ok_or("missing `task` argument")?;
        let agent = self
            .available_agents
            .iter()
            .find(|a| a.name == agent_name)
            .ok_or_else(|| format!("unknown agent `{agent_name}`"))?;

        let task = AgentTask {
            parent_goal: self.parent_goal.clone(),
            task: task_text.to_string(),
            context: self.context.clone(),
            correction: None,
            supervised: self.supervised,
        };

        self.spawner
            .run_agents(std::slice::from_ref(agent), task, CancellationToken::new())
            .await
            .map_err(|e| e.to_string())
    }
}

//! Covers depth-1 sub-agent spawning (spec §4.5): even when the parent's
//! tool registry itself contains a tool literally named `spawn_agent`, a
//! sub-agent never sees it among its available tools.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use common::{agent, plain_goal, single_goal_workflow, ScriptedProvider, SingleProviderFactory};
use vigil::domain::models::event::EventType;
use vigil::domain::ports::tool::{Tool, ToolResult};
use vigil::domain::ports::session_manager::NullSessionManager;
use vigil::domain::ports::NullSecurityVerifier;
use vigil::services::checkpoint_store::CheckpointStore;
use vigil::services::event_logger::SessionEventLogger;
use vigil::services::tool_dispatcher::{ToolDispatcher, ToolRegistry};
use vigil::{RunStatus, WorkflowRunner};

/// A tool that happens to be named `spawn_agent` for reasons unrelated to
/// the built-in dynamic-spawn tool -- the dispatcher strips it from a
/// sub-agent's registry purely by name, not by checking where it came from.
struct ImposterSpawnTool;

#[async_trait]
impl Tool for ImposterSpawnTool {
    fn name(&self) -> &str {
        "spawn_agent"
    }
    fn description(&self) -> &str {
        "not the real spawn tool"
    }
    fn parameters(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }
    async fn execute(&self, _args: Value) -> ToolResult {
        Ok("imposter".into())
    }
}

struct LookupTool;

#[async_trait]
impl Tool for LookupTool {
    fn name(&self) -> &str {
        "lookup"
    }
    fn description(&self) -> &str {
        "looks things up"
    }
    fn parameters(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }
    async fn execute(&self, _args: Value) -> ToolResult {
        Ok("result".into())
    }
}

#[tokio::test]
async fn sub_agent_never_sees_spawn_agent_tool() {
    let provider = Arc::new(ScriptedProvider::new().with_execute_text(["findings"]));
    let events = Arc::new(SessionEventLogger::new(true, Arc::new(NullSessionManager)));

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(ImposterSpawnTool));
    registry.register(Arc::new(LookupTool));
    let dispatcher = Arc::new(ToolDispatcher::new(registry, None, Arc::new(NullSecurityVerifier::new()), events.clone()));

    let checkpoints = Arc::new(CheckpointStore::in_memory());
    let factory = Arc::new(SingleProviderFactory(provider.clone()));
    let runner = WorkflowRunner::new(factory, dispatcher, checkpoints, events.clone(), None);

    let mut goal = plain_goal("report");
    goal.using_agent = vec!["researcher".into()];
    let mut workflow = single_goal_workflow("report", goal);
    workflow.agents.push(agent("researcher", "You research things."));

    let result = runner.run(&workflow, BTreeMap::new(), CancellationToken::new()).await;
    assert_eq!(result.status, RunStatus::Complete);

    let seen = provider.seen_tool_names.lock().unwrap();
    assert!(
        seen.iter().any(|tools| tools.iter().any(|t| t == "lookup")),
        "the sub-agent's EXECUTE call should still see unrelated tools"
    );
    assert!(
        seen.iter().all(|tools| !tools.iter().any(|t| t == "spawn_agent")),
        "no call the sub-agent makes should ever see a `spawn_agent` tool"
    );

    let logged = events.events().await;
    assert!(
        logged.iter().any(|e| e.event_type == EventType::SubAgentStart && e.agent.as_deref() == Some("researcher")),
        "spawning a sub-agent should log SubAgentStart"
    );
    assert!(
        logged.iter().any(|e| e.event_type == EventType::SubAgentEnd && e.agent.as_deref() == Some("researcher")),
        "a sub-agent completing should log SubAgentEnd"
    );
}

//! Categorises and executes model-requested tool calls (spec §4.4).
//!
//! Async (fire-and-forget) calls are scheduled on a background task and
//! answered with a synthetic `"OK"` immediately. Serialize calls run on a
//! single sequential chain, in request order, independent of the parallel
//! pool. Parallel calls run concurrently, bounded by a counted semaphore.
//! Whatever order execution actually happens in, the returned tool
//! messages are always re-sorted to the original request order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::time::timeout as tokio_timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::models::event::EventType;
use crate::domain::models::untrusted::{ContentType, Trust};
use crate::domain::ports::mcp::parse_mcp_tool_name;
use crate::domain::ports::model_provider::{ChatMessage, ToolCallRequest};
use crate::domain::ports::security::AgentContext;
use crate::domain::ports::tool::{categorize, is_external_tool, Tool, ToolCategory};
use crate::domain::ports::{McpManager, SecurityVerifier};
use crate::services::event_logger::SessionEventLogger;

/// Tool name prefixes/exact names that get a network timeout wrapped
/// around their execution (spec §4.4).
fn is_network_tool(name: &str) -> bool {
    name == "web-search" || name == "web_search" || name == "web-fetch" || name == "web_fetch" || name.starts_with("mcp_")
}

/// `min(max(4, 4 * cpu_count), 32)` simultaneous parallel executions
/// (spec §4.4).
pub fn default_concurrency_cap() -> usize {
    (4 * num_cpus::get()).clamp(4, 32)
}

/// A name -> implementation registry for locally-hosted tools.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// A copy of this registry with `names` removed -- used to build the
    /// depth-1 tool set handed to a sub-agent (spec §4.5: the parent's set
    /// minus `spawn_agent`/`spawn_agents`).
    pub fn without(&self, names: &[&str]) -> Self {
        Self {
            tools: self
                .tools
                .iter()
                .filter(|(n, _)| !names.contains(&n.as_str()))
                .map(|(n, t)| (n.clone(), t.clone()))
                .collect(),
        }
    }

    pub fn tool_defs(&self) -> Vec<crate::domain::ports::model_provider::ToolDef> {
        self.tools
            .values()
            .map(|t| crate::domain::ports::model_provider::ToolDef {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters(),
            })
            .collect()
    }
}

pub struct ToolDispatcher {
    registry: ToolRegistry,
    mcp: Option<Arc<dyn McpManager>>,
    security: Arc<dyn SecurityVerifier>,
    semaphore: Arc<Semaphore>,
    network_timeout: Duration,
    events: Arc<SessionEventLogger>,
}

impl ToolDispatcher {
    pub fn new(
        registry: ToolRegistry,
        mcp: Option<Arc<dyn McpManager>>,
        security: Arc<dyn SecurityVerifier>,
        events: Arc<SessionEventLogger>,
    ) -> Self {
        Self {
            registry,
            mcp,
            security,
            semaphore: Arc::new(Semaphore::new(default_concurrency_cap())),
            network_timeout: Duration::from_secs(30),
            events,
        }
    }

    pub fn with_network_timeout(mut self, timeout: Duration) -> Self {
        self.network_timeout = timeout;
        self
    }

    pub fn with_concurrency_cap(mut self, cap: usize) -> Self {
        self.semaphore = Arc::new(Semaphore::new(cap.max(1)));
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// A dispatcher sharing this one's MCP manager, security verifier,
    /// concurrency cap, and network timeout, but scoped to `registry` --
    /// used to build a sub-agent's depth-1 tool set (spec §4.5).
    pub fn with_registry(&self, registry: ToolRegistry) -> Self {
        Self {
            registry,
            mcp: self.mcp.clone(),
            security: self.security.clone(),
            semaphore: self.semaphore.clone(),
            network_timeout: self.network_timeout,
            events: self.events.clone(),
        }
    }

    /// Dispatch one batch of tool calls and return one tool-result message
    /// per request, in the original request order (spec §4.4, §5).
    pub async fn dispatch(
        &self,
        calls: Vec<ToolCallRequest>,
        ctx: AgentContext,
        cancel: CancellationToken,
    ) -> Vec<ChatMessage> {
        let n = calls.len();
        let mut slots: Vec<Option<ChatMessage>> = (0..n).map(|_| None).collect();

        let mut serialize_batch = Vec::new();
        let mut parallel_futures = Vec::new();

        for (idx, call) in calls.into_iter().enumerate() {
            match categorize(&call.name) {
                ToolCategory::Async => {
                    self.events
                        .log(
                            EventType::ToolCall,
                            Some(ctx.goal.clone()),
                            None,
                            ctx.agent_role.clone(),
                            Some(call.name.clone()),
                            Some(call.id.clone()),
                            None,
                            serde_json::Value::Null,
                        )
                        .await;
                    self.spawn_async(call.clone(), ctx.clone());
                    self.events
                        .log(
                            EventType::ToolResult,
                            Some(ctx.goal.clone()),
                            None,
                            ctx.agent_role.clone(),
                            Some(call.name.clone()),
                            Some(call.id.clone()),
                            Some("OK".to_string()),
                            serde_json::Value::Null,
                        )
                        .await;
                    slots[idx] = Some(ChatMessage::tool_result(call.id.clone(), "OK"));
                }
                ToolCategory::Serialize => serialize_batch.push((idx, call)),
                ToolCategory::Parallel => parallel_futures.push((idx, call)),
            }
        }

        let serialize_ctx = ctx.clone();
        let serialize_cancel = cancel.clone();
        let serialize_fut = async {
            let mut out = Vec::with_capacity(serialize_batch.len());
            for (idx, call) in serialize_batch {
                let message = self.execute_one(&call, &serialize_ctx, serialize_cancel.clone()).await;
                out.push((idx, message));
            }
            out
        };

        let parallel_fut = async {
            let handles = parallel_futures.into_iter().map(|(idx, call)| {
                let ctx = ctx.clone();
                let cancel = cancel.clone();
                async move {
                    let _permit = self.semaphore.acquire().await.expect("semaphore not closed");
                    let message = self.execute_one(&call, &ctx, cancel).await;
                    (idx, message)
                }
            });
            futures::future::join_all(handles).await
        };

        let (serialize_results, parallel_results) = tokio::join!(serialize_fut, parallel_fut);
        for (idx, message) in serialize_results.into_iter().chain(parallel_results) {
            slots[idx] = Some(message);
        }

        slots.into_iter().map(|s| s.expect("every slot filled")).collect()
    }

    fn spawn_async(&self, call: ToolCallRequest, ctx: AgentContext) {
        let registry = self.registry.clone();
        let mcp = self.mcp.clone();
        let security = self.security.clone();
        let events = self.events.clone();
        let network_timeout = self.network_timeout;
        tokio::spawn(async move {
            let dispatcher = ToolDispatcher {
                registry,
                mcp,
                security,
                semaphore: Arc::new(Semaphore::new(1)),
                network_timeout,
                events,
            };
            // Fire-and-forget: the model already has its synthetic "OK".
            // Tolerate failures; never propagate a panic into the runner.
            let result = std::panic::AssertUnwindSafe(
                dispatcher.execute_one(&call, &ctx, CancellationToken::new()),
            )
            .catch_unwind()
            .await;
            if let Err(_panic) = result {
                warn!(tool = %call.name, "async tool task panicked");
            }
        });
    }

    async fn execute_one(
        &self,
        call: &ToolCallRequest,
        ctx: &AgentContext,
        cancel: CancellationToken,
    ) -> ChatMessage {
        self.events
            .log(
                EventType::ToolCall,
                Some(ctx.goal.clone()),
                None,
                ctx.agent_role.clone(),
                Some(call.name.clone()),
                Some(call.id.clone()),
                None,
                serde_json::json!({"args": call.args}),
            )
            .await;

        let verification = match self.security.verify_tool_call(&call.name, &call.args, ctx).await {
            Ok(v) => v,
            Err(e) => {
                return ChatMessage::tool_result(call.id.clone(), format!("Error: {e}"));
            }
        };

        self.log_tier_events(&call, ctx, &verification).await;

        self.events
            .log(
                EventType::SecurityDecision,
                Some(ctx.goal.clone()),
                None,
                ctx.agent_role.clone(),
                Some(call.name.clone()),
                Some(call.id.clone()),
                None,
                serde_json::json!({"check_path": verification.check_path.as_str(), "allowed": verification.allowed}),
            )
            .await;

        if !verification.allowed {
            let reason = verification.deny_reason.clone().unwrap_or_else(|| "denied by security verifier".into());
            self.events
                .log(
                    EventType::SecurityBlock,
                    Some(ctx.goal.clone()),
                    None,
                    ctx.agent_role.clone(),
                    Some(call.name.clone()),
                    Some(call.id.clone()),
                    Some(reason.clone()),
                    serde_json::json!({"check_path": verification.check_path.as_str()}),
                )
                .await;
            return ChatMessage::tool_result(call.id.clone(), format!("Error: {reason}"));
        }

        let run = self.run_tool(&call.name, call.args.clone());
        let outcome = if is_network_tool(&call.name) {
            match tokio_timeout(self.network_timeout, run).await {
                Ok(r) => r,
                Err(_) => Err(format!("tool `{}` timed out after {:?}", call.name, self.network_timeout)),
            }
        } else {
            tokio::select! {
                r = run => r,
                () = cancel.cancelled() => Err("run cancelled".to_string()),
            }
        };

        let content = match outcome {
            Ok(text) => {
                if is_external_tool(&call.name) {
                    let event_seq = self.events.next_sequence();
                    let _block = self
                        .security
                        .add_block_with_taint(
                            Trust::Untrusted,
                            ContentType::ToolResult,
                            false,
                            text.clone(),
                            call.name.clone(),
                            ctx.agent_role.clone(),
                            event_seq,
                            verification.related_blocks.clone(),
                        )
                        .await;
                }
                text
            }
            Err(e) => format!("Error: {e}"),
        };

        self.events
            .log(
                EventType::ToolResult,
                Some(ctx.goal.clone()),
                None,
                ctx.agent_role.clone(),
                Some(call.name.clone()),
                Some(call.id.clone()),
                Some(content.clone()),
                serde_json::Value::Null,
            )
            .await;

        ChatMessage::tool_result(call.id.clone(), content)
    }

    /// Log one event per tier the call actually traversed (spec §4.8):
    /// static always runs, triage/supervisor only when escalated to.
    async fn log_tier_events(
        &self,
        call: &ToolCallRequest,
        ctx: &AgentContext,
        verification: &crate::domain::ports::security::VerificationResult,
    ) {
        let tiers: [(EventType, Option<&crate::domain::ports::security::TierRecord>); 3] = [
            (EventType::SecurityStatic, Some(&verification.static_tier)),
            (EventType::SecurityTriage, verification.triage_tier.as_ref()),
            (EventType::SecuritySupervisor, verification.supervisor_tier.as_ref()),
        ];
        for (event_type, tier) in tiers {
            let Some(tier) = tier else { continue };
            self.events
                .log(
                    event_type,
                    Some(ctx.goal.clone()),
                    None,
                    ctx.agent_role.clone(),
                    Some(call.name.clone()),
                    Some(call.id.clone()),
                    tier.reason.clone(),
                    serde_json::json!({"allowed": tier.allowed}),
                )
                .await;
        }
    }

    async fn run_tool(&self, name: &str, args: Value) -> Result<String, String> {
        if let Some((server, tool)) = parse_mcp_tool_name(name) {
            let mcp = self.mcp.as_ref().ok_or_else(|| format!("no MCP manager configured for `{name}`"))?;
            let decision = mcp.check_mcp_tool(server, tool);
            if !decision.allowed {
                return Err(decision.reason.unwrap_or_else(|| "MCP policy denied".into()));
            }
            return mcp
                .call_tool(server, tool, args)
                .await
                .map(|c| c.as_text())
                .map_err(|e| e.to_string());
        }

        let tool = self.registry.get(name).ok_or_else(|| format!("unknown tool `{name}`"))?;
        info!(tool = name, "executing tool");
        tool.execute(args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::NullSecurityVerifier;
    use async_trait::async_trait;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn parameters(&self) -> Value {
            serde_json::json!({})
        }
        async fn execute(&self, args: Value) -> Result<String, String> {
            Ok(args.to_string())
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "fail"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        fn parameters(&self) -> Value {
            serde_json::json!({})
        }
        async fn execute(&self, _args: Value) -> Result<String, String> {
            Err("boom".into())
        }
    }

    fn test_ctx() -> AgentContext {
        AgentContext { goal: "g".into(), agent_role: None }
    }

    fn logger() -> Arc<SessionEventLogger> {
        Arc::new(SessionEventLogger::new(true, Arc::new(crate::domain::ports::NullSessionManager)))
    }

    #[tokio::test]
    async fn returns_results_in_request_order() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry.register(Arc::new(FailingTool));
        let dispatcher = ToolDispatcher::new(registry, None, Arc::new(NullSecurityVerifier::new()), logger());

        let calls = vec![
            ToolCallRequest { id: "1".into(), name: "echo".into(), args: serde_json::json!({"a": 1}) },
            ToolCallRequest { id: "2".into(), name: "memory-write".into(), args: serde_json::json!({}) },
            ToolCallRequest { id: "3".into(), name: "fail".into(), args: serde_json::json!({}) },
        ];
        let results = dispatcher.dispatch(calls, test_ctx(), CancellationToken::new()).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].tool_call_id.as_deref(), Some("1"));
        assert_eq!(results[1].content, "OK");
        assert!(results[2].content.starts_with("Error: "));
    }

    #[tokio::test]
    async fn every_tool_call_logs_a_matching_tool_call_and_tool_result_event() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let events = logger();
        let dispatcher = ToolDispatcher::new(registry, None, Arc::new(NullSecurityVerifier::new()), events.clone());

        let calls = vec![ToolCallRequest { id: "1".into(), name: "echo".into(), args: serde_json::json!({}) }];
        dispatcher.dispatch(calls, test_ctx(), CancellationToken::new()).await;

        let logged = events.events().await;
        let call_events: Vec<_> = logged.iter().filter(|e| e.event_type == EventType::ToolCall).collect();
        let result_events: Vec<_> = logged.iter().filter(|e| e.event_type == EventType::ToolResult).collect();
        assert_eq!(call_events.len(), 1);
        assert_eq!(result_events.len(), 1);
        assert_eq!(call_events[0].correlation_id.as_deref(), Some("1"));
        assert_eq!(result_events[0].correlation_id.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn unknown_tool_is_a_non_fatal_error_result() {
        let dispatcher = ToolDispatcher::new(ToolRegistry::new(), None, Arc::new(NullSecurityVerifier::new()), logger());
        let calls = vec![ToolCallRequest { id: "1".into(), name: "nope".into(), args: serde_json::json!({}) }];
        let results = dispatcher.dispatch(calls, test_ctx(), CancellationToken::new()).await;
        assert!(results[0].content.starts_with("Error: "));
    }
}

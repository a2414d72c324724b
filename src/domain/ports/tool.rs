//! The tool contract and dispatch category (spec §4.4, §6).

use async_trait::async_trait;
use serde_json::Value;

/// `Execute(ctx, argsMap) -> (result, error)` (spec §6). Errors are
/// surfaced to the model as `Error: ...` tool results by the dispatcher;
/// tools themselves just return a plain `Result`.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> Value;
    async fn execute(&self, args: Value) -> ToolResult;
}

pub type ToolResult = Result<String, String>;

/// The dispatch category a tool call is bucketed into by name (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCategory {
    /// Fire-and-forget: scheduled in the background, the model sees a
    /// synthetic `"OK"` immediately and never waits on completion.
    Async,
    /// Mutating, high side-effect cost: run strictly in request order.
    Serialize,
    /// Everything else: run concurrently, bounded by the concurrency cap.
    Parallel,
}

/// Tool names that are fire-and-forget writes.
const ASYNC_TOOLS: &[&str] = &["memory-write", "scratchpad-write"];

/// Tool names that must run strictly sequentially in request order.
const SERIALIZE_TOOLS: &[&str] = &["file-write", "shell", "agent-spawn", "spawn_agent", "spawn_agents"];

/// Tool names whose results are registered as untrusted content (spec §4.4).
const EXTERNAL_TOOLS: &[&str] = &["web_fetch", "web_search"];

pub fn categorize(tool_name: &str) -> ToolCategory {
    if ASYNC_TOOLS.contains(&tool_name) {
        ToolCategory::Async
    } else if SERIALIZE_TOOLS.contains(&tool_name) {
        ToolCategory::Serialize
    } else {
        ToolCategory::Parallel
    }
}

/// A tool call's result must be registered as an untrusted content block
/// when it crosses a network/external boundary the model doesn't control.
pub fn is_external_tool(tool_name: &str) -> bool {
    EXTERNAL_TOOLS.contains(&tool_name) || tool_name.starts_with("mcp_")
}

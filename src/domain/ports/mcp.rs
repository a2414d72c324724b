//! The MCP bridge contract (spec §6).
//!
//! Tool names beginning with `mcp_<server>_<tool>` are routed through this
//! manager. Concrete MCP transport is out of scope for the core; this is
//! the contract a bridge must satisfy.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::error::VigilError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpContentBlock {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct McpContent {
    pub content: Vec<McpContentBlock>,
}

impl McpContent {
    pub fn as_text(&self) -> String {
        self.content
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
pub trait McpManager: Send + Sync {
    async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        args: Value,
    ) -> Result<McpContent, VigilError>;

    /// Policy hook gating MCP calls before dispatch.
    fn check_mcp_tool(&self, server: &str, tool: &str) -> McpPolicyDecision;
}

#[derive(Debug, Clone)]
pub struct McpPolicyDecision {
    pub allowed: bool,
    pub reason: Option<String>,
    pub warning: Option<String>,
}

impl McpPolicyDecision {
    pub fn allow() -> Self {
        Self { allowed: true, reason: None, warning: None }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self { allowed: false, reason: Some(reason.into()), warning: None }
    }
}

/// Split a `mcp_<server>_<tool>` tool name into its server and tool parts.
pub fn parse_mcp_tool_name(name: &str) -> Option<(&str, &str)> {
    let rest = name.strip_prefix("mcp_")?;
    rest.split_once('_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mcp_tool_names() {
        assert_eq!(parse_mcp_tool_name("mcp_github_create_issue"), Some(("github", "create_issue")));
        assert_eq!(parse_mcp_tool_name("ls"), None);
    }
}

//! Covers the tool dispatcher's ordering guarantee directly (spec §4.4,
//! §8): whatever order calls actually finish in, results come back in the
//! original request order.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use common::DelayTool;
use vigil::domain::error::VigilError;
use vigil::domain::models::event::EventType;
use vigil::domain::models::untrusted::{BlockId, ContentType, Trust, UntrustedBlock};
use vigil::domain::ports::model_provider::ToolCallRequest;
use vigil::domain::ports::security::{AgentContext, CheckPath, SecurityVerifier, TierRecord, VerificationResult};
use vigil::domain::ports::session_manager::NullSessionManager;
use vigil::domain::ports::NullSecurityVerifier;
use vigil::services::event_logger::SessionEventLogger;
use vigil::services::tool_dispatcher::{ToolDispatcher, ToolRegistry};

/// A verifier that always escalates through all three tiers, to exercise
/// the per-tier event logging (spec §4.8).
struct AlwaysEscalatesVerifier;

#[async_trait]
impl SecurityVerifier for AlwaysEscalatesVerifier {
    async fn add_block_with_taint(
        &self,
        _trust: Trust,
        _content_type: ContentType,
        _mutable: bool,
        content: String,
        source: String,
        agent: Option<String>,
        event_seq: u64,
        tainted_by: Vec<BlockId>,
    ) -> UntrustedBlock {
        UntrustedBlock {
            id: 1,
            trust: Trust::Untrusted,
            content_type: ContentType::ToolResult,
            mutable: false,
            content,
            source,
            agent_role: agent,
            event_seq,
            tainted_by,
            entropy: 0.0,
        }
    }

    async fn verify_tool_call(
        &self,
        _tool_name: &str,
        _args: &serde_json::Value,
        _ctx: &AgentContext,
    ) -> Result<VerificationResult, VigilError> {
        Ok(VerificationResult {
            allowed: true,
            static_tier: TierRecord { tier: "static", allowed: true, reason: None },
            triage_tier: Some(TierRecord { tier: "triage", allowed: true, reason: None }),
            supervisor_tier: Some(TierRecord { tier: "supervisor", allowed: true, reason: None }),
            check_path: CheckPath::StaticTriageSupervisor,
            related_blocks: Vec::new(),
            deny_reason: None,
        })
    }
}

#[tokio::test]
async fn parallel_results_are_resorted_to_request_order() {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(DelayTool { tool_name: "slow".into(), delay_ms: 60 }));
    registry.register(Arc::new(DelayTool { tool_name: "medium".into(), delay_ms: 30 }));
    registry.register(Arc::new(DelayTool { tool_name: "fast".into(), delay_ms: 5 }));

    let events = Arc::new(SessionEventLogger::new(true, Arc::new(NullSessionManager)));
    let dispatcher = ToolDispatcher::new(registry, None, Arc::new(NullSecurityVerifier::new()), events);

    // Requested slowest-first so completion order is the reverse of
    // request order; the dispatcher must still return request order.
    let calls = vec![
        ToolCallRequest { id: "1".into(), name: "slow".into(), args: serde_json::json!({}) },
        ToolCallRequest { id: "2".into(), name: "medium".into(), args: serde_json::json!({}) },
        ToolCallRequest { id: "3".into(), name: "fast".into(), args: serde_json::json!({}) },
    ];

    let ctx = AgentContext { goal: "g".into(), agent_role: None };
    let results = dispatcher.dispatch(calls, ctx, CancellationToken::new()).await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].tool_call_id.as_deref(), Some("1"));
    assert_eq!(results[0].content, "slow");
    assert_eq!(results[1].tool_call_id.as_deref(), Some("2"));
    assert_eq!(results[1].content, "medium");
    assert_eq!(results[2].tool_call_id.as_deref(), Some("3"));
    assert_eq!(results[2].content, "fast");
}

#[tokio::test]
async fn each_escalated_tier_logs_its_own_event() {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(DelayTool { tool_name: "lookup".into(), delay_ms: 1 }));

    let events = Arc::new(SessionEventLogger::new(true, Arc::new(NullSessionManager)));
    let dispatcher = ToolDispatcher::new(registry, None, Arc::new(AlwaysEscalatesVerifier), events.clone());

    let calls = vec![ToolCallRequest { id: "1".into(), name: "lookup".into(), args: serde_json::json!({}) }];
    let ctx = AgentContext { goal: "g".into(), agent_role: None };
    dispatcher.dispatch(calls, ctx, CancellationToken::new()).await;

    let logged = events.events().await;
    for expected in [EventType::SecurityStatic, EventType::SecurityTriage, EventType::SecuritySupervisor] {
        assert!(logged.iter().any(|e| e.event_type == expected), "missing {expected:?} event");
    }
}

#[tokio::test]
async fn a_denied_call_logs_security_block() {
    let dispatcher_registry = ToolRegistry::new();
    let events = Arc::new(SessionEventLogger::new(true, Arc::new(NullSessionManager)));

    struct AlwaysDenies;
    #[async_trait]
    impl SecurityVerifier for AlwaysDenies {
        async fn add_block_with_taint(
            &self,
            _trust: Trust,
            _content_type: ContentType,
            _mutable: bool,
            content: String,
            source: String,
            agent: Option<String>,
            event_seq: u64,
            tainted_by: Vec<BlockId>,
        ) -> UntrustedBlock {
            UntrustedBlock {
                id: 1,
                trust: Trust::Untrusted,
                content_type: ContentType::ToolResult,
                mutable: false,
                content,
                source,
                agent_role: agent,
                event_seq,
                tainted_by,
                entropy: 0.0,
            }
        }

        async fn verify_tool_call(
            &self,
            _tool_name: &str,
            _args: &serde_json::Value,
            _ctx: &AgentContext,
        ) -> Result<VerificationResult, VigilError> {
            Ok(VerificationResult {
                allowed: false,
                static_tier: TierRecord { tier: "static", allowed: false, reason: Some("blocked".into()) },
                triage_tier: None,
                supervisor_tier: None,
                check_path: CheckPath::Static,
                related_blocks: Vec::new(),
                deny_reason: Some("blocked by policy".into()),
            })
        }
    }

    let dispatcher = ToolDispatcher::new(dispatcher_registry, None, Arc::new(AlwaysDenies), events.clone());
    let calls = vec![ToolCallRequest { id: "1".into(), name: "rm-rf-root".into(), args: serde_json::json!({}) }];
    let ctx = AgentContext { goal: "g".into(), agent_role: None };
    let results = dispatcher.dispatch(calls, ctx, CancellationToken::new()).await;

    assert!(results[0].content.contains("blocked by policy"));
    let logged = events.events().await;
    assert!(logged.iter().any(|e| e.event_type == EventType::SecurityBlock));
}

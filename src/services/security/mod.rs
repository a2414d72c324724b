//! Reference (swappable) implementation of the [`SecurityVerifier`]
//! integration contract (spec §4.8).
//!
//! Grounded on the teacher's cost-tiered `services::overseers` /
//! `domain::models::convergence::overseer::{Overseer, OverseerCluster}`
//! design: cheap checks run first and short-circuit expensive ones. Here
//! the tiers are a cheap **static** regex pass, an optional **triage**
//! model call, and an optional **supervisor** model call -- escalating
//! only when the cheaper tier flags the call as needing another look,
//! exactly matching the `static` / `static→triage` / `static→triage→supervisor`
//! check-path strings from spec §4.8.
//!
//! This is never the only implementation: [`SecurityVerifier`] remains a
//! trait, and [`crate::domain::ports::NullSecurityVerifier`] is available
//! for callers who run with no verifier at all.

mod static_tier;

pub use static_tier::{StaticRule, StaticTier};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::domain::error::VigilError;
use crate::domain::models::untrusted::{shannon_entropy, BlockId, ContentType, Trust, UntrustedBlock};
use crate::domain::ports::model_provider::{ChatMessage, ChatRequest, ModelProvider};
use crate::domain::ports::security::{
    AgentContext, CheckPath, SecurityVerifier, TierRecord, VerificationResult,
};

/// Tiered security verifier: static pattern tier always runs; triage and
/// supervisor tiers are optional model calls invoked only when a cheaper
/// tier flags the call as needing another look.
pub struct TieredSecurityVerifier {
    static_tier: StaticTier,
    triage: Option<Arc<dyn ModelProvider>>,
    supervisor: Option<Arc<dyn ModelProvider>>,
    blocks: RwLock<Vec<UntrustedBlock>>,
    next_block_id: AtomicU64,
}

impl TieredSecurityVerifier {
    pub fn new(static_tier: StaticTier) -> Self {
        Self {
            static_tier,
            triage: None,
            supervisor: None,
            blocks: RwLock::new(Vec::new()),
            next_block_id: AtomicU64::new(1),
        }
    }

    pub fn with_triage(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        self.triage = Some(provider);
        self
    }

    pub fn with_supervisor(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        self.supervisor = Some(provider);
        self
    }

    async fn ask_model(&self, provider: &Arc<dyn ModelProvider>, tool_name: &str, args: &Value) -> TierRecord {
        let prompt = format!(
            "A workflow agent wants to call tool `{tool_name}` with arguments: {args}.\n\
             Reply with exactly `ALLOW` if this is safe to run, or `DENY: <reason>` otherwise."
        );
        let request = ChatRequest { messages: vec![ChatMessage::user(prompt)], tools: vec![] };
        match provider.chat(request).await {
            Ok(response) => {
                let text = response.content.trim();
                if let Some(reason) = text.strip_prefix("DENY:") {
                    TierRecord { tier: "model", allowed: false, reason: Some(reason.trim().to_string()) }
                } else {
                    TierRecord { tier: "model", allowed: true, reason: None }
                }
            }
            Err(e) => TierRecord { tier: "model", allowed: true, reason: Some(format!("model call failed, defaulting to allow: {e}")) },
        }
    }
}

#[async_trait]
impl SecurityVerifier for TieredSecurityVerifier {
    async fn add_block_with_taint(
        &self,
        trust: Trust,
        content_type: ContentType,
        mutable: bool,
        content: String,
        source: String,
        agent: Option<String>,
        event_seq: u64,
        tainted_by: Vec<BlockId>,
    ) -> UntrustedBlock {
        let id = self.next_block_id.fetch_add(1, Ordering::SeqCst);
        let entropy = shannon_entropy(&content);
        let mut blocks = self.blocks.write().await;
        // Taint lineage is a DAG by construction: only keep parents that
        // were registered strictly before this block (spec §3 invariant).
        let valid_parents: Vec<BlockId> = tainted_by
            .into_iter()
            .filter(|p| blocks.iter().any(|b| b.id == *p && b.event_seq < event_seq))
            .collect();
        let block = UntrustedBlock {
            id,
            trust,
            content_type,
            mutable,
            content,
            source,
            agent_role: agent,
            event_seq,
            tainted_by: valid_parents,
            entropy,
        };
        blocks.push(block.clone());
        block
    }

    async fn verify_tool_call(
        &self,
        tool_name: &str,
        args: &Value,
        ctx: &AgentContext,
    ) -> Result<VerificationResult, VigilError> {
        let static_verdict = self.static_tier.check(tool_name, args);
        let related_blocks = {
            let blocks = self.blocks.read().await;
            blocks
                .iter()
                .filter(|b| b.agent_role == ctx.agent_role)
                .map(|b| b.id)
                .collect::<Vec<_>>()
        };

        if !static_verdict.allowed {
            return Ok(VerificationResult {
                allowed: false,
                static_tier: static_verdict.record.clone(),
                triage_tier: None,
                supervisor_tier: None,
                check_path: CheckPath::Static,
                related_blocks,
                deny_reason: static_verdict.record.reason.clone(),
            });
        }

        if !static_verdict.needs_escalation {
            return Ok(VerificationResult {
                allowed: true,
                static_tier: static_verdict.record,
                triage_tier: None,
                supervisor_tier: None,
                check_path: CheckPath::Static,
                related_blocks,
                deny_reason: None,
            });
        }

        let Some(triage) = &self.triage else {
            // Escalation was requested but no triage tier is configured;
            // fail open at the static tier rather than block all callers
            // who haven't wired up a model triage provider.
            return Ok(VerificationResult {
                allowed: true,
                static_tier: static_verdict.record,
                triage_tier: None,
                supervisor_tier: None,
                check_path: CheckPath::Static,
                related_blocks,
                deny_reason: None,
            });
        };
        let triage_record = self.ask_model(triage, tool_name, args).await;
        if !triage_record.allowed {
            return Ok(VerificationResult {
                allowed: false,
                static_tier: static_verdict.record,
                triage_tier: Some(triage_record.clone()),
                supervisor_tier: None,
                check_path: CheckPath::StaticTriage,
                related_blocks,
                deny_reason: triage_record.reason,
            });
        }

        let Some(supervisor) = &self.supervisor else {
            return Ok(VerificationResult {
                allowed: true,
                static_tier: static_verdict.record,
                triage_tier: Some(triage_record),
                supervisor_tier: None,
                check_path: CheckPath::StaticTriage,
                related_blocks,
                deny_reason: None,
            });
        };
        let supervisor_record = self.ask_model(supervisor, tool_name, args).await;
        let allowed = supervisor_record.allowed;
        let deny_reason = supervisor_record.reason.clone().filter(|_| !allowed);
        Ok(VerificationResult {
            allowed,
            static_tier: static_verdict.record,
            triage_tier: Some(triage_record),
            supervisor_tier: Some(supervisor_record),
            check_path: CheckPath::StaticTriageSupervisor,
            related_blocks,
            deny_reason,
        })
    }
}

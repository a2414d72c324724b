//! The security verifier integration contract (spec §4.8).
//!
//! The core does not implement the verifier; it calls through this trait
//! at two points: before every tool dispatch, and after every external-tool
//! result (to register the new untrusted block). [`NullSecurityVerifier`]
//! is the always-allow null object for callers who run without one,
//! matching the teacher's `NullMemoryRepository` / `NullEmbeddingProvider`
//! convention.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::error::VigilError;
use crate::domain::models::untrusted::{BlockId, ContentType, Trust, UntrustedBlock};

/// One tier's pass/fail record within a [`VerificationResult`].
#[derive(Debug, Clone)]
pub struct TierRecord {
    pub tier: &'static str,
    pub allowed: bool,
    pub reason: Option<String>,
}

/// The check path a tool call actually traversed, for logging (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckPath {
    Static,
    StaticTriage,
    StaticTriageSupervisor,
}

impl CheckPath {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::StaticTriage => "static→triage",
            Self::StaticTriageSupervisor => "static→triage→supervisor",
        }
    }
}

#[derive(Debug, Clone)]
pub struct VerificationResult {
    pub allowed: bool,
    pub static_tier: TierRecord,
    pub triage_tier: Option<TierRecord>,
    pub supervisor_tier: Option<TierRecord>,
    pub check_path: CheckPath,
    pub related_blocks: Vec<BlockId>,
    pub deny_reason: Option<String>,
}

/// Context passed to `verify_tool_call` describing who is asking.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub goal: String,
    pub agent_role: Option<String>,
}

#[async_trait]
pub trait SecurityVerifier: Send + Sync {
    /// Register content entering the prompt; returns the minted block.
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
    ) -> UntrustedBlock;

    async fn verify_tool_call(
        &self,
        tool_name: &str,
        args: &Value,
        ctx: &AgentContext,
    ) -> Result<VerificationResult, VigilError>;
}

/// Always-allow verifier for callers who run without a security pipeline.
/// Every call reports the `static` check path.
pub struct NullSecurityVerifier {
    next_block_id: std::sync::atomic::AtomicU64,
}

impl Default for NullSecurityVerifier {
    fn default() -> Self {
        Self { next_block_id: std::sync::atomic::AtomicU64::new(1) }
    }
}

impl NullSecurityVerifier {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecurityVerifier for NullSecurityVerifier {
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
        let id = self
            .next_block_id
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let entropy = crate::domain::models::untrusted::shannon_entropy(&content);
        UntrustedBlock {
            id,
            trust,
            content_type,
            mutable,
            content,
            source,
            agent_role: agent,
            event_seq,
            tainted_by,
            entropy,
        }
    }

    async fn verify_tool_call(
        &self,
        _tool_name: &str,
        _args: &Value,
        _ctx: &AgentContext,
    ) -> Result<VerificationResult, VigilError> {
        Ok(VerificationResult {
            allowed: true,
            static_tier: TierRecord { tier: "static", allowed: true, reason: None },
            triage_tier: None,
            supervisor_tier: None,
            check_path: CheckPath::Static,
            related_blocks: Vec::new(),
            deny_reason: None,
        })
    }
}

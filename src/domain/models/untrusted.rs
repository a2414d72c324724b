//! Untrusted content blocks and their taint lineage (spec §3, §4.8).

use serde::{Deserialize, Serialize};

/// Opaque identifier for an [`UntrustedBlock`], unique within one session.
pub type BlockId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trust {
    Trusted,
    Untrusted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentType {
    Data,
    Instruction,
    ToolResult,
}

/// A content span entering the prompt from an external source. Lineage
/// (`tainted_by`) is a DAG by construction: every parent must have an
/// earlier `event_seq` than the child (spec §3 invariant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UntrustedBlock {
    pub id: BlockId,
    pub trust: Trust,
    pub content_type: ContentType,
    pub mutable: bool,
    pub content: String,
    pub source: String,
    pub agent_role: Option<String>,
    pub event_seq: u64,
    pub tainted_by: Vec<BlockId>,
    pub entropy: f64,
}

/// Shannon entropy in bits/byte, used as a cheap untrusted-content signal.
pub fn shannon_entropy(content: &str) -> f64 {
    if content.is_empty() {
        return 0.0;
    }
    let mut counts = [0u32; 256];
    for b in content.bytes() {
        counts[b as usize] += 1;
    }
    let len = content.len() as f64;
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = f64::from(c) / len;
            -p * p.log2()
        })
        .sum()
}

//! Cheap, regex-based first tier of [`super::TieredSecurityVerifier`].
//!
//! Grounded on the teacher's `Overseer` cheap-tier pattern: a handful of
//! precompiled rules run against every call before anything touches a
//! model. A rule either denies outright (`deny = true`) or flags the call
//! for triage (`deny = false`) -- it never allows by itself, since "no
//! rule matched" is the default allow.

use regex::Regex;
use serde_json::Value;

use crate::domain::ports::security::TierRecord;

/// One static rule: a compiled pattern checked against the tool name and
/// its serialized arguments.
pub struct StaticRule {
    pub name: &'static str,
    pattern: Regex,
    /// `true` denies the call outright; `false` only flags it for triage.
    pub deny: bool,
    pub reason: &'static str,
}

impl StaticRule {
    pub fn new(name: &'static str, pattern: &str, deny: bool, reason: &'static str) -> Self {
        Self {
            name,
            pattern: Regex::new(pattern).expect("static security pattern must compile"),
            deny,
            reason,
        }
    }

    fn matches(&self, haystack: &str) -> bool {
        self.pattern.is_match(haystack)
    }
}

pub struct StaticVerdict {
    pub allowed: bool,
    pub needs_escalation: bool,
    pub record: TierRecord,
}

/// Ordered set of static rules, checked in order; first deny wins.
pub struct StaticTier {
    rules: Vec<StaticRule>,
}

impl StaticTier {
    pub fn new(rules: Vec<StaticRule>) -> Self {
        Self { rules }
    }

    /// A reasonable default rule set: hard-deny on destructive filesystem
    /// wipes and raw credential exfiltration, soft-flag (escalate to
    /// triage) on broader shell/network access.
    pub fn defaults() -> Self {
        Self::new(vec![
            StaticRule::new(
                "rm-rf-root",
                r"rm\s+-rf\s+(/|~|\$HOME)(\s|$)",
                true,
                "recursive delete targeting a root or home path",
            ),
            StaticRule::new(
                "credential-exfil",
                r"(?i)(AKIA[0-9A-Z]{16}|-----BEGIN [A-Z ]*PRIVATE KEY-----)",
                true,
                "tool arguments contain what looks like a live credential",
            ),
            StaticRule::new(
                "shell-invocation",
                r"(?i)\b(curl|wget|nc|ncat)\b",
                false,
                "shell call reaches out to the network",
            ),
            StaticRule::new(
                "destructive-write",
                r"(?i)\b(drop\s+table|truncate\s+table|:\(\)\{)",
                false,
                "call looks destructive or resembles a fork bomb",
            ),
        ])
    }

    pub fn check(&self, tool_name: &str, args: &Value) -> StaticVerdict {
        let haystack = format!("{tool_name} {args}");
        for rule in &self.rules {
            if rule.matches(&haystack) {
                if rule.deny {
                    return StaticVerdict {
                        allowed: false,
                        needs_escalation: false,
                        record: TierRecord {
                            tier: "static",
                            allowed: false,
                            reason: Some(rule.reason.to_string()),
                        },
                    };
                }
                return StaticVerdict {
                    allowed: true,
                    needs_escalation: true,
                    record: TierRecord {
                        tier: "static",
                        allowed: true,
                        reason: Some(rule.reason.to_string()),
                    },
                };
            }
        }
        StaticVerdict {
            allowed: true,
            needs_escalation: false,
            record: TierRecord { tier: "static", allowed: true, reason: None },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denies_recursive_root_delete() {
        let tier = StaticTier::defaults();
        let verdict = tier.check("shell", &serde_json::json!({"command": "rm -rf /"}));
        assert!(!verdict.allowed);
        assert!(!verdict.needs_escalation);
    }

    #[test]
    fn flags_network_shell_for_triage() {
        let tier = StaticTier::defaults();
        let verdict = tier.check("shell", &serde_json::json!({"command": "curl https://example.com"}));
        assert!(verdict.allowed);
        assert!(verdict.needs_escalation);
    }

    #[test]
    fn plain_call_passes_without_escalation() {
        let tier = StaticTier::defaults();
        let verdict = tier.check("file-write", &serde_json::json!({"path": "out.txt", "content": "hi"}));
        assert!(verdict.allowed);
        assert!(!verdict.needs_escalation);
    }
}

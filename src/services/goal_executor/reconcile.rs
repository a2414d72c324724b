//! The RECONCILE phase: deterministic, no model call (spec §4.2 table).

use chrono::Utc;

use crate::domain::models::checkpoint::{PostRecord, PreRecord, ReconcileRecord, ReconcileTrigger};

const EXCESS_ASSUMPTIONS_THRESHOLD: usize = 3;

pub fn run(pre: &PreRecord, post: &PostRecord) -> ReconcileRecord {
    let mut triggers = Vec::new();
    if !post.concerns.is_empty() {
        triggers.push(ReconcileTrigger::ConcernsRaised);
    }
    if !post.met_commitment {
        triggers.push(ReconcileTrigger::CommitmentNotMet);
    }
    if !post.deviations.is_empty() {
        triggers.push(ReconcileTrigger::ScopeDeviation);
    }
    if !post.unexpected.is_empty() {
        triggers.push(ReconcileTrigger::UnexpectedResults);
    }
    if pre.confidence == crate::domain::models::checkpoint::Confidence::Low {
        triggers.push(ReconcileTrigger::LowConfidence);
    }
    if pre.assumptions.len() > EXCESS_ASSUMPTIONS_THRESHOLD {
        triggers.push(ReconcileTrigger::ExcessAssumptions);
    }

    ReconcileRecord { supervise: !triggers.is_empty(), triggers, timestamp: Utc::now() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::checkpoint::{Confidence, StepType};
    use crate::domain::models::ids::StepId;

    fn sample_pre(confidence: Confidence, assumptions: Vec<String>) -> PreRecord {
        PreRecord {
            step_id: StepId::from_name("s"),
            step_type: StepType::Goal,
            instruction: "i".into(),
            interpretation: "i".into(),
            scope_in: vec![],
            scope_out: vec![],
            approach: "a".into(),
            tools_planned: vec![],
            predicted_output: "p".into(),
            confidence,
            assumptions,
            timestamp: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }

    fn sample_post(met: bool, concerns: Vec<String>) -> PostRecord {
        PostRecord {
            actual_output: "out".into(),
            tools_used: vec![],
            met_commitment: met,
            deviations: vec![],
            concerns,
            unexpected: vec![],
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn no_triggers_means_no_supervise() {
        let record = run(&sample_pre(Confidence::High, vec![]), &sample_post(true, vec![]));
        assert!(!record.supervise);
        assert!(record.triggers.is_empty());
    }

    #[test]
    fn concerns_raised_triggers_supervise() {
        let record = run(&sample_pre(Confidence::High, vec![]), &sample_post(true, vec!["risky".into()]));
        assert!(record.supervise);
        assert!(record.triggers.contains(&ReconcileTrigger::ConcernsRaised));
    }

    #[test]
    fn excess_assumptions_trigger_at_four() {
        let assumptions = vec!["a".into(), "b".into(), "c".into(), "d".into()];
        let record = run(&sample_pre(Confidence::High, assumptions), &sample_post(true, vec![]));
        assert!(record.triggers.contains(&ReconcileTrigger::ExcessAssumptions));
    }
}

//! The immutable workflow definition (spec §3, "Workflow").
//!
//! A `Workflow` is consumed exactly as handed to the executor by the
//! (external) parser -- the core assumes it is already well-formed JSON; it
//! does not parse a workflow DSL.

use serde::{Deserialize, Serialize};

/// A named, pre-parsed workflow: ordered inputs, ordered steps, named goals
/// and agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<InputDecl>,
    pub steps: Vec<Step>,
    pub goals: Vec<Goal>,
    #[serde(default)]
    pub agents: Vec<Agent>,
}

impl Workflow {
    pub fn goal(&self, name: &str) -> Option<&Goal> {
        self.goals.iter().find(|g| g.name == name)
    }

    pub fn agent(&self, name: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.name == name)
    }
}

/// One declared input, with an optional default used when the caller does
/// not supply a value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputDecl {
    pub name: String,
    #[serde(default)]
    pub default: Option<String>,
}

/// Step kind: RUN executes each named goal once; LOOP iterates until
/// convergence or its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepKind {
    Run,
    Loop,
}

/// Default LOOP iteration limit when none is declared (spec §4.1).
pub const DEFAULT_LOOP_LIMIT: u32 = 10;

/// An ordering construct over one or more goals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub kind: StepKind,
    pub goals: Vec<String>,
    /// Iteration limit for LOOP steps. Absent means [`DEFAULT_LOOP_LIMIT`].
    #[serde(default)]
    pub limit: Option<u32>,
}

impl Step {
    pub fn loop_limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LOOP_LIMIT)
    }
}

/// A literal convergence limit, or the name of an input/output variable to
/// resolve it from (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConvergenceLimit {
    Literal(i64),
    Variable(String),
}

/// A named unit of model work with an outcome template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub name: String,
    /// Outcome template text; `$name` placeholders are resolved against
    /// inputs then outputs by the context builder.
    pub outcome_template: String,
    /// Declared structured-output field names, if this goal expects JSON.
    #[serde(default)]
    pub structured_output_fields: Vec<String>,
    /// Static agents to run in parallel for this goal (spec §4.5).
    #[serde(default)]
    pub using_agent: Vec<String>,
    #[serde(default)]
    pub converge: bool,
    #[serde(default)]
    pub convergence_limit: Option<ConvergenceLimit>,
    #[serde(default)]
    pub supervised: bool,
    #[serde(default)]
    pub human_required: bool,
}

impl Goal {
    pub fn is_supervised(&self) -> bool {
        self.supervised
    }
}

/// A sub-role with its own system prompt and, optionally, its own capability
/// profile (resolved to a concrete [`crate::domain::ports::ModelProvider`]
/// via `ProviderFactory::get_provider`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub name: String,
    pub system_prompt: String,
    #[serde(default)]
    pub output_fields: Vec<String>,
    #[serde(default)]
    pub capability_profile: Option<String>,
}

//! Domain models for the Vigil workflow executor (spec §3).

pub mod checkpoint;
pub mod event;
pub mod ids;
pub mod result;
pub mod untrusted;
pub mod variables;
pub mod workflow;

pub use checkpoint::{
    Checkpoint, Confidence, PostRecord, PreRecord, ReconcileRecord, StepType, SuperviseRecord,
    Verdict,
};
pub use event::{EventType, SessionEvent};
pub use ids::{RunId, StepId};
pub use result::{RunResult, RunStatus};
pub use untrusted::{BlockId, ContentType, Trust, UntrustedBlock};
pub use variables::VariableMap;
pub use workflow::{Agent, Goal, Step, StepKind, Workflow};

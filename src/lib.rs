//! Vigil - a supervised workflow executor for tool-using language-model agents.
//!
//! Runs a workflow of named goals through a four-phase COMMIT/EXECUTE/POST/
//! RECONCILE-SUPERVISE state machine, with tiered tool-call security
//! verification, depth-1 sub-agent spawning, and convergence loops.

pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::error::{VigilError, VigilResult};
pub use domain::models::result::{RunResult, RunStatus};
pub use domain::models::workflow::Workflow;
pub use services::WorkflowRunner;

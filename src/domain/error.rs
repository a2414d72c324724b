//! Error taxonomy for the Vigil executor (spec §7).
//!
//! Each variant corresponds to one row of the error-kind table: it carries
//! enough context for the runner to reproduce the table's "Behaviour" column
//! in its match arms, rather than forcing callers to inspect strings.

use thiserror::Error;

/// Top-level error produced anywhere in the executor.
#[derive(Debug, Error)]
pub enum VigilError {
    /// Missing input, bad LOOP limit, unresolved goal/agent name, or
    /// human-required with no available channel. Always fails the run
    /// terminally, before or at first encounter.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A model provider call failed outright. Fatal to the current phase
    /// except COMMIT/POST, which degrade instead of propagating this.
    #[error("model transport error: {0}")]
    ModelTransport(String),

    /// A tool invocation failed, was denied by the security verifier, or
    /// timed out. Non-fatal: surfaced to the model as an `Error: ...` tool
    /// result, never propagated as a Rust error to the goal.
    #[error("tool execution error: {0}")]
    ToolExecution(String),

    /// A sub-agent received a PAUSE verdict, a human-required PAUSE timed
    /// out, or a supervisor call itself errored. Fails the current goal,
    /// which aborts the run.
    #[error("supervision fatal: {0}")]
    SupervisionFatal(String),

    /// The governing cancellation token fired mid-call.
    #[error("run cancelled")]
    Cancelled,
}

/// Convenience alias used throughout the executor.
pub type VigilResult<T> = Result<T, VigilError>;

/// Non-fatal outcomes that degrade a record instead of raising [`VigilError`].
///
/// Distinguished from `VigilError` because `StructuredOutputParse` and
/// `UnresolvedVariable` (spec §7) are explicitly *not* errors: they log a
/// warning event and continue with defaults.
#[derive(Debug, Clone, Error)]
pub enum Degradation {
    /// COMMIT/POST response was not parseable JSON; defaults were applied.
    #[error("could not parse structured output from model response: {0}")]
    StructuredOutputParse(String),

    /// A `$name` interpolation reference did not resolve against inputs or
    /// outputs; the placeholder was left verbatim.
    #[error("unresolved variable reference: ${0}")]
    UnresolvedVariable(String),
}

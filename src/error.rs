//! Error types for the research assistant

use std::time::Duration;

use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Run Orchestration Errors
    // =============================

    #[error("Malformed tool call {call_id}: {reason}")]
    MalformedToolCall { call_id: String, reason: String },

    #[error("Run {run_id} failed: {reason}")]
    RunFailed { run_id: String, reason: String },

    #[error("Run {run_id} did not finish within {waited:?} ({polls} polls)")]
    RunTimeout {
        run_id: String,
        waited: Duration,
        polls: u32,
    },

    #[error("Conversation thread invariant violated: {0}")]
    ThreadInvariant(String),

    // =============================
    // Routing Errors
    // =============================

    #[error("Classifier error: {0}")]
    ClassifierError(String),

    #[error("{agent} agent failed: {reason}")]
    AgentFailed { agent: String, reason: String },

    #[error("Both agents failed (primary: {primary}; fallback: {fallback})")]
    BothAgentsFailed { primary: String, fallback: String },

    // =============================
    // Remote Service Errors
    // =============================

    #[error("Model service error: {0}")]
    Remote(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OrchestrationError {
    /// Turn a failure observed mid-run into the `RunFailed` the fallback
    /// layer expects. Errors that already describe a run are kept as-is.
    pub fn into_run_failure(self, run_id: &str) -> Self {
        match self {
            OrchestrationError::RunFailed { .. } | OrchestrationError::RunTimeout { .. } => self,
            other => OrchestrationError::RunFailed {
                run_id: run_id.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

//! Research Assistant
//!
//! A two-agent question answering service that:
//! - Classifies each query as general or finance-flavoured
//! - Routes it to a web-search or finance assistant running remotely
//! - Drives the assistant's run to completion, answering its tool calls
//! - Falls back from the finance agent to web search on failure or "N/A"
//!
//! RUN LOOP:
//! APPEND → RUN → POLL → (TOOLS → SUBMIT → POLL)* → COMPLETE

pub mod agent;
pub mod api;
pub mod assistants;
pub mod classifier;
pub mod config;
pub mod context;
pub mod error;
pub mod execution;
pub mod fallback;
pub mod memory;
pub mod models;
pub mod openai;
pub mod run;
pub mod tools;

pub use error::{OrchestrationError, Result};

// Re-export common types
pub use context::OrchestratorContext;
pub use models::*;

//! Agent Memory
//!
//! Each agent owns one conversation thread; only its orchestrator writes to it.

pub mod thread;

pub use thread::{ConversationThread, RecordedCall, ThreadMessage};

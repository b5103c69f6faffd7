//! Remote assistant service port
//!
//! The run protocol the orchestrator drives: register an assistant, keep a
//! thread, append user turns, start runs, poll them, answer tool calls and
//! read the thread back.

use crate::models::{AssistantDefinition, RemoteMessage, Run, ToolOutput};
use crate::Result;
use async_trait::async_trait;

pub mod openai;
pub mod scripted;

pub use openai::OpenAiAssistants;
pub use scripted::{Fault, RunScript, ScriptedAssistantService};

#[async_trait]
pub trait AssistantService: Send + Sync {
    /// Register instructions and tool schemas; returns the assistant id.
    async fn create_assistant(&self, definition: &AssistantDefinition) -> Result<String>;

    /// Returns the new thread id.
    async fn create_thread(&self) -> Result<String>;

    /// Append a user message; returns the message id.
    async fn append_message(&self, thread_id: &str, content: &str) -> Result<String>;

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run>;

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run>;

    /// Answer every pending tool call of a run in one batch.
    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run>;

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<()>;

    /// All messages of a thread, oldest first.
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<RemoteMessage>>;
}

//! Tool call dispatch
//!
//! Turns the model's tool call requests into tool outputs. A whole batch is
//! validated before any tool runs, so a malformed call never leaves a run
//! half-answered.

use crate::error::OrchestrationError;
use crate::models::{ToolCallRequest, ToolName, ToolOutput};
use crate::tools::{ToolAdapter, ToolError, ToolErrorKind};
use crate::Result;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Argument field every tool schema declares.
const INPUT_FIELD: &str = "input";

/// A validated call, ready to run.
#[derive(Debug, Clone)]
pub struct PreparedCall {
    pub call_id: String,
    /// Name as sent by the model
    pub name: String,
    pub input: String,
    target: std::result::Result<ToolName, ToolError>,
}

/// The outcome of one call, before it is packaged for submission.
#[derive(Debug, Clone)]
pub struct CallResult {
    pub call_id: String,
    pub name: String,
    pub input: String,
    pub result: std::result::Result<String, ToolError>,
}

impl CallResult {
    /// Failures are still answered so the model can react to them.
    pub fn to_output(&self) -> ToolOutput {
        let output = match &self.result {
            Ok(text) => text.clone(),
            Err(e) => json!({
                "error": {
                    "kind": e.kind.to_string(),
                    "message": e.message,
                }
            })
            .to_string(),
        };

        ToolOutput {
            tool_call_id: self.call_id.clone(),
            output,
        }
    }
}

/// Executes tool calls for one agent, restricted to its tool set.
pub struct ToolDispatcher {
    adapter: Arc<ToolAdapter>,
    allowed: Vec<ToolName>,
}

impl ToolDispatcher {
    pub fn new(adapter: Arc<ToolAdapter>, allowed: Vec<ToolName>) -> Self {
        Self { adapter, allowed }
    }

    /// Validate a batch. Unknown or disallowed tools become error outputs;
    /// a missing argument fails the whole batch.
    pub fn prepare(&self, calls: &[ToolCallRequest]) -> Result<Vec<PreparedCall>> {
        let mut seen = HashSet::with_capacity(calls.len());
        let mut prepared = Vec::with_capacity(calls.len());

        for call in calls {
            if !seen.insert(call.id.as_str()) {
                warn!(call_id = %call.id, "Duplicate tool call id in one batch, answering once");
                continue;
            }

            let target = self.resolve(&call.name);
            let input = match &target {
                Ok(_) => extract_input(call)?,
                Err(_) => call.arguments.clone(),
            };

            prepared.push(PreparedCall {
                call_id: call.id.clone(),
                name: call.name.clone(),
                input,
                target,
            });
        }

        Ok(prepared)
    }

    /// Run prepared calls in order. Never fails: tool errors are results.
    pub async fn execute(&self, prepared: Vec<PreparedCall>) -> Vec<CallResult> {
        let mut results = Vec::with_capacity(prepared.len());

        for call in prepared {
            let result = match call.target {
                Ok(tool) => {
                    debug!(call_id = %call.call_id, tool = %tool, input = %call.input, "Dispatching tool call");
                    self.adapter.call_tool(tool, &call.input).await
                }
                Err(e) => {
                    warn!(call_id = %call.call_id, tool = %call.name, error = %e, "Rejected tool call");
                    Err(e)
                }
            };

            results.push(CallResult {
                call_id: call.call_id,
                name: call.name,
                input: call.input,
                result,
            });
        }

        results
    }

    fn resolve(&self, name: &str) -> std::result::Result<ToolName, ToolError> {
        let tool: ToolName = name.parse()?;
        if self.allowed.contains(&tool) {
            Ok(tool)
        } else {
            Err(ToolError::new(
                ToolErrorKind::NotAllowed,
                format!("{} is not available to this agent", tool),
            ))
        }
    }
}

fn extract_input(call: &ToolCallRequest) -> Result<String> {
    let malformed = |reason: String| OrchestrationError::MalformedToolCall {
        call_id: call.id.clone(),
        reason,
    };

    let arguments: Value = serde_json::from_str(&call.arguments)
        .map_err(|e| malformed(format!("arguments are not JSON: {}", e)))?;

    arguments
        .get(INPUT_FIELD)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| malformed(format!("missing string field '{}'", INPUT_FIELD)))
}

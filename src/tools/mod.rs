//! Tool trait and adapter
//!
//! Every external capability sits behind the same contract:
//! a string query in, a string result (or a `ToolError`) out.
//! Provider failures never escape this layer as anything but a `ToolError`.

use crate::models::ToolName;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

pub mod serpapi;
pub use serpapi::{FinanceSearchTool, SerpApiClient, WebSearchTool};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolErrorKind {
    UnknownTool,
    NotAllowed,
    NotConfigured,
    Timeout,
    Quota,
    MalformedResponse,
    Transport,
    Provider,
}

impl fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ToolErrorKind::UnknownTool => "unknown_tool",
            ToolErrorKind::NotAllowed => "not_allowed",
            ToolErrorKind::NotConfigured => "not_configured",
            ToolErrorKind::Timeout => "timeout",
            ToolErrorKind::Quota => "quota",
            ToolErrorKind::MalformedResponse => "malformed_response",
            ToolErrorKind::Transport => "transport",
            ToolErrorKind::Provider => "provider",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub message: String,
}

impl ToolError {
    pub fn new(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unknown_tool(name: &str) -> Self {
        Self::new(ToolErrorKind::UnknownTool, format!("no tool named '{}'", name))
    }
}

/// A single external capability.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> ToolName;
    async fn call(&self, query: &str) -> Result<String, ToolError>;
}

/// Stateless lookup from tool name to implementation.
/// Safe to share across agents.
pub struct ToolAdapter {
    tools: HashMap<ToolName, Arc<dyn Tool>>,
}

impl ToolAdapter {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name(), tool);
    }

    pub fn get(&self, tool: ToolName) -> Option<Arc<dyn Tool>> {
        self.tools.get(&tool).cloned()
    }

    pub fn list(&self) -> Vec<ToolName> {
        let mut names: Vec<ToolName> = self.tools.keys().copied().collect();
        names.sort_by_key(|t| t.as_str());
        names
    }

    /// Call a tool by its wire name.
    pub async fn call(&self, tool_name: &str, argument: &str) -> Result<String, ToolError> {
        let tool: ToolName = tool_name.parse()?;
        self.call_tool(tool, argument).await
    }

    pub async fn call_tool(&self, tool: ToolName, argument: &str) -> Result<String, ToolError> {
        let implementation = self.get(tool).ok_or_else(|| {
            ToolError::new(
                ToolErrorKind::NotConfigured,
                format!("{} is not registered", tool),
            )
        })?;

        let start = Instant::now();
        let result = implementation.call(argument).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(output) => debug!(
                tool = %tool,
                elapsed_ms,
                output_len = output.len(),
                "Tool call succeeded"
            ),
            Err(e) => warn!(
                tool = %tool,
                elapsed_ms,
                error = %e,
                "Tool call failed"
            ),
        }

        result
    }
}

impl Default for ToolAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// Tool with a canned reply that remembers every query it was given.
/// Test double for the tool adapter.
pub struct StaticTool {
    name: ToolName,
    reply: Result<String, ToolError>,
    calls: Mutex<Vec<String>>,
}

impl StaticTool {
    pub fn ok(name: ToolName, reply: impl Into<String>) -> Self {
        Self {
            name,
            reply: Ok(reply.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(name: ToolName, error: ToolError) -> Self {
        Self {
            name,
            reply: Err(error),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queries received so far, oldest first.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Tool for StaticTool {
    fn name(&self) -> ToolName {
        self.name
    }

    async fn call(&self, query: &str) -> Result<String, ToolError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(query.to_string());
        }
        self.reply.clone()
    }
}

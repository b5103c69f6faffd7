//! Core data models for the research assistant

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

use crate::tools::ToolError;

//
// ================= Tools =================
//

/// The fixed set of tools the remote model may ask for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ToolName {
    #[serde(rename = "webSearch")]
    WebSearch,
    #[serde(rename = "financeSearch")]
    FinanceSearch,
}

impl ToolName {
    pub const ALL: [ToolName; 2] = [ToolName::WebSearch, ToolName::FinanceSearch];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::WebSearch => "webSearch",
            ToolName::FinanceSearch => "financeSearch",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ToolName::WebSearch => "Tool for searching queries from google.com. Input is a string.",
            ToolName::FinanceSearch => "Tool for fetching finance-related data and news. Input is a string.",
        }
    }

    /// Function schema declared to the model service.
    pub fn schema(&self) -> Value {
        let input_description = match self {
            ToolName::WebSearch => "The query to search for.",
            ToolName::FinanceSearch => "The finance-related query to process.",
        };

        json!({
            "name": self.as_str(),
            "description": self.description(),
            "parameters": {
                "type": "object",
                "properties": {
                    "input": {
                        "type": "string",
                        "description": input_description,
                    }
                },
                "required": ["input"],
            }
        })
    }
}

impl FromStr for ToolName {
    type Err = ToolError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ToolName::ALL
            .into_iter()
            .find(|tool| tool.as_str() == s)
            .ok_or_else(|| ToolError::unknown_tool(s))
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ================= Routing =================
//

/// Classifier verdict for a query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Goes straight to the web-search agent.
    Trivial,
    /// Tries the finance agent first.
    NonTrivial,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Route::Trivial => "trivial",
            Route::NonTrivial => "non-trivial",
        };
        write!(f, "{}", s)
    }
}

//
// ================= Messages =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
}

/// A message as listed back from a remote thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteMessage {
    pub id: String,
    pub role: MessageRole,
    pub run_id: Option<String>,
    pub content: String,
}

//
// ================= Runs =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Created,
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
}

impl RunStatus {
    /// Still waiting on the service; the orchestrator only polls.
    pub fn is_pending(&self) -> bool {
        matches!(self, RunStatus::Created | RunStatus::Queued | RunStatus::InProgress)
    }

    /// Terminal states other than `Completed`.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            RunStatus::Cancelling
                | RunStatus::Cancelled
                | RunStatus::Failed
                | RunStatus::Incomplete
                | RunStatus::Expired
        )
    }

    /// The service will not move the run any further on its own.
    pub fn is_terminal(&self) -> bool {
        *self == RunStatus::Completed || self.is_failure()
    }
}

/// One in-flight request for the next assistant turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Run {
    pub id: String,
    pub thread_id: String,
    pub status: RunStatus,
    /// Pending tool calls; only populated in `RequiresAction`.
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default)]
    pub last_error: Option<String>,
}

/// A tool call as emitted by the model. `name` and `arguments` are raw
/// and validated by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

//
// ================= Assistants =================
//

/// Reusable assistant configuration registered with the model service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantDefinition {
    pub name: String,
    pub model: String,
    pub instructions: String,
    pub tools: Vec<ToolName>,
    pub temperature: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolErrorKind;

    #[test]
    fn test_tool_name_parsing() {
        assert_eq!("webSearch".parse::<ToolName>().unwrap(), ToolName::WebSearch);
        assert_eq!(
            "financeSearch".parse::<ToolName>().unwrap(),
            ToolName::FinanceSearch
        );

        let err = "google-scholar".parse::<ToolName>().unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::UnknownTool);
        assert!(err.message.contains("google-scholar"));
    }

    #[test]
    fn test_tool_schema_shape() {
        for tool in ToolName::ALL {
            let schema = tool.schema();
            assert_eq!(schema["name"], tool.as_str());
            assert_eq!(schema["parameters"]["type"], "object");
            assert_eq!(schema["parameters"]["properties"]["input"]["type"], "string");
            assert_eq!(schema["parameters"]["required"], json!(["input"]));
        }
    }

    #[test]
    fn test_run_status_wire_names() {
        let status: RunStatus = serde_json::from_str("\"requires_action\"").unwrap();
        assert_eq!(status, RunStatus::RequiresAction);

        let status: RunStatus = serde_json::from_str("\"in_progress\"").unwrap();
        assert!(status.is_pending());

        for failed in ["\"failed\"", "\"expired\"", "\"cancelled\"", "\"incomplete\""] {
            let status: RunStatus = serde_json::from_str(failed).unwrap();
            assert!(status.is_failure());
            assert!(status.is_terminal());
            assert!(!status.is_pending());
        }

        assert!(RunStatus::Completed.is_terminal());
        assert!(!RunStatus::RequiresAction.is_terminal());
        assert!(!RunStatus::Queued.is_terminal());
    }
}

//! OpenAI Assistants (v2) HTTP adapter

use super::AssistantService;
use crate::error::OrchestrationError;
use crate::models::{
    AssistantDefinition, MessageRole, RemoteMessage, Run, RunStatus, ToolCallRequest, ToolOutput,
};
use crate::Result;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error};

const PAGE_LIMIT: u32 = 100;

pub struct OpenAiAssistants {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiAssistants {
    pub fn new(api_key: String, base_url: String) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, what: &str, request: RequestBuilder) -> Result<T> {
        let response = request
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
            .send()
            .await
            .map_err(|e| {
                error!("{} request failed: {}", what, e);
                OrchestrationError::Remote(format!("{} request failed: {}", what, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, "{} rejected: {}", what, body);
            return Err(OrchestrationError::Remote(format!(
                "{} returned {}: {}",
                what, status, body
            )));
        }

        response.json::<T>().await.map_err(|e| {
            OrchestrationError::Remote(format!("{} returned an unreadable body: {}", what, e))
        })
    }
}

#[async_trait]
impl AssistantService for OpenAiAssistants {
    async fn create_assistant(&self, definition: &AssistantDefinition) -> Result<String> {
        let tools: Vec<Value> = definition
            .tools
            .iter()
            .map(|tool| json!({ "type": "function", "function": tool.schema() }))
            .collect();

        let mut body = json!({
            "model": definition.model,
            "name": definition.name,
            "instructions": definition.instructions,
            "tools": tools,
        });
        if let Some(temperature) = definition.temperature {
            body["temperature"] = json!(temperature);
        }

        let created: IdObject = self
            .send("create assistant", self.client.post(self.url("/assistants")).json(&body))
            .await?;
        debug!(assistant_id = %created.id, name = %definition.name, "Assistant created");
        Ok(created.id)
    }

    async fn create_thread(&self) -> Result<String> {
        let created: IdObject = self
            .send("create thread", self.client.post(self.url("/threads")).json(&json!({})))
            .await?;
        Ok(created.id)
    }

    async fn append_message(&self, thread_id: &str, content: &str) -> Result<String> {
        let body = json!({ "role": "user", "content": content });
        let created: IdObject = self
            .send(
                "append message",
                self.client
                    .post(self.url(&format!("/threads/{}/messages", thread_id)))
                    .json(&body),
            )
            .await?;
        Ok(created.id)
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run> {
        let body = json!({ "assistant_id": assistant_id });
        let run: RunObject = self
            .send(
                "create run",
                self.client
                    .post(self.url(&format!("/threads/{}/runs", thread_id)))
                    .json(&body),
            )
            .await?;
        Ok(run.into_run(thread_id))
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        let run: RunObject = self
            .send(
                "get run",
                self.client
                    .get(self.url(&format!("/threads/{}/runs/{}", thread_id, run_id))),
            )
            .await?;
        Ok(run.into_run(thread_id))
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run> {
        let body = json!({ "tool_outputs": outputs });
        let run: RunObject = self
            .send(
                "submit tool outputs",
                self.client
                    .post(self.url(&format!(
                        "/threads/{}/runs/{}/submit_tool_outputs",
                        thread_id, run_id
                    )))
                    .json(&body),
            )
            .await?;
        Ok(run.into_run(thread_id))
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<()> {
        let _: RunObject = self
            .send(
                "cancel run",
                self.client
                    .post(self.url(&format!("/threads/{}/runs/{}/cancel", thread_id, run_id))),
            )
            .await?;
        Ok(())
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<RemoteMessage>> {
        let mut messages = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let limit = PAGE_LIMIT.to_string();
            let mut query = vec![("order", "asc".to_string()), ("limit", limit)];
            if let Some(cursor) = &after {
                query.push(("after", cursor.clone()));
            }

            let page: MessagePage = self
                .send(
                    "list messages",
                    self.client
                        .get(self.url(&format!("/threads/{}/messages", thread_id)))
                        .query(&query),
                )
                .await?;

            messages.extend(page.data.into_iter().map(MessageObject::into_message));

            match (page.has_more, page.last_id) {
                (true, Some(last_id)) => after = Some(last_id),
                _ => break,
            }
        }

        Ok(messages)
    }
}

// ----- wire types -----

#[derive(Debug, Deserialize)]
struct IdObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RunObject {
    id: String,
    status: RunStatus,
    #[serde(default)]
    required_action: Option<RequiredAction>,
    #[serde(default)]
    last_error: Option<LastError>,
}

#[derive(Debug, Deserialize)]
struct RequiredAction {
    submit_tool_outputs: Option<SubmitToolOutputs>,
}

#[derive(Debug, Deserialize)]
struct SubmitToolOutputs {
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct LastError {
    code: Option<String>,
    message: String,
}

impl RunObject {
    fn into_run(self, thread_id: &str) -> Run {
        let tool_calls = self
            .required_action
            .and_then(|action| action.submit_tool_outputs)
            .map(|submit| {
                submit
                    .tool_calls
                    .into_iter()
                    .map(|call| ToolCallRequest {
                        id: call.id,
                        name: call.function.name,
                        arguments: call.function.arguments,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let last_error = self.last_error.map(|e| match e.code {
            Some(code) => format!("{}: {}", code, e.message),
            None => e.message,
        });

        Run {
            id: self.id,
            thread_id: thread_id.to_string(),
            status: self.status,
            tool_calls,
            last_error,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessagePage {
    data: Vec<MessageObject>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    last_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageObject {
    id: String,
    role: String,
    #[serde(default)]
    run_id: Option<String>,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(default)]
    text: Option<TextContent>,
}

#[derive(Debug, Deserialize)]
struct TextContent {
    value: String,
}

impl MessageObject {
    fn into_message(self) -> RemoteMessage {
        let role = if self.role == "assistant" {
            MessageRole::Assistant
        } else {
            MessageRole::User
        };

        let content = self
            .content
            .into_iter()
            .filter_map(|part| part.text.map(|t| t.value))
            .collect::<Vec<_>>()
            .join("\n");

        RemoteMessage {
            id: self.id,
            role,
            run_id: self.run_id,
            content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_action_run_parsing() {
        let raw = r#"{
            "id": "run_abc",
            "object": "thread.run",
            "status": "requires_action",
            "required_action": {
                "type": "submit_tool_outputs",
                "submit_tool_outputs": {
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": { "name": "financeSearch", "arguments": "{\"input\":\"current gold price\"}" }
                    }]
                }
            },
            "last_error": null
        }"#;

        let run = serde_json::from_str::<RunObject>(raw).unwrap().into_run("thread_1");
        assert_eq!(run.status, RunStatus::RequiresAction);
        assert_eq!(run.thread_id, "thread_1");
        assert_eq!(run.tool_calls.len(), 1);
        assert_eq!(run.tool_calls[0].name, "financeSearch");
        assert_eq!(run.tool_calls[0].arguments, r#"{"input":"current gold price"}"#);
    }

    #[test]
    fn test_failed_run_keeps_last_error() {
        let raw = r#"{
            "id": "run_abc",
            "status": "failed",
            "last_error": { "code": "rate_limit_exceeded", "message": "slow down" }
        }"#;

        let run = serde_json::from_str::<RunObject>(raw).unwrap().into_run("t");
        assert!(run.status.is_failure());
        assert!(run.tool_calls.is_empty());
        assert_eq!(run.last_error.as_deref(), Some("rate_limit_exceeded: slow down"));
    }

    #[test]
    fn test_message_text_parts_are_joined() {
        let raw = r#"{
            "object": "list",
            "data": [
                { "id": "msg_1", "role": "user", "run_id": null,
                  "content": [{ "type": "text", "text": { "value": "hi", "annotations": [] } }] },
                { "id": "msg_2", "role": "assistant", "run_id": "run_1",
                  "content": [
                    { "type": "text", "text": { "value": "Gold is $2400/oz", "annotations": [] } },
                    { "type": "image_file", "image_file": { "file_id": "f" } },
                    { "type": "text", "text": { "value": "Source: example.com", "annotations": [] } }
                  ] }
            ],
            "first_id": "msg_1",
            "last_id": "msg_2",
            "has_more": false
        }"#;

        let page: MessagePage = serde_json::from_str(raw).unwrap();
        assert!(!page.has_more);
        let messages: Vec<RemoteMessage> =
            page.data.into_iter().map(MessageObject::into_message).collect();

        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert_eq!(messages[1].run_id.as_deref(), Some("run_1"));
        assert_eq!(messages[1].content, "Gold is $2400/oz\nSource: example.com");
    }

    #[test]
    fn test_tool_outputs_body() {
        let outputs = vec![ToolOutput {
            tool_call_id: "call_1".to_string(),
            output: "$2400/oz".to_string(),
        }];
        let body = json!({ "tool_outputs": outputs });
        assert_eq!(body["tool_outputs"][0]["tool_call_id"], "call_1");
        assert_eq!(body["tool_outputs"][0]["output"], "$2400/oz");
    }
}

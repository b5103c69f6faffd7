//! In-memory assistant service driven by scripts
//!
//! Test double for `AssistantService`. Each `create_run` consumes the next
//! queued `RunScript`; each poll advances that script by one step. Single
//! calls can be made to fail with `fail_next`.

use super::AssistantService;
use crate::error::OrchestrationError;
use crate::models::{
    AssistantDefinition, MessageRole, RemoteMessage, Run, RunStatus, ToolCallRequest, ToolOutput,
};
use crate::Result;
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
enum ScriptStep {
    Status(RunStatus),
    RequireAction(Vec<ToolCallRequest>),
    Complete(Vec<String>),
    Fail(String),
}

/// What one run will do, poll by poll. A script that runs out of steps
/// leaves the run `in_progress` forever.
#[derive(Debug, Clone, Default)]
pub struct RunScript {
    steps: VecDeque<ScriptStep>,
}

impl RunScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `status` on the next poll.
    pub fn poll(mut self, status: RunStatus) -> Self {
        self.steps.push_back(ScriptStep::Status(status));
        self
    }

    /// Pause for tool outputs.
    pub fn require(mut self, calls: Vec<ToolCallRequest>) -> Self {
        self.steps.push_back(ScriptStep::RequireAction(calls));
        self
    }

    /// Pause for a single `{"input": ...}` tool call.
    pub fn require_tool(self, call_id: &str, tool: &str, input: &str) -> Self {
        self.require(vec![ToolCallRequest {
            id: call_id.to_string(),
            name: tool.to_string(),
            arguments: json!({ "input": input }).to_string(),
        }])
    }

    /// Write these assistant messages and complete.
    pub fn complete<I, S>(mut self, messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.steps.push_back(ScriptStep::Complete(
            messages.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn fail(mut self, reason: impl Into<String>) -> Self {
        self.steps.push_back(ScriptStep::Fail(reason.into()));
        self
    }

    /// Completes with `answer` on the first poll.
    pub fn answer(answer: impl Into<String>) -> Self {
        Self::new().complete([answer.into()])
    }
}

/// A service call that `fail_next` can break once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    AppendMessage,
    GetRun,
    SubmitToolOutputs,
    ListMessages,
}

struct RunState {
    run: Run,
    script: RunScript,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    assistants: Vec<AssistantDefinition>,
    threads: HashMap<String, Vec<RemoteMessage>>,
    runs: HashMap<String, RunState>,
    scripts: VecDeque<RunScript>,
    submitted: Vec<ToolOutput>,
    submitted_ids: HashSet<String>,
    cancelled: Vec<String>,
    polls: u32,
    faults: HashSet<Fault>,
}

impl Inner {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}_{}", prefix, self.next_id)
    }

    fn thread(&mut self, thread_id: &str) -> Result<&mut Vec<RemoteMessage>> {
        self.threads
            .get_mut(thread_id)
            .ok_or_else(|| OrchestrationError::Remote(format!("no thread {}", thread_id)))
    }

    fn trip(&mut self, fault: Fault) -> Result<()> {
        if self.faults.remove(&fault) {
            return Err(OrchestrationError::Remote(format!(
                "{:?} request failed: connection reset",
                fault
            )));
        }
        Ok(())
    }

    fn run(&mut self, thread_id: &str, run_id: &str) -> Result<&mut RunState> {
        match self.runs.get_mut(run_id) {
            Some(state) if state.run.thread_id == thread_id => Ok(state),
            _ => Err(OrchestrationError::Remote(format!(
                "no run {} on thread {}",
                run_id, thread_id
            ))),
        }
    }
}

#[derive(Default)]
pub struct ScriptedAssistantService {
    inner: Mutex<Inner>,
}

impl ScriptedAssistantService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_runs(scripts: impl IntoIterator<Item = RunScript>) -> Self {
        let service = Self::new();
        for script in scripts {
            service.push_run(script);
        }
        service
    }

    /// Queue the script for the next `create_run`.
    pub fn push_run(&self, script: RunScript) {
        self.lock().scripts.push_back(script);
    }

    /// Make the next call of this kind fail with a `Remote` error.
    pub fn fail_next(&self, fault: Fault) {
        self.lock().faults.insert(fault);
    }

    pub fn assistants(&self) -> Vec<AssistantDefinition> {
        self.lock().assistants.clone()
    }

    pub fn messages(&self, thread_id: &str) -> Vec<RemoteMessage> {
        self.lock().threads.get(thread_id).cloned().unwrap_or_default()
    }

    /// Every accepted tool output, in submission order.
    pub fn submitted_outputs(&self) -> Vec<ToolOutput> {
        self.lock().submitted.clone()
    }

    pub fn cancelled_runs(&self) -> Vec<String> {
        self.lock().cancelled.clone()
    }

    /// Number of `get_run` calls served.
    pub fn poll_count(&self) -> u32 {
        self.lock().polls
    }

    pub fn runs_started(&self) -> usize {
        self.lock().runs.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl AssistantService for ScriptedAssistantService {
    async fn create_assistant(&self, definition: &AssistantDefinition) -> Result<String> {
        let mut inner = self.lock();
        inner.assistants.push(definition.clone());
        Ok(inner.id("asst"))
    }

    async fn create_thread(&self) -> Result<String> {
        let mut inner = self.lock();
        let thread_id = inner.id("thread");
        inner.threads.insert(thread_id.clone(), Vec::new());
        Ok(thread_id)
    }

    async fn append_message(&self, thread_id: &str, content: &str) -> Result<String> {
        let mut inner = self.lock();
        inner.trip(Fault::AppendMessage)?;
        let message_id = inner.id("msg");
        inner.thread(thread_id)?.push(RemoteMessage {
            id: message_id.clone(),
            role: MessageRole::User,
            run_id: None,
            content: content.to_string(),
        });
        Ok(message_id)
    }

    async fn create_run(&self, thread_id: &str, _assistant_id: &str) -> Result<Run> {
        let mut inner = self.lock();
        inner.thread(thread_id)?;

        let busy = inner.runs.values().any(|state| {
            state.run.thread_id == thread_id
                && (state.run.status.is_pending() || state.run.status == RunStatus::RequiresAction)
        });
        if busy {
            return Err(OrchestrationError::Remote(format!(
                "thread {} already has an active run",
                thread_id
            )));
        }

        let script = inner
            .scripts
            .pop_front()
            .ok_or_else(|| OrchestrationError::Remote("no scripted run left".to_string()))?;

        let run = Run {
            id: inner.id("run"),
            thread_id: thread_id.to_string(),
            status: RunStatus::Queued,
            tool_calls: Vec::new(),
            last_error: None,
        };
        inner.runs.insert(
            run.id.clone(),
            RunState {
                run: run.clone(),
                script,
            },
        );
        Ok(run)
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        let mut inner = self.lock();
        inner.polls += 1;
        inner.trip(Fault::GetRun)?;

        let state = inner.run(thread_id, run_id)?;
        if !state.run.status.is_pending() {
            return Ok(state.run.clone());
        }

        let mut completed_with = None;
        match state.script.steps.pop_front() {
            Some(ScriptStep::Status(status)) => state.run.status = status,
            Some(ScriptStep::RequireAction(calls)) => {
                state.run.status = RunStatus::RequiresAction;
                state.run.tool_calls = calls;
            }
            Some(ScriptStep::Complete(messages)) => {
                state.run.status = RunStatus::Completed;
                completed_with = Some(messages);
            }
            Some(ScriptStep::Fail(reason)) => {
                state.run.status = RunStatus::Failed;
                state.run.last_error = Some(reason);
            }
            None => state.run.status = RunStatus::InProgress,
        }
        let run = state.run.clone();

        if let Some(messages) = completed_with {
            for content in messages {
                let message_id = inner.id("msg");
                inner.thread(thread_id)?.push(RemoteMessage {
                    id: message_id,
                    role: MessageRole::Assistant,
                    run_id: Some(run.id.clone()),
                    content,
                });
            }
        }

        Ok(run)
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run> {
        let mut inner = self.lock();
        inner.trip(Fault::SubmitToolOutputs)?;

        if let Some(dup) = outputs
            .iter()
            .find(|o| inner.submitted_ids.contains(&o.tool_call_id))
        {
            return Err(OrchestrationError::Remote(format!(
                "tool output for {} was already submitted",
                dup.tool_call_id
            )));
        }

        let state = inner.run(thread_id, run_id)?;
        if state.run.status != RunStatus::RequiresAction {
            return Err(OrchestrationError::Remote(format!(
                "run {} is not awaiting tool outputs",
                run_id
            )));
        }

        let pending: HashSet<&str> = state.run.tool_calls.iter().map(|c| c.id.as_str()).collect();
        let given: HashSet<&str> = outputs.iter().map(|o| o.tool_call_id.as_str()).collect();
        if pending != given || given.len() != outputs.len() {
            return Err(OrchestrationError::Remote(format!(
                "run {} needs exactly one output per pending call {:?}, got {:?}",
                run_id, pending, given
            )));
        }

        state.run.status = RunStatus::Queued;
        state.run.tool_calls.clear();
        let run = state.run.clone();

        for output in outputs {
            inner.submitted_ids.insert(output.tool_call_id.clone());
            inner.submitted.push(output.clone());
        }

        Ok(run)
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<()> {
        let mut inner = self.lock();
        let state = inner.run(thread_id, run_id)?;
        state.run.status = RunStatus::Cancelled;
        state.run.tool_calls.clear();
        inner.cancelled.push(run_id.to_string());
        Ok(())
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<RemoteMessage>> {
        let mut inner = self.lock();
        inner.trip(Fault::ListMessages)?;
        Ok(inner.thread(thread_id)?.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    async fn started(service: &ScriptedAssistantService) -> (String, Run) {
        let thread = service.create_thread().await.unwrap();
        service.append_message(&thread, "question").await.unwrap();
        let run = service.create_run(&thread, "asst").await.unwrap();
        (thread, run)
    }

    #[tokio::test]
    async fn test_script_advances_one_step_per_poll() {
        let service = ScriptedAssistantService::with_runs([RunScript::new()
            .poll(RunStatus::InProgress)
            .complete(["first", "second"])]);
        let (thread, run) = started(&service).await;
        assert_eq!(run.status, RunStatus::Queued);

        let run = service.get_run(&thread, &run.id).await.unwrap();
        assert_eq!(run.status, RunStatus::InProgress);
        let run = service.get_run(&thread, &run.id).await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);

        let messages = service.messages(&thread);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].content, "second");
        assert_eq!(messages[2].run_id.as_deref(), Some(run.id.as_str()));
        assert_eq!(service.poll_count(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_submission_is_rejected() {
        let service = ScriptedAssistantService::with_runs([RunScript::new()
            .require_tool("call_1", "webSearch", "rust")
            .complete(["done"])]);
        let (thread, run) = started(&service).await;
        let run = service.get_run(&thread, &run.id).await.unwrap();
        assert_eq!(run.status, RunStatus::RequiresAction);

        let outputs = vec![ToolOutput {
            tool_call_id: "call_1".to_string(),
            output: "result".to_string(),
        }];
        assert_ok!(service.submit_tool_outputs(&thread, &run.id, &outputs).await);
        assert_err!(service.submit_tool_outputs(&thread, &run.id, &outputs).await);
        assert_eq!(service.submitted_outputs().len(), 1);
    }

    #[tokio::test]
    async fn test_partial_submission_is_rejected() {
        let service = ScriptedAssistantService::with_runs([RunScript::new().require(vec![
            ToolCallRequest {
                id: "a".to_string(),
                name: "webSearch".to_string(),
                arguments: "{\"input\":\"x\"}".to_string(),
            },
            ToolCallRequest {
                id: "b".to_string(),
                name: "webSearch".to_string(),
                arguments: "{\"input\":\"y\"}".to_string(),
            },
        ])]);
        let (thread, run) = started(&service).await;
        service.get_run(&thread, &run.id).await.unwrap();

        let partial = vec![ToolOutput {
            tool_call_id: "a".to_string(),
            output: "only one".to_string(),
        }];
        assert_err!(service.submit_tool_outputs(&thread, &run.id, &partial).await);
        assert!(service.submitted_outputs().is_empty());
    }

    #[tokio::test]
    async fn test_one_active_run_per_thread() {
        let service = ScriptedAssistantService::with_runs([
            RunScript::answer("a"),
            RunScript::answer("b"),
        ]);
        let (thread, _run) = started(&service).await;
        assert_err!(service.create_run(&thread, "asst").await);
    }

    #[tokio::test]
    async fn test_fault_fires_once() {
        let service = ScriptedAssistantService::with_runs([RunScript::answer("a")]);
        let (thread, run) = started(&service).await;

        service.fail_next(Fault::GetRun);
        assert_err!(service.get_run(&thread, &run.id).await);
        let polled = assert_ok!(service.get_run(&thread, &run.id).await);
        assert_eq!(polled.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_exhausted_script_hangs_in_progress() {
        let service = ScriptedAssistantService::with_runs([RunScript::new()]);
        let (thread, run) = started(&service).await;
        for _ in 0..3 {
            let polled = service.get_run(&thread, &run.id).await.unwrap();
            assert_eq!(polled.status, RunStatus::InProgress);
        }

        service.cancel_run(&thread, &run.id).await.unwrap();
        assert_eq!(service.cancelled_runs(), vec![run.id.clone()]);
        let polled = service.get_run(&thread, &run.id).await.unwrap();
        assert_eq!(polled.status, RunStatus::Cancelled);
    }
}

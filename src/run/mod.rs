//! Run orchestrator - drives one assistant run to completion
//!
//! CREATED → QUEUED ⇄ IN_PROGRESS → { COMPLETED | REQUIRES_ACTION | FAILED }
//! REQUIRES_ACTION → (run tools, submit outputs) → QUEUED
//!
//! Polling is the only wait. Tool outputs are always submitted as one batch
//! before the next poll.

pub mod policy;

pub use policy::PollPolicy;

use crate::assistants::AssistantService;
use crate::error::OrchestrationError;
use crate::execution::{CallResult, ToolDispatcher};
use crate::memory::{ConversationThread, RecordedCall};
use crate::models::{MessageRole, Run, RunStatus, ToolOutput};
use crate::Result;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

const DEFAULT_TOOL_BUDGET: u32 = 2;

/// What one completed run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub answer: String,
    pub polls: u32,
    pub tool_calls: u32,
    /// More tool calls than the instructions allow. Logged, never fatal.
    pub exceeded_tool_budget: bool,
}

/// Owns one remote thread and its local mirror. Taking `&mut self` per
/// turn keeps at most one run open on the thread.
pub struct RunOrchestrator {
    name: String,
    service: Arc<dyn AssistantService>,
    dispatcher: ToolDispatcher,
    policy: PollPolicy,
    assistant_id: String,
    thread_id: String,
    thread: ConversationThread,
    tool_budget: u32,
}

impl RunOrchestrator {
    pub fn new(
        name: impl Into<String>,
        service: Arc<dyn AssistantService>,
        dispatcher: ToolDispatcher,
        policy: PollPolicy,
        assistant_id: String,
        thread_id: String,
    ) -> Self {
        Self {
            name: name.into(),
            service,
            dispatcher,
            policy,
            assistant_id,
            thread_id,
            thread: ConversationThread::new(),
            tool_budget: DEFAULT_TOOL_BUDGET,
        }
    }

    pub fn with_tool_budget(mut self, tool_budget: u32) -> Self {
        self.tool_budget = tool_budget;
        self
    }

    pub fn thread(&self) -> &ConversationThread {
        &self.thread
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    /// Submit one user turn and wait for the assistant's answer. The run is
    /// settled before this returns: any failure after creation cancels it
    /// unless it was already seen in a terminal state.
    pub async fn run_turn(&mut self, query: &str) -> Result<RunReport> {
        self.service.append_message(&self.thread_id, query).await?;
        self.thread.push_user(query)?;

        let mut run = self
            .service
            .create_run(&self.thread_id, &self.assistant_id)
            .await?;
        let run_id = run.id.clone();

        info!(
            agent = %self.name,
            thread_id = %self.thread_id,
            run_id = %run_id,
            "Run created"
        );

        match self.drive(&mut run).await {
            Ok(report) => {
                info!(
                    agent = %self.name,
                    run_id = %report.run_id,
                    polls = report.polls,
                    tool_calls = report.tool_calls,
                    "Run completed"
                );
                Ok(report)
            }
            Err(e) => {
                if !run.status.is_terminal() {
                    self.abandon(&run_id).await;
                }
                let e = e.into_run_failure(&run_id);
                error!(agent = %self.name, thread_id = %self.thread_id, error = %e, "Run did not complete");
                Err(e)
            }
        }
    }

    /// Poll and answer tool calls until the run settles. `run` always holds
    /// the last status observed from the service.
    async fn drive(&mut self, run: &mut Run) -> Result<RunReport> {
        let started = Instant::now();
        let mut polls: u32 = 0;
        let mut tool_calls: u32 = 0;
        let mut answered: HashSet<String> = HashSet::new();

        loop {
            match run.status {
                status if status.is_pending() => {
                    if self.policy.exhausted(started.elapsed(), polls) {
                        warn!(run_id = %run.id, polls, "Run exceeded its poll budget, cancelling");
                        return Err(OrchestrationError::RunTimeout {
                            run_id: run.id.clone(),
                            waited: started.elapsed(),
                            polls,
                        });
                    }

                    sleep(self.policy.interval).await;
                    polls += 1;
                    *run = self.service.get_run(&self.thread_id, &run.id).await?;
                    debug!(run_id = %run.id, status = ?run.status, polls, "Polled run");
                }
                RunStatus::RequiresAction => {
                    *run = self
                        .answer_tool_calls(run, &mut answered, &mut tool_calls)
                        .await?;
                }
                RunStatus::Completed => break,
                status if status.is_failure() => {
                    let reason = run
                        .last_error
                        .clone()
                        .unwrap_or_else(|| format!("run ended with status {:?}", status));
                    return Err(OrchestrationError::RunFailed {
                        run_id: run.id.clone(),
                        reason,
                    });
                }
                status => {
                    return Err(OrchestrationError::RunFailed {
                        run_id: run.id.clone(),
                        reason: format!("unexpected run status {:?}", status),
                    });
                }
            }
        }

        let answer = self.collect_answer(&run.id).await?;

        Ok(RunReport {
            run_id: run.id.clone(),
            answer,
            polls,
            tool_calls,
            exceeded_tool_budget: tool_calls > self.tool_budget,
        })
    }

    /// One RequiresAction cycle: validate, run tools, submit all outputs.
    async fn answer_tool_calls(
        &mut self,
        run: &Run,
        answered: &mut HashSet<String>,
        tool_calls: &mut u32,
    ) -> Result<Run> {
        if run.tool_calls.is_empty() {
            return Err(OrchestrationError::RunFailed {
                run_id: run.id.clone(),
                reason: "run requires action but lists no tool calls".to_string(),
            });
        }

        if let Some(repeat) = run.tool_calls.iter().find(|c| answered.contains(&c.id)) {
            return Err(OrchestrationError::RunFailed {
                run_id: run.id.clone(),
                reason: format!("tool call {} was already answered", repeat.id),
            });
        }

        let prepared = self.dispatcher.prepare(&run.tool_calls).map_err(|e| {
            warn!(run_id = %run.id, error = %e, "Malformed tool call, abandoning run");
            e
        })?;

        *tool_calls += prepared.len() as u32;
        if *tool_calls > self.tool_budget {
            warn!(
                agent = %self.name,
                run_id = %run.id,
                tool_calls = *tool_calls,
                budget = self.tool_budget,
                "Model exceeded its tool call budget"
            );
        }

        let results = self.dispatcher.execute(prepared).await;
        let outputs: Vec<ToolOutput> = results.iter().map(CallResult::to_output).collect();

        let next = self
            .service
            .submit_tool_outputs(&self.thread_id, &run.id, &outputs)
            .await?;

        debug!(run_id = %run.id, outputs = outputs.len(), "Tool outputs submitted");

        self.record_cycle(&results, &outputs)?;
        answered.extend(outputs.into_iter().map(|o| o.tool_call_id));

        Ok(next)
    }

    fn record_cycle(&mut self, results: &[CallResult], outputs: &[ToolOutput]) -> Result<()> {
        let calls: Vec<RecordedCall<'_>> = results
            .iter()
            .map(|r| RecordedCall {
                call_id: &r.call_id,
                tool: &r.name,
                input: &r.input,
            })
            .collect();
        self.thread.push_tool_request(&calls)?;

        for output in outputs {
            self.thread.push_tool_output(&output.tool_call_id, &output.output)?;
        }
        Ok(())
    }

    /// Assistant messages written by this run, newline-joined in thread order.
    async fn collect_answer(&mut self, run_id: &str) -> Result<String> {
        let messages = self.service.list_messages(&self.thread_id).await?;

        let parts: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == MessageRole::Assistant && m.run_id.as_deref() == Some(run_id))
            .map(|m| m.content.as_str())
            .collect();

        for part in &parts {
            self.thread.push_assistant(part)?;
        }

        Ok(parts.join("\n").trim().to_string())
    }

    async fn abandon(&self, run_id: &str) {
        if let Err(e) = self.service.cancel_run(&self.thread_id, run_id).await {
            warn!(run_id = %run_id, error = %e, "Failed to cancel run");
        }
    }
}

//! Agents - one remote assistant, one thread, one tool set
//!
//! An agent registers its assistant and opens its thread on first use, then
//! answers every query on that same thread. Queries against one agent are
//! serialized; different agents run independently.

use crate::assistants::AssistantService;
use crate::config::AppConfig;
use crate::error::OrchestrationError;
use crate::execution::ToolDispatcher;
use crate::models::{AssistantDefinition, ToolName};
use crate::run::{PollPolicy, RunOrchestrator, RunReport};
use crate::tools::ToolAdapter;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

const WEB_SEARCH_INSTRUCTIONS: &str = "You will be given a user query and you MUST call the webSearch tool to \
get back search results from google.com and provide a concise answer back to the user. You are only allowed to call the tools \
at most two times or less. You MUST NOT ask for clarifications, just make a reasonable choice yourself. \
You MUST add the URL links to the search results in your response.";

const FINANCE_INSTRUCTIONS: &str = "You will be provided with a user query related to financial information. \
You MUST call the financeSearch tool to retrieve relevant finance data or news. You are only allowed to call the tools \
at most two times or less. You MUST NOT ask for any clarifications; instead, make a reasonable choice based on the user's query. \
In your response, include pertinent data or news summaries. YOU MUST INCLUDE URL links to detailed financial reports or articles.";

#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    /// Answer one query. Errors are returned, never retried here.
    async fn invoke(&self, query: &str) -> Result<String>;
}

/// Fixed identity of an agent: instructions and the tools it may call.
#[derive(Debug, Clone)]
pub struct AgentProfile {
    pub name: String,
    pub instructions: String,
    pub tools: Vec<ToolName>,
}

impl AgentProfile {
    pub fn web_search() -> Self {
        Self {
            name: "web-search".to_string(),
            instructions: WEB_SEARCH_INSTRUCTIONS.to_string(),
            tools: vec![ToolName::WebSearch],
        }
    }

    pub fn finance() -> Self {
        Self {
            name: "finance".to_string(),
            instructions: FINANCE_INSTRUCTIONS.to_string(),
            tools: vec![ToolName::FinanceSearch],
        }
    }

    pub fn definition(&self, settings: &AgentSettings) -> AssistantDefinition {
        AssistantDefinition {
            name: self.name.clone(),
            model: settings.model.clone(),
            instructions: self.instructions.clone(),
            tools: self.tools.clone(),
            temperature: settings.temperature,
        }
    }
}

/// Model and run limits shared by every agent.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub model: String,
    pub temperature: Option<f32>,
    pub policy: PollPolicy,
    /// Soft per-query tool budget
    pub max_tool_calls: u32,
}

impl AgentSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: Some(config.temperature),
            policy: config.poll_policy(),
            max_tool_calls: config.max_tool_calls,
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4".to_string(),
            temperature: None,
            policy: PollPolicy::default(),
            max_tool_calls: 2,
        }
    }
}

/// Agent backed by a remote assistant.
pub struct AssistantAgent {
    profile: AgentProfile,
    settings: AgentSettings,
    service: Arc<dyn AssistantService>,
    tools: Arc<ToolAdapter>,
    session: OnceCell<Mutex<RunOrchestrator>>,
}

impl AssistantAgent {
    pub fn new(
        profile: AgentProfile,
        settings: AgentSettings,
        service: Arc<dyn AssistantService>,
        tools: Arc<ToolAdapter>,
    ) -> Self {
        Self {
            profile,
            settings,
            service,
            tools,
            session: OnceCell::new(),
        }
    }

    /// Run one query and return the full run report.
    pub async fn run(&self, query: &str) -> Result<RunReport> {
        let session = self.session().await?;
        let mut orchestrator = session.lock().await;

        debug!(agent = %self.profile.name, query = %query, "Agent invoked");
        orchestrator.run_turn(query).await
    }

    /// Remote assistant and thread, created once. A failed setup is retried
    /// on the next query.
    async fn session(&self) -> Result<&Mutex<RunOrchestrator>> {
        self.session
            .get_or_try_init(|| async {
                let definition = self.profile.definition(&self.settings);
                let assistant_id = self.service.create_assistant(&definition).await?;
                let thread_id = self.service.create_thread().await?;

                info!(
                    agent = %self.profile.name,
                    assistant_id = %assistant_id,
                    thread_id = %thread_id,
                    "Agent session ready"
                );

                let dispatcher = ToolDispatcher::new(self.tools.clone(), self.profile.tools.clone());
                let orchestrator = RunOrchestrator::new(
                    self.profile.name.clone(),
                    self.service.clone(),
                    dispatcher,
                    self.settings.policy,
                    assistant_id,
                    thread_id,
                )
                .with_tool_budget(self.settings.max_tool_calls);

                Ok::<_, OrchestrationError>(Mutex::new(orchestrator))
            })
            .await
    }
}

#[async_trait]
impl Agent for AssistantAgent {
    fn name(&self) -> &str {
        &self.profile.name
    }

    async fn invoke(&self, query: &str) -> Result<String> {
        self.run(query).await.map(|report| report.answer)
    }
}

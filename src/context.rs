//! Orchestrator context
//!
//! Holds every long-lived component (tools, classifier, both agents) and is
//! passed to the presentation layer explicitly.

use crate::agent::{Agent, AgentProfile, AgentSettings, AssistantAgent};
use crate::assistants::{AssistantService, OpenAiAssistants};
use crate::classifier::{Classifier, LlmClassifier};
use crate::config::AppConfig;
use crate::fallback::FallbackController;
use crate::openai::OpenAiClient;
use crate::tools::{FinanceSearchTool, SerpApiClient, ToolAdapter, WebSearchTool};
use crate::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Shown instead of an error when no agent could answer.
pub const APOLOGY: &str =
    "Sorry, I couldn't find an answer to that right now. Please try again in a moment.";

pub struct OrchestratorContext {
    tools: Arc<ToolAdapter>,
    web_agent: Arc<dyn Agent>,
    finance_agent: Arc<dyn Agent>,
    controller: FallbackController,
}

impl OrchestratorContext {
    pub fn new(
        tools: Arc<ToolAdapter>,
        classifier: Arc<dyn Classifier>,
        web_agent: Arc<dyn Agent>,
        finance_agent: Arc<dyn Agent>,
    ) -> Self {
        let controller =
            FallbackController::new(classifier, web_agent.clone(), finance_agent.clone());

        Self {
            tools,
            web_agent,
            finance_agent,
            controller,
        }
    }

    /// Both agents on one assistant service, each with its own profile.
    pub fn with_service(
        service: Arc<dyn AssistantService>,
        tools: Arc<ToolAdapter>,
        classifier: Arc<dyn Classifier>,
        settings: AgentSettings,
    ) -> Self {
        let web_agent = Arc::new(AssistantAgent::new(
            AgentProfile::web_search(),
            settings.clone(),
            service.clone(),
            tools.clone(),
        ));
        let finance_agent = Arc::new(AssistantAgent::new(
            AgentProfile::finance(),
            settings,
            service,
            tools.clone(),
        ));

        Self::new(tools, classifier, web_agent, finance_agent)
    }

    /// Wire the production stack: SerpAPI tools, OpenAI assistants and an
    /// OpenAI chat classifier.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let serpapi = SerpApiClient::new(
            config.serp_api_key.clone(),
            config.serpapi_base_url.clone(),
            config.tool_timeout,
        )?;

        let mut adapter = ToolAdapter::new();
        adapter.register(Arc::new(WebSearchTool::new(serpapi.clone())));
        adapter.register(Arc::new(FinanceSearchTool::new(serpapi)));

        let service = Arc::new(OpenAiAssistants::new(
            config.openai_api_key.clone(),
            config.openai_base_url.clone(),
        )?);

        let completion = Arc::new(OpenAiClient::new(
            config.openai_api_key.clone(),
            config.openai_base_url.clone(),
            config.classifier_model.clone(),
            config.temperature,
            config.max_tokens,
        )?);

        info!(model = %config.model, "Orchestrator context initialized");

        Ok(Self::with_service(
            service,
            Arc::new(adapter),
            Arc::new(LlmClassifier::new(completion)),
            AgentSettings::from_config(config),
        ))
    }

    pub fn tools(&self) -> &ToolAdapter {
        &self.tools
    }

    pub fn agents(&self) -> [&Arc<dyn Agent>; 2] {
        [&self.web_agent, &self.finance_agent]
    }

    pub async fn resolve(&self, query: &str) -> Result<String> {
        self.controller.resolve(query).await
    }

    /// The inbound operation. Never fails: a terminal failure is rendered
    /// as an apology.
    pub async fn answer(&self, query: &str) -> String {
        let started = Instant::now();

        match self.resolve(query).await {
            Ok(answer) => {
                info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    answer_len = answer.len(),
                    "Query answered"
                );
                answer
            }
            Err(e) => {
                error!(error = %e, "Query could not be answered");
                APOLOGY.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistants::{RunScript, ScriptedAssistantService};
    use crate::classifier::FixedClassifier;
    use crate::config::lookup_from_pairs;
    use crate::models::{Route, ToolName};
    use crate::tools::StaticTool;

    fn scripted_context(route: Route, scripts: Vec<RunScript>) -> (OrchestratorContext, Arc<ScriptedAssistantService>) {
        let service = Arc::new(ScriptedAssistantService::with_runs(scripts));
        let mut adapter = ToolAdapter::new();
        adapter.register(Arc::new(StaticTool::ok(ToolName::WebSearch, "web")));
        adapter.register(Arc::new(StaticTool::ok(ToolName::FinanceSearch, "finance")));

        let context = OrchestratorContext::with_service(
            service.clone(),
            Arc::new(adapter),
            Arc::new(FixedClassifier(route)),
            AgentSettings::default(),
        );
        (context, service)
    }

    #[tokio::test(start_paused = true)]
    async fn test_answer_returns_agent_text() {
        let (context, _) = scripted_context(Route::Trivial, vec![RunScript::answer("Paris is the capital.")]);
        assert_eq!(context.answer("capital of France?").await, "Paris is the capital.");
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_agents_failing_renders_apology() {
        let (context, service) = scripted_context(
            Route::NonTrivial,
            vec![RunScript::new().fail("finance broke"), RunScript::new().fail("web broke")],
        );

        assert_eq!(context.answer("gold price?").await, APOLOGY);
        assert!(context.resolve("again").await.is_err());
        assert_eq!(service.assistants().len(), 2);
    }

    #[test]
    fn test_from_config_registers_both_tools() {
        let config = AppConfig::from_lookup(lookup_from_pairs(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("SERP_API_KEY", "serp-test"),
        ]))
        .unwrap();

        let context = OrchestratorContext::from_config(&config).unwrap();
        assert_eq!(
            context.tools().list(),
            vec![ToolName::FinanceSearch, ToolName::WebSearch]
        );
        let agents = context.agents();
        let names: Vec<&str> = agents.iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["web-search", "finance"]);
    }
}

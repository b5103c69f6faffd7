//! Fallback controller
//!
//! Trivial queries go to the web-search agent only. Everything else tries
//! the finance agent first and falls back to web search when it errors or
//! has nothing to say. A single agent failure never reaches the caller.

use crate::agent::Agent;
use crate::classifier::Classifier;
use crate::error::OrchestrationError;
use crate::models::Route;
use crate::Result;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Answer text an agent uses when it has nothing.
pub const NOT_AVAILABLE: &str = "N/A";

pub struct FallbackController {
    classifier: Arc<dyn Classifier>,
    web_agent: Arc<dyn Agent>,
    finance_agent: Arc<dyn Agent>,
}

impl FallbackController {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        web_agent: Arc<dyn Agent>,
        finance_agent: Arc<dyn Agent>,
    ) -> Self {
        Self {
            classifier,
            web_agent,
            finance_agent,
        }
    }

    pub async fn resolve(&self, query: &str) -> Result<String> {
        let route = self.classifier.classify(query).await;
        info!(route = %route, "Query routed");

        match route {
            Route::Trivial => self.web_agent.invoke(query).await.map_err(|e| {
                error!(agent = %self.web_agent.name(), error = %e, "Web-search agent failed");
                OrchestrationError::AgentFailed {
                    agent: self.web_agent.name().to_string(),
                    reason: e.to_string(),
                }
            }),
            Route::NonTrivial => {
                let primary = match self.finance_agent.invoke(query).await {
                    Ok(answer) if !is_not_available(&answer) => return Ok(answer),
                    Ok(answer) => format!("{} agent answered {:?}", self.finance_agent.name(), answer.trim()),
                    Err(e) => e.to_string(),
                };

                warn!(
                    primary = %self.finance_agent.name(),
                    fallback = %self.web_agent.name(),
                    reason = %primary,
                    "Falling back"
                );

                self.web_agent.invoke(query).await.map_err(|e| {
                    error!(error = %e, "Fallback agent failed too");
                    OrchestrationError::BothAgentsFailed {
                        primary,
                        fallback: e.to_string(),
                    }
                })
            }
        }
    }
}

/// Sentinel check on the extracted answer text.
fn is_not_available(answer: &str) -> bool {
    let answer = answer.trim();
    answer.is_empty() || answer == NOT_AVAILABLE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentProfile, AgentSettings, AssistantAgent};
    use crate::assistants::{RunScript, ScriptedAssistantService};
    use crate::classifier::FixedClassifier;
    use crate::models::{MessageRole, RunStatus, ToolName};
    use crate::run::PollPolicy;
    use crate::tools::{StaticTool, ToolAdapter};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Agent with a canned outcome that records its queries.
    struct CannedAgent {
        name: &'static str,
        outcome: std::result::Result<String, String>,
        queries: Mutex<Vec<String>>,
    }

    impl CannedAgent {
        fn answering(name: &'static str, answer: &str) -> Arc<Self> {
            Arc::new(Self {
                name,
                outcome: Ok(answer.to_string()),
                queries: Mutex::new(Vec::new()),
            })
        }

        fn failing(name: &'static str, reason: &str) -> Arc<Self> {
            Arc::new(Self {
                name,
                outcome: Err(reason.to_string()),
                queries: Mutex::new(Vec::new()),
            })
        }

        fn queries(&self) -> Vec<String> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Agent for CannedAgent {
        fn name(&self) -> &str {
            self.name
        }

        async fn invoke(&self, query: &str) -> Result<String> {
            self.queries.lock().unwrap().push(query.to_string());
            self.outcome.clone().map_err(|reason| OrchestrationError::RunFailed {
                run_id: "run_x".to_string(),
                reason,
            })
        }
    }

    fn controller(route: Route, web: Arc<CannedAgent>, finance: Arc<CannedAgent>) -> FallbackController {
        FallbackController::new(Arc::new(FixedClassifier(route)), web, finance)
    }

    #[tokio::test]
    async fn test_trivial_queries_never_reach_finance() {
        let web = CannedAgent::answering("web-search", "Paris");
        let finance = CannedAgent::answering("finance", "should not be used");
        let controller = controller(Route::Trivial, web.clone(), finance.clone());

        assert_eq!(controller.resolve("capital of France?").await.unwrap(), "Paris");
        assert!(finance.queries().is_empty());
    }

    #[tokio::test]
    async fn test_finance_answer_wins_without_web() {
        let web = CannedAgent::answering("web-search", "web");
        let finance = CannedAgent::answering("finance", "AAPL closed at $190");
        let controller = controller(Route::NonTrivial, web.clone(), finance.clone());

        assert_eq!(
            controller.resolve("AAPL close?").await.unwrap(),
            "AAPL closed at $190"
        );
        assert!(web.queries().is_empty());
    }

    #[tokio::test]
    async fn test_not_available_falls_back() {
        let web = CannedAgent::answering("web-search", "from the web");
        let finance = CannedAgent::answering("finance", "  N/A \n");
        let controller = controller(Route::NonTrivial, web.clone(), finance);

        assert_eq!(controller.resolve("q").await.unwrap(), "from the web");
        assert_eq!(web.queries(), vec!["q".to_string()]);
    }

    #[tokio::test]
    async fn test_run_failure_falls_back_with_unmodified_query() {
        let query = "  What's the yield on 10-year Treasuries?  ";
        let web = CannedAgent::answering("web-search", "4.2%");
        let finance = CannedAgent::failing("finance", "server_error");
        let controller = controller(Route::NonTrivial, web.clone(), finance.clone());

        assert_eq!(controller.resolve(query).await.unwrap(), "4.2%");
        assert_eq!(finance.queries(), vec![query.to_string()]);
        assert_eq!(web.queries(), vec![query.to_string()]);
    }

    #[tokio::test]
    async fn test_both_failing_is_terminal() {
        let web = CannedAgent::failing("web-search", "web down");
        let finance = CannedAgent::failing("finance", "finance down");
        let controller = controller(Route::NonTrivial, web, finance);

        match controller.resolve("q").await.unwrap_err() {
            OrchestrationError::BothAgentsFailed { primary, fallback } => {
                assert!(primary.contains("finance down"));
                assert!(fallback.contains("web down"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_trivial_web_failure_is_agent_failed() {
        let web = CannedAgent::failing("web-search", "web down");
        let finance = CannedAgent::answering("finance", "unused");
        let controller = controller(Route::Trivial, web, finance.clone());

        let err = controller.resolve("q").await.unwrap_err();
        assert!(matches!(err, OrchestrationError::AgentFailed { .. }));
        assert!(finance.queries().is_empty());
    }

    fn scripted_agent(
        profile: AgentProfile,
        service: Arc<ScriptedAssistantService>,
        tools: Arc<ToolAdapter>,
    ) -> Arc<AssistantAgent> {
        let settings = AgentSettings {
            policy: PollPolicy::new(Duration::from_millis(500)).with_deadline(Duration::from_secs(30)),
            ..AgentSettings::default()
        };
        Arc::new(AssistantAgent::new(profile, settings, service, tools))
    }

    #[tokio::test(start_paused = true)]
    async fn test_gold_price_answer_carries_tool_output() {
        let quote = "$2400/oz (source: example.com)";
        let finance_tool = Arc::new(StaticTool::ok(ToolName::FinanceSearch, quote));
        let web_tool = Arc::new(StaticTool::ok(ToolName::WebSearch, "unused"));
        let mut adapter = ToolAdapter::new();
        adapter.register(finance_tool.clone());
        adapter.register(web_tool.clone());
        let tools = Arc::new(adapter);

        let finance_service = Arc::new(ScriptedAssistantService::with_runs([RunScript::new()
            .poll(RunStatus::InProgress)
            .require_tool("call_gold", "financeSearch", "current gold price")
            .complete([format!("Gold is trading at {}.", quote)])]));
        let web_service = Arc::new(ScriptedAssistantService::new());

        let controller = FallbackController::new(
            Arc::new(FixedClassifier(Route::NonTrivial)),
            scripted_agent(AgentProfile::web_search(), web_service.clone(), tools.clone()),
            scripted_agent(AgentProfile::finance(), finance_service.clone(), tools),
        );

        let answer = controller
            .resolve("What is the current price of gold?")
            .await
            .unwrap();

        assert!(answer.contains(quote));
        assert_eq!(finance_tool.calls(), vec!["current gold price".to_string()]);
        assert!(web_tool.calls().is_empty());
        assert!(web_service.assistants().is_empty());
        assert_eq!(finance_service.submitted_outputs()[0].output, quote);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_finance_run_reaches_web_thread_verbatim() {
        let query = "How did the FTSE 100 close today?";
        let mut adapter = ToolAdapter::new();
        adapter.register(Arc::new(StaticTool::ok(ToolName::WebSearch, "8,100 points")));
        let tools = Arc::new(adapter);

        let finance_service =
            Arc::new(ScriptedAssistantService::with_runs([RunScript::new().fail("server_error: overloaded")]));
        let web_service = Arc::new(ScriptedAssistantService::with_runs([RunScript::answer(
            "The FTSE 100 closed at 8,100 points.",
        )]));

        let controller = FallbackController::new(
            Arc::new(FixedClassifier(Route::NonTrivial)),
            scripted_agent(AgentProfile::web_search(), web_service.clone(), tools.clone()),
            scripted_agent(AgentProfile::finance(), finance_service, tools),
        );

        let answer = controller.resolve(query).await.unwrap();
        assert_eq!(answer, "The FTSE 100 closed at 8,100 points.");

        let user_turns: Vec<String> = web_service
            .messages("thread_2")
            .into_iter()
            .filter(|m| m.role == MessageRole::User)
            .map(|m| m.content)
            .collect();
        assert_eq!(user_turns, vec![query.to_string()]);
    }

}

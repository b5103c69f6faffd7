//! Query Classifier
//!
//! Decides which agent should see a query first:
//! - Trivial: general questions, straight to the web-search agent
//! - NonTrivial: finance-flavoured questions, finance agent first
//!
//! One best-effort completion call per query, never retried.

use crate::error::OrchestrationError;
use crate::models::Route;
use crate::openai::{ChatMessage, CompletionClient};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

const CLASSIFIER_PROMPT: &str = "You route questions for a research assistant. \
Reply with exactly True if the question is general knowledge that a plain web search answers well. \
Reply with exactly False if it needs financial data, market prices, company figures or economic news. \
Reply with the single word True or False and nothing else.";

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, query: &str) -> Route;
}

/// Classifier backed by a chat completion.
pub struct LlmClassifier {
    client: Arc<dyn CompletionClient>,
}

impl LlmClassifier {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, query: &str) -> Route {
        let messages = [ChatMessage::system(CLASSIFIER_PROMPT), ChatMessage::user(query)];

        match self.client.complete(&messages).await {
            Ok(reply) => {
                let route = route_from_reply(&reply);
                debug!(reply = %reply.trim(), route = %route, "Query classified");
                route
            }
            Err(e) => {
                let e = OrchestrationError::ClassifierError(e.to_string());
                warn!(error = %e, "Classifier call failed, using the web-search route");
                Route::Trivial
            }
        }
    }
}

/// Only a literal `True` marks a query trivial.
fn route_from_reply(reply: &str) -> Route {
    if reply.trim() == "True" {
        Route::Trivial
    } else {
        Route::NonTrivial
    }
}

/// Always answers with the same route.
pub struct FixedClassifier(pub Route);

#[async_trait]
impl Classifier for FixedClassifier {
    async fn classify(&self, _query: &str) -> Route {
        self.0
    }
}

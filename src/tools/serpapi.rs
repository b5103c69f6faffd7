//! SerpAPI-backed search tools
//!
//! `webSearch` uses the plain Google engine, `financeSearch` the Google
//! Finance engine. Results are flattened to text the model can quote,
//! keeping source links.

use super::{Tool, ToolError, ToolErrorKind};
use crate::models::ToolName;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Map, Value};
use std::time::Duration;

const NO_RESULTS_ERROR: &str = "Google hasn't returned any results for this query.";
const NO_RESULTS_TEXT: &str = "No good search result found";
const MAX_ORGANIC_RESULTS: usize = 5;
const MAX_MARKET_ROWS: usize = 3;
const MAX_NEWS_ITEMS: usize = 3;

/// Shared, connection-pooled SerpAPI client.
#[derive(Clone)]
pub struct SerpApiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl SerpApiClient {
    pub fn new(api_key: String, base_url: String, timeout: Duration) -> crate::Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url,
        })
    }

    /// Run one search and return the raw JSON body.
    pub async fn search(&self, engine: &str, query: &str) -> Result<Value, ToolError> {
        if self.api_key.is_empty() {
            return Err(ToolError::new(
                ToolErrorKind::NotConfigured,
                "SERP_API_KEY is not configured",
            ));
        }

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("engine", engine),
                ("q", query),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolError::new(ToolErrorKind::Timeout, format!("{} search timed out", engine))
                } else {
                    ToolError::new(
                        ToolErrorKind::Transport,
                        format!("{} search request failed: {}", engine, e),
                    )
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ToolError::new(
                ToolErrorKind::Quota,
                "SerpAPI rate limit or plan quota exceeded",
            ));
        }

        let body: Value = response.json().await.map_err(|e| {
            ToolError::new(
                ToolErrorKind::MalformedResponse,
                format!("Invalid JSON from SerpAPI: {}", e),
            )
        })?;

        if let Some(message) = body.get("error").and_then(Value::as_str) {
            if message == NO_RESULTS_ERROR {
                return Ok(json!({}));
            }
            return Err(ToolError::new(ToolErrorKind::Provider, message));
        }

        if !status.is_success() {
            return Err(ToolError::new(
                ToolErrorKind::Provider,
                format!("SerpAPI returned {}", status),
            ));
        }

        Ok(body)
    }
}

pub struct WebSearchTool {
    api: SerpApiClient,
}

impl WebSearchTool {
    pub fn new(api: SerpApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> ToolName {
        ToolName::WebSearch
    }

    async fn call(&self, query: &str) -> Result<String, ToolError> {
        let body = self.api.search("google", query).await?;
        Ok(summarize_web_results(&body))
    }
}

pub struct FinanceSearchTool {
    api: SerpApiClient,
}

impl FinanceSearchTool {
    pub fn new(api: SerpApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Tool for FinanceSearchTool {
    fn name(&self) -> ToolName {
        ToolName::FinanceSearch
    }

    async fn call(&self, query: &str) -> Result<String, ToolError> {
        let body = self.api.search("google_finance", query).await?;

        if let Some(structured) = summarize_finance_results(query, &body) {
            return serde_json::to_string(&structured).map_err(|e| {
                ToolError::new(ToolErrorKind::MalformedResponse, e.to_string())
            });
        }

        // Commodities and macro questions often have no ticker page.
        let body = self.api.search("google", query).await?;
        Ok(summarize_web_results(&body))
    }
}

fn text_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn with_link(text: &str, item: &Value) -> String {
    match text_field(item, "link") {
        Some(link) => format!("{} ({})", text, link),
        None => text.to_string(),
    }
}

/// Flatten a Google engine response, most direct answer first.
pub fn summarize_web_results(body: &Value) -> String {
    if let Some(answer_box) = body.get("answer_box") {
        let direct = text_field(answer_box, "answer")
            .or_else(|| text_field(answer_box, "snippet"))
            .or_else(|| text_field(answer_box, "result"));
        if let Some(text) = direct {
            return with_link(text, answer_box);
        }
    }

    let mut lines = Vec::new();

    if let Some(kg) = body.get("knowledge_graph") {
        if let Some(description) = text_field(kg, "description") {
            let link = text_field(kg, "website")
                .or_else(|| kg.get("source").and_then(|s| text_field(s, "link")));
            lines.push(match link {
                Some(link) => format!("{} ({})", description, link),
                None => description.to_string(),
            });
        }
    }

    if let Some(results) = body.get("organic_results").and_then(Value::as_array) {
        for result in results.iter().take(MAX_ORGANIC_RESULTS) {
            let Some(snippet) = text_field(result, "snippet") else {
                continue;
            };
            let line = match text_field(result, "title") {
                Some(title) => format!("{}: {}", title, snippet),
                None => snippet.to_string(),
            };
            lines.push(with_link(&line, result));
        }
    }

    if lines.is_empty() {
        NO_RESULTS_TEXT.to_string()
    } else {
        lines.join("\n")
    }
}

/// Pick the useful parts of a Google Finance response. `None` when the
/// engine had nothing for this query.
pub fn summarize_finance_results(query: &str, body: &Value) -> Option<Value> {
    let mut out = Map::new();

    if let Some(summary) = body.get("summary") {
        let mut picked = Map::new();
        for key in ["title", "stock", "exchange", "price", "extracted_price", "currency", "date"] {
            if let Some(v) = summary.get(key) {
                picked.insert(key.to_string(), v.clone());
            }
        }
        if !picked.is_empty() {
            out.insert("summary".to_string(), Value::Object(picked));
        }
    }

    if let Some(markets) = body.get("markets").and_then(Value::as_object) {
        let mut picked = Map::new();
        for (region, rows) in markets {
            let Some(rows) = rows.as_array() else {
                continue;
            };
            let rows: Vec<Value> = rows
                .iter()
                .take(MAX_MARKET_ROWS)
                .map(|row| {
                    json!({
                        "name": row.get("name"),
                        "stock": row.get("stock"),
                        "price": row.get("price"),
                        "movement": row.get("price_movement"),
                        "link": row.get("link"),
                    })
                })
                .collect();
            if !rows.is_empty() {
                picked.insert(region.clone(), Value::Array(rows));
            }
        }
        if !picked.is_empty() {
            out.insert("markets".to_string(), Value::Object(picked));
        }
    }

    if let Some(news) = body.get("news_results").and_then(Value::as_array) {
        // Entries are either articles or groups of articles under "items".
        let articles: Vec<Value> = news
            .iter()
            .flat_map(|entry| match entry.get("items").and_then(Value::as_array) {
                Some(items) => items.clone(),
                None => vec![entry.clone()],
            })
            .filter(|article| text_field(article, "link").is_some())
            .take(MAX_NEWS_ITEMS)
            .map(|article| {
                json!({
                    "title": article.get("title").or_else(|| article.get("snippet")),
                    "source": article.get("source"),
                    "link": article.get("link"),
                })
            })
            .collect();
        if !articles.is_empty() {
            out.insert("news".to_string(), Value::Array(articles));
        }
    }

    if out.is_empty() {
        return None;
    }

    out.insert("query".to_string(), Value::String(query.to_string()));
    Some(Value::Object(out))
}

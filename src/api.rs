//! REST API server for the research assistant
//!
//! Exposes `answer` over HTTP for web front ends.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::agent::Agent;
use crate::context::OrchestratorContext;

/// =============================
/// Request / Response Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AnswerRequest {
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub answer: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub context: Arc<OrchestratorContext>,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let tools: Vec<&str> = state.context.tools().list().iter().map(|t| t.as_str()).collect();
    let agents: Vec<&str> = state.context.agents().into_iter().map(|a| a.name()).collect();

    Json(serde_json::json!({
        "status": "healthy",
        "agents": agents,
        "tools": tools,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Answer Endpoint
/// =============================

async fn answer(
    State(state): State<ApiState>,
    Json(req): Json<AnswerRequest>,
) -> Result<Json<AnswerResponse>, (StatusCode, Json<ErrorResponse>)> {
    if req.query.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("query must not be empty")),
        ));
    }

    info!(query = %req.query, "Received answer request");

    let answer = state.context.answer(&req.query).await;
    Ok(Json(AnswerResponse { answer }))
}

/// =============================
/// Router
/// =============================

pub fn create_router(context: Arc<OrchestratorContext>) -> Router {
    let state = ApiState { context };

    Router::new()
        .route("/health", get(health))
        .route("/api/answer", post(answer))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    context: Arc<OrchestratorContext>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(context);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

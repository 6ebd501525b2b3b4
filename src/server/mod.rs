//! Assistant API service
//!
//! The server side of the chat application: two endpoints fronting the AI
//! provider, holding the provider key so the chat client never sees it.
//! `POST /api/enhance-query` rewrites a query for search; `POST
//! /api/summarize` streams a markdown narrative over a ranked result set.
//! Without the key the endpoints stay up and answer with explicit errors,
//! which the client pipeline treats as recoverable.

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::Config;
use crate::error::{IdeascopeError, Result};
use crate::prompts;
use crate::search::SearchResult;

pub mod gemini;
pub use gemini::{GeminiGenerator, TextGenerator, TextStream};

/// Shared handler state
pub struct AppState {
    /// The generation backend; `None` when the provider key is absent
    pub generator: Option<Arc<dyn TextGenerator>>,
}

/// Build handler state from configuration
///
/// A missing or rejected key does not prevent startup: the endpoints
/// degrade to explicit error responses instead.
pub fn build_state(config: &Config) -> AppState {
    match Config::provider_key() {
        Some(key) => match GeminiGenerator::new(&config.provider, key) {
            Ok(generator) => AppState {
                generator: Some(Arc::new(generator)),
            },
            Err(e) => {
                tracing::error!("failed to build provider client: {}", e);
                AppState { generator: None }
            }
        },
        None => {
            tracing::warn!(
                "{} not set; assistant endpoints will return errors",
                crate::config::PROVIDER_KEY_ENV
            );
            AppState { generator: None }
        }
    }
}

/// Assemble the service router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/enhance-query", post(enhance_query))
        .route("/api/summarize", post(summarize))
        .with_state(Arc::new(state))
}

/// Run the assistant API service until interrupted
pub async fn serve(config: Config, addr: &str) -> Result<()> {
    let app = router(build_state(&config));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("assistant API listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct EnhanceQueryBody {
    query: String,
}

#[derive(Debug, Serialize)]
struct EnhanceQueryReply {
    #[serde(rename = "enhancedQuery")]
    enhanced_query: String,
}

#[derive(Debug, Deserialize)]
struct SummarizeBody {
    results: Vec<SearchResult>,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

async fn enhance_query(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: EnhanceQueryBody = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "invalid request body"),
    };
    let query = request.query.trim();
    if query.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "query must not be empty");
    }

    let Some(generator) = &state.generator else {
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "query enhancement is not configured",
        );
    };

    let enhanced = match generator
        .generate(&prompts::build_enhancement_prompt(query))
        .await
    {
        Ok(text) => {
            let cleaned = clean_enhanced_line(&text);
            if cleaned.is_empty() {
                query.to_string()
            } else {
                cleaned
            }
        }
        Err(e) => {
            // Degraded, not broken: the client searches with its own words.
            tracing::warn!("enhancement generation failed, echoing query: {}", e);
            query.to_string()
        }
    };

    Json(EnhanceQueryReply {
        enhanced_query: enhanced,
    })
    .into_response()
}

async fn summarize(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: SummarizeBody = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "invalid request body"),
    };
    if request.results.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "results must not be empty");
    }

    let Some(generator) = &state.generator else {
        return error_response(StatusCode::UNAUTHORIZED, "summarizer is not configured");
    };

    match generator
        .stream(&prompts::build_summary_prompt(&request.results))
        .await
    {
        Ok(stream) => {
            let body_stream = stream.map(|item| item.map(Bytes::from));
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
                Body::from_stream(body_stream),
            )
                .into_response()
        }
        Err(IdeascopeError::Config(message)) => {
            tracing::error!("summarizer rejected: {}", message);
            error_response(StatusCode::UNAUTHORIZED, "provider rejected the API key")
        }
        Err(e) => {
            tracing::error!("failed to start summary generation: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "summary generation failed")
        }
    }
}

/// Reduce a model completion to the single-line rewritten query
fn clean_enhanced_line(text: &str) -> String {
    let line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    line.trim().trim_matches('"').trim().to_string()
}

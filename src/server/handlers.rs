//! HTTP request handlers.
//!
//! Errors leave as `{"error": "<short message>"}` with status 404 for unknown
//! ids and 500 for everything else. Full error detail is logged, never sent.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        DefaultBodyLimit, Json, Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::state::AppState;
use crate::agent::AgentCreationOptions;
use crate::conversation::{ConversationRequest, RequestHeaders, RequestSnapshot, RunRequest};
use crate::error::LabError;

/// Header carrying a caller-chosen retry key for `POST /conversation`.
pub const IDEMPOTENCY_KEY: &str = "idempotency-key";

/// Create the application router: `/health` plus the API under `/api`.
pub fn create_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/sessions", get(list_sessions))
        .route("/sessions/:id", get(get_session))
        .route("/sessions/:id/agents", get(get_session_agents))
        .route("/agents", post(create_agent))
        .route("/agents/random", post(random_agent))
        .route("/conversation", post(start_conversation))
        .route("/conversation/:id/analysis", get(get_analysis));

    let mut router = Router::new()
        .route("/health", get(health_check))
        .nest("/api", api)
        .fallback(not_found)
        .layer(middleware::map_response(contain_client_errors))
        .layer(DefaultBodyLimit::max(state.config.max_body_size));

    if state.config.cors_enabled {
        router = router.layer(CorsLayer::permissive());
    }
    if state.config.logging {
        router = router.layer(TraceLayer::new_for_http());
    }

    router.with_state(state)
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    /// Always `ok`
    pub status: &'static str,
    /// Crate version
    pub version: &'static str,
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Map a domain error onto the wire.
///
/// `fallback` is the message sent for internal failures. Validation and
/// not-found messages are already safe to show and pass through.
fn error_response(err: &LabError, fallback: &str) -> Response {
    match err {
        LabError::NotFound(_) => error_body(StatusCode::NOT_FOUND, "Session not found"),
        LabError::Validation(msg) => {
            tracing::warn!(error = %err, "request rejected");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, msg)
        },
        _ => {
            tracing::error!(error = %err, "{fallback}");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, fallback)
        },
    }
}

async fn not_found() -> Response {
    error_body(StatusCode::NOT_FOUND, "Not found")
}

/// Keep framework-generated statuses inside the 404/500 contract.
///
/// A known path with the wrong method reads as an unknown route. Any other
/// client error the router produces on its own becomes a 500.
async fn contain_client_errors(response: Response) -> Response {
    match response.status() {
        StatusCode::METHOD_NOT_ALLOWED => not_found().await,
        status if status.is_client_error() && status != StatusCode::NOT_FOUND => {
            tracing::warn!(%status, "client error contained");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "Invalid request")
        },
        _ => response,
    }
}

fn rejection_response(rejection: &impl std::fmt::Display) -> Response {
    tracing::warn!(error = %rejection, "malformed request");
    error_body(StatusCode::INTERNAL_SERVER_ERROR, "Invalid request")
}

/// `GET /sessions` query
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    /// Cursor from the previous page
    #[serde(default)]
    pub start_after: Option<String>,
}

async fn list_sessions(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return rejection_response(&rejection),
    };

    let cursor = query.start_after.as_deref().filter(|c| !c.is_empty());
    match state.archive.list_page(cursor).await {
        Ok(page) => Json(page).into_response(),
        Err(e) => error_response(&e, "Failed to fetch sessions"),
    }
}

async fn get_session(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.archive.get(&id).await {
        Ok(session) => Json(session).into_response(),
        Err(e) => error_response(&e, "Failed to fetch session"),
    }
}

async fn get_session_agents(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.archive.get(&id).await {
        Ok(session) => Json(session.agents).into_response(),
        Err(e) => error_response(&e, "Failed to fetch session agents"),
    }
}

async fn create_agent(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AgentCreationOptions>, JsonRejection>,
) -> Response {
    let Json(options) = match body {
        Ok(b) => b,
        Err(rejection) => return rejection_response(&rejection),
    };

    match state.agents.create(options) {
        Ok(agent) => {
            tracing::info!(agent = %agent.name, "agent created");
            Json(agent).into_response()
        },
        Err(e) => error_response(&e, "Failed to create agent"),
    }
}

/// `POST /agents/random` body
#[derive(Debug, Default, Deserialize)]
pub struct RandomAgentRequest {
    /// Topic the agent should care about
    #[serde(default)]
    pub topic: String,
}

async fn random_agent(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RandomAgentRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(b) => b,
        Err(rejection) => return rejection_response(&rejection),
    };

    match state.agents.random(&req.topic).await {
        Ok(agent) => Json(agent).into_response(),
        Err(e) => error_response(&e, "Failed to generate random agent"),
    }
}

async fn start_conversation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<ConversationRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(b) => b,
        Err(rejection) => return rejection_response(&rejection),
    };

    let mut run = RunRequest::new(req.topic, req.agents, req.messages_per_agent)
        .with_request(request_snapshot(&headers));
    if let Some(client) = req.system_info {
        run = run.with_client(client);
    }

    let key = headers
        .get(IDEMPOTENCY_KEY)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty());

    let result = match key {
        Some(key) => state.orchestrator.run_idempotent(key, run).await,
        None => state.orchestrator.run(run).await,
    };

    match result {
        Ok(session) => Json(session).into_response(),
        Err(e) => error_response(&e, "Failed to run conversation"),
    }
}

async fn get_analysis(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.archive.get(&id).await {
        Ok(session) => match session.analytics {
            Some(report) => Json(report).into_response(),
            None => error_body(StatusCode::NOT_FOUND, "Analysis not found"),
        },
        Err(e) => error_response(&e, "Failed to fetch analysis"),
    }
}

/// Facts about the incoming request, for run metadata.
pub fn request_snapshot(headers: &HeaderMap) -> RequestSnapshot {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    let ip = header("x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|s| s.trim().to_string()))
        .filter(|s| !s.is_empty());
    let protocol = header("x-forwarded-proto").unwrap_or_else(|| "http".to_string());

    RequestSnapshot {
        ip,
        user_agent: header("user-agent"),
        timestamp: Utc::now(),
        secure: protocol.eq_ignore_ascii_case("https"),
        protocol,
        headers: RequestHeaders {
            accept: header("accept"),
            language: header("accept-language"),
            encoding: header("accept-encoding"),
            connection: header("connection"),
        },
    }
}

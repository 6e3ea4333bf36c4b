//! Sub-agent lifecycle CRUD (C12) — create, list, get, suspend, revive,
//! soft-delete.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use crate::state::AppState;

fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

fn err_to_response(err: sa_domain::error::Error) -> Response {
    use sa_domain::error::Error;
    match err {
        Error::Capacity(msg) => api_error(StatusCode::TOO_MANY_REQUESTS, msg),
        Error::Validation(msg) => api_error(StatusCode::BAD_REQUEST, msg),
        other => api_error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct UserScopeQuery {
    pub user_id: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/subagents?user_id=
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_subagents(
    State(state): State<AppState>,
    Query(q): Query<UserScopeQuery>,
) -> impl IntoResponse {
    match state.agent_lifecycle.list(&q.user_id) {
        Ok(agents) => {
            let count = agents.len();
            Json(serde_json::json!({ "subagents": agents, "count": count })).into_response()
        }
        Err(e) => err_to_response(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/subagents/:id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn get_subagent(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.agent_lifecycle.get(&id) {
        Ok(Some(agent)) => Json(serde_json::json!({ "subagent": agent })).into_response(),
        Ok(None) => api_error(StatusCode::NOT_FOUND, "sub-agent not found"),
        Err(e) => err_to_response(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/subagents
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct CreateSubAgentRequest {
    pub user_id: String,
    pub role: String,
    pub system_prompt: String,
    #[serde(default)]
    pub tools_granted: Vec<String>,
    #[serde(default)]
    pub tier_preference: Option<String>,
    #[serde(default)]
    pub template_id: Option<String>,
}

pub async fn create_subagent(
    State(state): State<AppState>,
    Json(req): Json<CreateSubAgentRequest>,
) -> impl IntoResponse {
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp_millis();
    match state.agent_lifecycle.create(
        id,
        &req.user_id,
        &req.role,
        &req.system_prompt,
        req.tools_granted,
        req.tier_preference,
        req.template_id,
        now,
    ) {
        Ok(agent) => (StatusCode::CREATED, Json(serde_json::json!({ "subagent": agent }))).into_response(),
        Err(e) => err_to_response(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/subagents/:id/suspend, /revive, /soft-delete
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn suspend_subagent(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let now = chrono::Utc::now().timestamp_millis();
    match state.agent_lifecycle.suspend(&id, now) {
        Ok(()) => Json(serde_json::json!({ "suspended": true })).into_response(),
        Err(e) => err_to_response(e),
    }
}

pub async fn revive_subagent(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let now = chrono::Utc::now().timestamp_millis();
    match state.agent_lifecycle.revive(&id, now) {
        Ok(agent) => Json(serde_json::json!({ "subagent": agent })).into_response(),
        Err(e) => err_to_response(e),
    }
}

pub async fn soft_delete_subagent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let now = chrono::Utc::now().timestamp_millis();
    match state.agent_lifecycle.soft_delete(&id, now) {
        Ok(()) => Json(serde_json::json!({ "deleted": true })).into_response(),
        Err(e) => err_to_response(e),
    }
}

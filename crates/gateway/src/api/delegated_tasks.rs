//! Sub-agent delegated-task API (C14) — start a task on a sub-agent,
//! inspect its background record, and pull undelivered results.
//!
//! Distinct from [`crate::api::tasks`], which queues ad-hoc concurrent
//! turns on the caller's own session; these tasks run on a dedicated
//! sub-agent (C12) and serialize per agent.

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
// POST /v1/delegated-tasks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct CreateDelegatedTaskRequest {
    pub user_id: String,
    pub agent_id: String,
    pub task_description: String,
    #[serde(default)]
    pub auto_create_template: bool,
}

pub async fn create_delegated_task(
    State(state): State<AppState>,
    Json(req): Json<CreateDelegatedTaskRequest>,
) -> impl IntoResponse {
    let runner = state.background_runner.clone();
    match runner
        .start(
            state.clone(),
            req.user_id,
            req.agent_id,
            req.task_description,
            req.auto_create_template,
        )
        .await
    {
        Ok(task) => (StatusCode::ACCEPTED, Json(serde_json::json!({ "task": task }))).into_response(),
        Err(e) => err_to_response(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/delegated-tasks/:id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn get_delegated_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_background_task(&id) {
        Ok(Some(task)) => Json(serde_json::json!({ "task": task })).into_response(),
        Ok(None) => api_error(StatusCode::NOT_FOUND, "background task not found"),
        Err(e) => err_to_response(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DELETE /v1/delegated-tasks/:id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn cancel_delegated_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let cancelled = state.background_runner.cancel(&state, &id);
    Json(serde_json::json!({ "cancelled": cancelled })).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/delegated-tasks/undelivered?user_id=
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_undelivered(
    State(state): State<AppState>,
    Query(q): Query<UserScopeQuery>,
) -> impl IntoResponse {
    match state.store.undelivered_tasks(&q.user_id) {
        Ok(tasks) => {
            let count = tasks.len();
            Json(serde_json::json!({ "tasks": tasks, "count": count })).into_response()
        }
        Err(e) => err_to_response(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/delegated-tasks/:id/delivered
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn mark_delivered(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let now = chrono::Utc::now().timestamp_millis();
    match state.store.mark_task_delivered(&id, now) {
        Ok(()) => Json(serde_json::json!({ "delivered": true })).into_response(),
        Err(e) => err_to_response(e),
    }
}

//! Role template CRUD + best-match lookup (C13).

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
// GET /v1/templates?user_id=
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_templates(
    State(state): State<AppState>,
    Query(q): Query<UserScopeQuery>,
) -> impl IntoResponse {
    match state.templates.list(&q.user_id) {
        Ok(templates) => {
            let count = templates.len();
            Json(serde_json::json!({ "templates": templates, "count": count })).into_response()
        }
        Err(e) => err_to_response(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/templates/:id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn get_template(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.templates.get(&id) {
        Ok(Some(t)) => Json(serde_json::json!({ "template": t })).into_response(),
        Ok(None) => api_error(StatusCode::NOT_FOUND, "template not found"),
        Err(e) => err_to_response(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/templates
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct CreateTemplateRequest {
    pub user_id: String,
    pub name: String,
    pub role_description: String,
    #[serde(default)]
    pub default_tools: Vec<String>,
    #[serde(default)]
    pub default_tier: Option<String>,
}

pub async fn create_template(
    State(state): State<AppState>,
    Json(req): Json<CreateTemplateRequest>,
) -> impl IntoResponse {
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp_millis();
    match state.templates.create(
        id,
        &req.user_id,
        &req.name,
        &req.role_description,
        req.default_tools,
        req.default_tier,
        now,
    ) {
        Ok(t) => (StatusCode::CREATED, Json(serde_json::json!({ "template": t }))).into_response(),
        Err(e) => err_to_response(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DELETE /v1/templates/:id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn delete_template(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.templates.delete(&id) {
        Ok(()) => Json(serde_json::json!({ "deleted": true })).into_response(),
        Err(e) => err_to_response(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/templates/find-best-match
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct FindBestMatchRequest {
    pub user_id: String,
    pub task_description: String,
}

pub async fn find_best_match(
    State(state): State<AppState>,
    Json(req): Json<FindBestMatchRequest>,
) -> impl IntoResponse {
    match state.templates.find_best_match(&req.user_id, &req.task_description) {
        Ok(template) => Json(serde_json::json!({ "template": template })).into_response(),
        Err(e) => err_to_response(e),
    }
}

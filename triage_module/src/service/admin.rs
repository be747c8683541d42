//! Admin CRUD: suppressions, agent rules, Gmail accounts, tasks, reply
//! templates, and the email log. Every route sits behind the PIN session.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tokio::task;
use tracing::error;

use crate::account_store::GmailAccount;
use crate::rule_store::{RuleType, SuppressionKind};
use crate::task_store::{NewTask, TaskStatus, TaskStoreError};
use crate::template_store::{NewTemplate, TemplateStoreError};

use super::auth::{json_error, verify_admin};
use super::state::AppState;

fn db_error(err: impl std::fmt::Display) -> Response {
    error!("admin store call failed: {err}");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "database error")
}

fn join_error(err: impl std::fmt::Display) -> Response {
    error!("spawn_blocking panicked: {err}");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
}

// ---------------------------------------------------------------------------
// Suppressions
// ---------------------------------------------------------------------------

/// GET /admin/suppressions
pub(super) async fn list_suppressions(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = verify_admin(&headers, &state) {
        return response;
    }
    let stores = state.stores.clone();
    match task::spawn_blocking(move || stores.rules.list_suppressions()).await {
        Ok(Ok(suppressions)) => (StatusCode::OK, Json(suppressions)).into_response(),
        Ok(Err(err)) => db_error(err),
        Err(err) => join_error(err),
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct NewSuppressionRequest {
    kind: SuppressionKind,
    value: String,
    reason: Option<String>,
}

/// POST /admin/suppressions
pub(super) async fn add_suppression(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<NewSuppressionRequest>,
) -> Response {
    if let Err(response) = verify_admin(&headers, &state) {
        return response;
    }
    let stores = state.stores.clone();
    let result = task::spawn_blocking(move || {
        stores
            .rules
            .add_suppression(request.kind, &request.value, request.reason.as_deref())
    })
    .await;
    match result {
        Ok(Ok(id)) => (StatusCode::CREATED, Json(serde_json::json!({ "id": id }))).into_response(),
        Ok(Err(err)) => db_error(err),
        Err(err) => join_error(err),
    }
}

/// DELETE /admin/suppressions/:id
pub(super) async fn delete_suppression(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    if let Err(response) = verify_admin(&headers, &state) {
        return response;
    }
    let stores = state.stores.clone();
    match task::spawn_blocking(move || stores.rules.delete_suppression(id)).await {
        Ok(Ok(true)) => StatusCode::NO_CONTENT.into_response(),
        Ok(Ok(false)) => json_error(StatusCode::NOT_FOUND, "suppression not found"),
        Ok(Err(err)) => db_error(err),
        Err(err) => join_error(err),
    }
}

// ---------------------------------------------------------------------------
// Agent rules
// ---------------------------------------------------------------------------

/// GET /admin/rules
pub(super) async fn list_rules(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(response) = verify_admin(&headers, &state) {
        return response;
    }
    let stores = state.stores.clone();
    match task::spawn_blocking(move || stores.rules.list_rules()).await {
        Ok(Ok(rules)) => (StatusCode::OK, Json(rules)).into_response(),
        Ok(Err(err)) => db_error(err),
        Err(err) => join_error(err),
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct NewRuleRequest {
    gmail_account_id: String,
    rule_type: RuleType,
    pattern: String,
    #[serde(default = "default_true")]
    is_enabled: bool,
}

fn default_true() -> bool {
    true
}

/// POST /admin/rules
pub(super) async fn add_rule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<NewRuleRequest>,
) -> Response {
    if let Err(response) = verify_admin(&headers, &state) {
        return response;
    }
    let stores = state.stores.clone();
    let result = task::spawn_blocking(move || {
        stores.rules.add_rule(
            &request.gmail_account_id,
            request.rule_type,
            &request.pattern,
            request.is_enabled,
        )
    })
    .await;
    match result {
        Ok(Ok(id)) => (StatusCode::CREATED, Json(serde_json::json!({ "id": id }))).into_response(),
        Ok(Err(err)) => db_error(err),
        Err(err) => join_error(err),
    }
}

/// DELETE /admin/rules/:id
pub(super) async fn delete_rule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    if let Err(response) = verify_admin(&headers, &state) {
        return response;
    }
    let stores = state.stores.clone();
    match task::spawn_blocking(move || stores.rules.delete_rule(id)).await {
        Ok(Ok(true)) => StatusCode::NO_CONTENT.into_response(),
        Ok(Ok(false)) => json_error(StatusCode::NOT_FOUND, "rule not found"),
        Ok(Err(err)) => db_error(err),
        Err(err) => join_error(err),
    }
}

// ---------------------------------------------------------------------------
// Gmail accounts
// ---------------------------------------------------------------------------

/// GET /admin/accounts
pub(super) async fn list_accounts(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(response) = verify_admin(&headers, &state) {
        return response;
    }
    let stores = state.stores.clone();
    match task::spawn_blocking(move || stores.accounts.list_accounts()).await {
        Ok(Ok(accounts)) => (StatusCode::OK, Json(accounts)).into_response(),
        Ok(Err(err)) => db_error(err),
        Err(err) => join_error(err),
    }
}

/// PUT /admin/accounts/:id
pub(super) async fn upsert_account(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(mut account): Json<GmailAccount>,
) -> Response {
    if let Err(response) = verify_admin(&headers, &state) {
        return response;
    }
    account.id = id;
    let stores = state.stores.clone();
    let result = task::spawn_blocking(move || {
        stores.accounts.upsert_account(&account)?;
        stores.accounts.get_account(&account.id)
    })
    .await;
    match result {
        Ok(Ok(account)) => (StatusCode::OK, Json(account)).into_response(),
        Ok(Err(err)) => db_error(err),
        Err(err) => join_error(err),
    }
}

/// DELETE /admin/accounts/:id
pub(super) async fn delete_account(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(response) = verify_admin(&headers, &state) {
        return response;
    }
    let stores = state.stores.clone();
    match task::spawn_blocking(move || stores.accounts.delete_account(&id)).await {
        Ok(Ok(true)) => StatusCode::NO_CONTENT.into_response(),
        Ok(Ok(false)) => json_error(StatusCode::NOT_FOUND, "account not found"),
        Ok(Err(err)) => db_error(err),
        Err(err) => join_error(err),
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct EmailLogParams {
    account: String,
    limit: Option<u32>,
}

/// GET /admin/email-logs?account=acct-1&limit=50
pub(super) async fn list_email_logs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<EmailLogParams>,
) -> Response {
    if let Err(response) = verify_admin(&headers, &state) {
        return response;
    }
    let stores = state.stores.clone();
    let limit = params.limit.unwrap_or(100);
    let result =
        task::spawn_blocking(move || stores.email_logs.list_for_account(&params.account, limit))
            .await;
    match result {
        Ok(Ok(logs)) => (StatusCode::OK, Json(logs)).into_response(),
        Ok(Err(err)) => db_error(err),
        Err(err) => join_error(err),
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(super) struct ListTasksParams {
    status: Option<String>,
}

/// GET /tasks?status=open
pub(super) async fn list_tasks(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListTasksParams>,
) -> Response {
    if let Err(response) = verify_admin(&headers, &state) {
        return response;
    }
    let status = match params.status.as_deref().map(TaskStatus::parse).transpose() {
        Ok(status) => status,
        Err(err) => return json_error(StatusCode::BAD_REQUEST, &err.to_string()),
    };
    let stores = state.stores.clone();
    match task::spawn_blocking(move || stores.tasks.list_tasks(status)).await {
        Ok(Ok(tasks)) => (StatusCode::OK, Json(tasks)).into_response(),
        Ok(Err(err)) => db_error(err),
        Err(err) => join_error(err),
    }
}

/// POST /tasks
pub(super) async fn create_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<NewTask>,
) -> Response {
    if let Err(response) = verify_admin(&headers, &state) {
        return response;
    }
    let stores = state.stores.clone();
    match task::spawn_blocking(move || stores.tasks.create_task(&request)).await {
        Ok(Ok(task)) => (StatusCode::CREATED, Json(task)).into_response(),
        Ok(Err(err)) => db_error(err),
        Err(err) => join_error(err),
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct TaskStatusRequest {
    status: TaskStatus,
}

/// POST /tasks/:id/status
pub(super) async fn set_task_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<TaskStatusRequest>,
) -> Response {
    if let Err(response) = verify_admin(&headers, &state) {
        return response;
    }
    let stores = state.stores.clone();
    match task::spawn_blocking(move || stores.tasks.set_status(&id, request.status)).await {
        Ok(Ok(task)) => (StatusCode::OK, Json(task)).into_response(),
        Ok(Err(TaskStoreError::NotFound(_))) => json_error(StatusCode::NOT_FOUND, "task not found"),
        Ok(Err(err)) => db_error(err),
        Err(err) => join_error(err),
    }
}

/// DELETE /tasks/:id
pub(super) async fn delete_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(response) = verify_admin(&headers, &state) {
        return response;
    }
    let stores = state.stores.clone();
    match task::spawn_blocking(move || stores.tasks.delete_task(&id)).await {
        Ok(Ok(true)) => StatusCode::NO_CONTENT.into_response(),
        Ok(Ok(false)) => json_error(StatusCode::NOT_FOUND, "task not found"),
        Ok(Err(err)) => db_error(err),
        Err(err) => join_error(err),
    }
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// GET /templates
pub(super) async fn list_templates(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(response) = verify_admin(&headers, &state) {
        return response;
    }
    let stores = state.stores.clone();
    match task::spawn_blocking(move || stores.templates.list_templates()).await {
        Ok(Ok(templates)) => (StatusCode::OK, Json(templates)).into_response(),
        Ok(Err(err)) => db_error(err),
        Err(err) => join_error(err),
    }
}

/// POST /templates
pub(super) async fn create_template(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<NewTemplate>,
) -> Response {
    if let Err(response) = verify_admin(&headers, &state) {
        return response;
    }
    let stores = state.stores.clone();
    match task::spawn_blocking(move || stores.templates.create_template(&request)).await {
        Ok(Ok(template)) => (StatusCode::CREATED, Json(template)).into_response(),
        Ok(Err(err)) => db_error(err),
        Err(err) => join_error(err),
    }
}

/// PUT /templates/:id
pub(super) async fn update_template(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<NewTemplate>,
) -> Response {
    if let Err(response) = verify_admin(&headers, &state) {
        return response;
    }
    let stores = state.stores.clone();
    let result = task::spawn_blocking(move || {
        stores
            .templates
            .update_template(&id, &request.name, &request.body)
    })
    .await;
    match result {
        Ok(Ok(template)) => (StatusCode::OK, Json(template)).into_response(),
        Ok(Err(TemplateStoreError::NotFound(_))) => {
            json_error(StatusCode::NOT_FOUND, "template not found")
        }
        Ok(Err(err)) => db_error(err),
        Err(err) => join_error(err),
    }
}

/// DELETE /templates/:id
pub(super) async fn delete_template(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(response) = verify_admin(&headers, &state) {
        return response;
    }
    let stores = state.stores.clone();
    match task::spawn_blocking(move || stores.templates.delete_template(&id)).await {
        Ok(Ok(true)) => StatusCode::NO_CONTENT.into_response(),
        Ok(Ok(false)) => json_error(StatusCode::NOT_FOUND, "template not found"),
        Ok(Err(err)) => db_error(err),
        Err(err) => join_error(err),
    }
}

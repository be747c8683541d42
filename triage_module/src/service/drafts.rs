//! Draft review endpoints: list, approve, reject, and send. Sending goes
//! out through OpenPhone from the configured number and marks the draft
//! `sent` only after the API accepts the message.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use providers_module::openphone::OpenPhoneClient;
use serde::Deserialize;
use tokio::task;
use tracing::{error, info};

use crate::draft_store::{DraftReply, DraftStatus, DraftStore, DraftStoreError};

use super::auth::{json_error, verify_admin};
use super::state::AppState;

#[derive(Debug, Deserialize)]
pub(super) struct ListDraftsParams {
    status: Option<String>,
}

/// GET /drafts?status=pending
pub(super) async fn list_drafts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListDraftsParams>,
) -> Response {
    if let Err(response) = verify_admin(&headers, &state) {
        return response;
    }
    let status = match params.status.as_deref().map(DraftStatus::parse).transpose() {
        Ok(status) => status,
        Err(err) => return json_error(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    let stores = state.stores.clone();
    let result = task::spawn_blocking(move || stores.drafts.list_drafts(status)).await;
    match result {
        Ok(Ok(drafts)) => (StatusCode::OK, Json(drafts)).into_response(),
        Ok(Err(err)) => {
            error!("list drafts failed: {err}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "database error")
        }
        Err(err) => {
            error!("spawn_blocking panicked: {err}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

/// POST /drafts/:id/approve
pub(super) async fn approve_draft(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    transition(state, headers, id, DraftStatus::Approved).await
}

/// POST /drafts/:id/reject
pub(super) async fn reject_draft(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    transition(state, headers, id, DraftStatus::Rejected).await
}

async fn transition(state: AppState, headers: HeaderMap, id: String, to: DraftStatus) -> Response {
    if let Err(response) = verify_admin(&headers, &state) {
        return response;
    }
    let stores = state.stores.clone();
    let result = task::spawn_blocking(move || stores.drafts.transition(&id, to)).await;
    match result {
        Ok(Ok(draft)) => (StatusCode::OK, Json(draft)).into_response(),
        Ok(Err(DraftStoreError::NotFound(_))) => {
            json_error(StatusCode::NOT_FOUND, "draft not found")
        }
        Ok(Err(err @ DraftStoreError::InvalidTransition { .. })) => {
            json_error(StatusCode::CONFLICT, &err.to_string())
        }
        Ok(Err(err)) => {
            error!("draft transition failed: {err}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "database error")
        }
        Err(err) => {
            error!("spawn_blocking panicked: {err}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

/// POST /drafts/:id/send
pub(super) async fn send_draft(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(response) = verify_admin(&headers, &state) {
        return response;
    }
    let Some(from_number) = state.config.openphone_from_number.clone() else {
        return json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "OPENPHONE_FROM_NUMBER not configured",
        );
    };

    let stores = state.stores.clone();
    let result =
        task::spawn_blocking(move || send_one(&stores.drafts, &id, &from_number)).await;
    match result {
        Ok(Ok(draft)) => (StatusCode::OK, Json(draft)).into_response(),
        Ok(Err(SendError::NotFound)) => json_error(StatusCode::NOT_FOUND, "draft not found"),
        Ok(Err(SendError::NotApproved(status))) => json_error(
            StatusCode::CONFLICT,
            &format!("draft is {status}, only approved drafts can be sent"),
        ),
        Ok(Err(SendError::Failed(message))) => {
            error!("draft send failed: {message}");
            json_error(StatusCode::BAD_GATEWAY, &message)
        }
        Err(err) => {
            error!("spawn_blocking panicked: {err}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

/// POST /drafts/send-approved
///
/// Sends every approved draft. Individual failures are reported alongside
/// the successes rather than aborting the sweep.
pub(super) async fn send_approved_drafts(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = verify_admin(&headers, &state) {
        return response;
    }
    let Some(from_number) = state.config.openphone_from_number.clone() else {
        return json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "OPENPHONE_FROM_NUMBER not configured",
        );
    };

    let stores = state.stores.clone();
    let result = task::spawn_blocking(move || {
        let approved = stores
            .drafts
            .list_drafts(Some(DraftStatus::Approved))
            .map_err(|err| SendError::Failed(err.to_string()))?;
        let mut sent = Vec::new();
        let mut failures = Vec::new();
        for draft in approved {
            match send_one(&stores.drafts, &draft.id, &from_number) {
                Ok(draft) => sent.push(draft.id),
                Err(err) => failures.push(format!("{}: {err}", draft.id)),
            }
        }
        Ok::<_, SendError>((sent, failures))
    })
    .await;

    match result {
        Ok(Ok((sent, failures))) => {
            info!("sent {} approved drafts, {} failures", sent.len(), failures.len());
            (
                StatusCode::OK,
                Json(serde_json::json!({ "sent": sent, "failures": failures })),
            )
                .into_response()
        }
        Ok(Err(err)) => {
            error!("send-approved sweep failed: {err}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
        }
        Err(err) => {
            error!("spawn_blocking panicked: {err}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum SendError {
    #[error("draft not found")]
    NotFound,
    #[error("draft is {0}")]
    NotApproved(DraftStatus),
    #[error("{0}")]
    Failed(String),
}

fn send_one(drafts: &DraftStore, id: &str, from_number: &str) -> Result<DraftReply, SendError> {
    let draft = match drafts.get_draft(id) {
        Ok(draft) => draft,
        Err(DraftStoreError::NotFound(_)) => return Err(SendError::NotFound),
        Err(err) => return Err(SendError::Failed(err.to_string())),
    };
    if draft.status != DraftStatus::Approved {
        return Err(SendError::NotApproved(draft.status));
    }

    let client = OpenPhoneClient::from_env().map_err(|err| SendError::Failed(err.to_string()))?;
    client
        .send_message(&draft.draft_text, from_number, &draft.phone)
        .map_err(|err| SendError::Failed(err.to_string()))?;

    drafts
        .transition(id, DraftStatus::Sent)
        .map_err(|err| SendError::Failed(err.to_string()))
}

//! Two auth surfaces: a shared bearer secret for the scheduler-facing
//! pipeline endpoints, and a PIN login issuing short-lived session tokens
//! for the admin surface. Either secret being unset leaves its surface
//! open, which is the local-development mode.

use std::collections::HashMap;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::state::AppState;

const SESSION_TTL_HOURS: i64 = 12;

pub(super) fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Guard for the pipeline endpoints: the cron secret or a live admin
/// session both work.
pub(super) fn verify_cron(headers: &HeaderMap, state: &AppState) -> Result<(), Response> {
    let Some(secret) = &state.config.cron_secret else {
        return Ok(());
    };
    match bearer_token(headers) {
        Some(token) if token == secret => Ok(()),
        Some(_) if verify_admin(headers, state).is_ok() && state.config.admin_pin.is_some() => {
            Ok(())
        }
        _ => Err(json_error(
            StatusCode::UNAUTHORIZED,
            "missing or invalid bearer token",
        )),
    }
}

/// Guard for the admin surface: a session token from /auth/login.
pub(super) fn verify_admin(headers: &HeaderMap, state: &AppState) -> Result<(), Response> {
    if state.config.admin_pin.is_none() {
        return Ok(());
    }
    let Some(token) = bearer_token(headers) else {
        return Err(json_error(
            StatusCode::UNAUTHORIZED,
            "missing session token",
        ));
    };
    let sessions = state.sessions.lock().expect("session lock poisoned");
    match sessions.get(token) {
        Some(expiry) if *expiry > Utc::now() => Ok(()),
        _ => Err(json_error(
            StatusCode::UNAUTHORIZED,
            "invalid or expired session",
        )),
    }
}

/// Drop expired tokens so the session map does not grow with every login.
fn purge_expired(sessions: &mut HashMap<String, DateTime<Utc>>) {
    let now = Utc::now();
    sessions.retain(|_, expiry| *expiry > now);
}

#[derive(Debug, Deserialize)]
pub(super) struct LoginRequest {
    pin: String,
}

/// POST /auth/login
pub(super) async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Response {
    let Some(pin) = &state.config.admin_pin else {
        return json_error(StatusCode::SERVICE_UNAVAILABLE, "admin PIN not configured");
    };
    if request.pin != *pin {
        return json_error(StatusCode::UNAUTHORIZED, "wrong PIN");
    }

    let token = Uuid::new_v4().to_string();
    let expires_at = Utc::now() + Duration::hours(SESSION_TTL_HOURS);
    {
        let mut sessions = state.sessions.lock().expect("session lock poisoned");
        purge_expired(&mut sessions);
        sessions.insert(token.clone(), expires_at);
    }
    info!("admin session issued, expires {}", expires_at.to_rfc3339());

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "token": token,
            "expires_at": expires_at.to_rfc3339(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purge_drops_expired_sessions_and_keeps_live_ones() {
        let mut sessions = HashMap::new();
        sessions.insert("stale".to_string(), Utc::now() - Duration::hours(1));
        sessions.insert(
            "live".to_string(),
            Utc::now() + Duration::hours(SESSION_TTL_HOURS),
        );

        purge_expired(&mut sessions);

        assert!(!sessions.contains_key("stale"));
        assert!(sessions.contains_key("live"));
    }
}

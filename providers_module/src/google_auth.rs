//! Google OAuth 2.0 token management for Gmail accounts.
//!
//! Each connected mailbox authenticates with its own refresh token; tokens
//! are exchanged for short-lived access tokens via the standard OAuth
//! refresh flow and cached until shortly before expiry.

use serde::Deserialize;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// OAuth credentials for one Gmail account.
#[derive(Debug, Clone, Default)]
pub struct GoogleAuthConfig {
    /// OAuth client ID shared by all accounts.
    pub client_id: Option<String>,
    /// OAuth client secret shared by all accounts.
    pub client_secret: Option<String>,
    /// Per-account refresh token.
    pub refresh_token: Option<String>,
    /// Pre-generated access token (used in tests and sandboxes without
    /// network access to the token endpoint).
    pub access_token: Option<String>,
}

impl GoogleAuthConfig {
    /// Load credentials for a specific account.
    ///
    /// Looks for `GOOGLE_REFRESH_TOKEN_{ACCOUNT_ID_UPPERCASE}` first and
    /// falls back to the global `GOOGLE_REFRESH_TOKEN`.
    pub fn from_env_for_account(account_id: &str) -> Self {
        let key = format!(
            "GOOGLE_REFRESH_TOKEN_{}",
            account_id.trim().to_ascii_uppercase().replace('-', "_")
        );
        let refresh_token = std::env::var(&key).ok().or_else(|| {
            debug!("no account token {} found, using GOOGLE_REFRESH_TOKEN", key);
            std::env::var("GOOGLE_REFRESH_TOKEN").ok()
        });

        Self {
            client_id: std::env::var("GOOGLE_CLIENT_ID").ok(),
            client_secret: std::env::var("GOOGLE_CLIENT_SECRET").ok(),
            refresh_token,
            access_token: std::env::var("GOOGLE_ACCESS_TOKEN").ok(),
        }
    }

    /// Whether the configuration carries enough to obtain an access token.
    pub fn is_valid(&self) -> bool {
        self.access_token.is_some()
            || (self.client_id.is_some()
                && self.client_secret.is_some()
                && self.refresh_token.is_some())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GoogleAuthError {
    #[error("missing credentials: {0}")]
    MissingCredentials(String),
    #[error("token refresh failed: {0}")]
    TokenRefreshFailed(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("json error: {0}")]
    Json(String),
}

/// Token manager for one Gmail account.
#[derive(Debug, Clone)]
pub struct GoogleAuth {
    inner: Arc<RwLock<AuthInner>>,
}

#[derive(Debug)]
struct AuthInner {
    client_id: Option<String>,
    client_secret: Option<String>,
    refresh_token: Option<String>,
    access_token: Option<String>,
    token_expires_at: Option<Instant>,
}

impl GoogleAuth {
    pub fn new(config: GoogleAuthConfig) -> Result<Self, GoogleAuthError> {
        if !config.is_valid() {
            return Err(GoogleAuthError::MissingCredentials(
                "either GOOGLE_ACCESS_TOKEN or (GOOGLE_CLIENT_ID + GOOGLE_CLIENT_SECRET + a refresh token) must be set".to_string(),
            ));
        }

        // A pre-generated token is assumed valid for an hour.
        let (access_token, token_expires_at) = match config.access_token {
            Some(token) => (
                Some(token),
                Some(Instant::now() + Duration::from_secs(3600)),
            ),
            None => (None, None),
        };

        Ok(Self {
            inner: Arc::new(RwLock::new(AuthInner {
                client_id: config.client_id,
                client_secret: config.client_secret,
                refresh_token: config.refresh_token,
                access_token,
                token_expires_at,
            })),
        })
    }

    pub fn for_account(account_id: &str) -> Result<Self, GoogleAuthError> {
        Self::new(GoogleAuthConfig::from_env_for_account(account_id))
    }

    /// Get a valid access token, refreshing if the cached one is within a
    /// minute of expiry.
    pub fn access_token(&self) -> Result<String, GoogleAuthError> {
        {
            let inner = self.inner.read().unwrap();
            if let (Some(token), Some(expires_at)) = (&inner.access_token, &inner.token_expires_at)
            {
                if *expires_at > Instant::now() + Duration::from_secs(60) {
                    return Ok(token.clone());
                }
            }
        }
        self.refresh_access_token()
    }

    fn refresh_access_token(&self) -> Result<String, GoogleAuthError> {
        let (client_id, client_secret, refresh_token) = {
            let inner = self.inner.read().unwrap();
            match (&inner.client_id, &inner.client_secret, &inner.refresh_token) {
                (Some(id), Some(secret), Some(token)) => {
                    (id.clone(), secret.clone(), token.clone())
                }
                _ => {
                    return Err(GoogleAuthError::MissingCredentials(
                        "no refresh credentials available".to_string(),
                    ))
                }
            }
        };

        debug!("refreshing Google OAuth token");

        let token_url = std::env::var("GOOGLE_TOKEN_URL")
            .unwrap_or_else(|_| "https://oauth2.googleapis.com/token".to_string());
        let client = reqwest::blocking::Client::new();
        let response = client
            .post(&token_url)
            .form(&[
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .map_err(|e| GoogleAuthError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            error!("OAuth token refresh failed: {} - {}", status, body);
            return Err(GoogleAuthError::TokenRefreshFailed(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let token_response: OAuthTokenResponse = response
            .json()
            .map_err(|e| GoogleAuthError::Json(e.to_string()))?;

        let expires_at = Instant::now() + Duration::from_secs(token_response.expires_in.max(0) as u64);
        let access_token = token_response.access_token.clone();

        {
            let mut inner = self.inner.write().unwrap();
            inner.access_token = Some(token_response.access_token);
            inner.token_expires_at = Some(expires_at);
        }

        Ok(access_token)
    }
}

#[derive(Debug, Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Scopes the triage service requests for connected mailboxes.
pub const GMAIL_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/gmail.compose",
    "https://www.googleapis.com/auth/gmail.labels",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_validation() {
        let empty = GoogleAuthConfig::default();
        assert!(!empty.is_valid());

        let oauth = GoogleAuthConfig {
            client_id: Some("client".to_string()),
            client_secret: Some("secret".to_string()),
            refresh_token: Some("refresh".to_string()),
            access_token: None,
        };
        assert!(oauth.is_valid());

        let pre_generated = GoogleAuthConfig {
            access_token: Some("ya29.token".to_string()),
            ..Default::default()
        };
        assert!(pre_generated.is_valid());
    }

    #[test]
    fn pre_generated_token_is_served_without_refresh() {
        let auth = GoogleAuth::new(GoogleAuthConfig {
            access_token: Some("ya29.token".to_string()),
            ..Default::default()
        })
        .expect("auth");
        assert_eq!(auth.access_token().expect("token"), "ya29.token");
    }
}

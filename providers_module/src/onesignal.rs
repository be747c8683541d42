//! OneSignal push notification client.
//!
//! Used for the best-effort "drafts awaiting approval" notification after a
//! run; failures here must never fail the run that triggered them.

use serde::Deserialize;
use serde_json::json;

const DEFAULT_BASE_URL: &str = "https://api.onesignal.com";

#[derive(Debug, thiserror::Error)]
pub enum OneSignalError {
    #[error("http error: {0}")]
    Http(String),
    #[error("onesignal api error: HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("json error: {0}")]
    Json(String),
}

#[derive(Debug, Deserialize)]
pub struct NotificationAck {
    pub id: Option<String>,
}

/// Blocking OneSignal API client.
#[derive(Debug, Clone)]
pub struct OneSignalClient {
    app_id: String,
    api_key: String,
    base_url: String,
    http: reqwest::blocking::Client,
}

impl OneSignalClient {
    pub fn new(app_id: String, api_key: String) -> Self {
        let base_url = std::env::var("ONESIGNAL_API_BASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            app_id,
            api_key,
            base_url,
            http: reqwest::blocking::Client::new(),
        }
    }

    /// Both `ONESIGNAL_APP_ID` and `ONESIGNAL_API_KEY` must be set for push
    /// to be enabled; otherwise returns `None` and the caller skips push.
    pub fn from_env() -> Option<Self> {
        let app_id = std::env::var("ONESIGNAL_APP_ID")
            .ok()
            .filter(|v| !v.trim().is_empty())?;
        let api_key = std::env::var("ONESIGNAL_API_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty())?;
        Some(Self::new(app_id, api_key))
    }

    /// Send a broadcast notification to all subscribed devices.
    pub fn notify_all(&self, title: &str, message: &str) -> Result<NotificationAck, OneSignalError> {
        let url = format!("{}/notifications", self.base_url);
        let payload = json!({
            "app_id": self.app_id,
            "included_segments": ["Subscribed Users"],
            "headings": {"en": title},
            "contents": {"en": message},
        });
        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Basic {}", self.api_key))
            .json(&payload)
            .send()
            .map_err(|e| OneSignalError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(OneSignalError::Api {
                status: status.as_u16(),
                body,
            });
        }
        response.json().map_err(|e| OneSignalError::Json(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    #[test]
    fn notify_all_posts_broadcast() {
        let mut server = Server::new();
        let mock = server
            .mock("POST", "/notifications")
            .match_header("authorization", "Basic os-test-key")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("\"app_id\":\"app-1\"".to_string()),
                Matcher::Regex("Subscribed Users".to_string()),
                Matcher::Regex("3 drafts awaiting approval".to_string()),
            ]))
            .with_status(200)
            .with_body(r#"{"id":"n1"}"#)
            .expect(1)
            .create();

        let client = OneSignalClient {
            app_id: "app-1".to_string(),
            api_key: "os-test-key".to_string(),
            base_url: server.url(),
            http: reqwest::blocking::Client::new(),
        };
        let ack = client
            .notify_all("Drafts ready", "3 drafts awaiting approval")
            .expect("notify");
        assert_eq!(ack.id.as_deref(), Some("n1"));
        mock.assert();
    }
}

//! OpenPhone REST client.
//!
//! Covers the three calls the cleanup run needs: listing conversations in a
//! time window, listing the messages of one conversation, and sending an
//! approved reply. All list calls are cursor-paginated via `pageToken`.

use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.openphone.com/v1";

#[derive(Debug, thiserror::Error)]
pub enum OpenPhoneError {
    #[error("http error: {0}")]
    Http(String),
    #[error("openphone api error: HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("json error: {0}")]
    Json(String),
    #[error("missing OPENPHONE_API_KEY")]
    MissingApiKey,
}

/// One SMS conversation as returned by the list endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub phone_number_id: Option<String>,
    #[serde(default)]
    pub participants: Vec<String>,
    pub name: Option<String>,
    pub updated_at: Option<String>,
}

/// One SMS message within a conversation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    /// "incoming" or "outgoing".
    pub direction: String,
    pub text: Option<String>,
    pub created_at: Option<String>,
    pub from: Option<String>,
    #[serde(default)]
    pub to: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    content: &'a str,
    from: &'a str,
    to: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageAck {
    pub data: Option<SentMessage>,
}

#[derive(Debug, Deserialize)]
pub struct SentMessage {
    pub id: String,
}

/// Blocking OpenPhone API client.
#[derive(Debug, Clone)]
pub struct OpenPhoneClient {
    api_key: String,
    base_url: String,
    http: reqwest::blocking::Client,
}

impl OpenPhoneClient {
    pub fn new(api_key: String) -> Self {
        let base_url = std::env::var("OPENPHONE_API_BASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            api_key,
            base_url,
            http: reqwest::blocking::Client::new(),
        }
    }

    pub fn from_env() -> Result<Self, OpenPhoneError> {
        let api_key = std::env::var("OPENPHONE_API_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(OpenPhoneError::MissingApiKey)?;
        Ok(Self::new(api_key))
    }

    /// List conversations updated inside `[updated_after, updated_before)`.
    pub fn list_conversations(
        &self,
        updated_after: &str,
        updated_before: &str,
        page_token: Option<&str>,
        max_results: u32,
    ) -> Result<Page<Conversation>, OpenPhoneError> {
        let mut url = format!(
            "{}/conversations?updatedAfter={}&updatedBefore={}&maxResults={}",
            self.base_url,
            urlencoding::encode(updated_after),
            urlencoding::encode(updated_before),
            max_results
        );
        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
        }
        self.get_json(&url)
    }

    /// List messages for one conversation inside a time window.
    pub fn list_messages(
        &self,
        phone_number_id: &str,
        participants: &[String],
        created_after: &str,
        created_before: &str,
        page_token: Option<&str>,
    ) -> Result<Page<Message>, OpenPhoneError> {
        let mut url = format!(
            "{}/messages?phoneNumberId={}&createdAfter={}&createdBefore={}&maxResults=100",
            self.base_url,
            urlencoding::encode(phone_number_id),
            urlencoding::encode(created_after),
            urlencoding::encode(created_before),
        );
        for participant in participants {
            url.push_str(&format!(
                "&participants[]={}",
                urlencoding::encode(participant)
            ));
        }
        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
        }
        self.get_json(&url)
    }

    /// Send an SMS message.
    pub fn send_message(
        &self,
        content: &str,
        from: &str,
        to: &str,
    ) -> Result<SendMessageAck, OpenPhoneError> {
        let url = format!("{}/messages", self.base_url);
        let request = SendMessageRequest {
            content,
            from,
            to: vec![to],
        };
        let response = self
            .http
            .post(&url)
            .header("Authorization", &self.api_key)
            .json(&request)
            .send()
            .map_err(|e| OpenPhoneError::Http(e.to_string()))?;
        Self::read_json(response)
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, OpenPhoneError> {
        let response = self
            .http
            .get(url)
            .header("Authorization", &self.api_key)
            .send()
            .map_err(|e| OpenPhoneError::Http(e.to_string()))?;
        Self::read_json(response)
    }

    fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::blocking::Response,
    ) -> Result<T, OpenPhoneError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(OpenPhoneError::Api {
                status: status.as_u16(),
                body,
            });
        }
        response.json().map_err(|e| OpenPhoneError::Json(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn client(server: &Server) -> OpenPhoneClient {
        OpenPhoneClient {
            api_key: "op-test-key".to_string(),
            base_url: server.url(),
            http: reqwest::blocking::Client::new(),
        }
    }

    #[test]
    fn list_conversations_parses_page() {
        let mut server = Server::new();
        let mock = server
            .mock("GET", "/conversations")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("updatedAfter".into(), "2024-01-01T00:00:00Z".into()),
                Matcher::UrlEncoded("updatedBefore".into(), "2024-01-07T00:00:00Z".into()),
                Matcher::UrlEncoded("maxResults".into(), "25".into()),
            ]))
            .match_header("authorization", "op-test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"data":[{"id":"CN1","phoneNumberId":"PN1","participants":["+15551234567"],"name":"Alice","updatedAt":"2024-01-02T10:00:00Z"}],"nextPageToken":"tok-2"}"#,
            )
            .expect(1)
            .create();

        let page = client(&server)
            .list_conversations("2024-01-01T00:00:00Z", "2024-01-07T00:00:00Z", None, 25)
            .expect("list");

        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].id, "CN1");
        assert_eq!(page.next_page_token.as_deref(), Some("tok-2"));
        mock.assert();
    }

    #[test]
    fn api_error_carries_status_and_body() {
        let mut server = Server::new();
        let _mock = server
            .mock("GET", Matcher::Regex("^/conversations".to_string()))
            .with_status(429)
            .with_body("rate limited")
            .create();

        let err = client(&server)
            .list_conversations("a", "b", None, 25)
            .expect_err("should fail");
        match err {
            OpenPhoneError::Api { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "rate limited");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn send_message_posts_payload() {
        let mut server = Server::new();
        let mock = server
            .mock("POST", "/messages")
            .match_header("authorization", "op-test-key")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("\"content\":\"On my way\"".to_string()),
                Matcher::Regex("\"from\":\"\\+15557654321\"".to_string()),
                Matcher::Regex("\"to\":\\[\"\\+15551234567\"\\]".to_string()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data":{"id":"MSG1"}}"#)
            .expect(1)
            .create();

        let ack = client(&server)
            .send_message("On my way", "+15557654321", "+15551234567")
            .expect("send");
        assert_eq!(ack.data.expect("data").id, "MSG1");
        mock.assert();
    }
}

//! Gmail REST client for one connected mailbox.
//!
//! Covers what the triage pipeline needs: listing recent inbox messages,
//! fetching full message content (headers + decoded text body), managing
//! labels, and creating a threaded draft reply.

use std::collections::HashMap;

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::google_auth::{GoogleAuth, GoogleAuthError};

const DEFAULT_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";

#[derive(Debug, thiserror::Error)]
pub enum GmailError {
    #[error("http error: {0}")]
    Http(String),
    #[error("gmail api error: HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("json error: {0}")]
    Json(String),
    #[error(transparent)]
    Auth(#[from] GoogleAuthError),
}

/// Reference to a message from the list endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: String,
    pub thread_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListPage {
    #[serde(default)]
    messages: Vec<MessageRef>,
    next_page_token: Option<String>,
}

/// A fully fetched message with the fields triage cares about.
#[derive(Debug, Clone, Default)]
pub struct GmailMessage {
    pub id: String,
    pub thread_id: Option<String>,
    pub subject: String,
    pub from: String,
    pub to: String,
    pub reply_to: Option<String>,
    /// RFC 2822 Message-ID header, used for In-Reply-To threading.
    pub rfc822_message_id: Option<String>,
    pub body_text: String,
    pub label_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    id: String,
    thread_id: Option<String>,
    #[serde(default)]
    label_ids: Vec<String>,
    payload: Option<RawPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPart {
    mime_type: Option<String>,
    #[serde(default)]
    headers: Vec<RawHeader>,
    body: Option<RawBody>,
    #[serde(default)]
    parts: Vec<RawPart>,
}

#[derive(Debug, Deserialize)]
struct RawHeader {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct RawBody {
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Label {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct LabelList {
    #[serde(default)]
    labels: Vec<Label>,
}

#[derive(Debug, Deserialize)]
pub struct DraftAck {
    pub id: String,
}

/// Blocking Gmail API client scoped to one account's OAuth credentials.
#[derive(Debug, Clone)]
pub struct GmailClient {
    auth: GoogleAuth,
    base_url: String,
    http: reqwest::blocking::Client,
}

impl GmailClient {
    pub fn new(auth: GoogleAuth) -> Self {
        let base_url = std::env::var("GMAIL_API_BASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            auth,
            base_url,
            http: reqwest::blocking::Client::new(),
        }
    }

    /// List inbox messages newer than `lookback_days`, following pagination
    /// to the end.
    pub fn list_recent_inbox_messages(
        &self,
        lookback_days: u32,
    ) -> Result<Vec<MessageRef>, GmailError> {
        let query = format!("in:inbox newer_than:{}d", lookback_days.max(1));
        let mut refs = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = format!(
                "{}/users/me/messages?q={}&maxResults=100",
                self.base_url,
                urlencoding::encode(&query)
            );
            if let Some(token) = &page_token {
                url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
            }
            let page: MessageListPage = self.get_json(&url)?;
            refs.extend(page.messages);
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!("gmail list returned {} message refs", refs.len());
        Ok(refs)
    }

    /// Fetch a full message and flatten it to headers + plain-text body.
    pub fn get_message(&self, id: &str) -> Result<GmailMessage, GmailError> {
        let url = format!("{}/users/me/messages/{}?format=full", self.base_url, id);
        let raw: RawMessage = self.get_json(&url)?;

        let mut message = GmailMessage {
            id: raw.id,
            thread_id: raw.thread_id,
            label_ids: raw.label_ids,
            ..Default::default()
        };

        if let Some(payload) = raw.payload {
            for header in &payload.headers {
                match header.name.to_ascii_lowercase().as_str() {
                    "subject" => message.subject = header.value.clone(),
                    "from" => message.from = header.value.clone(),
                    "to" => message.to = header.value.clone(),
                    "reply-to" => message.reply_to = Some(header.value.clone()),
                    "message-id" => message.rfc822_message_id = Some(header.value.clone()),
                    _ => {}
                }
            }
            message.body_text = extract_text_body(&payload);
        }

        Ok(message)
    }

    /// Look up labels by name, creating any that do not exist yet.
    /// Returns a name → id map.
    pub fn ensure_labels(&self, names: &[&str]) -> Result<HashMap<String, String>, GmailError> {
        let url = format!("{}/users/me/labels", self.base_url);
        let existing: LabelList = self.get_json(&url)?;
        let mut by_name: HashMap<String, String> = existing
            .labels
            .into_iter()
            .map(|label| (label.name, label.id))
            .collect();

        for name in names {
            if by_name.contains_key(*name) {
                continue;
            }
            let created: Label = self.post_json(
                &url,
                &json!({
                    "name": name,
                    "labelListVisibility": "labelShow",
                    "messageListVisibility": "show",
                }),
            )?;
            by_name.insert(created.name, created.id);
        }

        Ok(by_name
            .into_iter()
            .filter(|(name, _)| names.contains(&name.as_str()))
            .collect())
    }

    /// Add and remove labels on a message.
    pub fn modify_labels(
        &self,
        message_id: &str,
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<(), GmailError> {
        let url = format!(
            "{}/users/me/messages/{}/modify",
            self.base_url, message_id
        );
        let _: serde_json::Value = self.post_json(
            &url,
            &json!({
                "addLabelIds": add_label_ids,
                "removeLabelIds": remove_label_ids,
            }),
        )?;
        Ok(())
    }

    /// Create a draft reply threaded onto the original message.
    pub fn create_draft_reply(
        &self,
        original: &GmailMessage,
        reply_text: &str,
        signature: Option<&str>,
    ) -> Result<DraftAck, GmailError> {
        let to = original
            .reply_to
            .as_deref()
            .unwrap_or(&original.from)
            .to_string();
        let subject = if original.subject.to_ascii_lowercase().starts_with("re:") {
            original.subject.clone()
        } else {
            format!("Re: {}", original.subject)
        };

        let mut body = reply_text.to_string();
        if let Some(signature) = signature.filter(|s| !s.trim().is_empty()) {
            body.push_str("\r\n\r\n");
            body.push_str(signature);
        }

        let mut rfc822 = String::new();
        rfc822.push_str(&format!("To: {}\r\n", to));
        rfc822.push_str(&format!("Subject: {}\r\n", subject));
        if let Some(message_id) = &original.rfc822_message_id {
            rfc822.push_str(&format!("In-Reply-To: {}\r\n", message_id));
            rfc822.push_str(&format!("References: {}\r\n", message_id));
        }
        rfc822.push_str("Content-Type: text/plain; charset=utf-8\r\n");
        rfc822.push_str("\r\n");
        rfc822.push_str(&body);

        let raw = URL_SAFE_NO_PAD.encode(rfc822.as_bytes());
        let url = format!("{}/users/me/drafts", self.base_url);
        let payload = json!({
            "message": {
                "raw": raw,
                "threadId": original.thread_id,
            }
        });
        self.post_json(&url, &payload)
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, GmailError> {
        let token = self.auth.access_token()?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .map_err(|e| GmailError::Http(e.to_string()))?;
        Self::read_json(response)
    }

    fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<T, GmailError> {
        let token = self.auth.access_token()?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .map_err(|e| GmailError::Http(e.to_string()))?;
        Self::read_json(response)
    }

    fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::blocking::Response,
    ) -> Result<T, GmailError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(GmailError::Api {
                status: status.as_u16(),
                body,
            });
        }
        response.json().map_err(|e| GmailError::Json(e.to_string()))
    }
}

/// Walk the MIME tree and pull out the first text/plain body, falling back
/// to text/html with tags stripped.
fn extract_text_body(payload: &RawPart) -> String {
    if let Some(text) = find_part(payload, "text/plain") {
        return text;
    }
    if let Some(html) = find_part(payload, "text/html") {
        return strip_html(&html);
    }
    String::new()
}

fn find_part(part: &RawPart, mime_type: &str) -> Option<String> {
    if part.mime_type.as_deref() == Some(mime_type) {
        if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_deref()) {
            if let Some(decoded) = decode_body(data) {
                return Some(decoded);
            }
        }
    }
    for child in &part.parts {
        if let Some(found) = find_part(child, mime_type) {
            return Some(found);
        }
    }
    None
}

/// Gmail body data is base64url, sometimes padded and sometimes not.
fn decode_body(data: &str) -> Option<String> {
    let bytes = URL_SAFE
        .decode(data)
        .or_else(|_| URL_SAFE_NO_PAD.decode(data))
        .ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::google_auth::GoogleAuthConfig;
    use mockito::{Matcher, Server};

    fn client(server: &Server) -> GmailClient {
        let auth = GoogleAuth::new(GoogleAuthConfig {
            access_token: Some("ya29.test".to_string()),
            ..Default::default()
        })
        .expect("auth");
        GmailClient {
            auth,
            base_url: server.url(),
            http: reqwest::blocking::Client::new(),
        }
    }

    fn encode(data: &str) -> String {
        URL_SAFE_NO_PAD.encode(data.as_bytes())
    }

    #[test]
    fn list_follows_pagination() {
        let mut server = Server::new();
        let first = server
            .mock("GET", "/users/me/messages")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), "in:inbox newer_than:3d".into()),
                Matcher::UrlEncoded("maxResults".into(), "100".into()),
            ]))
            .match_header("authorization", "Bearer ya29.test")
            .with_status(200)
            .with_body(r#"{"messages":[{"id":"m1"}],"nextPageToken":"p2"}"#)
            .expect(1)
            .create();
        let second = server
            .mock("GET", "/users/me/messages")
            .match_query(Matcher::AllOf(vec![Matcher::UrlEncoded(
                "pageToken".into(),
                "p2".into(),
            )]))
            .with_status(200)
            .with_body(r#"{"messages":[{"id":"m2"}]}"#)
            .expect(1)
            .create();

        let refs = client(&server)
            .list_recent_inbox_messages(3)
            .expect("list");
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].id, "m1");
        assert_eq!(refs[1].id, "m2");
        first.assert();
        second.assert();
    }

    #[test]
    fn get_message_flattens_headers_and_body() {
        let mut server = Server::new();
        let body = serde_json::json!({
            "id": "m1",
            "threadId": "t1",
            "labelIds": ["INBOX"],
            "payload": {
                "mimeType": "multipart/alternative",
                "headers": [
                    {"name": "Subject", "value": "Invoice overdue"},
                    {"name": "From", "value": "Billing <billing@acme.test>"},
                    {"name": "To", "value": "me@example.test"},
                    {"name": "Message-ID", "value": "<abc@acme.test>"}
                ],
                "parts": [
                    {"mimeType": "text/plain", "body": {"data": encode("Please pay soon.")}},
                    {"mimeType": "text/html", "body": {"data": encode("<p>Please pay soon.</p>")}}
                ]
            }
        });
        let _mock = server
            .mock("GET", "/users/me/messages/m1")
            .match_query(Matcher::UrlEncoded("format".into(), "full".into()))
            .with_status(200)
            .with_body(body.to_string())
            .create();

        let message = client(&server).get_message("m1").expect("get");
        assert_eq!(message.subject, "Invoice overdue");
        assert_eq!(message.from, "Billing <billing@acme.test>");
        assert_eq!(message.body_text, "Please pay soon.");
        assert_eq!(message.rfc822_message_id.as_deref(), Some("<abc@acme.test>"));
    }

    #[test]
    fn ensure_labels_creates_missing_ones() {
        let mut server = Server::new();
        let _list = server
            .mock("GET", "/users/me/labels")
            .with_status(200)
            .with_body(r#"{"labels":[{"id":"L1","name":"AI/Processed"}]}"#)
            .create();
        let create = server
            .mock("POST", "/users/me/labels")
            .match_body(Matcher::Regex("\"name\":\"AI/Needs-Response\"".to_string()))
            .with_status(200)
            .with_body(r#"{"id":"L2","name":"AI/Needs-Response"}"#)
            .expect(1)
            .create();

        let labels = client(&server)
            .ensure_labels(&["AI/Processed", "AI/Needs-Response"])
            .expect("ensure");
        assert_eq!(labels.get("AI/Processed").map(String::as_str), Some("L1"));
        assert_eq!(
            labels.get("AI/Needs-Response").map(String::as_str),
            Some("L2")
        );
        create.assert();
    }

    #[test]
    fn create_draft_reply_threads_onto_original() {
        let mut server = Server::new();
        let mock = server
            .mock("POST", "/users/me/drafts")
            .match_body(Matcher::Regex("\"threadId\":\"t1\"".to_string()))
            .with_status(200)
            .with_body(r#"{"id":"d1"}"#)
            .expect(1)
            .create();

        let original = GmailMessage {
            id: "m1".to_string(),
            thread_id: Some("t1".to_string()),
            subject: "Invoice overdue".to_string(),
            from: "billing@acme.test".to_string(),
            rfc822_message_id: Some("<abc@acme.test>".to_string()),
            ..Default::default()
        };
        let ack = client(&server)
            .create_draft_reply(&original, "Payment sent yesterday.", Some("-- Ops"))
            .expect("draft");
        assert_eq!(ack.id, "d1");
        mock.assert();
    }

    #[test]
    fn strip_html_drops_tags() {
        assert_eq!(strip_html("<p>Hello <b>there</b></p>"), "Hello there");
    }
}

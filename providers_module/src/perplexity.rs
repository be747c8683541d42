//! Perplexity chat-completions client.
//!
//! Thin wrapper over the `/chat/completions` endpoint. The caller supplies
//! system + user messages and gets back the raw assistant text; interpreting
//! that text (including tolerating malformed JSON) is the classifier's job.

use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.perplexity.ai";

#[derive(Debug, thiserror::Error)]
pub enum PerplexityError {
    #[error("http error: {0}")]
    Http(String),
    #[error("perplexity api error: HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("json error: {0}")]
    Json(String),
    #[error("empty completion response")]
    EmptyResponse,
    #[error("missing PERPLEXITY_API_KEY")]
    MissingApiKey,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Blocking Perplexity API client.
#[derive(Debug, Clone)]
pub struct PerplexityClient {
    api_key: String,
    base_url: String,
    http: reqwest::blocking::Client,
}

impl PerplexityClient {
    pub fn new(api_key: String) -> Self {
        let base_url = std::env::var("PERPLEXITY_API_BASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            api_key,
            base_url,
            http: reqwest::blocking::Client::new(),
        }
    }

    pub fn from_env() -> Result<Self, PerplexityError> {
        let api_key = std::env::var("PERPLEXITY_API_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(PerplexityError::MissingApiKey)?;
        Ok(Self::new(api_key))
    }

    /// Run one chat completion and return the assistant text.
    pub fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, PerplexityError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model,
            messages,
            temperature,
            max_tokens,
        };
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .map_err(|e| PerplexityError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(PerplexityError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| PerplexityError::Json(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(PerplexityError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn client(server: &Server) -> PerplexityClient {
        PerplexityClient {
            api_key: "pplx-test".to_string(),
            base_url: server.url(),
            http: reqwest::blocking::Client::new(),
        }
    }

    #[test]
    fn chat_completion_returns_assistant_text() {
        let mut server = Server::new();
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer pplx-test")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("\"model\":\"sonar\"".to_string()),
                Matcher::Regex("\"role\":\"system\"".to_string()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"choices":[{"message":{"role":"assistant","content":"{\"summary\":\"ok\"}"}}]}"#,
            )
            .expect(1)
            .create();

        let text = client(&server)
            .chat_completion(
                "sonar",
                &[
                    ChatMessage::system("You summarize."),
                    ChatMessage::user("hello"),
                ],
                0.2,
                600,
            )
            .expect("completion");
        assert_eq!(text, "{\"summary\":\"ok\"}");
        mock.assert();
    }

    #[test]
    fn empty_choices_is_an_error() {
        let mut server = Server::new();
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[]}"#)
            .create();

        let err = client(&server)
            .chat_completion("sonar", &[ChatMessage::user("hi")], 0.2, 100)
            .expect_err("should fail");
        assert!(matches!(err, PerplexityError::EmptyResponse));
    }
}

//! LLM-backed classification of conversations and emails.
//!
//! The model is asked for strict JSON. Responses that come back fenced or
//! with prose around the object are salvaged; anything unparseable becomes
//! a [`Classification::Fallback`] so one bad response never aborts a run.
//! Only transport errors propagate as `Err`.

use providers_module::perplexity::{ChatMessage, PerplexityClient, PerplexityError};
use serde::Deserialize;
use tracing::warn;

use crate::email_log_store::Priority;

/// Transcript budget in characters before truncation.
pub const TRANSCRIPT_BUDGET: usize = 8000;
/// Email body budget in characters before truncation.
pub const EMAIL_BODY_BUDGET: usize = 3000;

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("perplexity error: {0}")]
    Perplexity(#[from] PerplexityError),
}

/// A verdict that either parsed cleanly or fell back to safe defaults.
#[derive(Debug, Clone)]
pub enum Classification<T> {
    Parsed(T),
    Fallback { reason: String, verdict: T },
}

impl<T> Classification<T> {
    pub fn verdict(&self) -> &T {
        match self {
            Classification::Parsed(v) => v,
            Classification::Fallback { verdict, .. } => verdict,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Classification::Fallback { .. })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationVerdict {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub needs_response: bool,
    #[serde(default)]
    pub needs_response_reason: Option<String>,
    #[serde(default)]
    pub draft_reply: Option<String>,
    #[serde(default)]
    pub explicit_name: Option<String>,
}

impl ConversationVerdict {
    fn fallback() -> Self {
        Self {
            summary: "Summary unavailable (classifier output could not be parsed).".to_string(),
            topics: Vec::new(),
            needs_response: false,
            needs_response_reason: None,
            draft_reply: None,
            explicit_name: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailVerdict {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub needs_response: bool,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub draft_reply: Option<String>,
}

impl EmailVerdict {
    fn fallback() -> Self {
        Self {
            summary: "Summary unavailable (classifier output could not be parsed).".to_string(),
            labels: Vec::new(),
            needs_response: false,
            priority: Priority::Normal,
            draft_reply: None,
        }
    }
}

pub struct Classifier {
    client: PerplexityClient,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl Classifier {
    pub fn new(client: PerplexityClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            temperature: 0.2,
            max_tokens: 1024,
        }
    }

    /// Classify one SMS conversation from its transcript.
    pub fn classify_conversation(
        &self,
        contact: &str,
        transcript: &str,
    ) -> Result<Classification<ConversationVerdict>, ClassifierError> {
        let transcript = truncate_chars(transcript, TRANSCRIPT_BUDGET);
        let system = "You are a triage assistant for an SMS inbox. Respond with a single JSON \
                      object and nothing else, with keys: summary (string), topics (array of \
                      strings), needs_response (boolean), needs_response_reason (string or null), \
                      draft_reply (string or null), explicit_name (string or null). Only set \
                      draft_reply when needs_response is true. Set explicit_name if the contact \
                      states their name in the transcript.";
        let user = format!("Contact: {contact}\n\nTranscript:\n{transcript}");
        let raw = self.client.chat_completion(
            &self.model,
            &[ChatMessage::system(system), ChatMessage::user(&user)],
            self.temperature,
            self.max_tokens,
        )?;
        Ok(parse_verdict(&raw, ConversationVerdict::fallback))
    }

    /// Classify one email from its headers and body.
    pub fn classify_email(
        &self,
        from: &str,
        subject: &str,
        body: &str,
    ) -> Result<Classification<EmailVerdict>, ClassifierError> {
        let body = truncate_chars(body, EMAIL_BODY_BUDGET);
        let system = "You are a triage assistant for a Gmail inbox. Respond with a single JSON \
                      object and nothing else, with keys: summary (string), labels (array of \
                      strings), needs_response (boolean), priority (one of \"high\", \"normal\", \
                      \"low\"), draft_reply (string or null). Only set draft_reply when \
                      needs_response is true.";
        let user = format!("From: {from}\nSubject: {subject}\n\nBody:\n{body}");
        let raw = self.client.chat_completion(
            &self.model,
            &[ChatMessage::system(system), ChatMessage::user(&user)],
            self.temperature,
            self.max_tokens,
        )?;
        Ok(parse_verdict(&raw, EmailVerdict::fallback))
    }
}

fn parse_verdict<T, F>(raw: &str, fallback: F) -> Classification<T>
where
    T: for<'de> Deserialize<'de>,
    F: FnOnce() -> T,
{
    match serde_json::from_str(&extract_json(raw)) {
        Ok(verdict) => Classification::Parsed(verdict),
        Err(err) => {
            warn!("unparseable classifier response: {err}");
            Classification::Fallback {
                reason: format!("unparseable model response: {err}"),
                verdict: fallback(),
            }
        }
    }
}

/// Salvage a JSON object from a response that may carry code fences or
/// surrounding prose.
fn extract_json(raw: &str) -> String {
    let trimmed = raw.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();
    match (unfenced.find('{'), unfenced.rfind('}')) {
        (Some(start), Some(end)) if start < end => unfenced[start..=end].to_string(),
        _ => unfenced.to_string(),
    }
}

/// Truncate to at most `budget` characters without splitting a char.
fn truncate_chars(text: &str, budget: usize) -> &str {
    match text.char_indices().nth(budget) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_clean_object() {
        let raw = r#"{"summary": "Asked about pricing.", "topics": ["sales"], "needs_response": true, "needs_response_reason": "open question", "draft_reply": "Happy to help!", "explicit_name": null}"#;
        let verdict: Classification<ConversationVerdict> =
            parse_verdict(raw, ConversationVerdict::fallback);
        assert!(!verdict.is_fallback());
        assert!(verdict.verdict().needs_response);
        assert_eq!(verdict.verdict().draft_reply.as_deref(), Some("Happy to help!"));
    }

    #[test]
    fn strips_code_fences() {
        let raw = "```json\n{\"summary\": \"ok\", \"needs_response\": false}\n```";
        let verdict: Classification<ConversationVerdict> =
            parse_verdict(raw, ConversationVerdict::fallback);
        assert!(!verdict.is_fallback());
        assert_eq!(verdict.verdict().summary, "ok");
    }

    #[test]
    fn salvages_object_from_surrounding_prose() {
        let raw = "Sure, here is the JSON you asked for:\n{\"summary\": \"ok\"}\nHope that helps!";
        let verdict: Classification<EmailVerdict> = parse_verdict(raw, EmailVerdict::fallback);
        assert!(!verdict.is_fallback());
        assert_eq!(verdict.verdict().summary, "ok");
    }

    #[test]
    fn garbage_becomes_fallback_with_safe_defaults() {
        let verdict: Classification<ConversationVerdict> =
            parse_verdict("I could not process that.", ConversationVerdict::fallback);
        assert!(verdict.is_fallback());
        assert!(!verdict.verdict().needs_response);
        assert!(verdict.verdict().draft_reply.is_none());
    }

    #[test]
    fn missing_fields_take_defaults() {
        let verdict: Classification<EmailVerdict> =
            parse_verdict(r#"{"summary": "invoice"}"#, EmailVerdict::fallback);
        assert!(!verdict.is_fallback());
        assert_eq!(verdict.verdict().priority, Priority::Normal);
        assert!(!verdict.verdict().needs_response);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "héllo wörld".repeat(10);
        let truncated = truncate_chars(&text, 15);
        assert_eq!(truncated.chars().count(), 15);
    }
}

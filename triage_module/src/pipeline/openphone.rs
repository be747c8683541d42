//! The OpenPhone cleanup run.
//!
//! One invocation processes at most `max_conversations` conversations,
//! requesting exactly the remaining allowance per page so the cap always
//! lands on a page boundary. If more pages remain the run pauses with the
//! next page token checkpointed; passing the run id back as `resumeRunId`
//! picks up from there.

use chrono::Utc;
use providers_module::onesignal::OneSignalClient;
use providers_module::openphone::{Conversation, Message, OpenPhoneClient};
use tracing::{info, warn};

use crate::classifier::Classifier;
use crate::draft_store::DraftStore;
use crate::rule_store::{RuleStore, SuppressionKind};
use crate::run_store::{Run, RunSource, RunStatus, RunStore};
use crate::summary_store::{NewSummary, SummaryStore};
use crate::suppression::{self, FilterItem};

use super::{PipelineError, RunReport, RunRequest};

/// Bound on raw messages fetched per conversation.
const MAX_RAW_MESSAGES: usize = 500;

const FALLBACK_DRAFT_WITH_INBOUND: &str =
    "Thanks for your message! We'll get back to you shortly.";
const FALLBACK_DRAFT_NO_INBOUND: &str =
    "Hi! Just checking in. Let us know if there's anything you need.";

pub struct CleanupPipeline<'a> {
    pub openphone: &'a OpenPhoneClient,
    pub classifier: &'a Classifier,
    pub runs: &'a RunStore,
    pub summaries: &'a SummaryStore,
    pub drafts: &'a DraftStore,
    pub rules: &'a RuleStore,
    pub notifier: Option<&'a OneSignalClient>,
    pub max_conversations: u32,
    pub static_phones: &'a [String],
    pub static_phrases: &'a [String],
    /// Messages whose text equals this are dropped from transcripts.
    pub ignored_auto_reply: Option<&'a str>,
}

impl CleanupPipeline<'_> {
    pub fn execute(&self, request: &RunRequest) -> Result<RunReport, PipelineError> {
        let run = self.resolve_run(request)?;
        let mut checkpoint = run.checkpoint.clone();

        let chain = suppression::conversation_chain(
            &self.suppression_values(SuppressionKind::Phone),
            &self.suppression_values(SuppressionKind::Conversation),
            self.static_phones,
            self.static_phrases,
            &self.suppression_values(SuppressionKind::Phrase),
        );

        let mut page_token = checkpoint.page_token.clone();
        let mut processed_now: u32 = 0;
        let status = loop {
            let remaining = self.max_conversations.saturating_sub(processed_now);
            if remaining == 0 {
                break RunStatus::Paused;
            }
            let page = match self.openphone.list_conversations(
                &run.start_date,
                &run.end_date,
                page_token.as_deref(),
                remaining,
            ) {
                Ok(page) => page,
                Err(err) => {
                    checkpoint.errors.push(format!("list conversations: {err}"));
                    self.runs.update_run(&run.id, RunStatus::Failed, &checkpoint)?;
                    return Err(err.into());
                }
            };

            for conversation in &page.data {
                match self.process_conversation(&run, conversation, &chain) {
                    Ok(drafted) => {
                        if drafted {
                            checkpoint.drafts_created += 1;
                        }
                    }
                    Err(err) => {
                        warn!("conversation {}: {err}", conversation.id);
                        checkpoint
                            .errors
                            .push(format!("conversation {}: {err}", conversation.id));
                    }
                }
                checkpoint.processed += 1;
                processed_now += 1;
                checkpoint.last_processed_at = Some(Utc::now());
            }

            page_token = page.next_page_token;
            checkpoint.page_token = page_token.clone();
            if page_token.is_none() {
                break RunStatus::Completed;
            }
        };

        self.runs.update_run(&run.id, status, &checkpoint)?;
        info!(
            "cleanup run {} {}: {} processed, {} drafts, {} errors",
            run.id,
            status.as_str(),
            checkpoint.processed,
            checkpoint.drafts_created,
            checkpoint.errors.len()
        );

        if checkpoint.drafts_created > 0 {
            if let Some(notifier) = self.notifier {
                if let Err(err) = notifier.notify_all(
                    "Drafts ready for review",
                    &format!("{} draft replies awaiting approval", checkpoint.drafts_created),
                ) {
                    warn!("push notification failed: {err}");
                }
            }
        }

        // The checkpoint accumulates across resumes; the report covers this
        // invocation only, so `processed` stays within the per-run cap.
        Ok(RunReport {
            run_id: run.id,
            status,
            processed: u64::from(processed_now),
            drafts_created: checkpoint.drafts_created,
            errors_count: checkpoint.errors.len(),
            next_page_token: checkpoint.page_token,
        })
    }

    /// A failed suppression lookup degrades to an empty list; a broken
    /// blocklist must not block the run itself.
    fn suppression_values(&self, kind: SuppressionKind) -> Vec<String> {
        self.rules.list_values_by_kind(kind).unwrap_or_else(|err| {
            warn!("suppression lookup ({}) failed: {err}", kind.as_str());
            Vec::new()
        })
    }

    fn resolve_run(&self, request: &RunRequest) -> Result<Run, PipelineError> {
        if let Some(id) = &request.resume_run_id {
            let run = self.runs.get_run(id)?;
            if run.source != RunSource::Openphone {
                return Err(PipelineError::WrongSource {
                    id: run.id,
                    pipeline: run.source.as_str().to_string(),
                });
            }
            if run.status != RunStatus::Paused {
                return Err(PipelineError::NotResumable {
                    id: run.id,
                    status: run.status.as_str().to_string(),
                });
            }
            return Ok(run);
        }
        let end = request
            .end_date
            .clone()
            .unwrap_or_else(|| Utc::now().to_rfc3339());
        let start = request.start_date.clone().unwrap_or_else(|| {
            (Utc::now() - chrono::Duration::days(7)).to_rfc3339()
        });
        Ok(self.runs.create_run(RunSource::Openphone, &start, &end)?)
    }

    /// Process one conversation. Returns whether a draft was created.
    fn process_conversation(
        &self,
        run: &Run,
        conversation: &Conversation,
        chain: &suppression::FilterChain,
    ) -> Result<bool, PipelineError> {
        let phone = conversation
            .participants
            .first()
            .cloned()
            .unwrap_or_default();
        let messages = self.fetch_messages(run, conversation)?;

        let transcript = build_transcript(&messages, self.ignored_auto_reply);
        let last_inbound = last_text(&messages, "incoming");
        let last_outbound = last_text(&messages, "outgoing");
        let last_message_at = messages.iter().filter_map(|m| m.created_at.clone()).max();

        let suppressed_reason = chain.evaluate(&FilterItem {
            sender: phone.clone(),
            conversation_id: conversation.id.clone(),
            subject: String::new(),
            text: transcript.clone(),
        });

        let contact = conversation.name.clone().unwrap_or_else(|| phone.clone());
        let classification = self.classifier.classify_conversation(&contact, &transcript)?;
        let verdict = classification.verdict();

        let contact_name = verdict
            .explicit_name
            .clone()
            .or_else(|| conversation.name.clone());
        let suppressed = suppressed_reason.is_some();

        self.summaries.insert_summary(&NewSummary {
            run_id: run.id.clone(),
            conversation_id: conversation.id.clone(),
            contact_name,
            phone: phone.clone(),
            summary: verdict.summary.clone(),
            topics: verdict.topics.clone(),
            needs_response: verdict.needs_response,
            suppress_response: suppressed,
            last_inbound: last_inbound.clone(),
            last_outbound,
            last_message_at,
            needs_response_reason: suppressed_reason
                .clone()
                .or_else(|| verdict.needs_response_reason.clone()),
        })?;

        if verdict.needs_response && !suppressed {
            let draft_text = match &verdict.draft_reply {
                Some(text) if !text.trim().is_empty() => text.clone(),
                _ if last_inbound.is_some() => FALLBACK_DRAFT_WITH_INBOUND.to_string(),
                _ => FALLBACK_DRAFT_NO_INBOUND.to_string(),
            };
            self.drafts
                .insert_draft(&run.id, &conversation.id, &phone, &draft_text)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Fetch every message of the conversation inside the run window,
    /// following inner pagination, bounded at [`MAX_RAW_MESSAGES`].
    fn fetch_messages(
        &self,
        run: &Run,
        conversation: &Conversation,
    ) -> Result<Vec<Message>, PipelineError> {
        let phone_number_id = conversation.phone_number_id.clone().unwrap_or_default();
        let mut messages = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self.openphone.list_messages(
                &phone_number_id,
                &conversation.participants,
                &run.start_date,
                &run.end_date,
                page_token.as_deref(),
            )?;
            messages.extend(page.data);
            if messages.len() >= MAX_RAW_MESSAGES {
                messages.truncate(MAX_RAW_MESSAGES);
                break;
            }
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(messages)
    }

}

/// Flatten messages into a classifier transcript, dropping empty texts and
/// the configured auto-reply. An empty result becomes a placeholder so a
/// Summary row is still written.
fn build_transcript(messages: &[Message], ignored_auto_reply: Option<&str>) -> String {
    let lines: Vec<String> = messages
        .iter()
        .filter_map(|message| {
            let text = message.text.as_deref()?.trim();
            if text.is_empty() || Some(text) == ignored_auto_reply {
                return None;
            }
            let who = if message.direction == "incoming" {
                "Them"
            } else {
                "Us"
            };
            Some(format!("{who}: {text}"))
        })
        .collect();
    if lines.is_empty() {
        "(no messages in window)".to_string()
    } else {
        lines.join("\n")
    }
}

fn last_text(messages: &[Message], direction: &str) -> Option<String> {
    messages
        .iter()
        .rev()
        .find(|m| m.direction == direction)
        .and_then(|m| m.text.clone())
}

//! The Gmail triage loop.
//!
//! Walks every enabled account's recent inbox, skipping anything already
//! logged (the email log is the dedup ledger) and anything an agent rule
//! matches. Everything else is classified, labeled, and logged; a threaded
//! draft reply is created when the classifier asks for one.

use chrono::Utc;
use providers_module::gmail::{GmailClient, GmailMessage};
use providers_module::google_auth::GoogleAuth;
use tracing::{info, warn};

use crate::account_store::{AccountStore, GmailAccount};
use crate::classifier::Classifier;
use crate::email_log_store::{EmailLogStore, NewEmailLog};
use crate::rule_store::RuleStore;
use crate::run_store::{RunSource, RunStatus, RunStore};
use crate::suppression::{self, FilterItem};

use super::{PipelineError, TriageReport};

pub const LABEL_PROCESSED: &str = "AI/Processed";
pub const LABEL_NEEDS_RESPONSE: &str = "AI/Needs-Response";

/// Subjects containing this marker are the pipeline's own digest emails and
/// are excluded from triage without ever reaching the classifier.
pub const SUMMARY_EMAIL_MARKER: &str = "AI Email Summary";
pub const SUMMARY_EMAIL_SKIP: &str = "Skipped: summary email (excluded from triage).";

pub struct TriagePipeline<'a> {
    pub classifier: &'a Classifier,
    pub runs: &'a RunStore,
    pub accounts: &'a AccountStore,
    pub rules: &'a RuleStore,
    pub email_logs: &'a EmailLogStore,
    /// Default lookback when the account has no override.
    pub lookback_days: u32,
}

struct Tally {
    processed: u64,
    drafts_created: u64,
    skipped_by_rule: u64,
    skipped_duplicate: u64,
}

impl TriagePipeline<'_> {
    pub fn execute(&self) -> Result<TriageReport, PipelineError> {
        let start = (Utc::now() - chrono::Duration::days(i64::from(self.lookback_days)))
            .to_rfc3339();
        let run = self
            .runs
            .create_run(RunSource::Gmail, &start, &Utc::now().to_rfc3339())?;
        let mut checkpoint = run.checkpoint.clone();
        let mut tally = Tally {
            processed: 0,
            drafts_created: 0,
            skipped_by_rule: 0,
            skipped_duplicate: 0,
        };

        let accounts = self.accounts.list_enabled()?;
        for account in &accounts {
            if let Err(err) = self.triage_account(account, &mut tally, &mut checkpoint.errors) {
                warn!("account {}: {err}", account.id);
                checkpoint.errors.push(format!("account {}: {err}", account.id));
            }
            checkpoint.last_processed_at = Some(Utc::now());
        }

        checkpoint.processed = tally.processed;
        checkpoint.drafts_created = tally.drafts_created;
        self.runs
            .update_run(&run.id, RunStatus::Completed, &checkpoint)?;
        info!(
            "gmail triage run {}: {} processed, {} drafts, {} skipped by rule, {} duplicates, {} errors",
            run.id,
            tally.processed,
            tally.drafts_created,
            tally.skipped_by_rule,
            tally.skipped_duplicate,
            checkpoint.errors.len()
        );

        Ok(TriageReport {
            run_id: run.id,
            processed: tally.processed,
            drafts_created: tally.drafts_created,
            skipped_by_rule: tally.skipped_by_rule,
            skipped_duplicate: tally.skipped_duplicate,
            errors_count: checkpoint.errors.len(),
        })
    }

    fn triage_account(
        &self,
        account: &GmailAccount,
        tally: &mut Tally,
        errors: &mut Vec<String>,
    ) -> Result<(), PipelineError> {
        let auth = GoogleAuth::for_account(&account.id)?;
        let client = GmailClient::new(auth);
        let lookback = account.lookback_days.unwrap_or(self.lookback_days);
        let refs = client.list_recent_inbox_messages(lookback)?;
        let labels = client.ensure_labels(&[LABEL_PROCESSED, LABEL_NEEDS_RESPONSE])?;
        // A failed rule lookup degrades to an empty chain rather than
        // skipping the whole account.
        let rules = self.rules.list_enabled_rules(&account.id).unwrap_or_else(|err| {
            warn!("account {}: rule lookup failed: {err}", account.id);
            Vec::new()
        });
        let chain = suppression::email_chain(&rules);

        for message_ref in refs {
            if self.email_logs.exists(&account.id, &message_ref.id)? {
                tally.skipped_duplicate += 1;
                continue;
            }
            match self.triage_message(account, &client, &labels, &chain, &message_ref.id, errors) {
                Ok(outcome) => {
                    tally.processed += 1;
                    match outcome {
                        Outcome::SkippedByRule => tally.skipped_by_rule += 1,
                        Outcome::DraftCreated => tally.drafts_created += 1,
                        Outcome::Logged => {}
                    }
                }
                // No log row is written on failure, so the message is
                // retried on the next invocation.
                Err(err) => {
                    warn!("message {}: {err}", message_ref.id);
                    errors.push(format!(
                        "account {} message {}: {err}",
                        account.id, message_ref.id
                    ));
                }
            }
        }
        Ok(())
    }

    fn triage_message(
        &self,
        account: &GmailAccount,
        client: &GmailClient,
        labels: &std::collections::HashMap<String, String>,
        chain: &suppression::FilterChain,
        message_id: &str,
        errors: &mut Vec<String>,
    ) -> Result<Outcome, PipelineError> {
        let message = client.get_message(message_id)?;

        if message.subject.contains(SUMMARY_EMAIL_MARKER) {
            self.log_skip(account, &message, SUMMARY_EMAIL_SKIP)?;
            return Ok(Outcome::SkippedByRule);
        }

        if let Some(reason) = chain.evaluate(&FilterItem {
            sender: sender_address(&message.from),
            conversation_id: String::new(),
            subject: message.subject.clone(),
            text: message.body_text.clone(),
        }) {
            self.log_skip(account, &message, &reason)?;
            return Ok(Outcome::SkippedByRule);
        }

        let classification =
            self.classifier
                .classify_email(&message.from, &message.subject, &message.body_text)?;
        let verdict = classification.verdict();

        let mut draft_created = false;
        if verdict.needs_response {
            if let Some(draft) = verdict.draft_reply.as_deref().filter(|d| !d.trim().is_empty()) {
                client.create_draft_reply(&message, draft, account.signature.as_deref())?;
                draft_created = true;
            }
        }

        let mut add = Vec::new();
        if let Some(id) = labels.get(LABEL_PROCESSED) {
            add.push(id.clone());
        }
        if verdict.needs_response {
            if let Some(id) = labels.get(LABEL_NEEDS_RESPONSE) {
                add.push(id.clone());
            }
        }
        // A failed label update is surfaced on the run but does not block
        // the log row; aborting here would recreate the draft on retry.
        if let Err(err) = client.modify_labels(&message.id, &add, &[]) {
            warn!("message {}: label update failed: {err}", message.id);
            errors.push(format!(
                "account {} message {}: label update: {err}",
                account.id, message.id
            ));
        }

        self.email_logs.insert_if_absent(&NewEmailLog {
            gmail_account_id: account.id.clone(),
            gmail_message_id: message.id.clone(),
            subject: message.subject.clone(),
            from_address: message.from.clone(),
            summary: verdict.summary.clone(),
            needs_response: verdict.needs_response,
            priority: verdict.priority,
            draft_created,
        })?;

        Ok(if draft_created {
            Outcome::DraftCreated
        } else {
            Outcome::Logged
        })
    }

    /// Log a skipped message with the match reason as its summary. Skipped
    /// mail never gets a draft and never reaches the classifier.
    fn log_skip(
        &self,
        account: &GmailAccount,
        message: &GmailMessage,
        reason: &str,
    ) -> Result<(), PipelineError> {
        self.email_logs.insert_if_absent(&NewEmailLog {
            gmail_account_id: account.id.clone(),
            gmail_message_id: message.id.clone(),
            subject: message.subject.clone(),
            from_address: message.from.clone(),
            summary: reason.to_string(),
            needs_response: false,
            priority: Default::default(),
            draft_created: false,
        })?;
        Ok(())
    }
}

enum Outcome {
    Logged,
    DraftCreated,
    SkippedByRule,
}

/// Pull the bare address out of a `Display Name <addr>` header value.
fn sender_address(from: &str) -> String {
    match (from.rfind('<'), from.rfind('>')) {
        (Some(start), Some(end)) if start < end => from[start + 1..end].to_string(),
        _ => from.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_address_unwraps_display_names() {
        assert_eq!(
            sender_address("Billing Team <billing@acme.test>"),
            "billing@acme.test"
        );
        assert_eq!(sender_address("billing@acme.test"), "billing@acme.test");
    }
}

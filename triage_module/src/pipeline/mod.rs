//! The two batch pipelines: the OpenPhone cleanup run and the Gmail triage
//! loop. Both are synchronous; the HTTP layer invokes them on a blocking
//! worker. Each invocation mutates its run row exactly once, at the end.

pub mod gmail;
pub mod openphone;

use providers_module::gmail::GmailError;
use providers_module::google_auth::GoogleAuthError;
use providers_module::openphone::OpenPhoneError;
use serde::{Deserialize, Serialize};

use crate::account_store::AccountStoreError;
use crate::classifier::ClassifierError;
use crate::draft_store::DraftStoreError;
use crate::email_log_store::EmailLogStoreError;
use crate::run_store::{RunStoreError, RunStatus};
use crate::summary_store::SummaryStoreError;

pub use gmail::TriagePipeline;
pub use openphone::CleanupPipeline;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    RunStore(#[from] RunStoreError),
    #[error(transparent)]
    SummaryStore(#[from] SummaryStoreError),
    #[error(transparent)]
    DraftStore(#[from] DraftStoreError),
    #[error(transparent)]
    EmailLogStore(#[from] EmailLogStoreError),
    #[error(transparent)]
    AccountStore(#[from] AccountStoreError),
    #[error(transparent)]
    OpenPhone(#[from] OpenPhoneError),
    #[error(transparent)]
    Gmail(#[from] GmailError),
    #[error(transparent)]
    GoogleAuth(#[from] GoogleAuthError),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
    #[error("run {id} cannot be resumed from status {status}")]
    NotResumable { id: String, status: String },
    #[error("run {id} belongs to the {pipeline} pipeline")]
    WrongSource { id: String, pipeline: String },
}

/// Request body for starting or resuming an OpenPhone cleanup run.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub resume_run_id: Option<String>,
}

/// What one cleanup invocation accomplished.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    pub status: RunStatus,
    pub processed: u64,
    pub drafts_created: u64,
    pub errors_count: usize,
    pub next_page_token: Option<String>,
}

/// What one Gmail triage invocation accomplished.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageReport {
    pub run_id: String,
    pub processed: u64,
    pub drafts_created: u64,
    pub skipped_by_rule: u64,
    pub skipped_duplicate: u64,
    pub errors_count: usize,
}

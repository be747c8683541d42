use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::account_store::AccountStore;
use crate::draft_store::DraftStore;
use crate::email_log_store::EmailLogStore;
use crate::rule_store::RuleStore;
use crate::run_store::RunStore;
use crate::summary_store::SummaryStore;
use crate::task_store::TaskStore;
use crate::template_store::TemplateStore;

use super::config::ServiceConfig;
use super::BoxError;

/// Every store, opened against the one shared database file.
pub(super) struct Stores {
    pub(super) runs: RunStore,
    pub(super) summaries: SummaryStore,
    pub(super) drafts: DraftStore,
    pub(super) email_logs: EmailLogStore,
    pub(super) rules: RuleStore,
    pub(super) accounts: AccountStore,
    pub(super) tasks: TaskStore,
    pub(super) templates: TemplateStore,
}

impl Stores {
    pub(super) fn open(db_path: &Path) -> Result<Self, BoxError> {
        Ok(Self {
            runs: RunStore::new(db_path)?,
            summaries: SummaryStore::new(db_path)?,
            drafts: DraftStore::new(db_path)?,
            email_logs: EmailLogStore::new(db_path)?,
            rules: RuleStore::new(db_path)?,
            accounts: AccountStore::new(db_path)?,
            tasks: TaskStore::new(db_path)?,
            templates: TemplateStore::new(db_path)?,
        })
    }
}

#[derive(Clone)]
pub(super) struct AppState {
    pub(super) config: Arc<ServiceConfig>,
    pub(super) stores: Arc<Stores>,
    /// Admin session tokens and their expiry instants.
    pub(super) sessions: Arc<Mutex<HashMap<String, DateTime<Utc>>>>,
}

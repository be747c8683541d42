//! Triage log for Gmail messages.
//!
//! One row per processed message, never updated. The
//! `(gmail_account_id, gmail_message_id)` uniqueness is what makes the
//! Gmail triage idempotent under re-invocation: a message already logged is
//! skipped as a duplicate.

use chrono::Utc;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum EmailLogStoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown priority: {0}")]
    UnknownPriority(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }

    pub fn parse(value: &str) -> Result<Self, EmailLogStoreError> {
        match value {
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            other => Err(EmailLogStoreError::UnknownPriority(other.to_string())),
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EmailLog {
    pub id: i64,
    pub gmail_account_id: String,
    pub gmail_message_id: String,
    pub subject: String,
    pub from_address: String,
    pub summary: String,
    pub needs_response: bool,
    pub priority: Priority,
    pub draft_created: bool,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewEmailLog {
    pub gmail_account_id: String,
    pub gmail_message_id: String,
    pub subject: String,
    pub from_address: String,
    pub summary: String,
    pub needs_response: bool,
    pub priority: Priority,
    pub draft_created: bool,
}

#[derive(Debug, Clone)]
pub struct EmailLogStore {
    path: PathBuf,
}

impl EmailLogStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, EmailLogStoreError> {
        let store = Self { path: path.into() };
        let _ = store.open()?;
        Ok(store)
    }

    /// Insert unless the `(account, message)` pair is already logged.
    /// Returns whether a row was actually written.
    pub fn insert_if_absent(&self, log: &NewEmailLog) -> Result<bool, EmailLogStoreError> {
        let conn = self.open()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO email_logs (
                gmail_account_id, gmail_message_id, subject, from_address,
                summary, needs_response, priority, draft_created, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                log.gmail_account_id,
                log.gmail_message_id,
                log.subject,
                log.from_address,
                log.summary,
                log.needs_response,
                log.priority.as_str(),
                log.draft_created,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(inserted > 0)
    }

    pub fn exists(
        &self,
        gmail_account_id: &str,
        gmail_message_id: &str,
    ) -> Result<bool, EmailLogStoreError> {
        let conn = self.open()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM email_logs WHERE gmail_account_id = ?1 AND gmail_message_id = ?2",
            params![gmail_account_id, gmail_message_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn list_for_account(
        &self,
        gmail_account_id: &str,
        limit: u32,
    ) -> Result<Vec<EmailLog>, EmailLogStoreError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, gmail_account_id, gmail_message_id, subject, from_address,
                    summary, needs_response, priority, draft_created, created_at
             FROM email_logs WHERE gmail_account_id = ?1
             ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![gmail_account_id, limit], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, bool>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, bool>(8)?,
                row.get::<_, String>(9)?,
            ))
        })?;

        let mut logs = Vec::new();
        for row in rows {
            let (
                id,
                gmail_account_id,
                gmail_message_id,
                subject,
                from_address,
                summary,
                needs_response,
                priority,
                draft_created,
                created_at,
            ) = row?;
            logs.push(EmailLog {
                id,
                gmail_account_id,
                gmail_message_id,
                subject,
                from_address,
                summary,
                needs_response,
                priority: Priority::parse(&priority)?,
                draft_created,
                created_at,
            });
        }
        Ok(logs)
    }

    fn open(&self) -> Result<Connection, EmailLogStoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS email_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                gmail_account_id TEXT NOT NULL,
                gmail_message_id TEXT NOT NULL,
                subject TEXT NOT NULL,
                from_address TEXT NOT NULL,
                summary TEXT NOT NULL,
                needs_response INTEGER NOT NULL,
                priority TEXT NOT NULL,
                draft_created INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(gmail_account_id, gmail_message_id)
            )",
            [],
        )?;
        Ok(conn)
    }
}

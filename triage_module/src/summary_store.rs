//! Conversation summaries produced by the OpenPhone cleanup run.
//!
//! Append-only: one row per conversation per run, never updated. New runs
//! over the same window write new rows.

use chrono::Utc;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum SummaryStoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One processed conversation.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub id: i64,
    pub run_id: String,
    pub conversation_id: String,
    pub contact_name: Option<String>,
    pub phone: String,
    pub summary: String,
    pub topics: Vec<String>,
    pub needs_response: bool,
    pub suppress_response: bool,
    pub last_inbound: Option<String>,
    pub last_outbound: Option<String>,
    pub last_message_at: Option<String>,
    pub needs_response_reason: Option<String>,
    pub created_at: String,
}

/// Insert payload; id and created_at are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewSummary {
    pub run_id: String,
    pub conversation_id: String,
    pub contact_name: Option<String>,
    pub phone: String,
    pub summary: String,
    pub topics: Vec<String>,
    pub needs_response: bool,
    pub suppress_response: bool,
    pub last_inbound: Option<String>,
    pub last_outbound: Option<String>,
    pub last_message_at: Option<String>,
    pub needs_response_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SummaryStore {
    path: PathBuf,
}

impl SummaryStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, SummaryStoreError> {
        let store = Self { path: path.into() };
        let _ = store.open()?;
        Ok(store)
    }

    pub fn insert_summary(&self, summary: &NewSummary) -> Result<i64, SummaryStoreError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO summaries (
                run_id, conversation_id, contact_name, phone, summary, topics,
                needs_response, suppress_response, last_inbound, last_outbound,
                last_message_at, needs_response_reason, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                summary.run_id,
                summary.conversation_id,
                summary.contact_name,
                summary.phone,
                summary.summary,
                serde_json::to_string(&summary.topics)?,
                summary.needs_response,
                summary.suppress_response,
                summary.last_inbound,
                summary.last_outbound,
                summary.last_message_at,
                summary.needs_response_reason,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_for_run(&self, run_id: &str) -> Result<Vec<Summary>, SummaryStoreError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, run_id, conversation_id, contact_name, phone, summary, topics,
                    needs_response, suppress_response, last_inbound, last_outbound,
                    last_message_at, needs_response_reason, created_at
             FROM summaries WHERE run_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok(RawRow {
                id: row.get(0)?,
                run_id: row.get(1)?,
                conversation_id: row.get(2)?,
                contact_name: row.get(3)?,
                phone: row.get(4)?,
                summary: row.get(5)?,
                topics: row.get(6)?,
                needs_response: row.get(7)?,
                suppress_response: row.get(8)?,
                last_inbound: row.get(9)?,
                last_outbound: row.get(10)?,
                last_message_at: row.get(11)?,
                needs_response_reason: row.get(12)?,
                created_at: row.get(13)?,
            })
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            let raw = row?;
            summaries.push(Summary {
                id: raw.id,
                run_id: raw.run_id,
                conversation_id: raw.conversation_id,
                contact_name: raw.contact_name,
                phone: raw.phone,
                summary: raw.summary,
                topics: serde_json::from_str(&raw.topics).unwrap_or_default(),
                needs_response: raw.needs_response,
                suppress_response: raw.suppress_response,
                last_inbound: raw.last_inbound,
                last_outbound: raw.last_outbound,
                last_message_at: raw.last_message_at,
                needs_response_reason: raw.needs_response_reason,
                created_at: raw.created_at,
            });
        }
        Ok(summaries)
    }

    fn open(&self) -> Result<Connection, SummaryStoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS summaries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                conversation_id TEXT NOT NULL,
                contact_name TEXT,
                phone TEXT NOT NULL,
                summary TEXT NOT NULL,
                topics TEXT NOT NULL,
                needs_response INTEGER NOT NULL,
                suppress_response INTEGER NOT NULL,
                last_inbound TEXT,
                last_outbound TEXT,
                last_message_at TEXT,
                needs_response_reason TEXT,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_summaries_run ON summaries(run_id)",
            [],
        )?;
        Ok(conn)
    }
}

struct RawRow {
    id: i64,
    run_id: String,
    conversation_id: String,
    contact_name: Option<String>,
    phone: String,
    summary: String,
    topics: String,
    needs_response: bool,
    suppress_response: bool,
    last_inbound: Option<String>,
    last_outbound: Option<String>,
    last_message_at: Option<String>,
    needs_response_reason: Option<String>,
    created_at: String,
}

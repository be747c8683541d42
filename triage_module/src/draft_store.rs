//! Draft replies awaiting human review.
//!
//! State machine: `pending → approved → sent`, or `pending → rejected`.
//! `sent` and `rejected` are terminal; every other transition is rejected.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum DraftStoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("draft not found: {0}")]
    NotFound(String),
    #[error("invalid draft transition: {from} -> {to}")]
    InvalidTransition { from: DraftStatus, to: DraftStatus },
    #[error("unknown draft status: {0}")]
    UnknownStatus(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftStatus {
    Pending,
    Approved,
    Rejected,
    Sent,
}

impl DraftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftStatus::Pending => "pending",
            DraftStatus::Approved => "approved",
            DraftStatus::Rejected => "rejected",
            DraftStatus::Sent => "sent",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DraftStoreError> {
        match value {
            "pending" => Ok(DraftStatus::Pending),
            "approved" => Ok(DraftStatus::Approved),
            "rejected" => Ok(DraftStatus::Rejected),
            "sent" => Ok(DraftStatus::Sent),
            other => Err(DraftStoreError::UnknownStatus(other.to_string())),
        }
    }

    fn can_become(&self, next: DraftStatus) -> bool {
        matches!(
            (self, next),
            (DraftStatus::Pending, DraftStatus::Approved)
                | (DraftStatus::Pending, DraftStatus::Rejected)
                | (DraftStatus::Approved, DraftStatus::Sent)
        )
    }
}

impl std::fmt::Display for DraftStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DraftReply {
    pub id: String,
    pub run_id: String,
    pub conversation_id: String,
    pub phone: String,
    pub draft_text: String,
    pub status: DraftStatus,
    pub created_at: String,
    pub updated_at: String,
}

type DraftColumns = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
);

#[derive(Debug, Clone)]
pub struct DraftStore {
    path: PathBuf,
}

impl DraftStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, DraftStoreError> {
        let store = Self { path: path.into() };
        let _ = store.open()?;
        Ok(store)
    }

    /// Insert a new pending draft and return it.
    pub fn insert_draft(
        &self,
        run_id: &str,
        conversation_id: &str,
        phone: &str,
        draft_text: &str,
    ) -> Result<DraftReply, DraftStoreError> {
        let now = Utc::now().to_rfc3339();
        let draft = DraftReply {
            id: Uuid::new_v4().to_string(),
            run_id: run_id.to_string(),
            conversation_id: conversation_id.to_string(),
            phone: phone.to_string(),
            draft_text: draft_text.to_string(),
            status: DraftStatus::Pending,
            created_at: now.clone(),
            updated_at: now,
        };
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO draft_replies (id, run_id, conversation_id, phone, draft_text, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                draft.id,
                draft.run_id,
                draft.conversation_id,
                draft.phone,
                draft.draft_text,
                draft.status.as_str(),
                draft.created_at,
                draft.updated_at,
            ],
        )?;
        Ok(draft)
    }

    pub fn get_draft(&self, id: &str) -> Result<DraftReply, DraftStoreError> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                "SELECT id, run_id, conversation_id, phone, draft_text, status, created_at, updated_at
                 FROM draft_replies WHERE id = ?1",
                params![id],
                Self::map_row,
            )
            .optional()?;
        match row {
            Some(columns) => Self::to_draft(columns),
            None => Err(DraftStoreError::NotFound(id.to_string())),
        }
    }

    /// Apply a status transition, enforcing the state machine.
    pub fn transition(&self, id: &str, to: DraftStatus) -> Result<DraftReply, DraftStoreError> {
        let current = self.get_draft(id)?;
        if !current.status.can_become(to) {
            return Err(DraftStoreError::InvalidTransition {
                from: current.status,
                to,
            });
        }
        let conn = self.open()?;
        conn.execute(
            "UPDATE draft_replies SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, to.as_str(), Utc::now().to_rfc3339()],
        )?;
        self.get_draft(id)
    }

    pub fn list_drafts(
        &self,
        status: Option<DraftStatus>,
    ) -> Result<Vec<DraftReply>, DraftStoreError> {
        let conn = self.open()?;
        let mut drafts = Vec::new();
        match status {
            Some(status) => {
                let mut stmt = conn.prepare(
                    "SELECT id, run_id, conversation_id, phone, draft_text, status, created_at, updated_at
                     FROM draft_replies WHERE status = ?1 ORDER BY created_at DESC",
                )?;
                let rows = stmt.query_map(params![status.as_str()], Self::map_row)?;
                for row in rows {
                    drafts.push(Self::to_draft(row?)?);
                }
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, run_id, conversation_id, phone, draft_text, status, created_at, updated_at
                     FROM draft_replies ORDER BY created_at DESC",
                )?;
                let rows = stmt.query_map([], Self::map_row)?;
                for row in rows {
                    drafts.push(Self::to_draft(row?)?);
                }
            }
        }
        Ok(drafts)
    }

    pub fn list_for_run(&self, run_id: &str) -> Result<Vec<DraftReply>, DraftStoreError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, run_id, conversation_id, phone, draft_text, status, created_at, updated_at
             FROM draft_replies WHERE run_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![run_id], Self::map_row)?;
        let mut drafts = Vec::new();
        for row in rows {
            drafts.push(Self::to_draft(row?)?);
        }
        Ok(drafts)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DraftColumns> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
        ))
    }

    fn to_draft(
        (id, run_id, conversation_id, phone, draft_text, status, created_at, updated_at): DraftColumns,
    ) -> Result<DraftReply, DraftStoreError> {
        Ok(DraftReply {
            id,
            run_id,
            conversation_id,
            phone,
            draft_text,
            status: DraftStatus::parse(&status)?,
            created_at,
            updated_at,
        })
    }

    fn open(&self) -> Result<Connection, DraftStoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS draft_replies (
                id TEXT PRIMARY KEY,
                run_id TEXT NOT NULL,
                conversation_id TEXT NOT NULL,
                phone TEXT NOT NULL,
                draft_text TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_draft_replies_status ON draft_replies(status)",
            [],
        )?;
        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, DraftStore) {
        let temp = TempDir::new().expect("tempdir");
        let store = DraftStore::new(temp.path().join("triage.db")).expect("store");
        (temp, store)
    }

    #[test]
    fn insert_starts_pending() {
        let (_temp, store) = test_store();
        let draft = store
            .insert_draft("run-1", "CN1", "+15551234567", "On it!")
            .expect("insert");
        assert_eq!(draft.status, DraftStatus::Pending);
    }

    #[test]
    fn approve_then_send() {
        let (_temp, store) = test_store();
        let draft = store
            .insert_draft("run-1", "CN1", "+15551234567", "On it!")
            .expect("insert");

        let approved = store
            .transition(&draft.id, DraftStatus::Approved)
            .expect("approve");
        assert_eq!(approved.status, DraftStatus::Approved);

        let sent = store.transition(&draft.id, DraftStatus::Sent).expect("send");
        assert_eq!(sent.status, DraftStatus::Sent);
    }

    #[test]
    fn cannot_send_a_pending_draft() {
        let (_temp, store) = test_store();
        let draft = store
            .insert_draft("run-1", "CN1", "+15551234567", "On it!")
            .expect("insert");
        let err = store
            .transition(&draft.id, DraftStatus::Sent)
            .expect_err("should fail");
        assert!(matches!(err, DraftStoreError::InvalidTransition { .. }));
    }

    #[test]
    fn rejected_is_terminal() {
        let (_temp, store) = test_store();
        let draft = store
            .insert_draft("run-1", "CN1", "+15551234567", "On it!")
            .expect("insert");
        store
            .transition(&draft.id, DraftStatus::Rejected)
            .expect("reject");
        assert!(store.transition(&draft.id, DraftStatus::Approved).is_err());
        assert!(store.transition(&draft.id, DraftStatus::Sent).is_err());
    }

    #[test]
    fn list_filters_by_status() {
        let (_temp, store) = test_store();
        let first = store
            .insert_draft("run-1", "CN1", "+1", "a")
            .expect("insert");
        store.insert_draft("run-1", "CN2", "+2", "b").expect("insert");
        store
            .transition(&first.id, DraftStatus::Approved)
            .expect("approve");

        let pending = store.list_drafts(Some(DraftStatus::Pending)).expect("list");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].conversation_id, "CN2");

        let all = store.list_drafts(None).expect("list all");
        assert_eq!(all.len(), 2);
    }
}

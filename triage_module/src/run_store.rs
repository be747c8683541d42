//! Run tracking for the batch pipelines.
//!
//! One row per run, mutated once per invocation: the status transition plus
//! a checkpoint overwrite. A `paused` run always carries the page token to
//! resume from; a `completed` run never does.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum RunStoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("run not found: {0}")]
    NotFound(String),
    #[error("unknown run status: {0}")]
    UnknownStatus(String),
    #[error("unknown run source: {0}")]
    UnknownSource(String),
}

/// Which pipeline produced a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunSource {
    Openphone,
    Gmail,
}

impl RunSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunSource::Openphone => "openphone",
            RunSource::Gmail => "gmail",
        }
    }

    fn parse(value: &str) -> Result<Self, RunStoreError> {
        match value {
            "openphone" => Ok(RunSource::Openphone),
            "gmail" => Ok(RunSource::Gmail),
            other => Err(RunStoreError::UnknownSource(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Paused,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Paused => "paused",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    fn parse(value: &str) -> Result<Self, RunStoreError> {
        match value {
            "running" => Ok(RunStatus::Running),
            "paused" => Ok(RunStatus::Paused),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(RunStoreError::UnknownStatus(other.to_string())),
        }
    }
}

/// Opaque progress marker stored as a JSON blob on the run row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Checkpoint {
    pub page_token: Option<String>,
    pub processed: u64,
    pub drafts_created: u64,
    #[serde(default)]
    pub errors: Vec<String>,
    pub last_processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Run {
    pub id: String,
    pub source: RunSource,
    pub start_date: String,
    pub end_date: String,
    pub status: RunStatus,
    pub checkpoint: Checkpoint,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Store for run rows.
#[derive(Debug, Clone)]
pub struct RunStore {
    path: PathBuf,
}

impl RunStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, RunStoreError> {
        let store = Self { path: path.into() };
        let _ = store.open()?;
        Ok(store)
    }

    /// Create a run in `running` state with an empty checkpoint.
    pub fn create_run(
        &self,
        source: RunSource,
        start_date: &str,
        end_date: &str,
    ) -> Result<Run, RunStoreError> {
        let now = Utc::now();
        let run = Run {
            id: Uuid::new_v4().to_string(),
            source,
            start_date: start_date.to_string(),
            end_date: end_date.to_string(),
            status: RunStatus::Running,
            checkpoint: Checkpoint::default(),
            created_at: now,
            updated_at: now,
        };
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO runs (id, source, start_date, end_date, status, checkpoint, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                run.id,
                run.source.as_str(),
                run.start_date,
                run.end_date,
                run.status.as_str(),
                serde_json::to_string(&run.checkpoint)?,
                run.created_at.to_rfc3339(),
                run.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(run)
    }

    pub fn get_run(&self, id: &str) -> Result<Run, RunStoreError> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                "SELECT id, source, start_date, end_date, status, checkpoint, created_at, updated_at
                 FROM runs WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some(columns) => Self::row_to_run(columns),
            None => Err(RunStoreError::NotFound(id.to_string())),
        }
    }

    /// Overwrite status and checkpoint — the single per-invocation mutation.
    pub fn update_run(
        &self,
        id: &str,
        status: RunStatus,
        checkpoint: &Checkpoint,
    ) -> Result<(), RunStoreError> {
        let conn = self.open()?;
        let updated = conn.execute(
            "UPDATE runs SET status = ?2, checkpoint = ?3, updated_at = ?4 WHERE id = ?1",
            params![
                id,
                status.as_str(),
                serde_json::to_string(checkpoint)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        if updated == 0 {
            return Err(RunStoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn list_runs(&self, limit: u32) -> Result<Vec<Run>, RunStoreError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, source, start_date, end_date, status, checkpoint, created_at, updated_at
             FROM runs ORDER BY created_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;

        let mut runs = Vec::new();
        for row in rows {
            runs.push(Self::row_to_run(row?)?);
        }
        Ok(runs)
    }

    #[allow(clippy::type_complexity)]
    fn row_to_run(
        (id, source, start_date, end_date, status, checkpoint, created_at, updated_at): (
            String,
            String,
            String,
            String,
            String,
            String,
            String,
            String,
        ),
    ) -> Result<Run, RunStoreError> {
        Ok(Run {
            id,
            source: RunSource::parse(&source)?,
            start_date,
            end_date,
            status: RunStatus::parse(&status)?,
            checkpoint: serde_json::from_str(&checkpoint)?,
            created_at: parse_datetime(&created_at),
            updated_at: parse_datetime(&updated_at),
        })
    }

    fn open(&self) -> Result<Connection, RunStoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                start_date TEXT NOT NULL,
                end_date TEXT NOT NULL,
                status TEXT NOT NULL,
                checkpoint TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(conn)
    }
}

fn parse_datetime(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, RunStore) {
        let temp = TempDir::new().expect("tempdir");
        let store = RunStore::new(temp.path().join("triage.db")).expect("store");
        (temp, store)
    }

    #[test]
    fn create_and_get_run() {
        let (_temp, store) = test_store();
        let run = store
            .create_run(RunSource::Openphone, "2024-01-01T00:00:00Z", "2024-01-07T00:00:00Z")
            .expect("create");
        assert_eq!(run.status, RunStatus::Running);

        let loaded = store.get_run(&run.id).expect("get");
        assert_eq!(loaded.source, RunSource::Openphone);
        assert_eq!(loaded.start_date, "2024-01-01T00:00:00Z");
        assert!(loaded.checkpoint.page_token.is_none());
    }

    #[test]
    fn update_overwrites_status_and_checkpoint() {
        let (_temp, store) = test_store();
        let run = store
            .create_run(RunSource::Openphone, "a", "b")
            .expect("create");

        let checkpoint = Checkpoint {
            page_token: Some("tok-2".to_string()),
            processed: 25,
            drafts_created: 3,
            errors: vec!["conversation CN9: timeout".to_string()],
            last_processed_at: Some(Utc::now()),
        };
        store
            .update_run(&run.id, RunStatus::Paused, &checkpoint)
            .expect("update");

        let loaded = store.get_run(&run.id).expect("get");
        assert_eq!(loaded.status, RunStatus::Paused);
        assert_eq!(loaded.checkpoint.page_token.as_deref(), Some("tok-2"));
        assert_eq!(loaded.checkpoint.processed, 25);
        assert_eq!(loaded.checkpoint.errors.len(), 1);
    }

    #[test]
    fn get_missing_run_is_not_found() {
        let (_temp, store) = test_store();
        assert!(matches!(
            store.get_run("nope"),
            Err(RunStoreError::NotFound(_))
        ));
    }

    #[test]
    fn list_runs_most_recent_first() {
        let (_temp, store) = test_store();
        for _ in 0..3 {
            store.create_run(RunSource::Gmail, "a", "b").expect("create");
        }
        let runs = store.list_runs(2).expect("list");
        assert_eq!(runs.len(), 2);
    }
}

//! Lightweight operator task list, surfaced on the dashboard next to runs.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use crate::email_log_store::Priority;

#[derive(Debug, thiserror::Error)]
pub enum TaskStoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("task not found: {0}")]
    NotFound(String),
    #[error("unknown task status: {0}")]
    UnknownStatus(String),
    #[error("unknown priority: {0}")]
    UnknownPriority(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Open,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::Done => "done",
        }
    }

    pub fn parse(value: &str) -> Result<Self, TaskStoreError> {
        match value {
            "open" => Ok(TaskStatus::Open),
            "done" => Ok(TaskStatus::Done),
            other => Err(TaskStoreError::UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub notes: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub due_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub notes: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    pub due_date: Option<String>,
}

type TaskColumns = (
    String,
    String,
    Option<String>,
    String,
    String,
    Option<String>,
    String,
    String,
);

#[derive(Debug, Clone)]
pub struct TaskStore {
    path: PathBuf,
}

impl TaskStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, TaskStoreError> {
        let store = Self { path: path.into() };
        let _ = store.open()?;
        Ok(store)
    }

    pub fn create_task(&self, new: &NewTask) -> Result<Task, TaskStoreError> {
        let now = Utc::now().to_rfc3339();
        let task = Task {
            id: Uuid::new_v4().to_string(),
            title: new.title.clone(),
            notes: new.notes.clone(),
            status: TaskStatus::Open,
            priority: new.priority,
            due_date: new.due_date.clone(),
            created_at: now.clone(),
            updated_at: now,
        };
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO tasks (id, title, notes, status, priority, due_date, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                task.id,
                task.title,
                task.notes,
                task.status.as_str(),
                task.priority.as_str(),
                task.due_date,
                task.created_at,
                task.updated_at,
            ],
        )?;
        Ok(task)
    }

    pub fn get_task(&self, id: &str) -> Result<Task, TaskStoreError> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                "SELECT id, title, notes, status, priority, due_date, created_at, updated_at
                 FROM tasks WHERE id = ?1",
                params![id],
                Self::map_row,
            )
            .optional()?;
        match row {
            Some(columns) => Self::to_task(columns),
            None => Err(TaskStoreError::NotFound(id.to_string())),
        }
    }

    pub fn set_status(&self, id: &str, status: TaskStatus) -> Result<Task, TaskStoreError> {
        let conn = self.open()?;
        let updated = conn.execute(
            "UPDATE tasks SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status.as_str(), Utc::now().to_rfc3339()],
        )?;
        if updated == 0 {
            return Err(TaskStoreError::NotFound(id.to_string()));
        }
        self.get_task(id)
    }

    pub fn list_tasks(&self, status: Option<TaskStatus>) -> Result<Vec<Task>, TaskStoreError> {
        let conn = self.open()?;
        let mut tasks = Vec::new();
        match status {
            Some(status) => {
                let mut stmt = conn.prepare(
                    "SELECT id, title, notes, status, priority, due_date, created_at, updated_at
                     FROM tasks WHERE status = ?1 ORDER BY created_at DESC",
                )?;
                let rows = stmt.query_map(params![status.as_str()], Self::map_row)?;
                for row in rows {
                    tasks.push(Self::to_task(row?)?);
                }
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, title, notes, status, priority, due_date, created_at, updated_at
                     FROM tasks ORDER BY created_at DESC",
                )?;
                let rows = stmt.query_map([], Self::map_row)?;
                for row in rows {
                    tasks.push(Self::to_task(row?)?);
                }
            }
        }
        Ok(tasks)
    }

    pub fn delete_task(&self, id: &str) -> Result<bool, TaskStoreError> {
        let conn = self.open()?;
        let deleted = conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskColumns> {
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

    fn to_task(
        (id, title, notes, status, priority, due_date, created_at, updated_at): TaskColumns,
    ) -> Result<Task, TaskStoreError> {
        Ok(Task {
            id,
            title,
            notes,
            status: TaskStatus::parse(&status)?,
            priority: Priority::parse(&priority)
                .map_err(|_| TaskStoreError::UnknownPriority(priority))?,
            due_date,
            created_at,
            updated_at,
        })
    }

    fn open(&self) -> Result<Connection, TaskStoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                notes TEXT,
                status TEXT NOT NULL,
                priority TEXT NOT NULL,
                due_date TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(conn)
    }
}

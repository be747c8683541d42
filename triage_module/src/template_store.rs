//! Canned reply templates for the dashboard's draft editor.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum TemplateStoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("template not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub body: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTemplate {
    pub name: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct TemplateStore {
    path: PathBuf,
}

impl TemplateStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, TemplateStoreError> {
        let store = Self { path: path.into() };
        let _ = store.open()?;
        Ok(store)
    }

    pub fn create_template(&self, new: &NewTemplate) -> Result<Template, TemplateStoreError> {
        let now = Utc::now().to_rfc3339();
        let template = Template {
            id: Uuid::new_v4().to_string(),
            name: new.name.clone(),
            body: new.body.clone(),
            created_at: now.clone(),
            updated_at: now,
        };
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO templates (id, name, body, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                template.id,
                template.name,
                template.body,
                template.created_at,
                template.updated_at,
            ],
        )?;
        Ok(template)
    }

    pub fn update_template(
        &self,
        id: &str,
        name: &str,
        body: &str,
    ) -> Result<Template, TemplateStoreError> {
        let conn = self.open()?;
        let updated = conn.execute(
            "UPDATE templates SET name = ?2, body = ?3, updated_at = ?4 WHERE id = ?1",
            params![id, name, body, Utc::now().to_rfc3339()],
        )?;
        if updated == 0 {
            return Err(TemplateStoreError::NotFound(id.to_string()));
        }
        self.get_template(id)
    }

    pub fn get_template(&self, id: &str) -> Result<Template, TemplateStoreError> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                "SELECT id, name, body, created_at, updated_at FROM templates WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;
        match row {
            Some((id, name, body, created_at, updated_at)) => Ok(Template {
                id,
                name,
                body,
                created_at,
                updated_at,
            }),
            None => Err(TemplateStoreError::NotFound(id.to_string())),
        }
    }

    pub fn list_templates(&self) -> Result<Vec<Template>, TemplateStoreError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, body, created_at, updated_at FROM templates ORDER BY name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        let mut templates = Vec::new();
        for row in rows {
            let (id, name, body, created_at, updated_at) = row?;
            templates.push(Template {
                id,
                name,
                body,
                created_at,
                updated_at,
            });
        }
        Ok(templates)
    }

    pub fn delete_template(&self, id: &str) -> Result<bool, TemplateStoreError> {
        let conn = self.open()?;
        let deleted = conn.execute("DELETE FROM templates WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    fn open(&self) -> Result<Connection, TemplateStoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS templates (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn create_update_delete() {
        let temp = TempDir::new().expect("tempdir");
        let store = TemplateStore::new(temp.path().join("triage.db")).expect("store");

        let template = store
            .create_template(&NewTemplate {
                name: "Thanks".to_string(),
                body: "Thanks for reaching out!".to_string(),
            })
            .expect("create");

        let updated = store
            .update_template(&template.id, "Thanks", "Thanks, we're on it.")
            .expect("update");
        assert_eq!(updated.body, "Thanks, we're on it.");

        assert!(store.delete_template(&template.id).expect("delete"));
        assert!(matches!(
            store.get_template(&template.id),
            Err(TemplateStoreError::NotFound(_))
        ));
    }

    #[test]
    fn list_sorts_by_name() {
        let temp = TempDir::new().expect("tempdir");
        let store = TemplateStore::new(temp.path().join("triage.db")).expect("store");

        for name in ["b", "a"] {
            store
                .create_template(&NewTemplate {
                    name: name.to_string(),
                    body: "x".to_string(),
                })
                .expect("create");
        }
        let templates = store.list_templates().expect("list");
        assert_eq!(templates[0].name, "a");
        assert_eq!(templates[1].name, "b");
    }
}

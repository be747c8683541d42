//! Operator-managed filtering configuration: suppressions (SMS side) and
//! per-account agent rules (Gmail side). Read-only to the pipelines; CRUD
//! happens through the admin API.

use chrono::Utc;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Cap on DB-configured phrase suppressions evaluated per item.
pub const MAX_PHRASE_SUPPRESSIONS: u32 = 200;

#[derive(Debug, thiserror::Error)]
pub enum RuleStoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown suppression kind: {0}")]
    UnknownKind(String),
    #[error("unknown rule type: {0}")]
    UnknownRuleType(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuppressionKind {
    Phone,
    Conversation,
    Phrase,
}

impl SuppressionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuppressionKind::Phone => "phone",
            SuppressionKind::Conversation => "conversation",
            SuppressionKind::Phrase => "phrase",
        }
    }

    pub fn parse(value: &str) -> Result<Self, RuleStoreError> {
        match value {
            "phone" => Ok(SuppressionKind::Phone),
            "conversation" => Ok(SuppressionKind::Conversation),
            "phrase" => Ok(SuppressionKind::Phrase),
            other => Err(RuleStoreError::UnknownKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Suppression {
    pub id: i64,
    pub kind: SuppressionKind,
    pub value: String,
    pub reason: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    SkipSender,
    SkipSubject,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::SkipSender => "skip_sender",
            RuleType::SkipSubject => "skip_subject",
        }
    }

    pub fn parse(value: &str) -> Result<Self, RuleStoreError> {
        match value {
            "skip_sender" => Ok(RuleType::SkipSender),
            "skip_subject" => Ok(RuleType::SkipSubject),
            other => Err(RuleStoreError::UnknownRuleType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentRule {
    pub id: i64,
    pub gmail_account_id: String,
    pub rule_type: RuleType,
    pub pattern: String,
    pub is_enabled: bool,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct RuleStore {
    path: PathBuf,
}

impl RuleStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, RuleStoreError> {
        let store = Self { path: path.into() };
        let _ = store.open()?;
        Ok(store)
    }

    pub fn add_suppression(
        &self,
        kind: SuppressionKind,
        value: &str,
        reason: Option<&str>,
    ) -> Result<i64, RuleStoreError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO suppressions (kind, value, reason, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![kind.as_str(), value, reason, Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn delete_suppression(&self, id: i64) -> Result<bool, RuleStoreError> {
        let conn = self.open()?;
        let deleted = conn.execute("DELETE FROM suppressions WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    pub fn list_suppressions(&self) -> Result<Vec<Suppression>, RuleStoreError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, kind, value, reason, created_at FROM suppressions ORDER BY id",
        )?;
        let rows = stmt.query_map([], Self::map_suppression)?;
        let mut suppressions = Vec::new();
        for row in rows {
            let (id, kind, value, reason, created_at) = row?;
            suppressions.push(Suppression {
                id,
                kind: SuppressionKind::parse(&kind)?,
                value,
                reason,
                created_at,
            });
        }
        Ok(suppressions)
    }

    /// List suppression values of one kind, lowercased for matching.
    /// Phrase lookups are capped at [`MAX_PHRASE_SUPPRESSIONS`].
    pub fn list_values_by_kind(
        &self,
        kind: SuppressionKind,
    ) -> Result<Vec<String>, RuleStoreError> {
        let conn = self.open()?;
        let limit = match kind {
            SuppressionKind::Phrase => MAX_PHRASE_SUPPRESSIONS,
            _ => u32::MAX,
        };
        let mut stmt = conn.prepare(
            "SELECT value FROM suppressions WHERE kind = ?1 ORDER BY id LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![kind.as_str(), limit], |row| {
            row.get::<_, String>(0)
        })?;
        let mut values = Vec::new();
        for row in rows {
            values.push(row?.to_lowercase());
        }
        Ok(values)
    }

    pub fn add_rule(
        &self,
        gmail_account_id: &str,
        rule_type: RuleType,
        pattern: &str,
        is_enabled: bool,
    ) -> Result<i64, RuleStoreError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO agent_rules (gmail_account_id, rule_type, pattern, is_enabled, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                gmail_account_id,
                rule_type.as_str(),
                pattern,
                is_enabled,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn delete_rule(&self, id: i64) -> Result<bool, RuleStoreError> {
        let conn = self.open()?;
        let deleted = conn.execute("DELETE FROM agent_rules WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// Enabled rules for one account, in insertion order.
    pub fn list_enabled_rules(
        &self,
        gmail_account_id: &str,
    ) -> Result<Vec<AgentRule>, RuleStoreError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, gmail_account_id, rule_type, pattern, is_enabled, created_at
             FROM agent_rules WHERE gmail_account_id = ?1 AND is_enabled = 1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![gmail_account_id], Self::map_rule)?;
        let mut rules = Vec::new();
        for row in rows {
            let (id, gmail_account_id, rule_type, pattern, is_enabled, created_at) = row?;
            rules.push(AgentRule {
                id,
                gmail_account_id,
                rule_type: RuleType::parse(&rule_type)?,
                pattern,
                is_enabled,
                created_at,
            });
        }
        Ok(rules)
    }

    pub fn list_rules(&self) -> Result<Vec<AgentRule>, RuleStoreError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, gmail_account_id, rule_type, pattern, is_enabled, created_at
             FROM agent_rules ORDER BY id",
        )?;
        let rows = stmt.query_map([], Self::map_rule)?;
        let mut rules = Vec::new();
        for row in rows {
            let (id, gmail_account_id, rule_type, pattern, is_enabled, created_at) = row?;
            rules.push(AgentRule {
                id,
                gmail_account_id,
                rule_type: RuleType::parse(&rule_type)?,
                pattern,
                is_enabled,
                created_at,
            });
        }
        Ok(rules)
    }

    #[allow(clippy::type_complexity)]
    fn map_suppression(
        row: &rusqlite::Row<'_>,
    ) -> rusqlite::Result<(i64, String, String, Option<String>, String)> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
        ))
    }

    #[allow(clippy::type_complexity)]
    fn map_rule(
        row: &rusqlite::Row<'_>,
    ) -> rusqlite::Result<(i64, String, String, String, bool, String)> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
        ))
    }

    fn open(&self) -> Result<Connection, RuleStoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS suppressions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                value TEXT NOT NULL,
                reason TEXT,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS agent_rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                gmail_account_id TEXT NOT NULL,
                rule_type TEXT NOT NULL,
                pattern TEXT NOT NULL,
                is_enabled INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );",
        )?;
        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, RuleStore) {
        let temp = TempDir::new().expect("tempdir");
        let store = RuleStore::new(temp.path().join("triage.db")).expect("store");
        (temp, store)
    }

    #[test]
    fn suppressions_round_trip_by_kind() {
        let (_temp, store) = test_store();
        store
            .add_suppression(SuppressionKind::Phone, "+15550001111", Some("opted out"))
            .expect("add");
        store
            .add_suppression(SuppressionKind::Phrase, "UNSUBSCRIBE", None)
            .expect("add");

        let phones = store
            .list_values_by_kind(SuppressionKind::Phone)
            .expect("list");
        assert_eq!(phones, vec!["+15550001111".to_string()]);

        // Values are lowercased for case-insensitive matching.
        let phrases = store
            .list_values_by_kind(SuppressionKind::Phrase)
            .expect("list");
        assert_eq!(phrases, vec!["unsubscribe".to_string()]);
    }

    #[test]
    fn delete_suppression_by_id() {
        let (_temp, store) = test_store();
        let id = store
            .add_suppression(SuppressionKind::Conversation, "CN9", None)
            .expect("add");
        assert!(store.delete_suppression(id).expect("delete"));
        assert!(store.list_suppressions().expect("list").is_empty());
    }

    #[test]
    fn only_enabled_rules_are_listed_for_account() {
        let (_temp, store) = test_store();
        store
            .add_rule("acct-1", RuleType::SkipSender, "noreply@acme.test", true)
            .expect("add");
        store
            .add_rule("acct-1", RuleType::SkipSubject, "newsletter", false)
            .expect("add");
        store
            .add_rule("acct-2", RuleType::SkipSender, "spam@other.test", true)
            .expect("add");

        let rules = store.list_enabled_rules("acct-1").expect("list");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].rule_type, RuleType::SkipSender);
        assert_eq!(rules[0].pattern, "noreply@acme.test");
    }
}

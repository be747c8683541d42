//! Gmail accounts enrolled in triage. Each account carries its own
//! signature and lookback override; credentials stay in the environment,
//! keyed by account id.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum AccountStoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("gmail account not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmailAccount {
    pub id: String,
    pub email_address: String,
    pub display_name: Option<String>,
    pub signature: Option<String>,
    pub lookback_days: Option<u32>,
    pub is_enabled: bool,
}

type AccountColumns = (
    String,
    String,
    Option<String>,
    Option<String>,
    Option<u32>,
    bool,
);

#[derive(Debug, Clone)]
pub struct AccountStore {
    path: PathBuf,
}

impl AccountStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, AccountStoreError> {
        let store = Self { path: path.into() };
        let _ = store.open()?;
        Ok(store)
    }

    /// Insert or replace an account by id.
    pub fn upsert_account(&self, account: &GmailAccount) -> Result<(), AccountStoreError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO gmail_accounts (id, email_address, display_name, signature, lookback_days, is_enabled, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                email_address = excluded.email_address,
                display_name = excluded.display_name,
                signature = excluded.signature,
                lookback_days = excluded.lookback_days,
                is_enabled = excluded.is_enabled,
                updated_at = excluded.updated_at",
            params![
                account.id,
                account.email_address,
                account.display_name,
                account.signature,
                account.lookback_days,
                account.is_enabled,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_account(&self, id: &str) -> Result<GmailAccount, AccountStoreError> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                "SELECT id, email_address, display_name, signature, lookback_days, is_enabled
                 FROM gmail_accounts WHERE id = ?1",
                params![id],
                Self::map_row,
            )
            .optional()?;
        match row {
            Some(columns) => Ok(Self::to_account(columns)),
            None => Err(AccountStoreError::NotFound(id.to_string())),
        }
    }

    pub fn list_enabled(&self) -> Result<Vec<GmailAccount>, AccountStoreError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, email_address, display_name, signature, lookback_days, is_enabled
             FROM gmail_accounts WHERE is_enabled = 1 ORDER BY id",
        )?;
        let rows = stmt.query_map([], Self::map_row)?;
        let mut accounts = Vec::new();
        for row in rows {
            accounts.push(Self::to_account(row?));
        }
        Ok(accounts)
    }

    pub fn list_accounts(&self) -> Result<Vec<GmailAccount>, AccountStoreError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, email_address, display_name, signature, lookback_days, is_enabled
             FROM gmail_accounts ORDER BY id",
        )?;
        let rows = stmt.query_map([], Self::map_row)?;
        let mut accounts = Vec::new();
        for row in rows {
            accounts.push(Self::to_account(row?));
        }
        Ok(accounts)
    }

    pub fn delete_account(&self, id: &str) -> Result<bool, AccountStoreError> {
        let conn = self.open()?;
        let deleted = conn.execute("DELETE FROM gmail_accounts WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AccountColumns> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
        ))
    }

    fn to_account(
        (id, email_address, display_name, signature, lookback_days, is_enabled): AccountColumns,
    ) -> GmailAccount {
        GmailAccount {
            id,
            email_address,
            display_name,
            signature,
            lookback_days,
            is_enabled,
        }
    }

    fn open(&self) -> Result<Connection, AccountStoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS gmail_accounts (
                id TEXT PRIMARY KEY,
                email_address TEXT NOT NULL,
                display_name TEXT,
                signature TEXT,
                lookback_days INTEGER,
                is_enabled INTEGER NOT NULL DEFAULT 1,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(conn)
    }
}

//! Local durable store for chat history
//!
//! Crash-safe CRUD over [`ChatRecord`]s on embedded SQLite: one record
//! table keyed by chat id plus a secondary index on creation time, which
//! serves both recency listing and the retention purge. Every operation is
//! best-effort from the UI's perspective: a failed save loses the persisted
//! copy only, never the in-memory chat.

use crate::error::{IdeascopeError, Result};
use crate::session::{ChatRecord, MessageRecord};
use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;

pub mod types;
pub use types::{ChatSummary, Cursor};

/// Storage backend for chat history
#[derive(Debug, Clone)]
pub struct ChatStore {
    db_path: PathBuf,
}

/// Fixed-width RFC 3339 so the `created_at` index sorts chronologically.
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl ChatStore {
    /// Create a new store instance
    ///
    /// Resolves the database path from the `IDEASCOPE_HISTORY_DB`
    /// environment variable if set, otherwise the user's data directory,
    /// then initializes the schema.
    ///
    /// # Errors
    ///
    /// Returns `IdeascopeError::Storage` when the environment disallows
    /// persistent storage (no resolvable data directory, or the database
    /// cannot be created).
    pub fn new() -> Result<Self> {
        if let Ok(override_path) = std::env::var(crate::config::HISTORY_DB_ENV) {
            return Self::new_with_path(override_path);
        }

        let proj_dirs = ProjectDirs::from("io", "ideascope", "ideascope").ok_or_else(|| {
            IdeascopeError::Storage("storage unavailable: could not determine data directory".into())
        })?;

        let data_dir = proj_dirs.data_dir();
        std::fs::create_dir_all(data_dir)
            .context("Failed to create data directory")
            .map_err(|e| IdeascopeError::Storage(e.to_string()))?;

        let db_path = data_dir.join("history.db");
        let store = Self { db_path };
        store.initialize()?;
        Ok(store)
    }

    /// Create a new store instance at the specified database path
    ///
    /// Primarily useful for tests where the default application data
    /// directory is not desirable.
    ///
    /// # Examples
    ///
    /// ```
    /// use ideascope::storage::ChatStore;
    ///
    /// let store = ChatStore::new_with_path("/tmp/ideascope_doc_test.db").unwrap();
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create parent directory for database")
                .map_err(|e| IdeascopeError::Storage(e.to_string()))?;
        }

        let store = Self { db_path };
        store.initialize()?;
        Ok(store)
    }

    /// Initialize the database schema
    ///
    /// Idempotent: creates the record table and the creation-time index if
    /// absent.
    fn initialize(&self) -> Result<()> {
        let conn = self.open()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS chats (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL,
                summary TEXT,
                messages JSON NOT NULL
            )",
            [],
        )
        .context("Failed to create chats table")
        .map_err(|e| IdeascopeError::Storage(e.to_string()))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_chats_created_at
                ON chats (created_at, id)",
            [],
        )
        .context("Failed to create created_at index")
        .map_err(|e| IdeascopeError::Storage(e.to_string()))?;

        Ok(())
    }

    fn open(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .context("Failed to open database")
            .map_err(|e| IdeascopeError::Storage(format!("storage unavailable: {e}")).into())
    }

    /// Save a chat, overwriting any existing entry with the same id
    ///
    /// Whole-record overwrite inside a transaction: a concurrent reader
    /// never observes a half-written record.
    ///
    /// # Errors
    ///
    /// Returns `IdeascopeError::Validation` for a chat with zero messages,
    /// before any I/O; `IdeascopeError::Storage` on database failure.
    pub fn upsert(&self, chat: &ChatRecord) -> Result<()> {
        if chat.messages.is_empty() {
            return Err(
                IdeascopeError::Validation("refusing to save a chat with no messages".into())
                    .into(),
            );
        }

        let messages_json = serde_json::to_string(&chat.messages)
            .context("Failed to serialize messages")
            .map_err(|e| IdeascopeError::Storage(e.to_string()))?;
        let created_at = format_ts(chat.created_at);

        let mut conn = self.open()?;
        let tx = conn
            .transaction()
            .context("Failed to start transaction")
            .map_err(|e| IdeascopeError::Storage(e.to_string()))?;

        let exists: bool = tx
            .query_row("SELECT 1 FROM chats WHERE id = ?", params![chat.id], |_| {
                Ok(true)
            })
            .optional()
            .unwrap_or(Some(false))
            .unwrap_or(false);

        if exists {
            tx.execute(
                "UPDATE chats SET
                    title = ?,
                    created_at = ?,
                    summary = ?,
                    messages = ?
                WHERE id = ?",
                params![chat.title, created_at, chat.summary, messages_json, chat.id],
            )
            .context("Failed to update chat")
            .map_err(|e| IdeascopeError::Storage(e.to_string()))?;
        } else {
            tx.execute(
                "INSERT INTO chats (id, title, created_at, summary, messages)
                VALUES (?, ?, ?, ?, ?)",
                params![chat.id, chat.title, created_at, chat.summary, messages_json],
            )
            .context("Failed to insert chat")
            .map_err(|e| IdeascopeError::Storage(e.to_string()))?;
        }

        tx.commit()
            .context("Failed to commit transaction")
            .map_err(|e| IdeascopeError::Storage(e.to_string()))?;

        Ok(())
    }

    /// Load a chat by id (full id or 8-char prefix)
    ///
    /// Returns `Ok(None)` on a normal miss; never an error. The
    /// reconstructed record always has an empty result list, and its
    /// messages are in non-decreasing timestamp order.
    pub fn get(&self, id: &str) -> Result<Option<ChatRecord>> {
        let conn = self.open()?;

        let (query, search_param) = if id.len() == 36 {
            (
                "SELECT id, title, created_at, summary, messages FROM chats WHERE id = ?",
                id.to_string(),
            )
        } else {
            (
                "SELECT id, title, created_at, summary, messages FROM chats WHERE id LIKE ?",
                format!("{id}%"),
            )
        };

        let row = conn
            .query_row(query, params![search_param], |row| {
                let id: String = row.get(0)?;
                let title: String = row.get(1)?;
                let created_at: String = row.get(2)?;
                let summary: Option<String> = row.get(3)?;
                let messages_json: String = row.get(4)?;
                Ok((id, title, created_at, summary, messages_json))
            })
            .optional()
            .context("Failed to query chat")
            .map_err(|e| IdeascopeError::Storage(e.to_string()))?;

        match row {
            Some((id, title, created_at, summary, messages_json)) => {
                let created_at = DateTime::parse_from_rfc3339(&created_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| {
                        IdeascopeError::Storage(format!("corrupt created_at for chat {id}: {e}"))
                    })?;
                let mut messages: Vec<MessageRecord> = serde_json::from_str(&messages_json)
                    .context("Failed to deserialize messages")
                    .map_err(|e| IdeascopeError::Storage(e.to_string()))?;
                messages.sort_by_key(|m| m.timestamp);

                Ok(Some(ChatRecord {
                    id,
                    title,
                    created_at,
                    messages,
                    summary,
                    results: Vec::new(),
                }))
            }
            None => Ok(None),
        }
    }

    /// List up to `limit` chats ordered by creation time descending
    ///
    /// Pass the returned cursor back in to resume the scan after the last
    /// seen key instead of re-scanning from the start. The next-cursor is
    /// `None` once the page comes back short.
    pub fn list_recent(
        &self,
        limit: usize,
        cursor: Option<&Cursor>,
    ) -> Result<(Vec<ChatSummary>, Option<Cursor>)> {
        let conn = self.open()?;

        let mut stmt = conn
            .prepare(match cursor {
                Some(_) => {
                    "SELECT id, title, created_at, messages FROM chats
                        WHERE created_at < ?1 OR (created_at = ?1 AND id < ?2)
                        ORDER BY created_at DESC, id DESC
                        LIMIT ?3"
                }
                None => {
                    "SELECT id, title, created_at, messages FROM chats
                        ORDER BY created_at DESC, id DESC
                        LIMIT ?1"
                }
            })
            .context("Failed to prepare statement")
            .map_err(|e| IdeascopeError::Storage(e.to_string()))?;

        let map_row = |row: &rusqlite::Row<'_>| {
            let id: String = row.get(0)?;
            let title: String = row.get(1)?;
            let created_at: String = row.get(2)?;
            let messages_json: String = row.get(3)?;
            Ok((id, title, created_at, messages_json))
        };

        let rows: Vec<(String, String, String, String)> = match cursor {
            Some(c) => stmt
                .query_map(params![c.created_at, c.id, limit as i64], map_row)
                .context("Failed to query chats")
                .map_err(|e| IdeascopeError::Storage(e.to_string()))?
                .collect::<rusqlite::Result<_>>()
                .context("Failed to read chat rows")
                .map_err(|e| IdeascopeError::Storage(e.to_string()))?,
            None => stmt
                .query_map(params![limit as i64], map_row)
                .context("Failed to query chats")
                .map_err(|e| IdeascopeError::Storage(e.to_string()))?
                .collect::<rusqlite::Result<_>>()
                .context("Failed to read chat rows")
                .map_err(|e| IdeascopeError::Storage(e.to_string()))?,
        };

        let page_full = rows.len() == limit;
        let next_cursor = if page_full {
            rows.last().map(|(id, _, created_at, _)| Cursor {
                created_at: created_at.clone(),
                id: id.clone(),
            })
        } else {
            None
        };

        let mut summaries = Vec::with_capacity(rows.len());
        for (id, title, created_at_raw, messages_json) in rows {
            let created_at = match DateTime::parse_from_rfc3339(&created_at_raw) {
                Ok(dt) => dt.with_timezone(&Utc),
                Err(e) => {
                    tracing::warn!("skipping chat {} with corrupt created_at: {}", id, e);
                    continue;
                }
            };
            // Cheap count via the JSON array, not the full message structs.
            let message_count = serde_json::from_str::<serde_json::Value>(&messages_json)
                .ok()
                .and_then(|v| v.as_array().map(|a| a.len()))
                .unwrap_or(0);

            summaries.push(ChatSummary {
                id,
                title,
                created_at,
                message_count,
            });
        }

        Ok((summaries, next_cursor))
    }

    /// Delete a chat (full id or 8-char prefix)
    ///
    /// Idempotent: deleting a missing id is not an error.
    pub fn delete(&self, id: &str) -> Result<()> {
        let conn = self.open()?;

        let (query, param) = if id.len() == 36 {
            ("DELETE FROM chats WHERE id = ?", id.to_string())
        } else {
            ("DELETE FROM chats WHERE id LIKE ?", format!("{id}%"))
        };

        conn.execute(query, params![param])
            .context("Failed to delete chat")
            .map_err(|e| IdeascopeError::Storage(e.to_string()))?;

        Ok(())
    }

    /// Delete every chat created before `cutoff`
    ///
    /// Walks the creation-time index ascending and stops at the first
    /// parseable record at or past the cutoff, so old databases pay only
    /// for the expired prefix. Rows whose timestamp cannot be parsed are
    /// skipped, never deleted. Returns the number of chats purged.
    pub fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut conn = self.open()?;

        let mut expired: Vec<String> = Vec::new();
        {
            let mut stmt = conn
                .prepare("SELECT id, created_at FROM chats ORDER BY created_at ASC, id ASC")
                .context("Failed to prepare purge scan")
                .map_err(|e| IdeascopeError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map([], |row| {
                    let id: String = row.get(0)?;
                    let created_at: String = row.get(1)?;
                    Ok((id, created_at))
                })
                .context("Failed to scan chats")
                .map_err(|e| IdeascopeError::Storage(e.to_string()))?;

            for row in rows {
                let (id, created_at_raw) = row
                    .context("Failed to read purge row")
                    .map_err(|e| IdeascopeError::Storage(e.to_string()))?;
                let created_at = match DateTime::parse_from_rfc3339(&created_at_raw) {
                    Ok(dt) => dt.with_timezone(&Utc),
                    Err(e) => {
                        tracing::warn!("purge skipping unparseable chat {}: {}", id, e);
                        continue;
                    }
                };
                if created_at >= cutoff {
                    break;
                }
                expired.push(id);
            }
        }

        if expired.is_empty() {
            return Ok(0);
        }

        let tx = conn
            .transaction()
            .context("Failed to start purge transaction")
            .map_err(|e| IdeascopeError::Storage(e.to_string()))?;
        for id in &expired {
            tx.execute("DELETE FROM chats WHERE id = ?", params![id])
                .context("Failed to delete expired chat")
                .map_err(|e| IdeascopeError::Storage(e.to_string()))?;
        }
        tx.commit()
            .context("Failed to commit purge")
            .map_err(|e| IdeascopeError::Storage(e.to_string()))?;

        tracing::info!("purged {} expired chats", expired.len());
        Ok(expired.len())
    }

    /// Retention pass: purge chats older than `retention_days`
    pub fn purge_expired(&self, retention_days: i64) -> Result<usize> {
        let cutoff = Utc::now() - chrono::Duration::days(retention_days);
        self.purge_older_than(cutoff)
    }
}

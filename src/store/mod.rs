// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! SQLite persistence layer.
//!
//! Two stores share one database file: [`DocumentStore`] for documents and
//! their embeddings, [`ConversationStore`] for conversations and messages.
//! Each store holds its own connection; WAL mode keeps them from blocking
//! each other.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::error::StoreError;

pub mod conversations;
pub mod documents;

pub use conversations::ConversationStore;
pub use documents::DocumentStore;

/// Open a connection with the pragmas every store relies on.
///
/// Foreign keys must be on for message cascade deletes to work; SQLite
/// defaults them off per connection. The busy timeout makes the two writer
/// connections sharing one file wait for the WAL write lock instead of
/// failing with SQLITE_BUSY.
pub(crate) fn open_connection(db_path: &Path) -> Result<Connection, StoreError> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::QueryFailed(format!("Failed to create database directory: {}", e))
            })?;
        }
    }

    let conn = Connection::open(db_path)
        .map_err(|e| StoreError::QueryFailed(format!("Failed to open database: {}", e)))?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )
    .map_err(|e| StoreError::QueryFailed(format!("Failed to set pragmas: {}", e)))?;

    Ok(conn)
}

/// Current time as epoch milliseconds, the storage format for timestamps.
pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert stored epoch milliseconds back to a UTC timestamp.
pub(crate) fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_parent_directory() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("nested").join("test.db");
        let conn = open_connection(&db_path).unwrap();

        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn test_busy_timeout_is_set() {
        let temp = TempDir::new().unwrap();
        let conn = open_connection(&temp.path().join("test.db")).unwrap();

        let timeout: i64 = conn
            .query_row("PRAGMA busy_timeout", [], |row| row.get(0))
            .unwrap();
        assert_eq!(timeout, 5000);
    }

    #[test]
    fn test_millis_round_trip() {
        let now = now_millis();
        let ts = millis_to_datetime(now);
        assert_eq!(ts.timestamp_millis(), now);
    }
}

// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Conversation and message storage.
//!
//! Messages belong to exactly one conversation and cascade-delete with it.
//! Adding a message bumps the parent conversation's updated_at, which drives
//! the recency ordering of [`ConversationStore::get_recent_conversations`].

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreError;
use crate::types::{Conversation, DocumentSource, Message, Role};

use super::{millis_to_datetime, now_millis, open_connection};

/// SQLite-backed conversation store.
pub struct ConversationStore {
    conn: Connection,
}

impl ConversationStore {
    /// Open or create a conversation store at the given path.
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        let conn = open_connection(db_path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                role TEXT NOT NULL CHECK(role IN ('user', 'assistant')),
                content TEXT NOT NULL,
                sources TEXT NOT NULL DEFAULT '[]',
                created_at INTEGER NOT NULL,
                FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_conversations_updated_at
                ON conversations(updated_at DESC);
            CREATE INDEX IF NOT EXISTS idx_messages_conversation
                ON messages(conversation_id, created_at);
            "#,
        )?;
        Ok(())
    }

    /// Create a new empty conversation.
    pub fn create_conversation(&self) -> Result<Conversation, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_millis();

        self.conn.execute(
            "INSERT INTO conversations (id, created_at, updated_at) VALUES (?1, ?2, ?3)",
            params![id, now, now],
        )?;

        Ok(Conversation {
            id,
            created_at: millis_to_datetime(now),
            updated_at: millis_to_datetime(now),
        })
    }

    /// Look up a conversation by id.
    pub fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, created_at, updated_at FROM conversations WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Conversation {
                        id: row.get(0)?,
                        created_at: millis_to_datetime(row.get(1)?),
                        updated_at: millis_to_datetime(row.get(2)?),
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Append a message to a conversation and bump the conversation's
    /// updated_at. Fails with [`StoreError::NotFound`] when the conversation
    /// does not exist.
    pub fn add_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
        sources: &[DocumentSource],
    ) -> Result<Message, StoreError> {
        let exists: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM conversations WHERE id = ?1",
                params![conversation_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::NotFound(format!(
                "Conversation {} not found",
                conversation_id
            )));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = now_millis();
        let sources_json = serde_json::to_string(sources)?;

        self.conn.execute(
            "INSERT INTO messages (id, conversation_id, role, content, sources, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, conversation_id, role.as_str(), content, sources_json, now],
        )?;

        self.conn.execute(
            "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
            params![now, conversation_id],
        )?;

        Ok(Message {
            id,
            conversation_id: conversation_id.to_string(),
            role,
            content: content.to_string(),
            sources: sources.to_vec(),
            created_at: millis_to_datetime(now),
        })
    }

    /// All messages of a conversation, oldest first. Insertion order is kept
    /// even for same-millisecond writes via the rowid tiebreak.
    pub fn get_messages(&self, conversation_id: &str) -> Result<Vec<Message>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, conversation_id, role, content, sources, created_at
             FROM messages WHERE conversation_id = ?1
             ORDER BY created_at ASC, rowid ASC",
        )?;

        let rows = stmt
            .query_map(params![conversation_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, conversation_id, role, content, sources_json, created_at)| {
                let role = Role::parse(&role).ok_or_else(|| {
                    StoreError::Serialization(format!("Unknown message role: {}", role))
                })?;
                let sources: Vec<DocumentSource> = serde_json::from_str(&sources_json)?;
                Ok(Message {
                    id,
                    conversation_id,
                    role,
                    content,
                    sources,
                    created_at: millis_to_datetime(created_at),
                })
            })
            .collect()
    }

    /// A conversation together with its full message history.
    pub fn get_conversation_with_messages(
        &self,
        id: &str,
    ) -> Result<Option<(Conversation, Vec<Message>)>, StoreError> {
        let Some(conversation) = self.get_conversation(id)? else {
            return Ok(None);
        };
        let messages = self.get_messages(id)?;
        Ok(Some((conversation, messages)))
    }

    /// Delete a conversation and its messages. Returns false when it did not
    /// exist.
    pub fn delete_conversation(&self, id: &str) -> Result<bool, StoreError> {
        // Messages go with it via CASCADE.
        let rows = self
            .conn
            .execute("DELETE FROM conversations WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// Conversations ordered by most recent activity.
    pub fn get_recent_conversations(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Conversation>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, created_at, updated_at FROM conversations
             ORDER BY updated_at DESC LIMIT ?1 OFFSET ?2",
        )?;

        let rows = stmt
            .query_map(params![limit as i64, offset as i64], |row| {
                Ok(Conversation {
                    id: row.get(0)?,
                    created_at: millis_to_datetime(row.get(1)?),
                    updated_at: millis_to_datetime(row.get(2)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    #[cfg(test)]
    pub(crate) fn message_count(&self, conversation_id: &str) -> Result<u64, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
            params![conversation_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    #[cfg(test)]
    pub(crate) fn raw_message_count(&self) -> Result<u64, StoreError> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Document storage and similarity search.
//!
//! Embeddings are stored as JSON number arrays in a TEXT column. The encoding
//! is an internal detail; [`encode_vector`] and [`parse_vector`] are the only
//! two places that know about it.
//!
//! Similarity search ranks all embedded documents by cosine similarity,
//! truncates to the requested limit, and only then applies the threshold
//! filter. A query can therefore return fewer results than relevant documents
//! exist, because low-scoring entries inside the top window are dropped
//! without being replaced. Callers rely on this window-then-filter order.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreError;
use crate::types::{Document, Metadata, VectorSearchResult};

use super::{millis_to_datetime, now_millis, open_connection};

/// SQLite-backed document store.
pub struct DocumentStore {
    conn: Connection,
}

impl DocumentStore {
    /// Open or create a document store at the given path.
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        let conn = open_connection(db_path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                embedding TEXT,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_documents_created_at ON documents(created_at);
            "#,
        )?;
        Ok(())
    }

    /// Insert a new document, generating its id and timestamps.
    pub fn create(
        &self,
        content: &str,
        embedding: Option<&[f32]>,
        metadata: Metadata,
    ) -> Result<Document, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_millis();
        let embedding_text = embedding.map(encode_vector);
        let metadata_text = serde_json::to_string(&metadata)?;

        self.conn.execute(
            "INSERT INTO documents (id, content, embedding, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, content, embedding_text, metadata_text, now, now],
        )?;

        Ok(Document {
            id,
            content: content.to_string(),
            embedding: embedding.map(|e| e.to_vec()),
            metadata,
            created_at: millis_to_datetime(now),
            updated_at: millis_to_datetime(now),
        })
    }

    /// Look up a document by id.
    pub fn find_by_id(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, content, embedding, metadata, created_at, updated_at
                 FROM documents WHERE id = ?1",
                params![id],
                map_document_row,
            )
            .optional()?;

        row.map(finish_document_row).transpose()
    }

    /// List documents, newest first. Same-millisecond inserts fall back to
    /// the rowid so pagination stays stable.
    pub fn find_all(&self, limit: usize, offset: usize) -> Result<Vec<Document>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, content, embedding, metadata, created_at, updated_at
             FROM documents ORDER BY created_at DESC, rowid DESC LIMIT ?1 OFFSET ?2",
        )?;

        let rows = stmt
            .query_map(params![limit as i64, offset as i64], map_document_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(finish_document_row).collect()
    }

    /// Replace a document's embedding and touch its updated_at.
    pub fn update_embedding(&self, id: &str, embedding: &[f32]) -> Result<Document, StoreError> {
        let rows = self.conn.execute(
            "UPDATE documents SET embedding = ?1, updated_at = ?2 WHERE id = ?3",
            params![encode_vector(embedding), now_millis(), id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("Document {} not found", id)));
        }
        self.find_by_id(id)?
            .ok_or_else(|| StoreError::NotFound(format!("Document {} not found", id)))
    }

    /// Delete a document. Returns false when it did not exist.
    pub fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let rows = self
            .conn
            .execute("DELETE FROM documents WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// Number of stored documents, embedded or not.
    pub fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Remove documents that never received an embedding. Returns how many
    /// were deleted.
    pub fn delete_missing_embeddings(&self) -> Result<usize, StoreError> {
        let rows = self
            .conn
            .execute("DELETE FROM documents WHERE embedding IS NULL", [])?;
        Ok(rows)
    }

    /// Rank embedded documents against the query vector.
    ///
    /// Takes the `limit` highest-similarity documents first, then drops those
    /// below `threshold`. Documents without embeddings never participate.
    pub fn vector_search(
        &self,
        query: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<VectorSearchResult>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, content, embedding, metadata FROM documents
             WHERE embedding IS NOT NULL",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut scored: Vec<VectorSearchResult> = Vec::with_capacity(rows.len());
        for (id, content, embedding_text, metadata_text) in rows {
            let embedding = parse_vector(&embedding_text)?;
            let metadata: Metadata = serde_json::from_str(&metadata_text)?;
            let similarity = cosine_similarity(query, &embedding);
            scored.push(VectorSearchResult {
                id,
                content,
                metadata,
                similarity,
            });
        }

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        scored.retain(|r| r.similarity >= threshold);

        Ok(scored)
    }
}

/// Encode a vector into its stored text form.
fn encode_vector(embedding: &[f32]) -> String {
    let parts: Vec<String> = embedding.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(","))
}

/// Parse the stored text form back into a vector.
fn parse_vector(text: &str) -> Result<Vec<f32>, StoreError> {
    serde_json::from_str(text).map_err(|e| {
        StoreError::Serialization(format!("Invalid stored embedding: {}", e))
    })
}

/// Cosine similarity between two vectors. Zero for mismatched lengths or
/// zero-magnitude input.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

type DocumentRow = (String, String, Option<String>, String, i64, i64);

fn map_document_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn finish_document_row(row: DocumentRow) -> Result<Document, StoreError> {
    let (id, content, embedding_text, metadata_text, created_at, updated_at) = row;
    let embedding = embedding_text.as_deref().map(parse_vector).transpose()?;
    let metadata: Metadata = serde_json::from_str(&metadata_text)?;

    Ok(Document {
        id,
        content,
        embedding,
        metadata,
        created_at: millis_to_datetime(created_at),
        updated_at: millis_to_datetime(updated_at),
    })
}

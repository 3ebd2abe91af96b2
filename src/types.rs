// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Core type definitions shared across the service.
//!
//! The data model has three persistent shapes (documents, conversations,
//! messages) plus the transient shapes flowing through the RAG pipeline
//! (search results, chat messages, token usage, ingestion outcomes).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Open key/value metadata attached to documents and sources.
pub type Metadata = Map<String, Value>;

/// A stored document with optional embedding.
///
/// The embedding is either absent (not yet computed) or has exactly the
/// configured dimension. Documents without embeddings are excluded from
/// similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub content: String,
    pub embedding: Option<Vec<f32>>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A conversation. Messages are stored separately and cascade-deleted with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Role of a persisted conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A persisted message. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    /// Source snapshots attached at answer time. Empty for user messages.
    pub sources: Vec<DocumentSource>,
    pub created_at: DateTime<Utc>,
}

/// Point-in-time snapshot of a retrieved document, attached to an assistant
/// message. Does not track back to the live document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSource {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
    pub similarity: f32,
}

/// A similarity search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorSearchResult {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
    pub similarity: f32,
}

/// A single turn handed to the completion provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Token accounting reported by the completion provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Result of a chat completion.
#[derive(Debug, Clone)]
pub struct CompletionResult {
    pub content: String,
    pub usage: TokenUsage,
}

/// Per-call overrides for the completion provider.
#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Replaces the built RAG system prompt entirely when set.
    pub system_prompt: Option<String>,
}

/// Options for a RAG query. Unset fields fall back to configured defaults.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub max_sources: Option<usize>,
    pub similarity_threshold: Option<f32>,
    pub include_history: Option<bool>,
}

/// The answer returned by the RAG pipeline.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RagResponse {
    pub answer: String,
    pub sources: Vec<VectorSearchResult>,
    pub conversation_id: String,
    pub usage: TokenUsage,
}

/// A document submitted for ingestion.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestDocument {
    pub content: String,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

/// Status of one ingestion outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    Success,
    Error,
}

/// Per-item result of a batch ingestion. Chunked documents produce one
/// success outcome per chunk; failures produce one error outcome per document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    pub status: IngestStatus,
    pub document_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IngestOutcome {
    pub fn success(document_index: usize, chunk_index: Option<usize>, id: String) -> Self {
        Self {
            status: IngestStatus::Success,
            document_index,
            chunk_index,
            id: Some(id),
            error: None,
        }
    }

    pub fn error(document_index: usize, error: impl Into<String>) -> Self {
        Self {
            status: IngestStatus::Error,
            document_index,
            chunk_index: None,
            id: None,
            error: Some(error.into()),
        }
    }
}

/// Vector store statistics.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchStats {
    pub total_documents: u64,
    pub embedding_dimension: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip() {
        assert_eq!(Role::parse("user"), Some(Role::User));
        assert_eq!(Role::parse("assistant"), Some(Role::Assistant));
        assert_eq!(Role::parse("system"), None);
        assert_eq!(Role::User.as_str(), "user");
    }

    #[test]
    fn test_token_usage_serializes_camel_case() {
        let usage = TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        };
        let json = serde_json::to_value(usage).unwrap();
        assert_eq!(json["promptTokens"], 10);
        assert_eq!(json["completionTokens"], 5);
        assert_eq!(json["totalTokens"], 15);
    }

    #[test]
    fn test_ingest_outcome_shape() {
        let ok = IngestOutcome::success(0, Some(2), "abc".to_string());
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["documentIndex"], 0);
        assert_eq!(json["chunkIndex"], 2);

        let err = IngestOutcome::error(1, "boom");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["status"], "error");
        assert!(json.get("chunkIndex").is_none());
        assert_eq!(json["error"], "boom");
    }
}

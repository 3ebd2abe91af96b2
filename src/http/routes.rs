// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Request handlers for the chat API.
//!
//! Bodies are taken as raw JSON and decoded by hand so that shape errors
//! come back in the same `{"success": false, "error": ...}` envelope as
//! every other failure.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::types::{IngestDocument, QueryOptions};

use super::{ApiError, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    pub conversation_id: Option<String>,
    pub max_sources: Option<usize>,
    pub similarity_threshold: Option<f32>,
    pub include_history: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub documents: Vec<IngestDocument>,
}

fn parse_body<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value)
        .map_err(|e| ApiError::Validation(format!("Invalid request body: {}", e)))
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn chat(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let payload: ChatRequest = parse_body(body)?;
    if payload.message.trim().is_empty() {
        return Err(ApiError::Validation(
            "Message is required and must be a non-empty string".to_string(),
        ));
    }

    let query_options = QueryOptions {
        max_sources: payload.max_sources,
        similarity_threshold: payload.similarity_threshold,
        include_history: payload.include_history,
    };

    let response = state
        .rag
        .query(
            &payload.message,
            payload.conversation_id.as_deref(),
            &query_options,
        )
        .await?;

    let source_count = response.sources.len();
    Ok(Json(json!({
        "success": true,
        "data": {
            "message": response.answer,
            "conversationId": response.conversation_id,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "sources": response.sources,
            "sourceCount": source_count,
            "usage": response.usage,
        }
    })))
}

pub async fn history(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let (conversation, messages) = state
        .rag
        .get_history(&conversation_id)
        .await?
        .ok_or_else(|| {
            ApiError::Rag(
                crate::error::StoreError::NotFound(format!(
                    "Conversation {} not found",
                    conversation_id
                ))
                .into(),
            )
        })?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "conversationId": conversation.id,
            "createdAt": conversation.created_at,
            "updatedAt": conversation.updated_at,
            "messages": messages,
        }
    })))
}

pub async fn ingest(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let payload: IngestRequest = parse_body(body)?;
    if payload.documents.is_empty() {
        return Err(ApiError::Validation(
            "Documents must be a non-empty array".to_string(),
        ));
    }
    if payload.documents.iter().any(|d| d.content.trim().is_empty()) {
        return Err(ApiError::Validation(
            "Each document must have non-empty content".to_string(),
        ));
    }

    let outcomes = state.rag.ingest_documents(&payload.documents).await?;
    Ok(Json(json!({
        "success": true,
        "data": {
            "ingested": outcomes.len(),
            "results": outcomes,
        }
    })))
}

pub async fn stats(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let stats = state.rag.stats().await?;
    Ok(Json(json!({ "success": true, "data": stats })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_parses_flat_tuning_fields() {
        let body = r#"{
            "message": "What is the refund policy?",
            "conversationId": "abc-123",
            "maxSources": 2,
            "similarityThreshold": 0.5,
            "includeHistory": false
        }"#;
        let parsed: ChatRequest = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.message, "What is the refund policy?");
        assert_eq!(parsed.conversation_id.as_deref(), Some("abc-123"));
        assert_eq!(parsed.max_sources, Some(2));
        assert_eq!(parsed.similarity_threshold, Some(0.5));
        assert_eq!(parsed.include_history, Some(false));
    }

    #[test]
    fn test_chat_request_minimal() {
        let parsed: ChatRequest = serde_json::from_str(r#"{"message":"hi"}"#).unwrap();
        assert!(parsed.conversation_id.is_none());
        assert!(parsed.max_sources.is_none());
        assert!(parsed.similarity_threshold.is_none());
        assert!(parsed.include_history.is_none());
    }

    #[test]
    fn test_missing_message_is_a_validation_error() {
        let result: Result<ChatRequest, ApiError> = parse_body(json!({ "maxSources": 2 }));
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }

    #[test]
    fn test_ingest_request_parsing() {
        let body = r#"{"documents":[{"content":"text","metadata":{"kind":"faq"}},{"content":"more"}]}"#;
        let parsed: IngestRequest = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.documents.len(), 2);
        assert!(parsed.documents[0].metadata.is_some());
        assert!(parsed.documents[1].metadata.is_none());
    }
}

// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Wire-level tests for the chat API: request and response shapes, the
//! response envelope, and status mapping.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::Mutex;
use tower::ServiceExt;

use ragchat::config::SearchConfig;
use ragchat::embeddings::EmbeddingProvider;
use ragchat::error::ProviderError;
use ragchat::http::{router, AppState};
use ragchat::llm::CompletionProvider;
use ragchat::rag::RagService;
use ragchat::search::VectorSearch;
use ragchat::store::{ConversationStore, DocumentStore};
use ragchat::types::{
    ChatMessage, CompletionOptions, CompletionResult, TokenUsage, VectorSearchResult,
};

/// Every text embeds to the same vector, so every stored document matches
/// every query with similarity 1.0.
struct UniformEmbeddings;

#[async_trait]
impl EmbeddingProvider for UniformEmbeddings {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(vec![1.0, 0.0, 0.0])
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
    }

    fn dimensions(&self) -> usize {
        3
    }

    fn is_configured(&self) -> bool {
        true
    }
}

struct FixedCompletions;

#[async_trait]
impl CompletionProvider for FixedCompletions {
    async fn complete(
        &self,
        _user_message: &str,
        _context: &[VectorSearchResult],
        _history: &[ChatMessage],
        _options: &CompletionOptions,
    ) -> Result<CompletionResult, ProviderError> {
        Ok(CompletionResult {
            content: "fixed answer".to_string(),
            usage: TokenUsage::default(),
        })
    }

    fn is_configured(&self) -> bool {
        true
    }
}

fn test_app() -> (Router, TempDir) {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("ragchat.db");

    let documents = Arc::new(Mutex::new(DocumentStore::open(&db_path).unwrap()));
    let conversations = Arc::new(Mutex::new(ConversationStore::open(&db_path).unwrap()));

    let search = Arc::new(VectorSearch::new(
        Arc::new(UniformEmbeddings),
        documents,
        SearchConfig {
            max_sources: 5,
            similarity_threshold: 0.7,
        },
    ));
    let rag = Arc::new(RagService::new(
        search,
        Arc::new(FixedCompletions),
        conversations,
    ));

    (router(AppState { rag }), temp)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn ingest_documents(app: &Router, contents: &[&str]) -> Value {
    let documents: Vec<Value> = contents.iter().map(|c| json!({ "content": c })).collect();
    let response = app
        .clone()
        .oneshot(post("/api/chat/ingest", json!({ "documents": documents })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

#[tokio::test]
async fn chat_honors_flat_tuning_fields() {
    let (app, _temp) = test_app();
    ingest_documents(&app, &["doc one", "doc two", "doc three"]).await;

    // All three documents score 1.0; maxSources at the top level of the
    // body must cap the result window.
    let response = app
        .clone()
        .oneshot(post(
            "/api/chat",
            json!({ "message": "anything", "maxSources": 2, "similarityThreshold": 0.0 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["message"], "fixed answer");
    assert_eq!(body["data"]["sourceCount"], 2);
    assert_eq!(body["data"]["sources"].as_array().unwrap().len(), 2);
    assert!(body["data"]["conversationId"].is_string());
    assert!(body["data"]["timestamp"].is_string());
}

#[tokio::test]
async fn history_returns_a_flat_conversation_shape() {
    let (app, _temp) = test_app();

    let response = app
        .clone()
        .oneshot(post("/api/chat", json!({ "message": "hello" })))
        .await
        .unwrap();
    let body = body_json(response).await;
    let conversation_id = body["data"]["conversationId"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(get(&format!("/api/chat/history/{}", conversation_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let data = &body["data"];
    assert_eq!(data["conversationId"], conversation_id.as_str());
    assert!(data["createdAt"].is_string());
    assert!(data["updatedAt"].is_string());
    assert_eq!(data["messages"].as_array().unwrap().len(), 2);
    // The conversation's fields live at the top level of data, not nested.
    assert!(data.get("conversation").is_none());
}

#[tokio::test]
async fn history_of_unknown_conversation_is_404() {
    let (app, _temp) = test_app();

    let response = app
        .clone()
        .oneshot(get("/api/chat/history/no-such-id"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn ingest_reports_the_success_tally() {
    let (app, _temp) = test_app();

    let body = ingest_documents(&app, &["first", "second"]).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["ingested"], 2);
    let results = body["data"]["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["status"], "success");
    assert_eq!(results[1]["status"], "success");
}

#[tokio::test]
async fn missing_message_gets_the_error_envelope() {
    let (app, _temp) = test_app();

    let response = app
        .clone()
        .oneshot(post("/api/chat", json!({ "maxSources": 2 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("message"));
}

#[tokio::test]
async fn blank_message_is_rejected() {
    let (app, _temp) = test_app();

    let response = app
        .clone()
        .oneshot(post("/api/chat", json!({ "message": "   " })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn stats_reports_count_and_dimension() {
    let (app, _temp) = test_app();
    ingest_documents(&app, &["only doc"]).await;

    let response = app.clone().oneshot(get("/api/chat/stats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["data"]["totalDocuments"], 1);
    assert_eq!(body["data"]["embeddingDimension"], 3);
}

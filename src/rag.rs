// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! RAG pipeline orchestration.
//!
//! [`RagService::query`] runs the full flow for one user turn: resolve the
//! conversation, persist the question, retrieve context, complete, persist
//! the answer. The user message is written before the completion call, so a
//! failed completion still leaves the question in history.
//!
//! [`RagService::ingest_documents`] is best-effort per document: one failing
//! document is reported in its outcome and does not stop the rest of the
//! batch.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::chunker::chunk_text_default;
use crate::error::{ProviderError, RagError, StoreError};
use crate::llm::CompletionProvider;
use crate::search::VectorSearch;
use crate::store::ConversationStore;
use crate::types::{
    ChatMessage, CompletionOptions, Conversation, IngestDocument, IngestOutcome, Message,
    QueryOptions, RagResponse, Role, SearchStats,
};

/// How many prior messages are replayed to the model.
const HISTORY_WINDOW: usize = 10;

/// Orchestrates retrieval, completion and persistence for the chat API.
pub struct RagService {
    search: Arc<VectorSearch>,
    completions: Arc<dyn CompletionProvider>,
    conversations: Arc<Mutex<ConversationStore>>,
}

impl RagService {
    pub fn new(
        search: Arc<VectorSearch>,
        completions: Arc<dyn CompletionProvider>,
        conversations: Arc<Mutex<ConversationStore>>,
    ) -> Self {
        Self {
            search,
            completions,
            conversations,
        }
    }

    /// Answer one user message with retrieval-augmented completion.
    ///
    /// When `conversation_id` is unset a fresh conversation is created, so
    /// repeating a query always produces a new conversation rather than
    /// reusing an old one.
    pub async fn query(
        &self,
        message: &str,
        conversation_id: Option<&str>,
        options: &QueryOptions,
    ) -> Result<RagResponse, RagError> {
        // No side effects before the configuration check; an unconfigured
        // provider must not leave a half-written conversation behind.
        if !self.search.is_configured() {
            return Err(ProviderError::NotConfigured(
                "OPENAI_API_KEY is not set; embedding generation is disabled".to_string(),
            )
            .into());
        }
        if !self.completions.is_configured() {
            return Err(ProviderError::NotConfigured(
                "OPENAI_API_KEY is not set; chat completion is disabled".to_string(),
            )
            .into());
        }

        let conversation = self.resolve_conversation(conversation_id).await?;
        tracing::info!(conversation_id = %conversation.id, "handling chat query");

        // Persist the question first; history must keep it even when the
        // completion below fails.
        {
            let conversations = self.conversations.lock().await;
            conversations.add_message(&conversation.id, Role::User, message, &[])?;
        }

        let results = self
            .search
            .search(message, options.max_sources, options.similarity_threshold)
            .await?;
        let sources = VectorSearch::format_sources(&results);

        let history = if options.include_history.unwrap_or(true) {
            self.recent_history(&conversation.id).await?
        } else {
            Vec::new()
        };

        let completion = self
            .completions
            .complete(message, &results, &history, &CompletionOptions::default())
            .await?;

        {
            let conversations = self.conversations.lock().await;
            conversations.add_message(
                &conversation.id,
                Role::Assistant,
                &completion.content,
                &sources,
            )?;
        }

        tracing::info!(
            conversation_id = %conversation.id,
            sources = results.len(),
            total_tokens = completion.usage.total_tokens,
            "chat query answered"
        );

        Ok(RagResponse {
            answer: completion.content,
            sources: results,
            conversation_id: conversation.id,
            usage: completion.usage,
        })
    }

    /// Chunk, embed and store a batch of documents.
    ///
    /// Documents are processed in order, one chunk at a time. Chunks stored
    /// before a failure stay stored and keep their success outcomes; the
    /// failure is recorded as an error outcome and processing moves on to
    /// the next document. An unconfigured embedding provider fails the whole
    /// call instead of producing a batch of identical error outcomes.
    pub async fn ingest_documents(
        &self,
        documents: &[IngestDocument],
    ) -> Result<Vec<IngestOutcome>, RagError> {
        if !self.search.is_configured() {
            return Err(ProviderError::NotConfigured(
                "OPENAI_API_KEY is not set; embedding generation is disabled".to_string(),
            )
            .into());
        }

        let mut outcomes = Vec::new();
        for (doc_index, doc) in documents.iter().enumerate() {
            outcomes.append(&mut self.ingest_one(doc_index, doc).await);
        }
        Ok(outcomes)
    }

    async fn ingest_one(&self, doc_index: usize, doc: &IngestDocument) -> Vec<IngestOutcome> {
        let chunks = chunk_text_default(&doc.content);
        if chunks.is_empty() {
            return vec![IngestOutcome::error(doc_index, "Document is empty")];
        }

        let total_chunks = chunks.len();
        let base_metadata = doc.metadata.clone().unwrap_or_default();
        let mut outcomes = Vec::with_capacity(total_chunks);

        for (chunk_index, chunk) in chunks.into_iter().enumerate() {
            let mut metadata = base_metadata.clone();
            if total_chunks > 1 {
                metadata.insert("chunkIndex".to_string(), chunk_index.into());
                metadata.insert("totalChunks".to_string(), total_chunks.into());
                metadata.insert("isChunked".to_string(), true.into());
            }

            match self.search.add_document(&chunk, metadata).await {
                Ok(stored) => {
                    let chunk_index = (total_chunks > 1).then_some(chunk_index);
                    outcomes.push(IngestOutcome::success(doc_index, chunk_index, stored.id));
                }
                Err(e) => {
                    tracing::warn!(
                        document_index = doc_index,
                        chunk_index,
                        error = %e,
                        "chunk ingestion failed"
                    );
                    outcomes.push(IngestOutcome::error(doc_index, e.to_string()));
                    break;
                }
            }
        }

        outcomes
    }

    /// A conversation and its messages, for the history endpoint.
    pub async fn get_history(
        &self,
        conversation_id: &str,
    ) -> Result<Option<(Conversation, Vec<Message>)>, RagError> {
        let conversations = self.conversations.lock().await;
        Ok(conversations.get_conversation_with_messages(conversation_id)?)
    }

    /// Vector store statistics.
    pub async fn stats(&self) -> Result<SearchStats, RagError> {
        self.search.stats().await
    }

    async fn resolve_conversation(
        &self,
        conversation_id: Option<&str>,
    ) -> Result<Conversation, RagError> {
        let conversations = self.conversations.lock().await;
        match conversation_id {
            Some(id) => conversations
                .get_conversation(id)?
                .ok_or_else(|| StoreError::NotFound(format!("Conversation {} not found", id)).into()),
            None => Ok(conversations.create_conversation()?),
        }
    }

    /// Prior turns for the prompt: everything except the just-persisted user
    /// message, windowed to the most recent [`HISTORY_WINDOW`], oldest first.
    async fn recent_history(&self, conversation_id: &str) -> Result<Vec<ChatMessage>, RagError> {
        let conversations = self.conversations.lock().await;
        let mut messages = conversations.get_messages(conversation_id)?;
        messages.pop();

        let skip = messages.len().saturating_sub(HISTORY_WINDOW);
        Ok(messages
            .into_iter()
            .skip(skip)
            .map(|m| ChatMessage {
                role: m.role,
                content: m.content,
            })
            .collect())
    }
}

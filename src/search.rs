// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Vector search facade.
//!
//! Pairs the embedding provider with the document store: queries and new
//! documents are embedded here, then handed to the store. Also owns the two
//! presentation helpers for retrieval results (source snapshots and the
//! prompt context block).

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::SearchConfig;
use crate::embeddings::EmbeddingProvider;
use crate::error::RagError;
use crate::store::DocumentStore;
use crate::types::{Document, DocumentSource, Metadata, SearchStats, VectorSearchResult};

/// Embedding-backed search over the document store.
pub struct VectorSearch {
    embeddings: Arc<dyn EmbeddingProvider>,
    documents: Arc<Mutex<DocumentStore>>,
    config: SearchConfig,
}

impl VectorSearch {
    pub fn new(
        embeddings: Arc<dyn EmbeddingProvider>,
        documents: Arc<Mutex<DocumentStore>>,
        config: SearchConfig,
    ) -> Self {
        Self {
            embeddings,
            documents,
            config,
        }
    }

    /// Whether the embedding provider has a usable credential.
    pub fn is_configured(&self) -> bool {
        self.embeddings.is_configured()
    }

    /// Embed a document and store it.
    pub async fn add_document(
        &self,
        content: &str,
        metadata: Metadata,
    ) -> Result<Document, RagError> {
        let embedding = self.embeddings.embed(content).await?;
        let documents = self.documents.lock().await;
        let doc = documents.create(content, Some(&embedding), metadata)?;
        tracing::debug!(id = %doc.id, chars = content.len(), "stored document");
        Ok(doc)
    }

    /// Embed and store a batch of documents in one provider call.
    pub async fn add_documents(
        &self,
        entries: &[(String, Metadata)],
    ) -> Result<Vec<Document>, RagError> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = entries.iter().map(|(content, _)| content.clone()).collect();
        let embeddings = self.embeddings.embed_batch(&texts).await?;

        let documents = self.documents.lock().await;
        let mut stored = Vec::with_capacity(entries.len());
        for ((content, metadata), embedding) in entries.iter().zip(embeddings.iter()) {
            stored.push(documents.create(content, Some(embedding), metadata.clone())?);
        }
        Ok(stored)
    }

    /// Embed the query text and rank stored documents against it.
    ///
    /// Unset options fall back to the configured defaults.
    pub async fn search(
        &self,
        query: &str,
        limit: Option<usize>,
        threshold: Option<f32>,
    ) -> Result<Vec<VectorSearchResult>, RagError> {
        let limit = limit.unwrap_or(self.config.max_sources);
        let threshold = threshold.unwrap_or(self.config.similarity_threshold);

        let query_embedding = self.embeddings.embed(query).await?;
        let documents = self.documents.lock().await;
        let results = documents.vector_search(&query_embedding, limit, threshold)?;

        tracing::debug!(
            results = results.len(),
            top_similarity = results.first().map(|r| r.similarity).unwrap_or(0.0),
            "vector search complete"
        );

        Ok(results)
    }

    /// Store statistics for the stats endpoint.
    pub async fn stats(&self) -> Result<SearchStats, RagError> {
        let documents = self.documents.lock().await;
        Ok(SearchStats {
            total_documents: documents.count()?,
            embedding_dimension: self.embeddings.dimensions(),
        })
    }

    /// Snapshot search results as message sources.
    pub fn format_sources(results: &[VectorSearchResult]) -> Vec<DocumentSource> {
        results
            .iter()
            .map(|r| DocumentSource {
                id: r.id.clone(),
                content: r.content.clone(),
                metadata: r.metadata.clone(),
                similarity: r.similarity,
            })
            .collect()
    }

    /// Render search results as a numbered context block for the prompt.
    pub fn build_context(results: &[VectorSearchResult]) -> String {
        results
            .iter()
            .enumerate()
            .map(|(index, r)| {
                format!(
                    "[Document {}] (Relevance: {:.1}%)\n{}",
                    index + 1,
                    r.similarity * 100.0,
                    r.content
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n---\n\n")
    }
}

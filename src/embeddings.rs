// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Embedding generation.
//!
//! The [`EmbeddingProvider`] trait abstracts text-to-vector conversion; the
//! OpenAI implementation talks to the `/embeddings` endpoint. Batch results
//! are resorted by the provider-reported index so output order always matches
//! input order.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::OpenAiConfig;
use crate::error::ProviderError;

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// Generate embeddings for multiple texts, preserving input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    /// Output dimension of the configured model. Never makes a network call.
    fn dimensions(&self) -> usize;

    /// Whether a usable credential is present.
    fn is_configured(&self) -> bool;
}

/// OpenAI embedding request.
#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
    encoding_format: &'static str,
}

/// OpenAI embedding response.
#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// OpenAI error response.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// OpenAI embedding provider.
pub struct OpenAiEmbeddings {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    dimensions: usize,
}

impl OpenAiEmbeddings {
    pub fn new(config: &OpenAiConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key.clone().filter(|_| config.is_configured()),
            model: config.embedding_model.clone(),
            base_url: config.base_url.clone(),
            dimensions: config.embedding_dimension,
        }
    }

    fn require_key(&self) -> Result<&str, ProviderError> {
        self.api_key.as_deref().ok_or_else(|| {
            ProviderError::NotConfigured(
                "OPENAI_API_KEY is not set; embedding generation is disabled".to_string(),
            )
        })
    }

    async fn request_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let api_key = self.require_key()?;

        let request = EmbeddingRequest {
            model: self.model.clone(),
            input: texts.to_vec(),
            encoding_format: "float",
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|r| r.error.message)
                .unwrap_or(body);
            return Err(ProviderError::from_status(status.as_u16(), message));
        }

        let parsed: EmbeddingResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        if parsed.data.is_empty() {
            return Err(ProviderError::ParseError(
                "No embeddings returned".to_string(),
            ));
        }

        // The API may return entries out of order; restore input order.
        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);

        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut vectors = self.request_embeddings(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| ProviderError::ParseError("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request_embeddings(texts).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

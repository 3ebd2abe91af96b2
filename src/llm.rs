// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Chat completion providers.
//!
//! The [`CompletionProvider`] trait abstracts the language model behind the
//! RAG pipeline. The OpenAI implementation targets the Chat Completions API
//! and supports both a buffered call and a cancellable streaming variant.
//!
//! The prompt layout is fixed: one system instruction (carrying the numbered
//! retrieval context when present), then conversation history oldest-first,
//! then the current user turn.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::task::Poll;
use tokio::sync::mpsc;

use crate::config::OpenAiConfig;
use crate::error::ProviderError;
use crate::types::{ChatMessage, CompletionOptions, CompletionResult, TokenUsage, VectorSearchResult};

/// Trait for chat completion providers.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Generate a completion for the user message, with optional retrieval
    /// context and conversation history.
    async fn complete(
        &self,
        user_message: &str,
        context: &[VectorSearchResult],
        history: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<CompletionResult, ProviderError>;

    /// Streaming variant producing a lazy sequence of text fragments.
    /// Dropping the returned stream cancels the underlying request.
    async fn stream(
        &self,
        _user_message: &str,
        _context: &[VectorSearchResult],
        _history: &[ChatMessage],
        _options: &CompletionOptions,
    ) -> Result<CompletionStream, ProviderError> {
        Err(ProviderError::StreamError(
            "streaming not supported by this provider".to_string(),
        ))
    }

    /// Whether a usable credential is present.
    fn is_configured(&self) -> bool;
}

/// Build the system instruction, embedding retrieval context when present.
///
/// Context documents are enumerated as `[Source N] (Relevance: P%)` blocks
/// separated by `---`, and the model is told to cite sources by number and to
/// flag clearly when it answers from general knowledge instead.
pub fn build_system_prompt(context: &[VectorSearchResult]) -> String {
    let mut prompt = String::from(
        "You are a helpful AI customer service assistant. You provide accurate, \
         relevant, and concise answers based on the information available to you.",
    );

    if !context.is_empty() {
        prompt.push_str(
            "\n\nUse the following context to answer the user's question. If the \
             context doesn't contain relevant information, please alert the user \
             clearly that it is from your general knowledge.\n\n",
        );
        prompt.push_str("CONTEXT:\n---\n");

        for (index, doc) in context.iter().enumerate() {
            prompt.push_str(&format!(
                "[Source {}] (Relevance: {:.1}%)\n{}\n\n",
                index + 1,
                doc.similarity * 100.0,
                doc.content
            ));
            if index < context.len() - 1 {
                prompt.push_str("---\n");
            }
        }

        prompt.push_str(
            "\nWhen using information from the context, try to reference which \
             source it came from (e.g., \"According to Source 1...\").",
        );
    }

    prompt
}

/// A lazy sequence of completion text fragments.
///
/// Backed by a channel fed from a background task; dropping the stream closes
/// the channel, which makes the producer bail out and release the connection.
pub struct CompletionStream {
    rx: mpsc::Receiver<Result<String, ProviderError>>,
}

impl CompletionStream {
    /// Pull the next text fragment, or `None` when the stream is finished.
    pub async fn next_fragment(&mut self) -> Option<Result<String, ProviderError>> {
        self.rx.recv().await
    }
}

impl futures_util::Stream for CompletionStream {
    type Item = Result<String, ProviderError>;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// OpenAI chat completion provider.
pub struct OpenAiCompletions {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiCompletions {
    pub fn new(config: &OpenAiConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key.clone().filter(|_| config.is_configured()),
            model: config.chat_model.clone(),
            base_url: config.base_url.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    fn require_key(&self) -> Result<&str, ProviderError> {
        self.api_key.as_deref().ok_or_else(|| {
            ProviderError::NotConfigured(
                "OPENAI_API_KEY is not set; chat completion is disabled".to_string(),
            )
        })
    }

    fn build_request(
        &self,
        user_message: &str,
        context: &[VectorSearchResult],
        history: &[ChatMessage],
        options: &CompletionOptions,
        stream: bool,
    ) -> ChatRequest {
        let system_prompt = options
            .system_prompt
            .clone()
            .unwrap_or_else(|| build_system_prompt(context));

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ApiMessage {
            role: "system".to_string(),
            content: system_prompt,
        });
        for turn in history {
            messages.push(ApiMessage {
                role: turn.role.as_str().to_string(),
                content: turn.content.clone(),
            });
        }
        messages.push(ApiMessage {
            role: "user".to_string(),
            content: user_message.to_string(),
        });

        ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: options.temperature.unwrap_or(self.temperature),
            max_tokens: options.max_tokens.unwrap_or(self.max_tokens),
            stream,
        }
    }

    async fn send_request(
        &self,
        request: &ChatRequest,
    ) -> Result<reqwest::Response, ProviderError> {
        let api_key = self.require_key()?;

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", api_key))
            .json(request)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|r| r.error.message)
                .unwrap_or(body);
            return Err(ProviderError::from_status(status.as_u16(), message));
        }

        Ok(response)
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompletions {
    async fn complete(
        &self,
        user_message: &str,
        context: &[VectorSearchResult],
        history: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<CompletionResult, ProviderError> {
        let request = self.build_request(user_message, context, history, options, false);
        let response = self.send_request(&request).await?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ParseError("No completion returned".to_string()))?;

        let usage = parsed
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResult {
            content: choice.message.content.unwrap_or_default(),
            usage,
        })
    }

    async fn stream(
        &self,
        user_message: &str,
        context: &[VectorSearchResult],
        history: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<CompletionStream, ProviderError> {
        let request = self.build_request(user_message, context, history, options, true);
        // Send before spawning so configuration and auth failures surface as
        // an immediate error instead of the first stream item.
        let response = self.send_request(&request).await?;

        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(Err(ProviderError::StreamError(e.to_string()))).await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(newline) = buffer.find('\n') {
                    let line: String = buffer.drain(..=newline).collect();
                    let line = line.trim_end();

                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    if data.trim() == "[DONE]" {
                        return;
                    }

                    if let Ok(parsed) = serde_json::from_str::<StreamChunk>(data) {
                        let delta = parsed
                            .choices
                            .into_iter()
                            .next()
                            .and_then(|c| c.delta.content);
                        if let Some(text) = delta {
                            if tx.send(Ok(text)).await.is_err() {
                                // Consumer stopped iterating; drop the connection.
                                return;
                            }
                        }
                    }
                }
            }
        });

        Ok(CompletionStream { rx })
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ApiMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OPENAI_BASE_URL;
    use serde_json::Map;

    fn config_with_key(key: Option<&str>) -> OpenAiConfig {
        OpenAiConfig {
            api_key: key.map(String::from),
            base_url: OPENAI_BASE_URL.to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimension: 1536,
            chat_model: "gpt-4-turbo-preview".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }

    fn result(content: &str, similarity: f32) -> VectorSearchResult {
        VectorSearchResult {
            id: "doc-1".to_string(),
            content: content.to_string(),
            metadata: Map::new(),
            similarity,
        }
    }

    #[test]
    fn test_system_prompt_without_context() {
        let prompt = build_system_prompt(&[]);
        assert!(prompt.contains("customer service assistant"));
        assert!(!prompt.contains("CONTEXT:"));
    }

    #[test]
    fn test_system_prompt_with_context() {
        let context = vec![result("Refund policy text", 0.913), result("Shipping", 0.85)];
        let prompt = build_system_prompt(&context);

        assert!(prompt.contains("CONTEXT:"));
        assert!(prompt.contains("[Source 1] (Relevance: 91.3%)"));
        assert!(prompt.contains("[Source 2] (Relevance: 85.0%)"));
        assert!(prompt.contains("Refund policy text"));
        assert!(prompt.contains("general knowledge"));
        assert!(prompt.contains("According to Source 1"));
    }

    #[test]
    fn test_request_message_ordering() {
        let provider = OpenAiCompletions::new(&config_with_key(Some("test-key")));
        let history = vec![
            ChatMessage::user("earlier question"),
            ChatMessage::assistant("earlier answer"),
        ];
        let request = provider.build_request(
            "current question",
            &[],
            &history,
            &CompletionOptions::default(),
            false,
        );

        assert_eq!(request.messages.len(), 4);
        assert_eq!(request.messages[0].role, "system");
        assert_eq!(request.messages[1].role, "user");
        assert_eq!(request.messages[1].content, "earlier question");
        assert_eq!(request.messages[2].role, "assistant");
        assert_eq!(request.messages[3].role, "user");
        assert_eq!(request.messages[3].content, "current question");
    }

    #[test]
    fn test_options_override_defaults() {
        let provider = OpenAiCompletions::new(&config_with_key(Some("test-key")));
        let options = CompletionOptions {
            temperature: Some(0.2),
            max_tokens: Some(64),
            system_prompt: Some("custom prompt".to_string()),
        };
        let request = provider.build_request("hi", &[], &[], &options, false);

        assert!((request.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(request.max_tokens, 64);
        assert_eq!(request.messages[0].content, "custom prompt");
    }

    #[tokio::test]
    async fn test_complete_fails_fast_without_key() {
        let provider = OpenAiCompletions::new(&config_with_key(None));
        let result = provider
            .complete("hi", &[], &[], &CompletionOptions::default())
            .await;
        assert!(matches!(result, Err(ProviderError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn test_stream_delivers_fragments_and_drop_cancels() {
        let (tx, rx) = mpsc::channel(4);
        let mut stream = CompletionStream { rx };

        tx.send(Ok("Hel".to_string())).await.unwrap();
        tx.send(Ok("lo".to_string())).await.unwrap();
        drop(tx);

        assert_eq!(stream.next_fragment().await.unwrap().unwrap(), "Hel");
        assert_eq!(stream.next_fragment().await.unwrap().unwrap(), "lo");
        assert!(stream.next_fragment().await.is_none());

        // Dropping the consumer closes the channel, which is how a producer
        // notices cancellation.
        let (tx, rx) = mpsc::channel::<Result<String, ProviderError>>(4);
        drop(CompletionStream { rx });
        assert!(tx.send(Ok("late".to_string())).await.is_err());
    }

    #[test]
    fn test_stream_chunk_parsing() {
        let data = r#"{"choices":[{"delta":{"content":"Hel"}}]}"#;
        let chunk: StreamChunk = serde_json::from_str(data).unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hel"));

        let done_delta = r#"{"choices":[{"delta":{}}]}"#;
        let chunk: StreamChunk = serde_json::from_str(done_delta).unwrap();
        assert!(chunk.choices[0].delta.content.is_none());
    }
}

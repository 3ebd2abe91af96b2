// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration loading.
//!
//! All tunables are read from the environment exactly once at startup into
//! [`AppConfig`], which is then passed down by reference. Components never
//! re-read ambient state at call sites.

use std::env;

/// Sentinel value treated as "no key set", mirroring clients that ship a
/// placeholder in their example env files.
const PLACEHOLDER_API_KEY: &str = "placeholder-key";

/// Default OpenAI API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI provider configuration (shared by embeddings and completions).
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    /// Embedding model name.
    pub embedding_model: String,
    /// Output dimension of the embedding model.
    pub embedding_dimension: usize,
    /// Chat completion model name.
    pub chat_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Retry budget for callers that choose to retry; the core never does.
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl OpenAiConfig {
    /// Whether a usable API key is present.
    pub fn is_configured(&self) -> bool {
        self.api_key
            .as_deref()
            .map(|k| !k.is_empty() && k != PLACEHOLDER_API_KEY)
            .unwrap_or(false)
    }
}

/// Retrieval defaults applied when a request leaves them unset.
#[derive(Debug, Clone, Copy)]
pub struct SearchConfig {
    pub max_sources: usize,
    pub similarity_threshold: f32,
}

/// Full application configuration, assembled once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub openai: OpenAiConfig,
    pub search: SearchConfig,
    pub database_path: String,
}

impl AppConfig {
    /// Assemble configuration from the environment.
    pub fn from_env() -> Self {
        let embedding_model = env_or("OPENAI_EMBEDDING_MODEL", "text-embedding-3-small");
        let embedding_dimension = env_parse("EMBEDDING_DIMENSION")
            .unwrap_or_else(|| default_embedding_dimension(&embedding_model));

        Self {
            openai: OpenAiConfig {
                api_key: env::var("OPENAI_API_KEY").ok(),
                base_url: env_or("OPENAI_BASE_URL", OPENAI_BASE_URL),
                embedding_model,
                embedding_dimension,
                chat_model: env_or("OPENAI_CHAT_MODEL", "gpt-4-turbo-preview"),
                temperature: env_parse("OPENAI_TEMPERATURE").unwrap_or(0.7),
                max_tokens: env_parse("OPENAI_MAX_TOKENS").unwrap_or(1000),
                max_retries: env_parse("OPENAI_MAX_RETRIES").unwrap_or(3),
                retry_delay_ms: env_parse("OPENAI_RETRY_DELAY").unwrap_or(1000),
            },
            search: SearchConfig {
                max_sources: env_parse("MAX_SOURCES").unwrap_or(5),
                similarity_threshold: env_parse("SIMILARITY_THRESHOLD").unwrap_or(0.7),
            },
            database_path: env_or("DATABASE_PATH", "data/ragchat.db"),
        }
    }
}

/// Known output dimensions for OpenAI embedding models.
pub fn default_embedding_dimension(model: &str) -> usize {
    match model {
        "text-embedding-3-small" => 1536,
        "text-embedding-3-large" => 3072,
        "text-embedding-ada-002" => 1536,
        _ => 1536,
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_openai() -> OpenAiConfig {
        OpenAiConfig {
            api_key: None,
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

    #[test]
    fn test_is_configured() {
        let mut config = base_openai();
        assert!(!config.is_configured());

        config.api_key = Some(String::new());
        assert!(!config.is_configured());

        config.api_key = Some("placeholder-key".to_string());
        assert!(!config.is_configured());

        config.api_key = Some("sk-real".to_string());
        assert!(config.is_configured());
    }

    #[test]
    fn test_default_dimensions_by_model() {
        assert_eq!(default_embedding_dimension("text-embedding-3-small"), 1536);
        assert_eq!(default_embedding_dimension("text-embedding-3-large"), 3072);
        assert_eq!(default_embedding_dimension("unknown-model"), 1536);
    }
}

// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! ragchat - retrieval-augmented chat service over SQLite.
//!
//! Documents are chunked, embedded and stored alongside conversations in
//! SQLite. Each chat turn embeds the question, retrieves the most similar
//! documents by cosine similarity, and feeds them as numbered sources into
//! an OpenAI chat completion. A small axum server exposes the whole thing
//! as a JSON API.

pub mod chunker;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod http;
pub mod llm;
pub mod rag;
pub mod search;
pub mod store;
pub mod types;

pub use config::AppConfig;
pub use error::{ProviderError, RagError, Result, StoreError};
pub use rag::RagService;
pub use search::VectorSearch;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

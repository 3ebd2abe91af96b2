// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

use ragchat::config::AppConfig;
use ragchat::embeddings::OpenAiEmbeddings;
use ragchat::http::{router, AppState};
use ragchat::llm::OpenAiCompletions;
use ragchat::rag::RagService;
use ragchat::search::VectorSearch;
use ragchat::store::{ConversationStore, DocumentStore};

#[derive(Debug, Parser)]
#[command(name = "ragchat", version = ragchat::VERSION, about = "Retrieval-augmented chat service")]
struct Cli {
    /// Address to bind.
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ragchat=info,tower_http=info")),
        )
        .init();

    let config = AppConfig::from_env();
    if !config.openai.is_configured() {
        tracing::warn!(
            "OPENAI_API_KEY is not set; chat and ingestion requests will be rejected"
        );
    }

    let db_path = Path::new(&config.database_path);
    let documents = Arc::new(Mutex::new(
        DocumentStore::open(db_path).context("Failed to open document store")?,
    ));
    let conversations = Arc::new(Mutex::new(
        ConversationStore::open(db_path).context("Failed to open conversation store")?,
    ));

    let embeddings = Arc::new(OpenAiEmbeddings::new(&config.openai));
    let completions = Arc::new(OpenAiCompletions::new(&config.openai));

    let search = Arc::new(VectorSearch::new(
        embeddings,
        documents,
        config.search,
    ));
    let rag = Arc::new(RagService::new(search, completions, conversations));

    let app = router(AppState { rag });

    let bind_addr = format!("{}:{}", cli.host, cli.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

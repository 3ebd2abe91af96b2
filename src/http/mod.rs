// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! HTTP server wiring.
//!
//! The handlers in [`routes`] are a thin translation layer over
//! [`RagService`]; no pipeline logic lives here. Every response uses the
//! `{"success": ..., ...}` envelope.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::{ProviderError, RagError, StoreError};
use crate::rag::RagService;

pub mod routes;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub rag: Arc<RagService>,
}

/// Build the application router with all routes and middleware.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/api/chat", post(routes::chat))
        .route("/api/chat/history/:conversation_id", get(routes::history))
        .route("/api/chat/ingest", post(routes::ingest))
        .route("/api/chat/stats", get(routes::stats))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Error surface of the HTTP layer.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request body. Always a 400.
    Validation(String),
    /// A pipeline failure, mapped to a status by its inner cause.
    Rag(RagError),
}

impl From<RagError> for ApiError {
    fn from(e: RagError) -> Self {
        Self::Rag(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Rag(RagError::Store(StoreError::NotFound(_))) => StatusCode::NOT_FOUND,
            Self::Rag(RagError::Provider(e)) => match e {
                ProviderError::AuthError(_) => StatusCode::UNAUTHORIZED,
                ProviderError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
                ProviderError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
                ProviderError::Unavailable(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Rag(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::Rag(e) => e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self.message(), "request failed");
        }
        let body = json!({
            "success": false,
            "error": self.message(),
        });
        (status, Json(body)).into_response()
    }
}

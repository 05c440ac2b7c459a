//! # KACLS API
//!
//! HTTP/JSON surface of the key access control list service.
//!
//! ## Endpoints
//!
//! - `GET  /health` - Service status
//! - `POST /api/wrap-key` - Wrap a caller-supplied data key
//! - `POST /api/unwrap-key` - Unwrap a data key for its owner
//! - `POST /api/generate-key` - Generate and wrap a fresh data key
//! - `POST /api/rotate-key` - Replace a key, keeping the old one for a grace period
//! - `POST /api/register-public-key` - Register a user's key exchange public key
//! - `GET  /api/get-public-key/{userId}` - Fetch a user's public key
//! - `GET  /api/list-public-keys` - List registered keys (previews only)
//!
//! Handlers only translate: every decision is made by the envelope service
//! or the directory.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod dto;
pub mod error;
mod routes;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use kacls_directory::PublicKeyDirectory;
use kacls_envelope::KeyEnvelopeService;

pub use error::ApiError;

/// Name reported by the health endpoint.
pub const SERVICE_NAME: &str = "kacls";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// Wrapped key operations.
    pub envelope: Arc<KeyEnvelopeService>,
    /// Public key directory.
    pub directory: Arc<PublicKeyDirectory>,
}

impl AppState {
    /// Bundles the services.
    pub fn new(envelope: Arc<KeyEnvelopeService>, directory: Arc<PublicKeyDirectory>) -> Self {
        Self {
            envelope,
            directory,
        }
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/api/wrap-key", post(routes::wrap_key))
        .route("/api/unwrap-key", post(routes::unwrap_key))
        .route("/api/generate-key", post(routes::generate_key))
        .route("/api/rotate-key", post(routes::rotate_key))
        .route("/api/register-public-key", post(routes::register_public_key))
        .route("/api/get-public-key/{user_id}", get(routes::get_public_key))
        .route("/api/list-public-keys", get(routes::list_public_keys))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

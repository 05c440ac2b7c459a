//! Integration tests for the KACLS server.
//!
//! Each test binds the real router to an ephemeral port and talks to it over
//! HTTP, so the JSON contract is exercised exactly as a client sees it.

// Allow unwrap() in tests - panics are acceptable for test assertions
#![allow(clippy::disallowed_methods)]

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use kacls_api::dto::{
    GenerateKeyResponse, HealthResponse, PublicKeyListResponse, PublicKeyResponse,
    RegisterPublicKeyResponse, RotateKeyResponse, UnwrapKeyResponse, WrapKeyResponse,
};
use kacls_api::AppState;
use kacls_auth::BlocklistGate;
use kacls_directory::PublicKeyDirectory;
use kacls_envelope::{EnvelopeConfig, KeyEnvelopeService};
use kacls_seal::MasterSecretSource;
use kacls_storage::ManualClock;
use kacls_storage_memory::MemoryKeyStore;

/// Start time of every test server's clock.
pub const START_TIME: u64 = 1_700_000_000;

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WrapKeyRequest {
    pub dek: String,
    pub owner_user_id: String,
    pub resource_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnwrapKeyRequest {
    pub ciphertext: String,
    pub nonce: String,
    pub auth_tag: String,
    pub key_id: String,
    pub caller_user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

impl UnwrapKeyRequest {
    /// Builds an unwrap request for a wrap response.
    pub fn for_wrapped(wrapped: &WrapKeyResponse, caller: &str, resource: &str) -> Self {
        Self {
            ciphertext: wrapped.ciphertext.clone(),
            nonce: wrapped.nonce.clone(),
            auth_tag: wrapped.auth_tag.clone(),
            key_id: wrapped.key_id.clone(),
            caller_user_id: caller.to_string(),
            resource_id: Some(resource.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateKeyRequest {
    pub owner_user_id: String,
    pub resource_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_size: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RotateKeyRequest {
    pub old_key_id: String,
    pub owner_user_id: String,
    pub resource_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPublicKeyRequest {
    pub user_id: String,
    pub public_key: String,
    pub algorithm: String,
}

/// A non-2xx answer from the server.
#[derive(Debug)]
pub struct ApiFailure {
    pub status: StatusCode,
    pub error: String,
}

impl std::fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.error)
    }
}

impl std::error::Error for ApiFailure {}

// ============================================================================
// Test Server
// ============================================================================

/// A KACLS instance serving on a local ephemeral port.
pub struct TestServer {
    pub base_url: String,
    pub clock: Arc<ManualClock>,
    task: JoinHandle<()>,
}

impl TestServer {
    /// Starts a server with an initialized ephemeral master secret.
    pub async fn start() -> Result<Self> {
        Self::start_with(EnvelopeConfig::default(), true).await
    }

    /// Starts a server with the given envelope settings. With `initialize`
    /// false the master secret is never loaded.
    pub async fn start_with(config: EnvelopeConfig, initialize: bool) -> Result<Self> {
        let secret = MasterSecretSource::ephemeral();
        if initialize {
            secret.initialize().context("Failed to initialize master secret")?;
        }

        let clock = Arc::new(ManualClock::new(START_TIME));
        let gate = Arc::new(BlocklistGate::default());
        let envelope = KeyEnvelopeService::new(
            Arc::new(secret),
            Arc::new(MemoryKeyStore::new()),
            gate.clone(),
            clock.clone(),
            config,
        );
        let directory = PublicKeyDirectory::new(gate, clock.clone());
        let app = kacls_api::router(AppState::new(Arc::new(envelope), Arc::new(directory)));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("Failed to bind test listener")?;
        let addr: SocketAddr = listener.local_addr()?;

        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            base_url: format!("http://{addr}"),
            clock,
            task,
        })
    }

    /// Get a configured HTTP client for this server.
    pub fn client(&self) -> KaclsClient {
        KaclsClient::new(&self.base_url)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ============================================================================
// Test Client
// ============================================================================

/// HTTP client for the KACLS API.
pub struct KaclsClient {
    client: Client,
    base_url: String,
}

impl KaclsClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        if !status.is_success() {
            let body: serde_json::Value = resp.json().await.unwrap_or_default();
            let error = body["error"].as_str().unwrap_or_default().to_string();
            return Err(ApiFailure { status, error }.into());
        }
        Ok(resp.json().await?)
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let resp = self.client.post(self.url(path)).json(body).send().await?;
        Self::read(resp).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self.client.get(self.url(path)).send().await?;
        Self::read(resp).await
    }

    /// Posts a raw JSON body and returns the status and decoded body.
    pub async fn post_raw(&self, path: &str, body: String) -> Result<(StatusCode, serde_json::Value)> {
        let resp = self
            .client
            .post(self.url(path))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await?;
        let status = resp.status();
        Ok((status, resp.json().await.unwrap_or_default()))
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.get("/health").await
    }

    pub async fn wrap_key(&self, req: &WrapKeyRequest) -> Result<WrapKeyResponse> {
        self.post("/api/wrap-key", req).await
    }

    pub async fn unwrap_key(&self, req: &UnwrapKeyRequest) -> Result<UnwrapKeyResponse> {
        self.post("/api/unwrap-key", req).await
    }

    pub async fn generate_key(&self, req: &GenerateKeyRequest) -> Result<GenerateKeyResponse> {
        self.post("/api/generate-key", req).await
    }

    pub async fn rotate_key(&self, req: &RotateKeyRequest) -> Result<RotateKeyResponse> {
        self.post("/api/rotate-key", req).await
    }

    pub async fn register_public_key(
        &self,
        req: &RegisterPublicKeyRequest,
    ) -> Result<RegisterPublicKeyResponse> {
        self.post("/api/register-public-key", req).await
    }

    pub async fn get_public_key(&self, user_id: &str) -> Result<PublicKeyResponse> {
        self.get(&format!("/api/get-public-key/{user_id}")).await
    }

    pub async fn list_public_keys(&self) -> Result<PublicKeyListResponse> {
        self.get("/api/list-public-keys").await
    }
}

/// Status code of a failed call.
pub fn failure_status<T: std::fmt::Debug>(result: Result<T>) -> StatusCode {
    result
        .unwrap_err()
        .downcast::<ApiFailure>()
        .expect("expected an API failure")
        .status
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const DEK: &str = "aabbccddeeff00112233445566778899";

    fn wrap_request(owner: &str, resource: &str) -> WrapKeyRequest {
        WrapKeyRequest {
            dek: DEK.to_string(),
            owner_user_id: owner.to_string(),
            resource_id: resource.to_string(),
            permissions: None,
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn test_health_reports_service_state() {
        let server = TestServer::start().await.unwrap();
        let health = server.client().health().await.unwrap();

        assert_eq!(health.service, "kacls");
        assert_eq!(health.status, "healthy");
        assert!(health.master_key_initialized);
        assert_eq!(health.active_keys, 0);
        assert_eq!(health.registered_public_keys, 0);
    }

    #[tokio::test]
    async fn test_health_degraded_without_master_secret() {
        let server = TestServer::start_with(EnvelopeConfig::default(), false)
            .await
            .unwrap();
        let client = server.client();

        let health = client.health().await.unwrap();
        assert_eq!(health.status, "degraded");
        assert!(!health.master_key_initialized);

        let result = client.wrap_key(&wrap_request("alice", "doc1")).await;
        assert_eq!(failure_status(result), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_wrap_unwrap_workflow() {
        let server = TestServer::start().await.unwrap();
        let client = server.client();

        let wrapped = client.wrap_key(&wrap_request("alice", "doc1")).await.unwrap();
        assert_eq!(wrapped.algorithm, "aes-256-gcm");
        assert_eq!(wrapped.nonce.len(), 24);
        assert_eq!(wrapped.auth_tag.len(), 32);
        assert_eq!(wrapped.expires_at, START_TIME + 86_400);

        let unwrapped = client
            .unwrap_key(&UnwrapKeyRequest::for_wrapped(&wrapped, "alice", "doc1"))
            .await
            .unwrap();
        assert_eq!(unwrapped.dek, DEK);
        assert_eq!(unwrapped.permissions, ["read", "write"]);
        assert_eq!(unwrapped.expires_at, wrapped.expires_at);

        assert_eq!(client.health().await.unwrap().active_keys, 1);
    }

    #[tokio::test]
    async fn test_unwrap_denied_for_other_user() {
        let server = TestServer::start().await.unwrap();
        let client = server.client();
        let wrapped = client.wrap_key(&wrap_request("alice", "doc1")).await.unwrap();

        let result = client
            .unwrap_key(&UnwrapKeyRequest::for_wrapped(&wrapped, "bob", "doc1"))
            .await;
        assert_eq!(failure_status(result), StatusCode::FORBIDDEN);

        let result = client
            .unwrap_key(&UnwrapKeyRequest::for_wrapped(&wrapped, "alice", "doc2"))
            .await;
        assert_eq!(failure_status(result), StatusCode::FORBIDDEN);

        // Still usable by its owner.
        client
            .unwrap_key(&UnwrapKeyRequest::for_wrapped(&wrapped, "alice", "doc1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unwrap_unknown_key_not_found() {
        let server = TestServer::start().await.unwrap();
        let client = server.client();
        let mut wrapped = client.wrap_key(&wrap_request("alice", "doc1")).await.unwrap();
        wrapped.key_id = "no-such-key".to_string();

        let result = client
            .unwrap_key(&UnwrapKeyRequest::for_wrapped(&wrapped, "alice", "doc1"))
            .await;
        assert_eq!(failure_status(result), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_expired_key_is_evicted() {
        let server = TestServer::start().await.unwrap();
        let client = server.client();
        let mut request = wrap_request("alice", "doc1");
        request.expires_at = Some(START_TIME + 60);
        let wrapped = client.wrap_key(&request).await.unwrap();

        server.clock.advance(60);

        let result = client
            .unwrap_key(&UnwrapKeyRequest::for_wrapped(&wrapped, "alice", "doc1"))
            .await;
        assert_eq!(failure_status(result), StatusCode::NOT_FOUND);
        assert_eq!(client.health().await.unwrap().active_keys, 0);
    }

    #[tokio::test]
    async fn test_blocked_user_rejected() {
        let server = TestServer::start().await.unwrap();
        let result = server
            .client()
            .wrap_key(&wrap_request("banned_user", "doc1"))
            .await;
        assert_eq!(failure_status(result), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_malformed_requests_bad_request() {
        let server = TestServer::start().await.unwrap();
        let client = server.client();

        let (status, body) = client
            .post_raw("/api/wrap-key", "{not json".to_string())
            .await
            .unwrap();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let mut request = wrap_request("alice", "doc1");
        request.dek = "zz".to_string();
        let result = client.wrap_key(&request).await;
        assert_eq!(failure_status(result), StatusCode::BAD_REQUEST);

        let result = client.wrap_key(&wrap_request("", "doc1")).await;
        assert_eq!(failure_status(result), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_tampered_envelope_hides_details() {
        let server = TestServer::start().await.unwrap();
        let client = server.client();
        let mut wrapped = client.wrap_key(&wrap_request("alice", "doc1")).await.unwrap();
        wrapped.auth_tag = "00".repeat(16);

        let err = client
            .unwrap_key(&UnwrapKeyRequest::for_wrapped(&wrapped, "alice", "doc1"))
            .await
            .unwrap_err()
            .downcast::<ApiFailure>()
            .unwrap();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.error, "Internal server error");
    }

    #[tokio::test]
    async fn test_generate_and_rotate_workflow() {
        let server = TestServer::start().await.unwrap();
        let client = server.client();

        let generated = client
            .generate_key(&GenerateKeyRequest {
                owner_user_id: "alice".into(),
                resource_id: "doc1".into(),
                key_size: None,
            })
            .await
            .unwrap();
        assert_eq!(generated.dek.len(), 64);

        server.clock.advance(10);
        let rotation = client
            .rotate_key(&RotateKeyRequest {
                old_key_id: generated.key_id.clone(),
                owner_user_id: "alice".into(),
                resource_id: "doc1".into(),
            })
            .await
            .unwrap();
        assert_eq!(rotation.old_key_id, generated.key_id);
        assert_ne!(rotation.new_key_id, generated.key_id);
        assert_ne!(rotation.new_dek, generated.dek);
        assert_eq!(rotation.rotated_at, START_TIME + 10);

        // The new key unwraps to the new data key.
        let unwrapped = client
            .unwrap_key(&UnwrapKeyRequest {
                ciphertext: rotation.new_ciphertext.clone(),
                nonce: rotation.new_nonce.clone(),
                auth_tag: rotation.new_auth_tag.clone(),
                key_id: rotation.new_key_id.clone(),
                caller_user_id: "alice".into(),
                resource_id: Some("doc1".into()),
            })
            .await
            .unwrap();
        assert_eq!(unwrapped.dek, rotation.new_dek);

        // The old key stays usable until the grace period ends.
        let old = UnwrapKeyRequest {
            ciphertext: generated.ciphertext.clone(),
            nonce: generated.nonce.clone(),
            auth_tag: generated.auth_tag.clone(),
            key_id: generated.key_id.clone(),
            caller_user_id: "alice".into(),
            resource_id: Some("doc1".into()),
        };
        assert_eq!(client.unwrap_key(&old).await.unwrap().dek, generated.dek);

        let result = client
            .rotate_key(&RotateKeyRequest {
                old_key_id: generated.key_id.clone(),
                owner_user_id: "alice".into(),
                resource_id: "doc1".into(),
            })
            .await;
        assert_eq!(failure_status(result), StatusCode::BAD_REQUEST);

        server.clock.advance(86_400);
        assert_eq!(failure_status(client.unwrap_key(&old).await), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rotate_requires_owner() {
        let server = TestServer::start().await.unwrap();
        let client = server.client();
        let wrapped = client.wrap_key(&wrap_request("alice", "doc1")).await.unwrap();

        let result = client
            .rotate_key(&RotateKeyRequest {
                old_key_id: wrapped.key_id,
                owner_user_id: "bob".into(),
                resource_id: "doc1".into(),
            })
            .await;
        assert_eq!(failure_status(result), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_public_key_directory_workflow() {
        let server = TestServer::start().await.unwrap();
        let client = server.client();
        let alice_key = "BA".to_string() + &"A".repeat(86);
        let carol_key = "BC".to_string() + &"Q".repeat(86);

        for (user, key) in [("carol", &carol_key), ("alice", &alice_key)] {
            let registered = client
                .register_public_key(&RegisterPublicKeyRequest {
                    user_id: user.into(),
                    public_key: key.clone(),
                    algorithm: "ECDH-P256".into(),
                })
                .await
                .unwrap();
            assert!(registered.success);
        }

        let fetched = client.get_public_key("alice").await.unwrap();
        assert_eq!(fetched.public_key, alice_key);
        assert_eq!(fetched.algorithm, "ECDH-P256");
        assert_eq!(fetched.registered_at, START_TIME);

        let listed = client.list_public_keys().await.unwrap();
        assert_eq!(listed.count, 2);
        let users: Vec<_> = listed.records.iter().map(|r| r.user_id.as_str()).collect();
        assert_eq!(users, ["alice", "carol"]);
        assert_eq!(
            listed.records[0].public_key_preview,
            format!("{}...", &alice_key[..20])
        );

        assert_eq!(
            failure_status(client.get_public_key("dave").await),
            StatusCode::NOT_FOUND
        );
        assert_eq!(client.health().await.unwrap().registered_public_keys, 2);
    }

    #[tokio::test]
    async fn test_register_rejects_unsupported_algorithm() {
        let server = TestServer::start().await.unwrap();
        let result = server
            .client()
            .register_public_key(&RegisterPublicKeyRequest {
                user_id: "alice".into(),
                public_key: "A".repeat(88),
                algorithm: "RSA-2048".into(),
            })
            .await;
        assert_eq!(failure_status(result), StatusCode::BAD_REQUEST);
    }
}

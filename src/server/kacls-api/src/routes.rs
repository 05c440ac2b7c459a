//! Route handlers.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};

use kacls_crypto::DataKey;
use kacls_envelope::{RotateRequest, WrapRequest};
use kacls_storage::{EnvelopeRecord, KeyId};

use crate::dto::{
    decode_base64, decode_hex, GenerateKeyRequest, GenerateKeyResponse, HealthResponse,
    PublicKeyListResponse, PublicKeyResponse, RegisterPublicKeyRequest,
    RegisterPublicKeyResponse, RotateKeyRequest, RotateKeyResponse, UnwrapKeyRequest,
    UnwrapKeyResponse, WrapKeyRequest, WrapKeyResponse,
};
use crate::error::ApiError;
use crate::{AppState, SERVICE_NAME};

/// Key size used by generate-key when none is given.
const DEFAULT_KEY_SIZE_BITS: usize = 256;

type ApiResult<T> = Result<Json<T>, ApiError>;

fn required(field: &str, value: String) -> Result<String, ApiError> {
    if value.is_empty() {
        return Err(ApiError::BadRequest(format!("Missing required field: {field}")));
    }
    Ok(value)
}

fn optional(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

pub(crate) async fn health(State(state): State<AppState>) -> ApiResult<HealthResponse> {
    let ready = state.envelope.is_ready();
    Ok(Json(HealthResponse {
        service: SERVICE_NAME.to_string(),
        status: if ready { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        master_key_initialized: ready,
        registered_public_keys: state.directory.len(),
        active_keys: state.envelope.key_count()?,
    }))
}

pub(crate) async fn wrap_key(
    State(state): State<AppState>,
    payload: Result<Json<WrapKeyRequest>, JsonRejection>,
) -> ApiResult<WrapKeyResponse> {
    let Json(req) = payload?;

    let dek_bytes = decode_hex("dek", &required("dek", req.dek)?)?;
    let dek = DataKey::from_bytes(&dek_bytes).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let request = WrapRequest {
        owner_user_id: required("ownerUserId", req.owner_user_id)?,
        resource_id: Some(required("resourceId", req.resource_id)?),
        permissions: req.permissions,
        expires_at: req.expires_at,
    };

    let wrapped = state.envelope.wrap(&dek, request)?;
    Ok(Json(wrapped.into()))
}

pub(crate) async fn unwrap_key(
    State(state): State<AppState>,
    payload: Result<Json<UnwrapKeyRequest>, JsonRejection>,
) -> ApiResult<UnwrapKeyResponse> {
    let Json(req) = payload?;

    let key_id = KeyId::new(required("keyId", req.key_id)?);
    let caller = required("callerUserId", req.caller_user_id)?;
    let envelope = EnvelopeRecord {
        key_id: key_id.clone(),
        ciphertext: decode_hex("ciphertext", &required("ciphertext", req.ciphertext)?)?,
        nonce: decode_hex("nonce", &required("nonce", req.nonce)?)?,
        auth_tag: decode_hex("authTag", &required("authTag", req.auth_tag)?)?,
        algorithm: req.algorithm,
    };
    let resource_id = optional(req.resource_id);

    let unwrapped = state
        .envelope
        .unwrap(&envelope, &key_id, &caller, resource_id.as_deref())?;
    Ok(Json(unwrapped.into()))
}

pub(crate) async fn generate_key(
    State(state): State<AppState>,
    payload: Result<Json<GenerateKeyRequest>, JsonRejection>,
) -> ApiResult<GenerateKeyResponse> {
    let Json(req) = payload?;

    let request = WrapRequest {
        owner_user_id: required("ownerUserId", req.owner_user_id)?,
        resource_id: Some(required("resourceId", req.resource_id)?),
        permissions: req.permissions,
        expires_at: req.expires_at,
    };
    let bits = req.key_size.unwrap_or(DEFAULT_KEY_SIZE_BITS);

    let generated = state.envelope.generate_key(request, bits)?;
    Ok(Json(generated.into()))
}

pub(crate) async fn rotate_key(
    State(state): State<AppState>,
    payload: Result<Json<RotateKeyRequest>, JsonRejection>,
) -> ApiResult<RotateKeyResponse> {
    let Json(req) = payload?;

    let old_key_id = KeyId::new(required("oldKeyId", req.old_key_id)?);
    let request = RotateRequest {
        owner_user_id: required("ownerUserId", req.owner_user_id)?,
        resource_id: Some(required("resourceId", req.resource_id)?),
        permissions: req.permissions,
        expires_at: req.expires_at,
    };

    let rotation = state.envelope.rotate(&old_key_id, request)?;
    Ok(Json(rotation.into()))
}

pub(crate) async fn register_public_key(
    State(state): State<AppState>,
    payload: Result<Json<RegisterPublicKeyRequest>, JsonRejection>,
) -> ApiResult<RegisterPublicKeyResponse> {
    let Json(req) = payload?;

    let user_id = required("userId", req.user_id)?;
    let public_key = decode_base64("publicKey", &required("publicKey", req.public_key)?)?;
    let algorithm = required("algorithm", req.algorithm)?;

    let key_id = state
        .directory
        .register(&user_id, &public_key, &algorithm)?;
    Ok(Json(RegisterPublicKeyResponse {
        success: true,
        key_id: key_id.to_string(),
    }))
}

pub(crate) async fn get_public_key(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<PublicKeyResponse> {
    let record = state.directory.get(&user_id)?;
    Ok(Json(record.into()))
}

pub(crate) async fn list_public_keys(
    State(state): State<AppState>,
) -> ApiResult<PublicKeyListResponse> {
    let records: Vec<_> = state
        .directory
        .list()
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(Json(PublicKeyListResponse {
        count: records.len(),
        records,
    }))
}

//! Encrypted payload shapes accepted for relay.
//!
//! Two shapes exist. The key-exchange shape carries data encrypted under an
//! ECDH-derived key and is identified by its timestamp. The legacy shape
//! carries data encrypted under a wrapped data key and names that key.

use serde_json::Value;

use crate::error::RelayError;

/// Algorithm tag of the key-exchange shape.
pub const KEY_EXCHANGE_ALGORITHM: &str = "ECDH-AES-GCM";

/// Algorithm tags accepted for the legacy shape.
pub const LEGACY_ALGORITHMS: [&str; 2] = ["AES-GCM", "aes-256-gcm"];

/// A validated encrypted payload.
#[derive(Debug, Clone, PartialEq)]
pub enum EncryptedPayload {
    /// Encrypted under a key agreed between the two clients.
    KeyExchange {
        /// Opaque ciphertext.
        encrypted_data: String,
        /// Opaque IV.
        iv: String,
        /// Sender-side timestamp, string or number.
        timestamp: Value,
    },
    /// Encrypted under a data key wrapped by this service.
    Legacy {
        /// Opaque ciphertext.
        encrypted_data: String,
        /// Opaque IV.
        iv: String,
        /// Wrapped key the data was encrypted with.
        key_id: String,
        /// Declared algorithm tag.
        algorithm: String,
    },
}

impl EncryptedPayload {
    /// Validates a JSON payload against the two accepted shapes.
    pub fn from_json(value: &Value) -> Result<Self, RelayError> {
        let object = value.as_object().ok_or(RelayError::NotAnObject)?;

        let algorithm = match object.get("algorithm") {
            None | Some(Value::Null) => return Err(RelayError::MissingField("algorithm")),
            Some(Value::String(s)) if s.is_empty() => {
                return Err(RelayError::MissingField("algorithm"))
            }
            Some(Value::String(s)) => s.as_str(),
            Some(_) => return Err(RelayError::InvalidField("algorithm")),
        };

        if algorithm == KEY_EXCHANGE_ALGORITHM {
            let encrypted_data = required_string(value, "encryptedData")?;
            let iv = required_string(value, "iv")?;
            let timestamp = match object.get("timestamp") {
                Some(Value::String(s)) if !s.is_empty() => Value::String(s.clone()),
                Some(Value::Number(n)) if n.as_f64() != Some(0.0) => Value::Number(n.clone()),
                Some(Value::Bool(_)) | Some(Value::Array(_)) | Some(Value::Object(_)) => {
                    return Err(RelayError::InvalidField("timestamp"))
                }
                _ => return Err(RelayError::MissingField("timestamp")),
            };
            return Ok(Self::KeyExchange {
                encrypted_data,
                iv,
                timestamp,
            });
        }

        if LEGACY_ALGORITHMS.contains(&algorithm) {
            return Ok(Self::Legacy {
                encrypted_data: required_string(value, "encryptedData")?,
                iv: required_string(value, "iv")?,
                key_id: required_string(value, "keyId")?,
                algorithm: algorithm.to_string(),
            });
        }

        Err(RelayError::UnsupportedAlgorithm(algorithm.to_string()))
    }

    /// Declared algorithm tag.
    pub fn algorithm(&self) -> &str {
        match self {
            Self::KeyExchange { .. } => KEY_EXCHANGE_ALGORITHM,
            Self::Legacy { algorithm, .. } => algorithm,
        }
    }

    /// Wrapped key id, for the legacy shape.
    pub fn key_id(&self) -> Option<&str> {
        match self {
            Self::KeyExchange { .. } => None,
            Self::Legacy { key_id, .. } => Some(key_id),
        }
    }
}

fn required_string(value: &Value, field: &'static str) -> Result<String, RelayError> {
    match value.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        None | Some(Value::Null) | Some(Value::String(_)) => Err(RelayError::MissingField(field)),
        Some(_) => Err(RelayError::InvalidField(field)),
    }
}

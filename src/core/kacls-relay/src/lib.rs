//! # KACLS Relay
//!
//! The part of message relay that depends on KACLS: validating encrypted
//! payloads before they are forwarded, and holding them for recipients who
//! are offline. Transport and presence tracking are left to the caller.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod mailbox;
pub mod payload;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use kacls_storage::Clock;

pub use error::RelayError;
pub use mailbox::{MailboxConfig, OfflineMailbox, DEFAULT_MAILBOX_CAPACITY};
pub use payload::{EncryptedPayload, KEY_EXCHANGE_ALGORITHM, LEGACY_ALGORITHMS};

/// A validated message ready for delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayedMessage {
    /// Message id.
    pub id: String,
    /// Sending user.
    pub sender_id: String,
    /// Receiving user.
    pub recipient_id: String,
    /// Declared algorithm tag.
    pub algorithm: String,
    /// Wrapped key id, for the legacy shape.
    pub key_id: Option<String>,
    /// The payload as received.
    pub encrypted_content: Value,
    /// Relay time (Unix seconds).
    pub timestamp: u64,
}

/// What happened to a routed message.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// Recipient is online; hand the message to its connection.
    Deliver(RelayedMessage),
    /// Recipient is offline; the message waits in the mailbox.
    Queued {
        /// Id of the queued message.
        message_id: String,
    },
}

/// Validates and routes encrypted messages.
pub struct Relay {
    mailbox: OfflineMailbox,
    clock: Arc<dyn Clock>,
}

impl Relay {
    /// Creates a relay with its own mailbox.
    pub fn new(config: MailboxConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            mailbox: OfflineMailbox::new(config),
            clock,
        }
    }

    /// Validates `content` and routes it from `sender_id` to `recipient_id`.
    ///
    /// Invalid payloads are refused before anything is stored.
    pub fn route(
        &self,
        sender_id: &str,
        recipient_id: &str,
        content: Value,
        recipient_online: bool,
    ) -> Result<Delivery, RelayError> {
        if sender_id.is_empty() {
            return Err(RelayError::InvalidParticipant("sender"));
        }
        if recipient_id.is_empty() {
            return Err(RelayError::InvalidParticipant("recipient"));
        }

        let payload = EncryptedPayload::from_json(&content).map_err(|e| {
            warn!(sender_id, error = %e, "Encrypted payload rejected");
            e
        })?;

        let message = RelayedMessage {
            id: Uuid::new_v4().to_string(),
            sender_id: sender_id.to_string(),
            recipient_id: recipient_id.to_string(),
            algorithm: payload.algorithm().to_string(),
            key_id: payload.key_id().map(str::to_string),
            encrypted_content: content,
            timestamp: self.clock.now(),
        };

        if recipient_online {
            info!(
                algorithm = %message.algorithm,
                sender_id,
                recipient_id,
                "Encrypted message delivered"
            );
            return Ok(Delivery::Deliver(message));
        }

        let message_id = message.id.clone();
        self.mailbox.deposit(message);
        info!(sender_id, recipient_id, "Encrypted message queued for offline recipient");
        Ok(Delivery::Queued { message_id })
    }

    /// Hands over everything queued for a recipient that came online.
    pub fn take_pending(&self, recipient_id: &str) -> Vec<RelayedMessage> {
        self.mailbox.drain(recipient_id)
    }

    /// Number of messages waiting for `recipient_id`.
    pub fn pending(&self, recipient_id: &str) -> usize {
        self.mailbox.pending(recipient_id)
    }
}

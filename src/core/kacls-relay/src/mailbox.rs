//! Bounded per-recipient store for messages to offline users.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use tracing::debug;

use crate::RelayedMessage;

/// Messages kept per recipient by default.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 100;

/// Mailbox configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxConfig {
    /// Messages kept per recipient; older ones are dropped first.
    pub capacity: usize,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }
}

/// FIFO mailboxes keyed by recipient.
#[derive(Debug, Default)]
pub struct OfflineMailbox {
    config: MailboxConfig,
    queues: Mutex<HashMap<String, VecDeque<RelayedMessage>>>,
}

impl OfflineMailbox {
    /// Creates empty mailboxes.
    pub fn new(config: MailboxConfig) -> Self {
        Self {
            config,
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// Queues a message for its recipient. Returns how many older messages
    /// were dropped to stay within capacity.
    pub fn deposit(&self, message: RelayedMessage) -> usize {
        let mut queues = self.queues.lock();
        let queue = queues.entry(message.recipient_id.clone()).or_default();
        queue.push_back(message);

        let mut dropped = 0;
        while queue.len() > self.config.capacity {
            queue.pop_front();
            dropped += 1;
        }
        if dropped > 0 {
            debug!(dropped, "Offline mailbox full, dropped oldest messages");
        }
        dropped
    }

    /// Removes and returns every message queued for `recipient_id`, oldest
    /// first.
    pub fn drain(&self, recipient_id: &str) -> Vec<RelayedMessage> {
        self.queues
            .lock()
            .remove(recipient_id)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Number of messages waiting for `recipient_id`.
    pub fn pending(&self, recipient_id: &str) -> usize {
        self.queues
            .lock()
            .get(recipient_id)
            .map_or(0, VecDeque::len)
    }
}

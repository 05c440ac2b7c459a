//! Access gate trait and implementations.

use std::collections::HashSet;

use tracing::debug;

/// Ids refused by [`BlocklistGate::default`].
pub const DEFAULT_BLOCKLIST: [&str; 2] = ["banned_user", "test_malicious"];

/// Longest user id accepted by [`BlocklistGate`], in bytes.
pub const MAX_USER_ID_LEN: usize = 256;

/// Decides whether a user id may take part in a key operation.
pub trait AccessGate: Send + Sync {
    /// Returns true if `user_id` is currently acceptable.
    fn validate(&self, user_id: &str) -> bool;

    /// Returns the name of this gate for logging.
    fn name(&self) -> &'static str;
}

/// Accepts non-empty ids that are not blocklisted.
#[derive(Debug, Clone)]
pub struct BlocklistGate {
    blocked: HashSet<String>,
}

impl BlocklistGate {
    /// Creates a gate refusing exactly the given ids.
    pub fn new<I, S>(blocked: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            blocked: blocked.into_iter().map(Into::into).collect(),
        }
    }

    /// Adds an id to the blocklist.
    pub fn block(&mut self, user_id: impl Into<String>) {
        self.blocked.insert(user_id.into());
    }

    /// Number of blocked ids.
    pub fn blocked_count(&self) -> usize {
        self.blocked.len()
    }
}

impl Default for BlocklistGate {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCKLIST)
    }
}

impl AccessGate for BlocklistGate {
    fn validate(&self, user_id: &str) -> bool {
        if user_id.is_empty() || user_id.len() > MAX_USER_ID_LEN {
            debug!(len = user_id.len(), "Rejected malformed user id");
            return false;
        }
        if self.blocked.contains(user_id) {
            debug!(user_id, "Rejected blocklisted user");
            return false;
        }
        true
    }

    fn name(&self) -> &'static str {
        "blocklist"
    }
}

/// Accepts every non-empty id.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAllGate;

impl AccessGate for AllowAllGate {
    fn validate(&self, user_id: &str) -> bool {
        !user_id.is_empty()
    }

    fn name(&self) -> &'static str {
        "allow-all"
    }
}

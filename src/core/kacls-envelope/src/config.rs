//! Envelope service configuration.

use std::time::Duration;

/// One day.
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Tunables of [`KeyEnvelopeService`](crate::KeyEnvelopeService).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeConfig {
    /// Lifetime of a grant when the caller gives no expiry.
    pub default_ttl: Duration,

    /// How long a superseded key stays unwrappable after rotation.
    ///
    /// The old grant's expiry becomes `min(expiry, rotated_at + grace)`.
    /// `None` keeps the old expiry unchanged.
    pub rotation_grace: Option<Duration>,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            default_ttl: DAY,
            rotation_grace: Some(DAY),
        }
    }
}

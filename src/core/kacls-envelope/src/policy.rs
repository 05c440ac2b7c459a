//! Permission evaluation.
//!
//! [`decide`] is a pure function of the grant, the caller and the clock. It
//! touches no storage, so the service decides what each outcome means
//! (eviction on expiry, denial otherwise).

use std::fmt;

use kacls_storage::GrantMetadata;

/// Why access was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The grant is past its expiry.
    Expired,
    /// Caller is not the owner.
    OwnerMismatch,
    /// Requested resource differs from the grant's.
    ResourceMismatch,
    /// The access gate rejected the user id.
    UserRejected,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::Expired => "grant expired",
            Self::OwnerMismatch => "caller does not own this key",
            Self::ResourceMismatch => "key is not granted for this resource",
            Self::UserRejected => "user rejected",
        };
        f.write_str(reason)
    }
}

/// Outcome of a permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Unwrap may proceed.
    Allow,
    /// Unwrap must not proceed.
    Deny(DenyReason),
}

/// Decides whether `caller` may unwrap the key governed by `grant`.
///
/// Expiry is checked first so an expired key looks the same to every
/// caller. The resource is only compared when the caller names one.
pub fn decide(
    grant: &GrantMetadata,
    caller: &str,
    resource_id: Option<&str>,
    now: u64,
) -> Decision {
    if grant.is_expired(now) {
        return Decision::Deny(DenyReason::Expired);
    }

    if grant.owner_user_id != caller {
        return Decision::Deny(DenyReason::OwnerMismatch);
    }

    if let Some(requested) = resource_id {
        if grant.resource_id.as_deref() != Some(requested) {
            return Decision::Deny(DenyReason::ResourceMismatch);
        }
    }

    Decision::Allow
}

#[cfg(test)]
mod tests {
    use super::*;
    use kacls_storage::{GrantStatus, KeyId};
    use std::collections::BTreeSet;

    fn grant(resource_id: Option<&str>) -> GrantMetadata {
        GrantMetadata {
            key_id: KeyId::new("k1"),
            owner_user_id: "alice".into(),
            resource_id: resource_id.map(Into::into),
            permissions: BTreeSet::new(),
            created_at: 0,
            expires_at: 100,
            status: GrantStatus::Active,
            rotated_from: None,
            rotated_to: None,
            rotated_at: None,
        }
    }

    #[test]
    fn test_owner_allowed() {
        let g = grant(Some("doc1"));
        assert_eq!(decide(&g, "alice", Some("doc1"), 50), Decision::Allow);
        assert_eq!(decide(&g, "alice", None, 50), Decision::Allow);
    }

    #[test]
    fn test_other_user_denied() {
        let g = grant(Some("doc1"));
        assert_eq!(
            decide(&g, "bob", Some("doc1"), 50),
            Decision::Deny(DenyReason::OwnerMismatch)
        );
    }

    #[test]
    fn test_resource_mismatch() {
        let g = grant(Some("doc1"));
        assert_eq!(
            decide(&g, "alice", Some("doc2"), 50),
            Decision::Deny(DenyReason::ResourceMismatch)
        );

        // A key with no resource cannot be claimed for one.
        let unscoped = grant(None);
        assert_eq!(
            decide(&unscoped, "alice", Some("doc1"), 50),
            Decision::Deny(DenyReason::ResourceMismatch)
        );
        assert_eq!(decide(&unscoped, "alice", None, 50), Decision::Allow);
    }

    #[test]
    fn test_expiry_checked_first() {
        let g = grant(Some("doc1"));
        assert_eq!(
            decide(&g, "bob", Some("other"), 100),
            Decision::Deny(DenyReason::Expired)
        );
        assert_eq!(
            decide(&g, "alice", Some("doc1"), 100),
            Decision::Deny(DenyReason::Expired)
        );
        assert_eq!(decide(&g, "alice", Some("doc1"), 99), Decision::Allow);
    }

    #[test]
    fn test_rotated_grant_still_allowed() {
        let mut g = grant(Some("doc1"));
        g.status = GrantStatus::Rotated;
        g.rotated_to = Some(KeyId::new("k2"));
        assert_eq!(decide(&g, "alice", Some("doc1"), 50), Decision::Allow);
    }
}

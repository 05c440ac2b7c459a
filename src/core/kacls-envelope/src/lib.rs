//! # KACLS Envelope
//!
//! Envelope encryption of data keys with access grants.
//!
//! ## Features
//!
//! - Wrap a caller's data key under the master secret, bound to a fresh key id
//! - Unwrap for the owner only, optionally scoped to a resource, until expiry
//! - Rotation with a bounded grace period for the superseded key
//! - Expiry eviction, both on access and in bulk

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod policy;
pub mod service;

pub use config::EnvelopeConfig;
pub use error::EnvelopeError;
pub use policy::{decide, Decision, DenyReason};
pub use service::{
    GeneratedKey, KeyEnvelopeService, RotateRequest, Rotation, UnwrappedKey, WrapRequest,
    WrappedKey, DEFAULT_PERMISSIONS,
};

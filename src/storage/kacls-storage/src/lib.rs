//! # KACLS Storage
//!
//! Storage abstraction for wrapped keys.
//!
//! A key is stored as one aggregate [`KeyRecord`] (envelope plus grant)
//! under its [`KeyId`]. Changes spanning several keys go through a
//! [`WriteBatch`], which backends apply all-or-nothing.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod error;
pub mod record;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::StorageError;
pub use record::{EnvelopeRecord, GrantMetadata, GrantStatus, KeyId, KeyRecord};
pub use store::{KeyRecordStore, Mutation, WriteBatch};

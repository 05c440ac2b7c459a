//! # KACLS Auth
//!
//! Identity gating for key operations.
//!
//! Identity and session issuance live outside this service. What remains
//! here is a single predicate: is this user id acceptable for a key
//! operation right now? A `false` answer stops the operation before any
//! lookup or cryptography happens.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod gate;

pub use gate::{AccessGate, AllowAllGate, BlocklistGate, DEFAULT_BLOCKLIST, MAX_USER_ID_LEN};

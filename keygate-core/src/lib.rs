//! Core authentication and authorization primitives for keygate
//!
//! keygate issues and verifies first-party bearer tokens: a short-lived
//! access token plus a longer-lived refresh token, both signed with a
//! rotatable Ed25519 key. Revocation works at two levels: rotating the
//! signing key invalidates every outstanding token once the overlap window
//! elapses, and rotating a single account's secret invalidates only that
//! account's tokens.

pub mod auth;
pub mod error;
pub mod types;

pub use auth::*;
pub use error::*;
pub use types::*;

/// Result type alias for keygate operations
pub type Result<T> = std::result::Result<T, KeygateError>;

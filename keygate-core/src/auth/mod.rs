//! Authentication and authorization module for keygate
//!
//! This module implements the token plane with:
//! - Ed25519 signing keys and rotation with a verification overlap window
//! - Compact signed token encoding for access/refresh pairs
//! - Per-account revocation through secret fingerprints
//! - Single-use refresh token tracking
//! - Constant-time cryptographic comparisons

pub mod keys;
pub mod replay;
pub mod service;
pub mod store;
pub mod timing;
pub mod token;

pub use keys::*;
pub use replay::*;
pub use service::*;
pub use store::*;
pub use timing::*;
pub use token::*;

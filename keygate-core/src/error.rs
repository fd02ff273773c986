//! Error types for keygate
//!
//! Every decode/verify path returns a typed failure; attacker-controlled
//! input must never panic the service. `Malformed` and `SignatureInvalid`
//! are mapped to the same external status by the HTTP layer but are kept
//! distinct here so they can be logged separately.

use crate::auth::TokenKind;
use crate::types::AccountId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeygateError {
    /// Structurally unparseable token or request input
    #[error("malformed token")]
    Malformed,

    /// Signature does not match the claims under the resolved key
    #[error("invalid token signature")]
    SignatureInvalid,

    /// Token is past its expiry; the client should use the refresh flow
    #[error("token expired")]
    Expired,

    /// Access token presented where a refresh token is required, or vice versa
    #[error("wrong token kind: expected {expected}, found {found}")]
    WrongKind {
        expected: TokenKind,
        found: TokenKind,
    },

    /// Key rotated out, account secret rotated, or refresh token already
    /// consumed; the client must fully re-authenticate
    #[error("token revoked")]
    Revoked,

    /// Valid principal, insufficient capability bits
    #[error("permission denied")]
    PermissionDenied,

    /// Source address not on the allowlist for the rotation operation
    #[error("source address not allowed")]
    Forbidden,

    #[error("account not found: {0}")]
    AccountNotFound(AccountId),

    /// Account store could not answer within the request deadline; retryable
    #[error("account store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("claims serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

//! Request-level access decisions
//!
//! The guard extracts a bearer token from a request, verifies it through
//! the auth service and hands the resulting principal to the handler. The
//! IP allowlist check for key rotation lives here too and fails closed: an
//! empty allowlist denies every caller.

use hyper::header::{AUTHORIZATION, COOKIE};
use hyper::{Request, StatusCode};
use keygate_core::{
    AccountSecretStore, AuthService, KeygateError, Permission, Principal, TokenKind,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// Cookie used for the browser flow
pub const TOKEN_COOKIE: &str = "token";

/// Guard configuration
#[derive(Debug, Clone, Default)]
pub struct GuardConfig {
    /// Source addresses allowed to trigger key rotation
    pub rotate_allowlist: Vec<IpAddr>,

    /// Honor the first `X-Forwarded-For` entry instead of the socket peer.
    /// Only enable behind a proxy that strips the client-supplied header.
    pub trust_forwarded_for: bool,
}

/// Middleware-level decision point in front of the auth service
pub struct AccessGuard<S> {
    service: Arc<AuthService<S>>,
    config: GuardConfig,
}

impl<S: AccountSecretStore> AccessGuard<S> {
    pub fn new(service: Arc<AuthService<S>>, config: GuardConfig) -> Self {
        AccessGuard { service, config }
    }

    /// Verify the request's bearer token and return the principal
    ///
    /// A request carrying no token at all reads as `Malformed`, the same
    /// externally as an unparseable one.
    pub fn authenticate<B>(&self, req: &Request<B>, kind: TokenKind) -> keygate_core::Result<Principal> {
        let token = bearer_token(req).ok_or(KeygateError::Malformed)?;
        self.service.verify(&token, kind)
    }

    /// Check that the principal holds every bit in `mask`
    ///
    /// Failure is distinguishable from "not authenticated": the caller had
    /// a valid token, just not the capability.
    pub fn require_permission(principal: &Principal, mask: Permission) -> keygate_core::Result<()> {
        if principal.permission.contains(mask) {
            Ok(())
        } else {
            Err(KeygateError::PermissionDenied)
        }
    }

    /// Check the caller's source address against the rotation allowlist
    pub fn require_allowed_ip<B>(
        &self,
        req: &Request<B>,
        remote: SocketAddr,
    ) -> keygate_core::Result<IpAddr> {
        let source = self.source_ip(req, remote);

        // Fail closed: no allowlist means nobody rotates
        if self.config.rotate_allowlist.is_empty() {
            return Err(KeygateError::Forbidden);
        }

        if self.config.rotate_allowlist.contains(&source) {
            Ok(source)
        } else {
            Err(KeygateError::Forbidden)
        }
    }

    fn source_ip<B>(&self, req: &Request<B>, remote: SocketAddr) -> IpAddr {
        if self.config.trust_forwarded_for {
            let forwarded = req
                .headers()
                .get("x-forwarded-for")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.split(',').next())
                .map(str::trim)
                .and_then(|value| value.parse().ok());

            if let Some(ip) = forwarded {
                return ip;
            }
        }

        remote.ip()
    }
}

/// Extract the bearer token from a request
///
/// The `Authorization` header wins; the `token` cookie is the fallback for
/// browser flows.
pub fn bearer_token<B>(req: &Request<B>) -> Option<String> {
    if let Some(value) = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    {
        if let Some(token) = value.strip_prefix("Bearer ") {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    for value in req.headers().get_all(COOKIE) {
        let Ok(value) = value.to_str() else { continue };
        for pair in value.split(';') {
            if let Some(token) = pair.trim().strip_prefix("token=") {
                if !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
    }

    None
}

/// Map an auth failure to its external status
///
/// `SignatureInvalid` is indistinguishable from `Malformed` on the wire to
/// avoid an oracle; the distinction survives only in logs.
pub fn status_for(error: &KeygateError) -> StatusCode {
    match error {
        KeygateError::Malformed
        | KeygateError::SignatureInvalid
        | KeygateError::Expired
        | KeygateError::WrongKind { .. }
        | KeygateError::Revoked
        | KeygateError::AccountNotFound(_) => StatusCode::UNAUTHORIZED,
        KeygateError::PermissionDenied | KeygateError::Forbidden => StatusCode::FORBIDDEN,
        KeygateError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        KeygateError::Serialization(_) | KeygateError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

//! Compact signed token encoding
//!
//! Tokens are three dot-separated base64url segments:
//! `header.claims.signature`, signed with Ed25519 over the first two
//! segments. The header carries the signing key version so a verifier can
//! resolve the right key before trusting anything else. The codec is pure:
//! expiry is checked by the caller, because expiry policy differs by token
//! kind.

use crate::{AccountId, KeygateError, Permission, Result, SecretFingerprint};
use crate::auth::keys::{KeyVersion, SigningKey};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use ed25519_dalek::Signature;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const TOKEN_ALG: &str = "EdDSA";
const TOKEN_TYP: &str = "JWT";

/// Access tokens authorize individual requests; refresh tokens are only
/// exchangeable for a new pair. Neither is accepted in the other's place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Access => write!(f, "access"),
            TokenKind::Refresh => write!(f, "refresh"),
        }
    }
}

/// Signed token claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject account
    pub sub: AccountId,

    /// Permission snapshot taken at issuance
    #[serde(rename = "prm")]
    pub permission: Permission,

    /// Account secret fingerprint at issuance
    #[serde(rename = "fpt")]
    pub fingerprint: SecretFingerprint,

    /// Token kind
    #[serde(rename = "knd")]
    pub kind: TokenKind,

    /// Unique token id (ULID), used for single-use refresh tracking
    pub jti: String,

    /// Issued-at, seconds since the Unix epoch
    pub iat: u64,

    /// Expiry, seconds since the Unix epoch
    pub exp: u64,
}

impl Claims {
    /// Build claims for a token issued now with the given lifetime
    pub fn new(
        sub: AccountId,
        permission: Permission,
        fingerprint: SecretFingerprint,
        kind: TokenKind,
        lifetime: Duration,
    ) -> Self {
        let iat = unix_now();
        Claims {
            sub,
            permission,
            fingerprint,
            kind,
            jti: ulid::Ulid::new().to_string(),
            iat,
            exp: iat + lifetime.as_secs(),
        }
    }

    /// Whether the token is past its expiry at `now` (Unix seconds)
    pub fn is_expired_at(&self, now: u64) -> bool {
        now >= self.exp
    }
}

/// Current time in seconds since the Unix epoch
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[derive(Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
    kid: KeyVersion,
}

/// Encoder/decoder for signed tokens; pure, no I/O
pub struct TokenCodec;

impl TokenCodec {
    /// Encode and sign claims with the supplied key
    ///
    /// Deterministic for fixed claims and key; fails only on claims that
    /// cannot identify a subject.
    pub fn encode(claims: &Claims, key: &SigningKey) -> Result<String> {
        if claims.sub.get() == 0 {
            return Err(KeygateError::Internal("claims missing subject".to_string()));
        }
        if claims.fingerprint.as_str().is_empty() {
            return Err(KeygateError::Internal(
                "claims missing secret fingerprint".to_string(),
            ));
        }

        let header = Header {
            alg: TOKEN_ALG.to_string(),
            typ: TOKEN_TYP.to_string(),
            kid: key.version(),
        };

        let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);
        let claims_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);

        let signing_input = format!("{}.{}", header_b64, claims_b64);
        let signature = key.sign(signing_input.as_bytes());
        let signature_b64 = URL_SAFE_NO_PAD.encode(signature.to_bytes());

        Ok(format!("{}.{}", signing_input, signature_b64))
    }

    /// Decode claims and key version WITHOUT verifying the signature
    ///
    /// Used to learn which key to verify against, since the key version is
    /// itself part of the token. Nothing returned here may be trusted until
    /// `verify` has passed.
    pub fn decode(token: &str) -> Result<(Claims, KeyVersion)> {
        let (header_b64, claims_b64, _) = split_token(token)?;

        let header_bytes = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|_| KeygateError::Malformed)?;
        let header: Header =
            serde_json::from_slice(&header_bytes).map_err(|_| KeygateError::Malformed)?;

        if header.alg != TOKEN_ALG {
            return Err(KeygateError::Malformed);
        }

        let claims_bytes = URL_SAFE_NO_PAD
            .decode(claims_b64)
            .map_err(|_| KeygateError::Malformed)?;
        let claims: Claims =
            serde_json::from_slice(&claims_bytes).map_err(|_| KeygateError::Malformed)?;

        Ok((claims, header.kid))
    }

    /// Verify the token signature with the supplied key and return the claims
    ///
    /// Every signature-stage failure collapses into `SignatureInvalid`, so a
    /// caller cannot learn which part of the check tripped.
    pub fn verify(token: &str, key: &SigningKey) -> Result<Claims> {
        let (header_b64, claims_b64, signature_b64) = split_token(token)?;

        let signature_bytes = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| KeygateError::SignatureInvalid)?;
        let signature =
            Signature::from_slice(&signature_bytes).map_err(|_| KeygateError::SignatureInvalid)?;

        // Sign over the raw segments as transmitted, not a re-encoding
        let signing_input = &token[..header_b64.len() + 1 + claims_b64.len()];
        key.verify(signing_input.as_bytes(), &signature)?;

        let claims_bytes = URL_SAFE_NO_PAD
            .decode(claims_b64)
            .map_err(|_| KeygateError::Malformed)?;
        let claims: Claims =
            serde_json::from_slice(&claims_bytes).map_err(|_| KeygateError::Malformed)?;

        Ok(claims)
    }
}

fn split_token(token: &str) -> Result<(&str, &str, &str)> {
    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(claims), Some(signature), None)
            if !header.is_empty() && !claims.is_empty() && !signature.is_empty() =>
        {
            Ok((header, claims, signature))
        }
        _ => Err(KeygateError::Malformed),
    }
}

//! Constant-time comparison helpers
//!
//! Fingerprint and token comparisons must not leak how much of the value
//! matched. Ed25519 signature verification is already constant-time in
//! dalek; these helpers cover the byte-level comparisons the service does
//! itself.

use crate::SecretFingerprint;
use subtle::ConstantTimeEq;

/// Constant-time byte slice comparison
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.ct_eq(b).into()
}

/// Constant-time secret fingerprint comparison
pub fn fingerprints_match(claimed: &SecretFingerprint, live: &SecretFingerprint) -> bool {
    constant_time_eq(claimed.as_str().as_bytes(), live.as_str().as_bytes())
}

/// Constant-time credential comparison (passwords, raw tokens)
pub fn secrets_match(provided: &str, expected: &str) -> bool {
    constant_time_eq(provided.as_bytes(), expected.as_bytes())
}

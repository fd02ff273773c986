//! Consumed refresh token registry
//!
//! Refresh tokens are single-use: exchanging one records its `jti` here
//! until the token's natural expiry, and a second exchange of the same
//! token fails as revoked. Access tokens are never tracked, so ordinary
//! request verification stays stateless.

use std::collections::HashMap;
use std::sync::Mutex;

/// Tracks refresh token ids that have already been exchanged
///
/// Entries are pruned opportunistically once their token would have
/// expired anyway, which bounds the registry by the refresh lifetime.
#[derive(Debug, Default)]
pub struct ReplayRegistry {
    consumed: Mutex<HashMap<String, u64>>,
}

impl ReplayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a token id as consumed
    ///
    /// Returns `true` on first use and `false` if the id was already
    /// consumed. `expires_at`/`now` are Unix seconds.
    pub fn consume(&self, jti: &str, expires_at: u64, now: u64) -> bool {
        let mut consumed = self.consumed.lock().expect("replay registry lock poisoned");

        consumed.retain(|_, exp| *exp > now);

        if consumed.contains_key(jti) {
            return false;
        }

        consumed.insert(jti.to_string(), expires_at);
        true
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.consumed
            .lock()
            .expect("replay registry lock poisoned")
            .len()
    }
}

//! Ed25519 signing keys and rotation
//!
//! The ring holds the current signing key plus at most one demoted
//! predecessor that stays valid for verification only until its overlap
//! window elapses. Rotation swaps an immutable snapshot under a write
//! lock, so verifiers always observe either the pre- or post-rotation
//! state, never a half-updated one.

use crate::{KeygateError, Result};
use ed25519_dalek::{Signature, Signer, SigningKey as Ed25519SigningKey, Verifier};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

/// Monotonically increasing signing key version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyVersion(u64);

impl KeyVersion {
    pub fn new(version: u64) -> Self {
        KeyVersion(version)
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    fn next(&self) -> KeyVersion {
        KeyVersion(self.0 + 1)
    }
}

impl fmt::Display for KeyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A versioned Ed25519 signing key with its validity bounds
///
/// `not_after` is `None` for the current key and set to the end of the
/// overlap window once the key has been demoted by a rotation.
#[derive(Clone)]
pub struct SigningKey {
    version: KeyVersion,
    material: Ed25519SigningKey,
    not_before: SystemTime,
    not_after: Option<SystemTime>,
}

impl SigningKey {
    /// Generate a fresh key that is immediately usable for signing
    pub fn generate(version: KeyVersion) -> Self {
        SigningKey {
            version,
            material: Ed25519SigningKey::generate(&mut OsRng),
            not_before: SystemTime::now(),
            not_after: None,
        }
    }

    pub fn version(&self) -> KeyVersion {
        self.version
    }

    pub fn not_before(&self) -> SystemTime {
        self.not_before
    }

    pub fn not_after(&self) -> Option<SystemTime> {
        self.not_after
    }

    /// Sign raw bytes with this key
    pub fn sign(&self, data: &[u8]) -> Signature {
        self.material.sign(data)
    }

    /// Verify a signature over raw bytes
    ///
    /// Ed25519 verification in dalek is constant-time; any mismatch maps
    /// uniformly to `SignatureInvalid`.
    pub fn verify(&self, data: &[u8], signature: &Signature) -> Result<()> {
        self.material
            .verifying_key()
            .verify(data, signature)
            .map_err(|_| KeygateError::SignatureInvalid)
    }

    pub fn verifying_key_bytes(&self) -> [u8; 32] {
        self.material.verifying_key().to_bytes()
    }

    /// Whether this key may be used for verification at `now`
    pub fn usable_at(&self, now: SystemTime) -> bool {
        if now < self.not_before {
            return false;
        }
        match self.not_after {
            Some(not_after) => now < not_after,
            None => true,
        }
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("version", &self.version)
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .finish_non_exhaustive()
    }
}

/// Immutable view of the ring, swapped wholesale on rotation
struct RingState {
    current: SigningKey,
    previous: Option<SigningKey>,
}

/// Holds the current and previous signing keys
///
/// `current`/`resolve` clone an `Arc` snapshot and may run concurrently
/// across requests; `rotate` is the single writer.
pub struct KeyRing {
    state: RwLock<Arc<RingState>>,
    overlap: Duration,
}

impl KeyRing {
    /// Default verification overlap after a rotation
    pub const DEFAULT_OVERLAP: Duration = Duration::from_secs(60 * 60);

    /// Create a ring with a freshly generated first key
    pub fn new(overlap: Duration) -> Self {
        let first = SigningKey::generate(KeyVersion::new(1));
        KeyRing {
            state: RwLock::new(Arc::new(RingState {
                current: first,
                previous: None,
            })),
            overlap,
        }
    }

    fn snapshot(&self) -> Arc<RingState> {
        self.state.read().expect("key ring lock poisoned").clone()
    }

    /// The key used for new signatures
    pub fn current(&self) -> SigningKey {
        self.snapshot().current.clone()
    }

    /// Look up a key usable for verification at this moment
    ///
    /// Reports `None` for unknown versions and for the previous key once
    /// its overlap window has elapsed; that miss is how old tokens are
    /// invalidated server-wide.
    pub fn resolve(&self, version: KeyVersion) -> Option<SigningKey> {
        let state = self.snapshot();
        let now = SystemTime::now();

        if state.current.version == version && state.current.usable_at(now) {
            return Some(state.current.clone());
        }

        state
            .previous
            .as_ref()
            .filter(|key| key.version == version && key.usable_at(now))
            .cloned()
    }

    /// Generate a new current key, demoting the old one for the overlap window
    ///
    /// A previously demoted key is dropped outright, so at most two key
    /// versions are ever resolvable.
    pub fn rotate(&self) -> SigningKey {
        let mut state = self.state.write().expect("key ring lock poisoned");
        let now = SystemTime::now();

        let fresh = SigningKey::generate(state.current.version.next());
        let mut demoted = state.current.clone();
        demoted.not_after = Some(now + self.overlap);

        *state = Arc::new(RingState {
            current: fresh.clone(),
            previous: Some(demoted),
        });

        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ring_has_signing_key() {
        let ring = KeyRing::new(KeyRing::DEFAULT_OVERLAP);
        let current = ring.current();

        assert_eq!(current.version(), KeyVersion::new(1));
        assert!(current.not_after().is_none());
        assert!(current.usable_at(SystemTime::now()));
    }

    #[test]
    fn test_resolve_current_and_unknown_versions() {
        let ring = KeyRing::new(KeyRing::DEFAULT_OVERLAP);

        assert!(ring.resolve(KeyVersion::new(1)).is_some());
        assert!(ring.resolve(KeyVersion::new(2)).is_none());
        assert!(ring.resolve(KeyVersion::new(0)).is_none());
    }

    #[test]
    fn keyring_rotate_keeps_previous_inside_overlap() {
        let ring = KeyRing::new(Duration::from_secs(60));
        let old = ring.current();

        let fresh = ring.rotate();

        assert_eq!(fresh.version(), KeyVersion::new(2));
        assert_eq!(ring.current().version(), KeyVersion::new(2));

        // Old version still resolvable for verification, with a deadline set
        let previous = ring.resolve(old.version()).unwrap();
        assert!(previous.not_after().is_some());
    }

    #[test]
    fn keyring_previous_expires_after_overlap_window() {
        let ring = KeyRing::new(Duration::from_millis(10));
        let old = ring.current();

        ring.rotate();
        assert!(ring.resolve(old.version()).is_some());

        std::thread::sleep(Duration::from_millis(30));
        assert!(ring.resolve(old.version()).is_none());
    }

    #[test]
    fn keyring_double_rotation_drops_oldest_key() {
        let ring = KeyRing::new(Duration::from_secs(60));
        let v1 = ring.current().version();

        ring.rotate();
        let v3 = ring.rotate();

        assert_eq!(v3.version(), KeyVersion::new(3));
        assert!(ring.resolve(v1).is_none());
        assert!(ring.resolve(KeyVersion::new(2)).is_some());
    }

    #[test]
    fn test_signature_roundtrip_and_mismatch() {
        let key = SigningKey::generate(KeyVersion::new(1));
        let data = b"signed payload";
        let signature = key.sign(data);

        assert!(key.verify(data, &signature).is_ok());
        assert!(matches!(
            key.verify(b"other payload", &signature),
            Err(KeygateError::SignatureInvalid)
        ));
    }

    #[test]
    fn test_concurrent_readers_see_consistent_snapshots() {
        let ring = Arc::new(KeyRing::new(Duration::from_secs(60)));
        let mut handles = Vec::new();

        for _ in 0..4 {
            let ring = Arc::clone(&ring);
            handles.push(std::thread::spawn(move || {
                let mut last = KeyVersion::new(0);
                for _ in 0..50 {
                    let current = ring.current();
                    // Snapshots never go backwards
                    assert!(current.version() >= last);
                    last = current.version();
                }
            }));
        }

        for _ in 0..5 {
            ring.rotate();
        }

        for handle in handles {
            handle.join().unwrap();
        }
    }
}

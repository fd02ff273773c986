//! Core data types for keygate

use serde::{Deserialize, Serialize};

/// Stable unique identifier for an account
///
/// Accounts are owned by the persistence layer; the core only ever carries
/// the identifier through claims and principals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(u64);

impl AccountId {
    pub fn new(id: u64) -> Self {
        AccountId(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bitmask of granted capabilities
///
/// Capabilities combine with OR across roles and are checked with
/// AND-equals-mask: a principal holding `READ_TODOS | WRITE_TODOS`
/// satisfies a `READ_TODOS` requirement but not `MANAGE_ACCOUNTS`.
/// Unknown bits round-trip untouched so a token issued by a newer build
/// still verifies on an older one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(u32);

impl Permission {
    /// Read the caller's own todos
    pub const READ_TODOS: Permission = Permission(1 << 0);
    /// Create, update and delete the caller's own todos
    pub const WRITE_TODOS: Permission = Permission(1 << 1);
    /// List and read all accounts
    pub const READ_ACCOUNTS: Permission = Permission(1 << 2);
    /// Create and modify accounts
    pub const MANAGE_ACCOUNTS: Permission = Permission(1 << 3);
    /// Trigger signing-key rotation
    pub const ROTATE_KEYS: Permission = Permission(1 << 4);

    /// No capabilities granted
    pub fn empty() -> Self {
        Permission(0)
    }

    /// Every defined capability
    pub fn all() -> Self {
        Permission::READ_TODOS
            | Permission::WRITE_TODOS
            | Permission::READ_ACCOUNTS
            | Permission::MANAGE_ACCOUNTS
            | Permission::ROTATE_KEYS
    }

    pub fn from_bits(bits: u32) -> Self {
        Permission(bits)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Check that every bit in `mask` is granted
    pub fn contains(&self, mask: Permission) -> bool {
        self.0 & mask.0 == mask.0
    }
}

impl std::ops::BitOr for Permission {
    type Output = Permission;

    fn bitor(self, rhs: Permission) -> Permission {
        Permission(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for Permission {
    fn bitor_assign(&mut self, rhs: Permission) {
        self.0 |= rhs.0;
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#07b}", self.0)
    }
}

/// Digest of an account's revocation secret
///
/// Embedded in every token issued to the account and compared against the
/// live value on each verification. Rotating the secret changes the
/// fingerprint and thereby invalidates all outstanding tokens for that
/// account without any token bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretFingerprint(String);

impl SecretFingerprint {
    /// Derive a fingerprint from raw secret bytes (BLAKE3, first 16 bytes hex)
    pub fn from_secret(secret: &[u8]) -> Self {
        let hash = blake3::hash(secret);
        SecretFingerprint(hex::encode(&hash.as_bytes()[..16]))
    }

    /// Reconstruct from its string representation
    pub fn from_string(s: String) -> Self {
        SecretFingerprint(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SecretFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Verified identity attached to a request
///
/// Derived from a verified token, owned by the request that created it,
/// never persisted. The permission bits are the snapshot taken at token
/// issuance, not the live account value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub account_id: AccountId,
    pub permission: Permission,
}

/// An access/refresh token pair as returned by issuance and refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

mod hex {
    use std::fmt::Write;

    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().fold(String::new(), |mut output, b| {
            let _ = write!(output, "{:02x}", b);
            output
        })
    }
}

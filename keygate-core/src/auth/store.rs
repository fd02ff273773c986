//! Account secret store interface
//!
//! The core never owns account storage. It reads an account's live
//! permission bits and secret fingerprint through this trait on every
//! verification, which is what makes per-account revocation a side effect
//! of secret rotation rather than a token-store operation.

use crate::{AccountId, KeygateError, Permission, Result, SecretFingerprint};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Account identity snapshot used to issue a token pair
#[derive(Debug, Clone)]
pub struct AccountAuth {
    pub id: AccountId,
    pub permission: Permission,
    pub fingerprint: SecretFingerprint,
}

/// Read access to an account's live permission and revocation fingerprint
///
/// Supplied by the persistence layer. Implementations backed by a remote
/// store are expected to enforce their own request deadline and surface
/// `StoreUnavailable` rather than hang.
pub trait AccountSecretStore: Send + Sync {
    fn permission_and_fingerprint(
        &self,
        id: AccountId,
    ) -> Result<(Permission, SecretFingerprint)>;
}

impl<S: AccountSecretStore + ?Sized> AccountSecretStore for Arc<S> {
    fn permission_and_fingerprint(
        &self,
        id: AccountId,
    ) -> Result<(Permission, SecretFingerprint)> {
        (**self).permission_and_fingerprint(id)
    }
}

/// In-memory account store used by tests and the demo server wiring
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: RwLock<HashMap<AccountId, (Permission, SecretFingerprint)>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace an account entry, deriving its fingerprint from
    /// the given revocation secret
    pub fn upsert(&self, id: AccountId, permission: Permission, secret: &[u8]) -> AccountAuth {
        let fingerprint = SecretFingerprint::from_secret(secret);
        self.accounts
            .write()
            .expect("account store lock poisoned")
            .insert(id, (permission, fingerprint.clone()));

        AccountAuth {
            id,
            permission,
            fingerprint,
        }
    }

    /// Replace the account's revocation secret, invalidating every token
    /// that embeds the old fingerprint
    pub fn rotate_secret(&self, id: AccountId, secret: &[u8]) -> Result<SecretFingerprint> {
        let mut accounts = self.accounts.write().expect("account store lock poisoned");
        let entry = accounts
            .get_mut(&id)
            .ok_or(KeygateError::AccountNotFound(id))?;

        entry.1 = SecretFingerprint::from_secret(secret);
        Ok(entry.1.clone())
    }

    /// Delete an account entry
    pub fn remove(&self, id: AccountId) {
        self.accounts
            .write()
            .expect("account store lock poisoned")
            .remove(&id);
    }

    /// Change the account's granted permission bits
    pub fn set_permission(&self, id: AccountId, permission: Permission) -> Result<()> {
        let mut accounts = self.accounts.write().expect("account store lock poisoned");
        let entry = accounts
            .get_mut(&id)
            .ok_or(KeygateError::AccountNotFound(id))?;

        entry.0 = permission;
        Ok(())
    }
}

impl AccountSecretStore for MemoryAccountStore {
    fn permission_and_fingerprint(
        &self,
        id: AccountId,
    ) -> Result<(Permission, SecretFingerprint)> {
        self.accounts
            .read()
            .expect("account store lock poisoned")
            .get(&id)
            .cloned()
            .ok_or(KeygateError::AccountNotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_and_lookup() {
        let store = MemoryAccountStore::new();
        let account = store.upsert(AccountId::new(1), Permission::READ_TODOS, b"secret");

        let (permission, fingerprint) =
            store.permission_and_fingerprint(AccountId::new(1)).unwrap();
        assert_eq!(permission, Permission::READ_TODOS);
        assert_eq!(fingerprint, account.fingerprint);
    }

    #[test]
    fn test_missing_account_is_not_found() {
        let store = MemoryAccountStore::new();

        assert!(matches!(
            store.permission_and_fingerprint(AccountId::new(9)),
            Err(KeygateError::AccountNotFound(_))
        ));
        assert!(store.rotate_secret(AccountId::new(9), b"x").is_err());
        assert!(store
            .set_permission(AccountId::new(9), Permission::empty())
            .is_err());
    }

    #[test]
    fn store_rotate_secret_changes_fingerprint() {
        let store = MemoryAccountStore::new();
        let before = store
            .upsert(AccountId::new(1), Permission::READ_TODOS, b"old")
            .fingerprint;

        let after = store.rotate_secret(AccountId::new(1), b"new").unwrap();

        assert_ne!(before, after);
        let (_, live) = store.permission_and_fingerprint(AccountId::new(1)).unwrap();
        assert_eq!(live, after);
    }
}

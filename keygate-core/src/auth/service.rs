//! Token issuance, verification, refresh and key rotation
//!
//! Checks run cheapest-first: structural decode, key lookup and signature
//! before the account store round trip for the live fingerprint, bounding
//! the cost of malicious input.

use crate::auth::keys::{KeyRing, SigningKey};
use crate::auth::replay::ReplayRegistry;
use crate::auth::store::{AccountAuth, AccountSecretStore};
use crate::auth::timing::fingerprints_match;
use crate::auth::token::{unix_now, Claims, TokenCodec, TokenKind};
use crate::{KeygateError, Permission, Principal, Result, SecretFingerprint, TokenPair};
use std::time::Duration;

/// Lifetimes for the two token kinds
#[derive(Debug, Clone, Copy)]
pub struct TokenLifetimes {
    pub access: Duration,
    pub refresh: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        TokenLifetimes {
            access: Duration::from_secs(60 * 60),
            refresh: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Orchestrates generate, verify, refresh and key rotation
///
/// Stateless with respect to individual access tokens; the only mutable
/// state is the key ring and the consumed-refresh registry.
pub struct AuthService<S> {
    keyring: KeyRing,
    store: S,
    lifetimes: TokenLifetimes,
    consumed_refresh: ReplayRegistry,
}

impl<S: AccountSecretStore> AuthService<S> {
    pub fn new(keyring: KeyRing, store: S, lifetimes: TokenLifetimes) -> Self {
        AuthService {
            keyring,
            store,
            lifetimes,
            consumed_refresh: ReplayRegistry::new(),
        }
    }

    /// Issue a fresh access/refresh pair for an account
    ///
    /// Claims snapshot the account's permission bits and secret
    /// fingerprint as given; both tokens are signed with the current key.
    pub fn generate(&self, account: &AccountAuth) -> Result<TokenPair> {
        let key = self.keyring.current();

        let access = TokenCodec::encode(
            &Claims::new(
                account.id,
                account.permission,
                account.fingerprint.clone(),
                TokenKind::Access,
                self.lifetimes.access,
            ),
            &key,
        )?;

        let refresh = TokenCodec::encode(
            &Claims::new(
                account.id,
                account.permission,
                account.fingerprint.clone(),
                TokenKind::Refresh,
                self.lifetimes.refresh,
            ),
            &key,
        )?;

        Ok(TokenPair { access, refresh })
    }

    /// Verify a token of the expected kind and return its principal
    ///
    /// The principal carries the permission snapshot from the token, not
    /// the live account value; a permission change takes effect at the
    /// next refresh.
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Principal> {
        let (claims, _, _) = self.verify_claims(token, expected)?;

        Ok(Principal {
            account_id: claims.sub,
            permission: claims.permission,
        })
    }

    /// Exchange a valid refresh token for a brand-new pair
    ///
    /// Refresh tokens are single-use: the consumed id is remembered until
    /// its natural expiry and a replayed token fails as revoked. The new
    /// pair reflects the account's live permission bits.
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let (claims, live_permission, live_fingerprint) =
            self.verify_claims(refresh_token, TokenKind::Refresh)?;

        if !self
            .consumed_refresh
            .consume(&claims.jti, claims.exp, unix_now())
        {
            return Err(KeygateError::Revoked);
        }

        self.generate(&AccountAuth {
            id: claims.sub,
            permission: live_permission,
            fingerprint: live_fingerprint,
        })
    }

    /// Rotate the signing key, demoting the old one for the overlap window
    ///
    /// Reachable only through the IP-gated guard path. Tokens signed with
    /// the demoted key keep verifying until the window elapses, then fail
    /// as revoked.
    pub fn rotate_key(&self) -> SigningKey {
        self.keyring.rotate()
    }

    /// Full verification pipeline, returning the claims plus the account's
    /// live permission and fingerprint
    fn verify_claims(
        &self,
        token: &str,
        expected: TokenKind,
    ) -> Result<(Claims, Permission, SecretFingerprint)> {
        // Untrusted decode, only to learn the key version
        let (_, version) = TokenCodec::decode(token)?;

        let key = self.keyring.resolve(version).ok_or(KeygateError::Revoked)?;
        let claims = TokenCodec::verify(token, &key)?;

        if claims.kind != expected {
            return Err(KeygateError::WrongKind {
                expected,
                found: claims.kind,
            });
        }

        if claims.is_expired_at(unix_now()) {
            return Err(KeygateError::Expired);
        }

        // A deleted account behaves exactly like a rotated secret
        let (live_permission, live_fingerprint) =
            match self.store.permission_and_fingerprint(claims.sub) {
                Ok(live) => live,
                Err(KeygateError::AccountNotFound(_)) => return Err(KeygateError::Revoked),
                Err(e) => return Err(e),
            };

        if !fingerprints_match(&claims.fingerprint, &live_fingerprint) {
            return Err(KeygateError::Revoked);
        }

        Ok((claims, live_permission, live_fingerprint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::MemoryAccountStore;
    use crate::AccountId;
    use std::sync::Arc;

    fn service_with_account(
        lifetimes: TokenLifetimes,
        overlap: Duration,
    ) -> (AuthService<Arc<MemoryAccountStore>>, AccountAuth) {
        let store = Arc::new(MemoryAccountStore::new());
        let account = store.upsert(AccountId::new(1), Permission::READ_TODOS, b"secret-1");
        let service = AuthService::new(KeyRing::new(overlap), store, lifetimes);
        (service, account)
    }

    fn default_service() -> (AuthService<Arc<MemoryAccountStore>>, AccountAuth) {
        service_with_account(TokenLifetimes::default(), KeyRing::DEFAULT_OVERLAP)
    }

    #[test]
    fn service_generate_then_verify_yields_principal() {
        let (service, account) = default_service();

        let pair = service.generate(&account).unwrap();
        let principal = service.verify(&pair.access, TokenKind::Access).unwrap();

        assert_eq!(principal.account_id, account.id);
        assert_eq!(principal.permission, Permission::READ_TODOS);
    }

    #[test]
    fn service_rejects_wrong_token_kind_both_ways() {
        let (service, account) = default_service();
        let pair = service.generate(&account).unwrap();

        assert!(matches!(
            service.verify(&pair.access, TokenKind::Refresh),
            Err(KeygateError::WrongKind {
                expected: TokenKind::Refresh,
                found: TokenKind::Access,
            })
        ));
        assert!(matches!(
            service.verify(&pair.refresh, TokenKind::Access),
            Err(KeygateError::WrongKind {
                expected: TokenKind::Access,
                found: TokenKind::Refresh,
            })
        ));
    }

    #[test]
    fn service_expired_access_token_is_rejected() {
        let lifetimes = TokenLifetimes {
            access: Duration::from_secs(0),
            refresh: Duration::from_secs(3600),
        };
        let (service, account) = service_with_account(lifetimes, KeyRing::DEFAULT_OVERLAP);

        let pair = service.generate(&account).unwrap();

        assert!(matches!(
            service.verify(&pair.access, TokenKind::Access),
            Err(KeygateError::Expired)
        ));
        // The refresh token from the same pair is still good
        assert!(service.refresh(&pair.refresh).is_ok());
    }

    #[test]
    fn service_secret_rotation_revokes_outstanding_tokens() {
        let store = Arc::new(MemoryAccountStore::new());
        let account = store.upsert(AccountId::new(1), Permission::READ_TODOS, b"secret-1");
        let service = AuthService::new(
            KeyRing::new(KeyRing::DEFAULT_OVERLAP),
            Arc::clone(&store),
            TokenLifetimes::default(),
        );

        let pair = service.generate(&account).unwrap();
        assert!(service.verify(&pair.access, TokenKind::Access).is_ok());

        store.rotate_secret(account.id, b"secret-2").unwrap();

        assert!(matches!(
            service.verify(&pair.access, TokenKind::Access),
            Err(KeygateError::Revoked)
        ));
        assert!(matches!(
            service.refresh(&pair.refresh),
            Err(KeygateError::Revoked)
        ));
    }

    #[test]
    fn service_key_rotation_honors_overlap_window() {
        let (service, account) =
            service_with_account(TokenLifetimes::default(), Duration::from_millis(20));

        let pair = service.generate(&account).unwrap();

        service.rotate_key();
        // Inside the overlap window the demoted key still verifies
        assert!(service.verify(&pair.access, TokenKind::Access).is_ok());

        std::thread::sleep(Duration::from_millis(40));
        assert!(matches!(
            service.verify(&pair.access, TokenKind::Access),
            Err(KeygateError::Revoked)
        ));

        // Tokens signed with the new key verify immediately
        let fresh = service.generate(&account).unwrap();
        assert!(service.verify(&fresh.access, TokenKind::Access).is_ok());
    }

    #[test]
    fn service_refresh_is_single_use() {
        let (service, account) = default_service();
        let pair = service.generate(&account).unwrap();

        let renewed = service.refresh(&pair.refresh).unwrap();
        assert!(service.verify(&renewed.access, TokenKind::Access).is_ok());

        assert!(matches!(
            service.refresh(&pair.refresh),
            Err(KeygateError::Revoked)
        ));
        // The renewed refresh token is independent and still valid
        assert!(service.refresh(&renewed.refresh).is_ok());
    }

    #[test]
    fn service_refresh_picks_up_live_permission() {
        let store = Arc::new(MemoryAccountStore::new());
        let account = store.upsert(AccountId::new(1), Permission::READ_TODOS, b"secret-1");
        let service = AuthService::new(
            KeyRing::new(KeyRing::DEFAULT_OVERLAP),
            Arc::clone(&store),
            TokenLifetimes::default(),
        );

        let pair = service.generate(&account).unwrap();
        store
            .set_permission(account.id, Permission::READ_TODOS | Permission::WRITE_TODOS)
            .unwrap();

        // The old access token still carries the issuance snapshot
        let old = service.verify(&pair.access, TokenKind::Access).unwrap();
        assert_eq!(old.permission, Permission::READ_TODOS);

        // The refreshed pair reflects the live bits
        let renewed = service.refresh(&pair.refresh).unwrap();
        let principal = service.verify(&renewed.access, TokenKind::Access).unwrap();
        assert_eq!(
            principal.permission,
            Permission::READ_TODOS | Permission::WRITE_TODOS
        );
    }

    #[test]
    fn service_deleted_account_reads_as_revoked() {
        let store = Arc::new(MemoryAccountStore::new());
        let account = store.upsert(AccountId::new(1), Permission::READ_TODOS, b"secret-1");
        let service = AuthService::new(
            KeyRing::new(KeyRing::DEFAULT_OVERLAP),
            Arc::clone(&store),
            TokenLifetimes::default(),
        );
        let pair = service.generate(&account).unwrap();
        assert!(service.verify(&pair.access, TokenKind::Access).is_ok());

        store.remove(account.id);

        assert!(matches!(
            service.verify(&pair.access, TokenKind::Access),
            Err(KeygateError::Revoked)
        ));
    }

    #[test]
    fn service_store_outage_is_surfaced_as_retryable() {
        struct DownStore;

        impl AccountSecretStore for DownStore {
            fn permission_and_fingerprint(
                &self,
                _id: AccountId,
            ) -> crate::Result<(Permission, SecretFingerprint)> {
                Err(KeygateError::StoreUnavailable("connection refused".to_string()))
            }
        }

        let service = AuthService::new(
            KeyRing::new(KeyRing::DEFAULT_OVERLAP),
            DownStore,
            TokenLifetimes::default(),
        );
        let account = AccountAuth {
            id: AccountId::new(1),
            permission: Permission::READ_TODOS,
            fingerprint: SecretFingerprint::from_secret(b"secret"),
        };
        let pair = service.generate(&account).unwrap();

        assert!(matches!(
            service.verify(&pair.access, TokenKind::Access),
            Err(KeygateError::StoreUnavailable(_))
        ));
    }
}

/// Identity linking
///
/// Maps a verified provider identity onto a local account:
///
/// 1. no account for the email: create account, link and a confirmed
///    addition together
/// 2. account exists without a link: confirm it and attach the link
/// 3. account and link exist: nothing to write
///
/// A concurrent first sign-in for the same email loses on the UNIQUE
/// constraints and re-runs the table once.

use super::ProviderIdentity;
use crate::{
    account::handle::derive_handle,
    credentials::CredentialStore,
    db::account::{normalize_email, NewAccount, OAuthLink, NO_PASSWORD},
    error::{AppError, AppResult},
    metrics,
    tokens::TokenIssuer,
};
use std::sync::Arc;
use uuid::Uuid;

/// Which branch of the decision table was taken
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    Created(String),
    Merged(String),
    Existing(String),
}

impl LinkOutcome {
    pub fn account_id(&self) -> &str {
        match self {
            LinkOutcome::Created(id) | LinkOutcome::Merged(id) | LinkOutcome::Existing(id) => id,
        }
    }
}

pub struct IdentityLinker {
    store: Arc<dyn CredentialStore>,
    issuer: Arc<TokenIssuer>,
    handle_suffix_length: usize,
}

impl IdentityLinker {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        issuer: Arc<TokenIssuer>,
        handle_suffix_length: usize,
    ) -> Self {
        Self {
            store,
            issuer,
            handle_suffix_length,
        }
    }

    /// Resolve the identity to an account, creating or merging as needed
    pub async fn link(&self, identity: &ProviderIdentity) -> AppResult<LinkOutcome> {
        match self.try_link(identity).await {
            Err(AppError::AlreadyExists(what)) => {
                tracing::debug!("Concurrent sign-in won on {}, re-evaluating", what);
                self.try_link(identity).await
            }
            other => other,
        }
    }

    async fn try_link(&self, identity: &ProviderIdentity) -> AppResult<LinkOutcome> {
        let email = normalize_email(&identity.email);
        let link = |account_id: &str| OAuthLink {
            provider_subject_id: identity.subject_id.clone(),
            provider_token: identity.access_token.clone(),
            provider_email: email.clone(),
            provider_display_name: identity.display_name.clone(),
            account_id: account_id.to_string(),
        };

        let Some(account) = self.store.account_by_email(&email).await? else {
            let account_id = Uuid::new_v4().to_string();
            let unique_handle = derive_handle(
                &identity.display_name,
                &self.issuer.suffix(self.handle_suffix_length),
            );
            self.store
                .create_oauth_account(
                    NewAccount {
                        id: account_id.clone(),
                        email: email.clone(),
                        display_name: identity.display_name.trim().to_string(),
                        unique_handle,
                        password_hash: NO_PASSWORD.to_string(),
                        created_at: self.issuer.now(),
                    },
                    link(&account_id),
                )
                .await?;

            tracing::info!("Created account {} from provider identity", account_id);
            metrics::record_account_event("oauth_created");
            return Ok(LinkOutcome::Created(account_id));
        };

        if self.store.oauth_link_by_email(&email).await?.is_some() {
            return Ok(LinkOutcome::Existing(account.id));
        }

        self.store.attach_oauth_link(link(&account.id)).await?;
        tracing::info!("Linked provider identity to existing account {}", account.id);
        metrics::record_account_event("oauth_merged");

        Ok(LinkOutcome::Merged(account.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        account::{AccountManager, AccountPolicy},
        credentials::{MemoryCredentialStore, SqliteCredentialStore},
        db::test_pool,
        mailer::RecordingSink,
        session::MemorySessionStore,
        tokens::ManualClock,
    };
    use chrono::Duration;
    use rand::{rngs::StdRng, SeedableRng};

    fn issuer() -> Arc<TokenIssuer> {
        Arc::new(TokenIssuer::new(
            StdRng::seed_from_u64(31),
            Arc::new(ManualClock::new()),
        ))
    }

    fn ada() -> ProviderIdentity {
        ProviderIdentity {
            subject_id: "google-108".to_string(),
            email: "Ada@X.com".to_string(),
            display_name: "Ada Lovelace".to_string(),
            access_token: "ya29.token".to_string(),
        }
    }

    #[tokio::test]
    async fn test_new_identity_creates_confirmed_account() {
        let store = Arc::new(MemoryCredentialStore::new());
        let linker = IdentityLinker::new(store.clone(), issuer(), 6);

        let outcome = linker.link(&ada()).await.unwrap();
        assert!(matches!(outcome, LinkOutcome::Created(_)));

        let account = store.account_by_email("ada@x.com").await.unwrap().unwrap();
        assert_eq!(account.id, outcome.account_id());
        assert_eq!(account.password_hash, NO_PASSWORD);
        assert!(account.unique_handle.starts_with("ada-lovelace-"));

        let addition = store.addition_for_account(&account.id).await.unwrap().unwrap();
        assert!(addition.confirmed);
        assert_eq!(addition.token, None);
        assert_eq!(store.link_count(), 1);
    }

    #[tokio::test]
    async fn test_linking_is_idempotent() {
        let store = Arc::new(MemoryCredentialStore::new());
        let linker = IdentityLinker::new(store.clone(), issuer(), 6);

        let first = linker.link(&ada()).await.unwrap();
        let second = linker.link(&ada()).await.unwrap();

        assert_eq!(first.account_id(), second.account_id());
        assert!(matches!(second, LinkOutcome::Existing(_)));
        assert_eq!(store.account_count(), 1);
        assert_eq!(store.link_count(), 1);
    }

    #[tokio::test]
    async fn test_password_account_is_merged_and_confirmed() {
        let store = Arc::new(MemoryCredentialStore::new());
        let issuer = issuer();
        let manager = AccountManager::new(
            store.clone(),
            Arc::new(MemorySessionStore::new(issuer.clone())),
            Arc::new(RecordingSink::new()),
            issuer.clone(),
            AccountPolicy {
                confirmation_window: Duration::hours(6),
                reset_window: Duration::hours(6),
                handle_suffix_length: 6,
                link_base: "http://files.test".to_string(),
            },
        );
        let account = manager
            .register_account("Ada", "a@x.com", "pw1")
            .await
            .unwrap();

        let linker = IdentityLinker::new(store.clone(), issuer, 6);
        let identity = ProviderIdentity {
            email: "a@x.com".to_string(),
            ..ada()
        };
        let outcome = linker.link(&identity).await.unwrap();

        assert_eq!(outcome, LinkOutcome::Merged(account.id.clone()));
        assert_eq!(store.account_count(), 1);
        assert_eq!(store.link_count(), 1);
        assert!(store
            .addition_for_account(&account.id)
            .await
            .unwrap()
            .unwrap()
            .confirmed);

        // Password login keeps working after the merge
        assert!(manager.login("a@x.com", "pw1").await.is_ok());

        // And a second sign-in is a no-op
        assert_eq!(
            linker.link(&identity).await.unwrap(),
            LinkOutcome::Existing(account.id)
        );
    }

    #[tokio::test]
    async fn test_merge_keeps_confirmed_account_confirmed() {
        let store = Arc::new(MemoryCredentialStore::new());
        let linker = IdentityLinker::new(store.clone(), issuer(), 6);
        store
            .create_account(
                NewAccount {
                    id: "a1".to_string(),
                    email: "ada@x.com".to_string(),
                    display_name: "Ada".to_string(),
                    unique_handle: "ada-aaaaaa".to_string(),
                    password_hash: "hash".to_string(),
                    created_at: chrono::Utc::now(),
                },
                "tok",
                chrono::Utc::now() + Duration::hours(1),
            )
            .await
            .unwrap();
        store.confirm_token("a1", "tok", chrono::Utc::now()).await.unwrap();

        assert_eq!(
            linker.link(&ada()).await.unwrap(),
            LinkOutcome::Merged("a1".to_string())
        );
        assert!(store.addition_for_account("a1").await.unwrap().unwrap().confirmed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_sign_ins_converge() {
        let (pool, _dir) = test_pool().await;
        let linker = Arc::new(IdentityLinker::new(
            Arc::new(SqliteCredentialStore::new(pool.clone())),
            issuer(),
            6,
        ));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let linker = linker.clone();
                tokio::spawn(async move { linker.link(&ada()).await })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().account_id().to_string());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);

        let accounts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM account")
            .fetch_one(&pool)
            .await
            .unwrap();
        let links: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM oauth_link")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!((accounts, links), (1, 1));
    }
}

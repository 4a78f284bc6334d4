/// Credential store
///
/// Persistence for accounts, their verification additions and OAuth links.
/// Every method that touches more than one row runs as a single transaction
/// or a single conditional statement, so callers never observe a half-written
/// account.

pub mod sqlite;

#[cfg(test)]
pub mod memory;

pub use sqlite::SqliteCredentialStore;

#[cfg(test)]
pub use memory::MemoryCredentialStore;

use crate::{
    db::account::{Account, Addition, NewAccount, OAuthLink},
    error::AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Storage backend for the credential lifecycle
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Whether an account with this (normalized) email exists
    async fn account_exists(&self, email: &str) -> AppResult<bool>;

    async fn account_by_email(&self, email: &str) -> AppResult<Option<Account>>;

    async fn account_by_id(&self, account_id: &str) -> AppResult<Option<Account>>;

    /// Insert an account and its unconfirmed addition in one transaction.
    /// A duplicate email yields `AlreadyExists`.
    async fn create_account(
        &self,
        account: NewAccount,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<Account>;

    async fn addition_by_token(&self, token: &str) -> AppResult<Option<Addition>>;

    async fn addition_for_account(&self, account_id: &str) -> AppResult<Option<Addition>>;

    /// Confirm the account if the token still matches, the row is unconfirmed
    /// and the window has not lapsed. Clears the token. Returns whether a row
    /// was updated.
    async fn confirm_token(&self, account_id: &str, token: &str, now: DateTime<Utc>)
        -> AppResult<bool>;

    /// Overwrite the account's token and expiry
    async fn set_token(
        &self,
        account_id: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Consume a live reset token and store the new password hash in one
    /// transaction. The account ends up confirmed. Returns whether the token
    /// was still live.
    async fn reset_password(
        &self,
        account_id: &str,
        token: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> AppResult<bool>;

    async fn oauth_link_by_email(&self, email: &str) -> AppResult<Option<OAuthLink>>;

    /// Create an account, its link and a confirmed token-less addition in one
    /// transaction
    async fn create_oauth_account(&self, account: NewAccount, link: OAuthLink)
        -> AppResult<Account>;

    /// Mark the linked account confirmed and insert the link in one transaction
    async fn attach_oauth_link(&self, link: OAuthLink) -> AppResult<()>;

    /// All additions that are not yet confirmed
    async fn unconfirmed_additions(&self) -> AppResult<Vec<Addition>>;

    /// Delete an account and everything hanging off it, but only while it is
    /// still unconfirmed and expired. Returns whether anything was deleted.
    async fn delete_unconfirmed_account(&self, account_id: &str, now: DateTime<Utc>)
        -> AppResult<bool>;
}

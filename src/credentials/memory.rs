/// In-memory credential store for tests
use super::CredentialStore;
use crate::{
    db::account::{Account, Addition, NewAccount, OAuthLink},
    error::{AppError, AppResult},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Default)]
struct Tables {
    accounts: HashMap<String, Account>,
    additions: HashMap<String, Addition>,
    links: HashMap<String, OAuthLink>,
}

/// HashMap-backed store; one mutex makes every method atomic
#[derive(Default)]
pub struct MemoryCredentialStore {
    tables: Mutex<Tables>,
    failing_deletes: Mutex<HashSet<String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make deletes of this account fail with a store error
    pub fn fail_delete_of(&self, account_id: &str) {
        self.failing_deletes
            .lock()
            .unwrap()
            .insert(account_id.to_string());
    }

    pub fn account_count(&self) -> usize {
        self.tables.lock().unwrap().accounts.len()
    }

    pub fn link_count(&self) -> usize {
        self.tables.lock().unwrap().links.len()
    }

    /// Overwrite an addition directly, bypassing the lifecycle
    pub fn put_addition(&self, addition: Addition) {
        self.tables
            .lock()
            .unwrap()
            .additions
            .insert(addition.account_id.clone(), addition);
    }
}

fn token_taken(tables: &Tables, token: &str, except: &str) -> bool {
    tables
        .additions
        .values()
        .any(|a| a.account_id != except && a.token.as_deref() == Some(token))
}

fn email_taken(tables: &Tables, email: &str) -> bool {
    tables.accounts.values().any(|a| a.email == email)
}

fn link_conflicts(tables: &Tables, link: &OAuthLink) -> bool {
    tables.links.contains_key(&link.provider_subject_id)
        || tables
            .links
            .values()
            .any(|l| l.provider_email == link.provider_email)
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn account_exists(&self, email: &str) -> AppResult<bool> {
        Ok(email_taken(&self.tables.lock().unwrap(), email))
    }

    async fn account_by_email(&self, email: &str) -> AppResult<Option<Account>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.accounts.values().find(|a| a.email == email).cloned())
    }

    async fn account_by_id(&self, account_id: &str) -> AppResult<Option<Account>> {
        Ok(self.tables.lock().unwrap().accounts.get(account_id).cloned())
    }

    async fn create_account(
        &self,
        account: NewAccount,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<Account> {
        let mut tables = self.tables.lock().unwrap();
        if email_taken(&tables, &account.email) {
            return Err(AppError::AlreadyExists("account with this email".to_string()));
        }
        if token_taken(&tables, token, &account.id) {
            return Err(AppError::AlreadyExists("token".to_string()));
        }

        let account = account.into_account();
        tables.additions.insert(
            account.id.clone(),
            Addition {
                account_id: account.id.clone(),
                token: Some(token.to_string()),
                expires_at: Some(expires_at),
                confirmed: false,
            },
        );
        tables.accounts.insert(account.id.clone(), account.clone());
        Ok(account)
    }

    async fn addition_by_token(&self, token: &str) -> AppResult<Option<Addition>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .additions
            .values()
            .find(|a| a.token.as_deref() == Some(token))
            .cloned())
    }

    async fn addition_for_account(&self, account_id: &str) -> AppResult<Option<Addition>> {
        Ok(self.tables.lock().unwrap().additions.get(account_id).cloned())
    }

    async fn confirm_token(
        &self,
        account_id: &str,
        token: &str,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut tables = self.tables.lock().unwrap();
        match tables.additions.get_mut(account_id) {
            Some(addition)
                if addition.token.as_deref() == Some(token)
                    && !addition.confirmed
                    && !addition.is_expired(now) =>
            {
                addition.confirmed = true;
                addition.token = None;
                addition.expires_at = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_token(
        &self,
        account_id: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut tables = self.tables.lock().unwrap();
        if token_taken(&tables, token, account_id) {
            return Err(AppError::AlreadyExists("token".to_string()));
        }
        let addition = tables.additions.get_mut(account_id).ok_or_else(|| {
            AppError::NotFound(format!("No credential record for account {}", account_id))
        })?;
        addition.token = Some(token.to_string());
        addition.expires_at = Some(expires_at);
        Ok(())
    }

    async fn reset_password(
        &self,
        account_id: &str,
        token: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut tables = self.tables.lock().unwrap();
        match tables.additions.get_mut(account_id) {
            Some(addition)
                if addition.token.as_deref() == Some(token) && !addition.is_expired(now) =>
            {
                addition.token = None;
                addition.expires_at = None;
                addition.confirmed = true;
            }
            _ => return Ok(false),
        }
        if let Some(account) = tables.accounts.get_mut(account_id) {
            account.password_hash = password_hash.to_string();
        }
        Ok(true)
    }

    async fn oauth_link_by_email(&self, email: &str) -> AppResult<Option<OAuthLink>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .links
            .values()
            .find(|l| l.provider_email == email)
            .cloned())
    }

    async fn create_oauth_account(
        &self,
        account: NewAccount,
        link: OAuthLink,
    ) -> AppResult<Account> {
        let mut tables = self.tables.lock().unwrap();
        if email_taken(&tables, &account.email) {
            return Err(AppError::AlreadyExists("account with this email".to_string()));
        }
        if link_conflicts(&tables, &link) {
            return Err(AppError::AlreadyExists("oauth link".to_string()));
        }

        let account = account.into_account();
        tables.additions.insert(
            account.id.clone(),
            Addition {
                account_id: account.id.clone(),
                token: None,
                expires_at: None,
                confirmed: true,
            },
        );
        tables.links.insert(link.provider_subject_id.clone(), link);
        tables.accounts.insert(account.id.clone(), account.clone());
        Ok(account)
    }

    async fn attach_oauth_link(&self, link: OAuthLink) -> AppResult<()> {
        let mut tables = self.tables.lock().unwrap();
        if link_conflicts(&tables, &link) {
            return Err(AppError::AlreadyExists("oauth link".to_string()));
        }

        tables
            .additions
            .entry(link.account_id.clone())
            .or_insert_with(|| Addition {
                account_id: link.account_id.clone(),
                token: None,
                expires_at: None,
                confirmed: true,
            })
            .confirmed = true;
        tables.links.insert(link.provider_subject_id.clone(), link);
        Ok(())
    }

    async fn unconfirmed_additions(&self) -> AppResult<Vec<Addition>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .additions
            .values()
            .filter(|a| !a.confirmed)
            .cloned()
            .collect())
    }

    async fn delete_unconfirmed_account(
        &self,
        account_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        if self.failing_deletes.lock().unwrap().contains(account_id) {
            return Err(AppError::StoreUnavailable(sqlx::Error::PoolTimedOut));
        }

        let mut tables = self.tables.lock().unwrap();
        let deletable = matches!(
            tables.additions.get(account_id),
            Some(addition) if !addition.confirmed && addition.is_expired(now)
        );
        if !deletable {
            return Ok(false);
        }

        tables.additions.remove(account_id);
        tables.accounts.remove(account_id);
        tables.links.retain(|_, l| l.account_id != account_id);
        Ok(true)
    }
}

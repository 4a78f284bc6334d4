/// Account lifecycle manager
///
/// Drives the verification state machine: an account starts unconfirmed with
/// a confirmation token, becomes confirmed once the emailed link is opened,
/// and may later hold a password reset token. Every transition goes through
/// a conditional write in the credential store, so two requests racing on the
/// same token cannot both succeed.

use crate::{
    account::{handle::derive_handle, password, validation_message, SignUpRequest, UserInfo},
    config::ServerConfig,
    credentials::CredentialStore,
    db::account::{normalize_email, Account, Addition, NewAccount},
    error::{AppError, AppResult},
    mailer::NotificationSink,
    metrics,
    session::SessionStore,
    tokens::TokenIssuer,
};
use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Windows and link settings for the lifecycle
#[derive(Debug, Clone)]
pub struct AccountPolicy {
    pub confirmation_window: Duration,
    pub reset_window: Duration,
    pub handle_suffix_length: usize,
    /// Base URL for emailed links, without trailing slash
    pub link_base: String,
}

impl AccountPolicy {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            confirmation_window: config.credentials.confirmation_window(),
            reset_window: config.credentials.reset_window(),
            handle_suffix_length: config.credentials.handle_suffix_length,
            link_base: config.link_base().to_string(),
        }
    }

    fn confirm_link(&self, token: &str) -> String {
        format!("{}/account/confirm/{}", self.link_base, token)
    }

    fn reset_link(&self, token: &str) -> String {
        format!("{}/account/confirm-pass/{}", self.link_base, token)
    }
}

/// Account manager service
pub struct AccountManager {
    store: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionStore>,
    sink: Arc<dyn NotificationSink>,
    issuer: Arc<TokenIssuer>,
    policy: AccountPolicy,
}

/// Sink failures surface as `NotificationFailed`; the persisted state stays
fn notification_failed(e: AppError) -> AppError {
    match e {
        AppError::NotificationFailed(_) => e,
        other => AppError::NotificationFailed(other.to_string()),
    }
}

impl AccountManager {
    /// Create a new account manager
    pub fn new(
        store: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
        sink: Arc<dyn NotificationSink>,
        issuer: Arc<TokenIssuer>,
        policy: AccountPolicy,
    ) -> Self {
        Self {
            store,
            sessions,
            sink,
            issuer,
            policy,
        }
    }

    /// Register a password account and send the confirmation link
    pub async fn register_account(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> AppResult<Account> {
        let request = SignUpRequest {
            name: name.trim().to_string(),
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        request
            .validate()
            .map_err(|e| AppError::Validation(validation_message(&e)))?;

        let email = normalize_email(&request.email);
        if self.store.account_exists(&email).await? {
            return Err(AppError::AlreadyExists("email already exists".to_string()));
        }

        let password_hash = password::hash_password_blocking(password).await?;
        let unique_handle = derive_handle(
            &request.name,
            &self.issuer.suffix(self.policy.handle_suffix_length),
        );
        let token = self.issuer.issue();
        let expires_at = self.issuer.expiry_from_now(self.policy.confirmation_window);

        let account = self
            .store
            .create_account(
                NewAccount {
                    id: Uuid::new_v4().to_string(),
                    email,
                    display_name: request.name,
                    unique_handle,
                    password_hash,
                    created_at: self.issuer.now(),
                },
                &token,
                expires_at,
            )
            .await?;

        tracing::info!("Registered account {} ({})", account.id, account.unique_handle);
        metrics::record_account_event("registered");

        self.sink
            .send_verification_email(
                &account.email,
                &account.display_name,
                &self.policy.confirm_link(&token),
            )
            .await
            .map_err(notification_failed)?;

        Ok(account)
    }

    /// Confirm an email address with the token from the confirmation link.
    /// Returns the confirmed account id.
    pub async fn confirm_email(&self, token: &str) -> AppResult<String> {
        let addition = self
            .store
            .addition_by_token(token)
            .await?
            .ok_or(AppError::TokenNotFound)?;

        let now = self.issuer.now();
        if addition.confirmed {
            return Err(AppError::AlreadyConfirmed);
        }
        if addition.is_expired(now) {
            return Err(AppError::TokenExpired);
        }

        if !self
            .store
            .confirm_token(&addition.account_id, token, now)
            .await?
        {
            // Lost a race with another confirm, a reset or the sweeper
            return Err(self.settled_token_error(token).await?);
        }

        tracing::info!("Email confirmed for account {}", addition.account_id);
        metrics::record_account_event("confirmed");

        Ok(addition.account_id)
    }

    /// Send the stored confirmation token again
    pub async fn resend_confirmation(&self, email: &str) -> AppResult<()> {
        let account = self.account_for_email(email).await?;
        let addition = self.addition_of(&account).await?;

        if addition.confirmed {
            return Err(AppError::AlreadyConfirmed);
        }
        let token = addition.token.clone().ok_or(AppError::TokenNotFound)?;
        if addition.is_expired(self.issuer.now()) {
            return Err(AppError::TokenExpired);
        }

        tracing::info!("Resending confirmation email for account {}", account.id);

        self.sink
            .send_verification_email(
                &account.email,
                &account.display_name,
                &self.policy.confirm_link(&token),
            )
            .await
            .map_err(notification_failed)
    }

    /// Issue a password reset token, replacing whatever token the account held
    pub async fn request_password_reset(&self, email: &str) -> AppResult<()> {
        let account = self.account_for_email(email).await?;

        let token = self.issuer.issue();
        let expires_at = self.issuer.expiry_from_now(self.policy.reset_window);
        self.store.set_token(&account.id, &token, expires_at).await?;

        tracing::info!("Password reset requested for account {}", account.id);
        metrics::record_account_event("reset_requested");

        self.sink
            .send_reset_email(&account.email, &self.policy.reset_link(&token))
            .await
            .map_err(notification_failed)
    }

    /// Check a reset token without consuming it. Returns the account id.
    pub async fn validate_reset_token(&self, token: &str) -> AppResult<String> {
        let addition = self
            .store
            .addition_by_token(token)
            .await?
            .ok_or(AppError::TokenNotFound)?;

        if addition.is_expired(self.issuer.now()) {
            return Err(AppError::TokenExpired);
        }

        Ok(addition.account_id)
    }

    /// Set a new password with a live reset token. All sessions of the
    /// account are closed afterwards.
    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> AppResult<()> {
        if new_password != confirm_password {
            return Err(AppError::Mismatch);
        }
        if new_password.is_empty() {
            return Err(AppError::Validation("password is required".to_string()));
        }

        let account_id = self.validate_reset_token(token).await?;
        let password_hash = password::hash_password_blocking(new_password).await?;

        if !self
            .store
            .reset_password(&account_id, token, &password_hash, self.issuer.now())
            .await?
        {
            return Err(self.settled_token_error(token).await?);
        }

        let closed = self.sessions.destroy_all(&account_id).await?;
        tracing::info!(
            "Password reset for account {} ({} sessions closed)",
            account_id,
            closed
        );
        metrics::record_account_event("password_reset");

        Ok(())
    }

    /// Check credentials and open a session. Returns the account and the
    /// session token.
    pub async fn login(&self, email: &str, password: &str) -> AppResult<(Account, String)> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AppError::Validation("missing credentials".to_string()));
        }

        let account = self.account_for_email(email).await?;
        let addition = self.addition_of(&account).await?;
        if !addition.confirmed {
            return Err(AppError::Authorization(
                "confirm your email to continue".to_string(),
            ));
        }

        if !password::verify_password_blocking(password, &account.password_hash).await? {
            return Err(AppError::Authentication(
                "email and/or password do not match".to_string(),
            ));
        }

        let session = self.sessions.create(&account.id).await?;
        tracing::info!("Account {} logged in", account.id);
        metrics::record_account_event("login");

        Ok((account, session))
    }

    /// Close a session
    pub async fn logout(&self, session_token: &str) -> AppResult<()> {
        self.sessions.destroy(session_token).await
    }

    /// Account id behind a session token, if the session is live
    pub async fn session_account(&self, session_token: &str) -> AppResult<Option<String>> {
        self.sessions.resolve(session_token).await
    }

    /// Open a session for an account (used after OAuth sign-in)
    pub async fn open_session(&self, account_id: &str) -> AppResult<String> {
        self.sessions.create(account_id).await
    }

    /// Public view of an account
    pub async fn get_user(&self, account_id: &str) -> AppResult<UserInfo> {
        let account = self
            .store
            .account_by_id(account_id)
            .await?
            .ok_or_else(|| AppError::NotFound("user not found".to_string()))?;

        Ok(UserInfo {
            name: account.display_name,
            email: account.email,
            uniquename: account.unique_handle,
        })
    }

    async fn account_for_email(&self, email: &str) -> AppResult<Account> {
        self.store
            .account_by_email(&normalize_email(email))
            .await?
            .ok_or_else(|| AppError::NotFound("email not found".to_string()))
    }

    async fn addition_of(&self, account: &Account) -> AppResult<Addition> {
        self.store
            .addition_for_account(&account.id)
            .await?
            .ok_or_else(|| {
                AppError::Internal(format!("Account {} has no credential record", account.id))
            })
    }

    /// Error for a token whose conditional write found nothing to update
    async fn settled_token_error(&self, token: &str) -> AppResult<AppError> {
        Ok(match self.store.addition_by_token(token).await? {
            None => AppError::TokenNotFound,
            Some(addition) if addition.confirmed => AppError::AlreadyConfirmed,
            Some(addition) if addition.is_expired(self.issuer.now()) => AppError::TokenExpired,
            Some(_) => AppError::TokenNotFound,
        })
    }
}

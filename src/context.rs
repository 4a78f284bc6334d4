/// Application context and dependency injection
use crate::{
    account::{AccountManager, AccountPolicy},
    board::BoardManager,
    config::ServerConfig,
    credentials::{CredentialStore, SqliteCredentialStore},
    db,
    error::{AppError, AppResult},
    mailer::{Mailer, NotificationSink},
    oauth::{GoogleProvider, IdentityLinker, IdentityProvider},
    rate_limit::RateLimiter,
    session::{SessionStore, SqliteSessionStore},
    tokens::{SystemClock, TokenIssuer},
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub credentials: Arc<dyn CredentialStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub issuer: Arc<TokenIssuer>,
    pub account_manager: Arc<AccountManager>,
    pub identity_linker: Arc<IdentityLinker>,
    /// Google sign-in, when configured
    pub identity_provider: Option<Arc<dyn IdentityProvider>>,
    pub board: Arc<BoardManager>,
    pub rate_limiter: Arc<RateLimiter>,
    pub mailer: Arc<Mailer>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> AppResult<Self> {
        config.validate()?;

        Self::ensure_directories(&config).await?;

        let db = db::create_pool(&config.storage.database, db::DatabaseOptions::default()).await?;
        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        let mailer = Arc::new(Mailer::new(config.email.clone())?);
        if !mailer.is_configured() {
            tracing::warn!("Email not configured; confirmation and reset links will not be delivered");
        }

        let identity_provider: Option<Arc<dyn IdentityProvider>> = match config.oauth.clone() {
            Some(oauth) => Some(Arc::new(GoogleProvider::new(oauth)?)),
            None => {
                tracing::info!("Google sign-in disabled - no client credentials");
                None
            }
        };

        Ok(Self::assemble(config, db, mailer, identity_provider))
    }

    /// Wire services over an open, migrated pool
    pub fn assemble(
        config: ServerConfig,
        db: SqlitePool,
        mailer: Arc<Mailer>,
        identity_provider: Option<Arc<dyn IdentityProvider>>,
    ) -> Self {
        let issuer = Arc::new(
            TokenIssuer::from_os_rng(Arc::new(SystemClock))
                .with_token_length(config.credentials.token_length),
        );

        let credentials: Arc<dyn CredentialStore> =
            Arc::new(SqliteCredentialStore::new(db.clone()));
        let sessions: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::new(
            db.clone(),
            issuer.clone(),
            chrono::Duration::seconds(config.session.ttl as i64),
        ));

        let sink: Arc<dyn NotificationSink> = mailer.clone();
        let account_manager = Arc::new(AccountManager::new(
            credentials.clone(),
            sessions.clone(),
            sink,
            issuer.clone(),
            AccountPolicy::from_config(&config),
        ));

        let identity_linker = Arc::new(IdentityLinker::new(
            credentials.clone(),
            issuer.clone(),
            config.credentials.handle_suffix_length,
        ));

        let board = Arc::new(BoardManager::new(db.clone(), issuer.clone()));
        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        Self {
            config: Arc::new(config),
            db,
            credentials,
            sessions,
            issuer,
            account_manager,
            identity_linker,
            identity_provider,
            board,
            rate_limiter,
            mailer,
        }
    }

    /// Ensure required directories exist
    async fn ensure_directories(config: &ServerConfig) -> AppResult<()> {
        let dir = &config.storage.data_directory;
        if !dir.exists() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                AppError::Internal(format!("Failed to create directory {:?}: {}", dir, e))
            })?;
        }

        Ok(())
    }

    /// Get service URL
    pub fn service_url(&self) -> &str {
        self.config.link_base()
    }
}

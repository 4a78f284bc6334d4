/// Session storage
///
/// Sessions are opaque bearer tokens mapped to an account id. Only the
/// SHA-256 digest of a token is persisted.
use crate::{
    db::{format_timestamp, parse_timestamp},
    error::AppResult,
    tokens::TokenIssuer,
};
use async_trait::async_trait;
use chrono::Duration;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// Cookie carrying the session token
pub const SESSION_COOKIE: &str = "presence";

/// Session store contract
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Open a session and return its token
    async fn create(&self, account_id: &str) -> AppResult<String>;

    /// Account id for a live session token
    async fn resolve(&self, token: &str) -> AppResult<Option<String>>;

    async fn destroy(&self, token: &str) -> AppResult<()>;

    /// Drop every session of an account
    async fn destroy_all(&self, account_id: &str) -> AppResult<u64>;

    /// Remove sessions past their lifetime
    async fn purge_expired(&self) -> AppResult<u64>;
}

/// Hex SHA-256 of a session token
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// SQLite-backed session store
pub struct SqliteSessionStore {
    db: SqlitePool,
    issuer: Arc<TokenIssuer>,
    ttl: Duration,
}

impl SqliteSessionStore {
    pub fn new(db: SqlitePool, issuer: Arc<TokenIssuer>, ttl: Duration) -> Self {
        Self { db, issuer, ttl }
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn create(&self, account_id: &str) -> AppResult<String> {
        let token = self.issuer.issue();
        let now = self.issuer.now();

        sqlx::query(
            "INSERT INTO session (token_hash, account_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(hash_token(&token))
        .bind(account_id)
        .bind(format_timestamp(now))
        .bind(format_timestamp(now + self.ttl))
        .execute(&self.db)
        .await?;

        Ok(token)
    }

    async fn resolve(&self, token: &str) -> AppResult<Option<String>> {
        let row = sqlx::query("SELECT account_id, expires_at FROM session WHERE token_hash = ?1")
            .bind(hash_token(token))
            .fetch_optional(&self.db)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let expires_at: String = row.try_get("expires_at")?;
        if self.issuer.now() >= parse_timestamp(&expires_at)? {
            return Ok(None);
        }

        Ok(Some(row.try_get("account_id")?))
    }

    async fn destroy(&self, token: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM session WHERE token_hash = ?1")
            .bind(hash_token(token))
            .execute(&self.db)
            .await?;

        Ok(())
    }

    async fn destroy_all(&self, account_id: &str) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM session WHERE account_id = ?1")
            .bind(account_id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }

    async fn purge_expired(&self) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM session WHERE expires_at <= ?1")
            .bind(format_timestamp(self.issuer.now()))
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
pub use memory::MemorySessionStore;

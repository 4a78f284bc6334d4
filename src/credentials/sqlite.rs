/// SQLite credential store using runtime queries
use super::CredentialStore;
use crate::{
    db::{
        account::{Account, Addition, NewAccount, OAuthLink},
        format_timestamp, parse_timestamp,
    },
    error::{AppError, AppResult},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

const ACCOUNT_COLUMNS: &str =
    "id, email, display_name, unique_handle, password_hash, created_at";

/// Credential store over the shared SQLite pool
#[derive(Clone)]
pub struct SqliteCredentialStore {
    db: SqlitePool,
}

impl SqliteCredentialStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

/// Map unique constraint violations to `AlreadyExists`
fn map_unique(e: sqlx::Error, what: &str) -> AppError {
    match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            AppError::AlreadyExists(what.to_string())
        }
        _ => AppError::StoreUnavailable(e),
    }
}

fn row_to_account(row: &SqliteRow) -> AppResult<Account> {
    let created_at: String = row.try_get("created_at")?;
    Ok(Account {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        display_name: row.try_get("display_name")?,
        unique_handle: row.try_get("unique_handle")?,
        password_hash: row.try_get("password_hash")?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn row_to_addition(row: &SqliteRow) -> AppResult<Addition> {
    let expires_at: Option<String> = row.try_get("expires_at")?;
    Ok(Addition {
        account_id: row.try_get("account_id")?,
        token: row.try_get("token")?,
        expires_at: expires_at.as_deref().map(parse_timestamp).transpose()?,
        confirmed: row.try_get("confirmed")?,
    })
}

async fn insert_account(
    conn: &mut sqlx::SqliteConnection,
    account: &NewAccount,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO account (id, email, display_name, unique_handle, password_hash, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .bind(&account.id)
    .bind(&account.email)
    .bind(&account.display_name)
    .bind(&account.unique_handle)
    .bind(&account.password_hash)
    .bind(format_timestamp(account.created_at))
    .execute(&mut *conn)
    .await
    .map_err(|e| map_unique(e, "account with this email"))?;

    Ok(())
}

async fn insert_link(conn: &mut sqlx::SqliteConnection, link: &OAuthLink) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO oauth_link (provider_subject_id, provider_token, provider_email, provider_display_name, account_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(&link.provider_subject_id)
    .bind(&link.provider_token)
    .bind(&link.provider_email)
    .bind(&link.provider_display_name)
    .bind(&link.account_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_unique(e, "oauth link"))?;

    Ok(())
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn account_exists(&self, email: &str) -> AppResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM account WHERE email = ?1")
            .bind(email)
            .fetch_one(&self.db)
            .await?;

        Ok(count > 0)
    }

    async fn account_by_email(&self, email: &str) -> AppResult<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM account WHERE email = ?1",
            ACCOUNT_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(row_to_account).transpose()
    }

    async fn account_by_id(&self, account_id: &str) -> AppResult<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM account WHERE id = ?1",
            ACCOUNT_COLUMNS
        ))
        .bind(account_id)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(row_to_account).transpose()
    }

    async fn create_account(
        &self,
        account: NewAccount,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<Account> {
        let mut tx = self.db.begin().await?;

        insert_account(&mut tx, &account).await?;

        sqlx::query(
            "INSERT INTO addition (account_id, token, expires_at, confirmed) VALUES (?1, ?2, ?3, 0)",
        )
        .bind(&account.id)
        .bind(token)
        .bind(format_timestamp(expires_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_unique(e, "token"))?;

        tx.commit().await?;

        Ok(account.into_account())
    }

    async fn addition_by_token(&self, token: &str) -> AppResult<Option<Addition>> {
        let row = sqlx::query(
            "SELECT account_id, token, expires_at, confirmed FROM addition WHERE token = ?1",
        )
        .bind(token)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(row_to_addition).transpose()
    }

    async fn addition_for_account(&self, account_id: &str) -> AppResult<Option<Addition>> {
        let row = sqlx::query(
            "SELECT account_id, token, expires_at, confirmed FROM addition WHERE account_id = ?1",
        )
        .bind(account_id)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(row_to_addition).transpose()
    }

    async fn confirm_token(
        &self,
        account_id: &str,
        token: &str,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE addition SET confirmed = 1, token = NULL, expires_at = NULL
             WHERE account_id = ?1 AND token = ?2 AND confirmed = 0 AND expires_at > ?3",
        )
        .bind(account_id)
        .bind(token)
        .bind(format_timestamp(now))
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_token(
        &self,
        account_id: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE addition SET token = ?1, expires_at = ?2 WHERE account_id = ?3",
        )
        .bind(token)
        .bind(format_timestamp(expires_at))
        .bind(account_id)
        .execute(&self.db)
        .await
        .map_err(|e| map_unique(e, "token"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "No credential record for account {}",
                account_id
            )));
        }

        Ok(())
    }

    async fn reset_password(
        &self,
        account_id: &str,
        token: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut tx = self.db.begin().await?;

        let consumed = sqlx::query(
            "UPDATE addition SET token = NULL, expires_at = NULL, confirmed = 1
             WHERE account_id = ?1 AND token = ?2 AND expires_at > ?3",
        )
        .bind(account_id)
        .bind(token)
        .bind(format_timestamp(now))
        .execute(&mut *tx)
        .await?;

        if consumed.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("UPDATE account SET password_hash = ?1 WHERE id = ?2")
            .bind(password_hash)
            .bind(account_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(true)
    }

    async fn oauth_link_by_email(&self, email: &str) -> AppResult<Option<OAuthLink>> {
        let row = sqlx::query(
            "SELECT provider_subject_id, provider_token, provider_email, provider_display_name, account_id
             FROM oauth_link WHERE provider_email = ?1",
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some(row) => Ok(Some(OAuthLink {
                provider_subject_id: row.try_get("provider_subject_id")?,
                provider_token: row.try_get("provider_token")?,
                provider_email: row.try_get("provider_email")?,
                provider_display_name: row.try_get("provider_display_name")?,
                account_id: row.try_get("account_id")?,
            })),
            None => Ok(None),
        }
    }

    async fn create_oauth_account(
        &self,
        account: NewAccount,
        link: OAuthLink,
    ) -> AppResult<Account> {
        let mut tx = self.db.begin().await?;

        insert_account(&mut tx, &account).await?;

        sqlx::query(
            "INSERT INTO addition (account_id, token, expires_at, confirmed) VALUES (?1, NULL, NULL, 1)",
        )
        .bind(&account.id)
        .execute(&mut *tx)
        .await?;

        insert_link(&mut tx, &link).await?;

        tx.commit().await?;

        Ok(account.into_account())
    }

    async fn attach_oauth_link(&self, link: OAuthLink) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        // Accounts created before additions existed get one here
        sqlx::query(
            "INSERT INTO addition (account_id, token, expires_at, confirmed) VALUES (?1, NULL, NULL, 1)
             ON CONFLICT(account_id) DO UPDATE SET confirmed = 1",
        )
        .bind(&link.account_id)
        .execute(&mut *tx)
        .await?;

        insert_link(&mut tx, &link).await?;

        tx.commit().await?;

        Ok(())
    }

    async fn unconfirmed_additions(&self) -> AppResult<Vec<Addition>> {
        let rows = sqlx::query(
            "SELECT account_id, token, expires_at, confirmed FROM addition WHERE confirmed = 0",
        )
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(row_to_addition).collect()
    }

    async fn delete_unconfirmed_account(
        &self,
        account_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut tx = self.db.begin().await?;

        let removed = sqlx::query(
            "DELETE FROM addition
             WHERE account_id = ?1 AND confirmed = 0 AND (expires_at IS NULL OR expires_at <= ?2)",
        )
        .bind(account_id)
        .bind(format_timestamp(now))
        .execute(&mut *tx)
        .await?;

        if removed.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("DELETE FROM session WHERE account_id = ?1")
            .bind(account_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM oauth_link WHERE account_id = ?1")
            .bind(account_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM account WHERE id = ?1")
            .bind(account_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use chrono::Duration;

    fn new_account(id: &str, email: &str) -> NewAccount {
        NewAccount {
            id: id.to_string(),
            email: email.to_string(),
            display_name: "Ada".to_string(),
            unique_handle: format!("ada-{}", id),
            password_hash: "hash".to_string(),
            created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    fn link(subject: &str, email: &str, account_id: &str) -> OAuthLink {
        OAuthLink {
            provider_subject_id: subject.to_string(),
            provider_token: "provider-token".to_string(),
            provider_email: email.to_string(),
            provider_display_name: "Ada".to_string(),
            account_id: account_id.to_string(),
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[tokio::test]
    async fn test_create_account_writes_account_and_addition() {
        let (pool, _dir) = test_pool().await;
        let store = SqliteCredentialStore::new(pool);

        let account = store
            .create_account(new_account("a1", "ada@x.com"), "tok", now() + Duration::hours(6))
            .await
            .unwrap();

        assert!(store.account_exists("ada@x.com").await.unwrap());
        assert_eq!(store.account_by_id("a1").await.unwrap(), Some(account));

        let addition = store.addition_by_token("tok").await.unwrap().unwrap();
        assert_eq!(addition.account_id, "a1");
        assert_eq!(addition.expires_at, Some(now() + Duration::hours(6)));
        assert!(!addition.confirmed);
    }

    #[tokio::test]
    async fn test_duplicate_email_is_already_exists_and_leaves_no_addition() {
        let (pool, _dir) = test_pool().await;
        let store = SqliteCredentialStore::new(pool);

        store
            .create_account(new_account("a1", "ada@x.com"), "tok1", now())
            .await
            .unwrap();
        let result = store
            .create_account(new_account("a2", "ada@x.com"), "tok2", now())
            .await;

        assert!(matches!(result, Err(AppError::AlreadyExists(_))));
        assert!(store.addition_by_token("tok2").await.unwrap().is_none());
        assert!(store.account_by_id("a2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_confirm_token_is_conditional() {
        let (pool, _dir) = test_pool().await;
        let store = SqliteCredentialStore::new(pool);
        store
            .create_account(new_account("a1", "ada@x.com"), "tok", now() + Duration::hours(6))
            .await
            .unwrap();

        // Wrong token and lapsed window do nothing
        assert!(!store.confirm_token("a1", "other", now()).await.unwrap());
        assert!(!store
            .confirm_token("a1", "tok", now() + Duration::hours(6))
            .await
            .unwrap());

        assert!(store.confirm_token("a1", "tok", now()).await.unwrap());
        assert!(!store.confirm_token("a1", "tok", now()).await.unwrap());

        let addition = store.addition_for_account("a1").await.unwrap().unwrap();
        assert!(addition.confirmed);
        assert_eq!(addition.token, None);
    }

    #[tokio::test]
    async fn test_reset_password_consumes_token_once() {
        let (pool, _dir) = test_pool().await;
        let store = SqliteCredentialStore::new(pool);
        store
            .create_account(new_account("a1", "ada@x.com"), "tok", now())
            .await
            .unwrap();
        store
            .set_token("a1", "reset", now() + Duration::hours(6))
            .await
            .unwrap();

        assert!(store
            .reset_password("a1", "reset", "new-hash", now())
            .await
            .unwrap());
        assert!(!store
            .reset_password("a1", "reset", "other-hash", now())
            .await
            .unwrap());

        let account = store.account_by_id("a1").await.unwrap().unwrap();
        assert_eq!(account.password_hash, "new-hash");
        let addition = store.addition_for_account("a1").await.unwrap().unwrap();
        assert!(addition.confirmed);
        assert_eq!(addition.token, None);
        assert_eq!(addition.expires_at, None);
    }

    #[tokio::test]
    async fn test_set_token_unknown_account() {
        let (pool, _dir) = test_pool().await;
        let store = SqliteCredentialStore::new(pool);

        let result = store.set_token("missing", "tok", now()).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_oauth_account_is_confirmed_without_token() {
        let (pool, _dir) = test_pool().await;
        let store = SqliteCredentialStore::new(pool);

        store
            .create_oauth_account(
                new_account("a1", "ada@x.com"),
                link("google-1", "ada@x.com", "a1"),
            )
            .await
            .unwrap();

        let addition = store.addition_for_account("a1").await.unwrap().unwrap();
        assert!(addition.confirmed);
        assert_eq!(addition.token, None);
        assert_eq!(
            store
                .oauth_link_by_email("ada@x.com")
                .await
                .unwrap()
                .unwrap()
                .account_id,
            "a1"
        );
    }

    #[tokio::test]
    async fn test_oauth_account_rolls_back_on_duplicate_link() {
        let (pool, _dir) = test_pool().await;
        let store = SqliteCredentialStore::new(pool);

        store
            .create_oauth_account(
                new_account("a1", "ada@x.com"),
                link("google-1", "ada@x.com", "a1"),
            )
            .await
            .unwrap();
        let result = store
            .create_oauth_account(
                new_account("a2", "other@x.com"),
                link("google-1", "other@x.com", "a2"),
            )
            .await;

        assert!(matches!(result, Err(AppError::AlreadyExists(_))));
        assert!(store.account_by_id("a2").await.unwrap().is_none());
        assert!(store.addition_for_account("a2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_attach_link_confirms_account() {
        let (pool, _dir) = test_pool().await;
        let store = SqliteCredentialStore::new(pool);
        store
            .create_account(new_account("a1", "ada@x.com"), "tok", now() + Duration::hours(6))
            .await
            .unwrap();

        store
            .attach_oauth_link(link("google-1", "ada@x.com", "a1"))
            .await
            .unwrap();

        let addition = store.addition_for_account("a1").await.unwrap().unwrap();
        assert!(addition.confirmed);
        assert!(store.unconfirmed_additions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_unconfirmed_account_guards() {
        let (pool, _dir) = test_pool().await;
        let store = SqliteCredentialStore::new(pool);
        store
            .create_account(new_account("live", "live@x.com"), "t1", now() + Duration::hours(1))
            .await
            .unwrap();
        store
            .create_account(new_account("stale", "stale@x.com"), "t2", now())
            .await
            .unwrap();
        store
            .create_account(new_account("done", "done@x.com"), "t3", now() + Duration::hours(1))
            .await
            .unwrap();
        store.confirm_token("done", "t3", now()).await.unwrap();

        let later = now() + Duration::hours(2);
        assert_eq!(store.unconfirmed_additions().await.unwrap().len(), 2);
        assert!(!store.delete_unconfirmed_account("done", later).await.unwrap());
        assert!(!store.delete_unconfirmed_account("live", now()).await.unwrap());
        assert!(store.delete_unconfirmed_account("stale", now()).await.unwrap());

        assert!(store.account_by_id("stale").await.unwrap().is_none());
        assert!(store.account_by_id("live").await.unwrap().is_some());
        assert!(store.account_by_id("done").await.unwrap().is_some());
    }
}

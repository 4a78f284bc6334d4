/// Question / answer board
///
/// Questions carry a readable slug, each account may answer a question once,
/// and likes are a set of (question, account) pairs.

use crate::{
    account::handle::{derive_handle, HANDLE_SUFFIX_LENGTH},
    db::{format_timestamp, parse_timestamp},
    error::{AppError, AppResult},
    tokens::TokenIssuer,
};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

/// Words of the question kept in its slug
const SLUG_WORDS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub question: String,
    pub poster: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub question_id: String,
    pub answer: String,
    pub commenter: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Slug for a question: its first words, hyphenated, plus a random suffix
pub fn question_slug(text: &str, suffix: &str) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let words: Vec<&str> = cleaned.split_whitespace().take(SLUG_WORDS).collect();

    if words.is_empty() {
        derive_handle("question", suffix)
    } else {
        derive_handle(&words.join(" "), suffix)
    }
}

fn row_to_question(row: &SqliteRow) -> AppResult<Question> {
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    Ok(Question {
        id: row.try_get("id")?,
        question: row.try_get("question")?,
        poster: row.try_get("poster")?,
        slug: row.try_get("slug")?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn row_to_answer(row: &SqliteRow) -> AppResult<Answer> {
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    Ok(Answer {
        question_id: row.try_get("question_id")?,
        answer: row.try_get("answer")?,
        commenter: row.try_get("commenter")?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn require_text(text: &str, what: &str) -> AppResult<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::Validation(format!("{} is empty", what)));
    }
    Ok(text.to_string())
}

/// Board persistence over SQLite
pub struct BoardManager {
    db: SqlitePool,
    issuer: Arc<TokenIssuer>,
}

impl BoardManager {
    pub fn new(db: SqlitePool, issuer: Arc<TokenIssuer>) -> Self {
        Self { db, issuer }
    }

    /// Current time at the precision stored in the database
    fn now(&self) -> DateTime<Utc> {
        self.issuer.now().trunc_subsecs(0)
    }

    /// All questions, newest first
    pub async fn list_questions(&self) -> AppResult<Vec<Question>> {
        let rows = sqlx::query(
            "SELECT id, question, poster, slug, created_at, updated_at
             FROM question ORDER BY created_at DESC, id",
        )
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(row_to_question).collect()
    }

    /// Look a question up by id or slug
    pub async fn get_question(&self, key: &str) -> AppResult<Question> {
        let row = sqlx::query(
            "SELECT id, question, poster, slug, created_at, updated_at
             FROM question WHERE id = ?1 OR slug = ?1",
        )
        .bind(key)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("no question found".to_string()))?;

        row_to_question(&row)
    }

    pub async fn post_question(&self, poster: &str, text: &str) -> AppResult<Question> {
        let text = require_text(text, "question")?;
        let now = self.now();
        let question = Question {
            id: Uuid::new_v4().to_string(),
            slug: question_slug(&text, &self.issuer.suffix(HANDLE_SUFFIX_LENGTH)),
            question: text,
            poster: poster.to_string(),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO question (id, question, poster, slug, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&question.id)
        .bind(&question.question)
        .bind(&question.poster)
        .bind(&question.slug)
        .bind(format_timestamp(now))
        .bind(format_timestamp(now))
        .execute(&self.db)
        .await?;

        tracing::info!("Question {} posted by {}", question.id, poster);
        Ok(question)
    }

    /// Rewrite a question; only its poster may do so
    pub async fn edit_question(
        &self,
        account_id: &str,
        key: &str,
        text: &str,
    ) -> AppResult<Question> {
        let text = require_text(text, "question")?;
        let mut question = self.get_question(key).await?;
        if question.poster != account_id {
            return Err(AppError::Authorization(
                "only the poster can edit this question".to_string(),
            ));
        }

        question.slug = question_slug(&text, &self.issuer.suffix(HANDLE_SUFFIX_LENGTH));
        question.question = text;
        question.updated_at = self.now();

        sqlx::query("UPDATE question SET question = ?1, slug = ?2, updated_at = ?3 WHERE id = ?4")
            .bind(&question.question)
            .bind(&question.slug)
            .bind(format_timestamp(question.updated_at))
            .bind(&question.id)
            .execute(&self.db)
            .await?;

        Ok(question)
    }

    /// Answers to a question, oldest first
    pub async fn list_answers(&self, key: &str) -> AppResult<Vec<Answer>> {
        let question = self.get_question(key).await?;

        let rows = sqlx::query(
            "SELECT question_id, answer, commenter, created_at, updated_at
             FROM answer WHERE question_id = ?1 ORDER BY created_at, commenter",
        )
        .bind(&question.id)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(row_to_answer).collect()
    }

    /// Answer a question; one answer per account
    pub async fn add_answer(&self, account_id: &str, key: &str, text: &str) -> AppResult<Answer> {
        let text = require_text(text, "answer")?;
        let question = self.get_question(key).await?;
        let now = self.now();

        sqlx::query(
            "INSERT INTO answer (question_id, answer, commenter, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&question.id)
        .bind(&text)
        .bind(account_id)
        .bind(format_timestamp(now))
        .bind(format_timestamp(now))
        .execute(&self.db)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::AlreadyExists("you have already answered the question".to_string())
            }
            _ => AppError::StoreUnavailable(e),
        })?;

        Ok(Answer {
            question_id: question.id,
            answer: text,
            commenter: account_id.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Rewrite the caller's own answer
    pub async fn edit_answer(&self, account_id: &str, key: &str, text: &str) -> AppResult<Answer> {
        let text = require_text(text, "answer")?;
        let question = self.get_question(key).await?;
        let now = self.now();

        let result = sqlx::query(
            "UPDATE answer SET answer = ?1, updated_at = ?2 WHERE question_id = ?3 AND commenter = ?4",
        )
        .bind(&text)
        .bind(format_timestamp(now))
        .bind(&question.id)
        .bind(account_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("no answer found".to_string()));
        }

        let row = sqlx::query(
            "SELECT question_id, answer, commenter, created_at, updated_at
             FROM answer WHERE question_id = ?1 AND commenter = ?2",
        )
        .bind(&question.id)
        .bind(account_id)
        .fetch_one(&self.db)
        .await?;

        row_to_answer(&row)
    }

    /// Like a question; liking twice is a no-op
    pub async fn like(&self, account_id: &str, key: &str) -> AppResult<()> {
        let question = self.get_question(key).await?;

        sqlx::query(
            "INSERT OR IGNORE INTO question_like (question_id, account_id, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(&question.id)
        .bind(account_id)
        .bind(format_timestamp(self.now()))
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Withdraw a like
    pub async fn dislike(&self, account_id: &str, key: &str) -> AppResult<()> {
        let question = self.get_question(key).await?;

        sqlx::query("DELETE FROM question_like WHERE question_id = ?1 AND account_id = ?2")
            .bind(&question.id)
            .bind(account_id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    pub async fn like_count(&self, key: &str) -> AppResult<i64> {
        let question = self.get_question(key).await?;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM question_like WHERE question_id = ?1")
            .bind(&question.id)
            .fetch_one(&self.db)
            .await?;

        Ok(count)
    }
}

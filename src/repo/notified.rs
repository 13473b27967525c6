//! The notified-vacancies ledger. A row means "this user was already told
//! about this vacancy", keyed both by vacancy id and by description hash so
//! republished copies of the same posting stay silent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::UNIQUE_VIOLATION;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded,
    /// A concurrent worker won the race; the notification already exists.
    AlreadyRecorded,
}

#[async_trait]
pub trait NotifiedStore: Send + Sync {
    /// True when the user already got a notification matching either the
    /// vacancy id or the content hash. A hit refreshes the row's timestamp
    /// so actively republished vacancies never age out of the ledger.
    async fn is_notified(
        &self,
        user_id: i64,
        vacancy_id: &str,
        description_hash: &str,
    ) -> anyhow::Result<bool>;

    async fn record(
        &self,
        user_id: i64,
        vacancy_id: &str,
        description_hash: &str,
    ) -> anyhow::Result<RecordOutcome>;

    /// Drop ledger rows not touched since the cutoff. Returns rows removed.
    async fn remove_older_than(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64>;
}

#[derive(Clone)]
pub struct PgNotifiedStore {
    pool: PgPool,
}

impl PgNotifiedStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotifiedStore for PgNotifiedStore {
    async fn is_notified(
        &self,
        user_id: i64,
        vacancy_id: &str,
        description_hash: &str,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE notified_vacancies
            SET last_checked_at = now()
            WHERE user_id = $1 AND (vacancy_id = $2 OR description_hash = $3)
            "#,
        )
        .bind(user_id)
        .bind(vacancy_id)
        .bind(description_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record(
        &self,
        user_id: i64,
        vacancy_id: &str,
        description_hash: &str,
    ) -> anyhow::Result<RecordOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO notified_vacancies (user_id, vacancy_id, description_hash, last_checked_at)
            VALUES ($1, $2, $3, now())
            "#,
        )
        .bind(user_id)
        .bind(vacancy_id)
        .bind(description_hash)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(RecordOutcome::Recorded),
            Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                Ok(RecordOutcome::AlreadyRecorded)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn remove_older_than(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM notified_vacancies WHERE last_checked_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

//! The failed-classification queue. Every item a worker could not classify
//! lands here and gets retried next cycle until it either succeeds or
//! exceeds the attempt ceiling.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::model::FailedVacancy;

#[async_trait]
pub trait FailedStore: Send + Sync {
    /// Insert the failure, or bump `attempts` and refresh the error if the
    /// (search, vacancy) pair is already queued.
    async fn upsert(&self, search_id: i64, vacancy_id: &str, error: &str) -> anyhow::Result<()>;

    async fn list_all(&self) -> anyhow::Result<Vec<FailedVacancy>>;

    /// Remove rows that exhausted the attempt ceiling or were not refreshed
    /// since the cutoff. A retried item that failed again was just
    /// re-upserted, so staleness only catches the ones that succeeded or
    /// whose search disappeared. Returns rows removed.
    async fn purge_stale(&self, max_attempts: i32, older_than: DateTime<Utc>)
        -> anyhow::Result<u64>;
}

#[derive(FromRow)]
struct FailedRow {
    search_id: i64,
    vacancy_id: String,
    error: String,
    attempts: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<FailedRow> for FailedVacancy {
    fn from(row: FailedRow) -> Self {
        FailedVacancy {
            search_id: row.search_id,
            vacancy_id: row.vacancy_id,
            error: row.error,
            attempts: row.attempts,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct PgFailedStore {
    pool: PgPool,
}

impl PgFailedStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FailedStore for PgFailedStore {
    async fn upsert(&self, search_id: i64, vacancy_id: &str, error: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO failed_vacancies (search_id, vacancy_id, error)
            VALUES ($1, $2, $3)
            ON CONFLICT (search_id, vacancy_id) DO UPDATE
            SET attempts = failed_vacancies.attempts + 1,
                error = EXCLUDED.error,
                updated_at = now()
            "#,
        )
        .bind(search_id)
        .bind(vacancy_id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_all(&self) -> anyhow::Result<Vec<FailedVacancy>> {
        let rows = sqlx::query_as::<_, FailedRow>(
            r#"
            SELECT search_id, vacancy_id, error, attempts, created_at, updated_at
            FROM failed_vacancies
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(FailedVacancy::from).collect())
    }

    async fn purge_stale(
        &self,
        max_attempts: i32,
        older_than: DateTime<Utc>,
    ) -> anyhow::Result<u64> {
        let result =
            sqlx::query("DELETE FROM failed_vacancies WHERE attempts > $1 OR updated_at < $2")
                .bind(max_attempts)
                .bind(older_than)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}

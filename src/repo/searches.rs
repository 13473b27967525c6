//! Saved search storage. The pipeline reads searches in pages and advances
//! their crawl checkpoint; the front-end gets the usual CRUD surface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::model::{schedules_from_str, schedules_to_str, Experience, JobSearch};

#[async_trait]
pub trait SearchStore: Send + Sync {
    /// A page of searches ordered by id, for the crawl pass.
    async fn list_page(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<JobSearch>>;

    async fn get(&self, id: i64) -> anyhow::Result<Option<JobSearch>>;

    /// Advance the crawl checkpoint to the publish time of the newest
    /// vacancy seen in a completed crawl.
    async fn update_checkpoint(&self, id: i64, seen_at: DateTime<Utc>) -> anyhow::Result<()>;
}

#[derive(FromRow)]
struct SearchRow {
    id: i64,
    user_id: i64,
    search_text: String,
    region_id: Option<String>,
    experience: String,
    schedules: String,
    user_wish: String,
    initial_search_days: i32,
    last_seen_published_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl SearchRow {
    fn into_search(self) -> JobSearch {
        JobSearch {
            id: self.id,
            user_id: self.user_id,
            search_text: self.search_text,
            region_id: self.region_id,
            // Unknown stored values fall back to the widest filter.
            experience: Experience::parse(&self.experience).unwrap_or(Experience::NoExperience),
            schedules: schedules_from_str(&self.schedules),
            user_wish: self.user_wish,
            initial_search_days: self.initial_search_days as i64,
            last_seen_published_at: self.last_seen_published_at,
            created_at: self.created_at,
        }
    }
}

const SEARCH_COLUMNS: &str = "id, user_id, search_text, region_id, experience, schedules, \
     user_wish, initial_search_days, last_seen_published_at, created_at";

#[derive(Clone)]
pub struct PgSearchStore {
    pool: PgPool,
}

impl PgSearchStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn add(&self, search: &JobSearch) -> anyhow::Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO searches
                (user_id, search_text, region_id, experience, schedules,
                 user_wish, initial_search_days, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(search.user_id)
        .bind(&search.search_text)
        .bind(&search.region_id)
        .bind(search.experience.as_str())
        .bind(schedules_to_str(&search.schedules))
        .bind(&search.user_wish)
        .bind(search.initial_search_days as i32)
        .bind(search.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Full rewrite of the user-editable fields; the checkpoint is reset so
    /// the next crawl re-evaluates under the new criteria.
    pub async fn update(&self, search: &JobSearch) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE searches
            SET search_text = $2, region_id = $3, experience = $4, schedules = $5,
                user_wish = $6, initial_search_days = $7, last_seen_published_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(search.id)
        .bind(&search.search_text)
        .bind(&search.region_id)
        .bind(search.experience.as_str())
        .bind(schedules_to_str(&search.schedules))
        .bind(&search.user_wish)
        .bind(search.initial_search_days as i32)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn remove(&self, id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM searches WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_by_user(&self, user_id: i64) -> anyhow::Result<Vec<JobSearch>> {
        let rows = sqlx::query_as::<_, SearchRow>(&format!(
            "SELECT {SEARCH_COLUMNS} FROM searches WHERE user_id = $1 ORDER BY id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SearchRow::into_search).collect())
    }

    pub async fn count_by_user(&self, user_id: i64) -> anyhow::Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM searches WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl SearchStore for PgSearchStore {
    async fn list_page(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<JobSearch>> {
        let rows = sqlx::query_as::<_, SearchRow>(&format!(
            "SELECT {SEARCH_COLUMNS} FROM searches ORDER BY id LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SearchRow::into_search).collect())
    }

    async fn get(&self, id: i64) -> anyhow::Result<Option<JobSearch>> {
        let row = sqlx::query_as::<_, SearchRow>(&format!(
            "SELECT {SEARCH_COLUMNS} FROM searches WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(SearchRow::into_search))
    }

    async fn update_checkpoint(&self, id: i64, seen_at: DateTime<Utc>) -> anyhow::Result<()> {
        sqlx::query("UPDATE searches SET last_seen_published_at = $2 WHERE id = $1")
            .bind(id)
            .bind(seen_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

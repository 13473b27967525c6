//! Thin client for the hh.ru vacancy search API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::clients::limiter::RateGate;
use crate::model::{Experience, Schedule};

pub const DEFAULT_BASE_URL: &str = "https://api.hh.ru";

/// The search API refuses to page past this many results.
const MAX_SEARCH_RESULTS: u32 = 2000;

#[derive(Debug, Error)]
pub enum HhError {
    #[error("too deep pagination")]
    TooDeepPagination,
    #[error("per_page must be between 1 and 100")]
    InvalidPageSize,
    #[error("request failed with status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct SearchParameters {
    pub text: String,
    pub area_id: Option<String>,
    pub experience: Experience,
    pub schedules: Vec<Schedule>,
    pub date_from: DateTime<Utc>,
    pub order_by_publication_time: bool,
    pub page: u32,
    pub per_page: u32,
}

impl SearchParameters {
    pub fn validate(&self) -> Result<(), HhError> {
        if self.per_page == 0 || self.per_page > 100 {
            return Err(HhError::InvalidPageSize);
        }
        if self.page >= MAX_SEARCH_RESULTS / self.per_page {
            return Err(HhError::TooDeepPagination);
        }
        Ok(())
    }

    fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("text", self.text.clone()),
            ("experience", self.experience.as_str().to_string()),
        ];
        for schedule in &self.schedules {
            query.push(("schedule", schedule.as_str().to_string()));
        }
        if let Some(area) = &self.area_id {
            query.push(("area", area.clone()));
        }
        query.push(("page", self.page.to_string()));
        query.push(("per_page", self.per_page.to_string()));
        if self.order_by_publication_time {
            query.push(("order_by", "publication_time".to_string()));
        }
        query.push(("date_from", self.date_from.format(HH_TIME_FORMAT).to_string()));
        query
    }
}

// The API speaks RFC3339 without the colon in the offset.
const HH_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

fn deserialize_hh_time<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    DateTime::parse_from_str(&raw, HH_TIME_FORMAT)
        .map(|t| t.with_timezone(&Utc))
        .map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, Deserialize)]
pub struct VacancyPreview {
    pub id: String,
    pub name: String,
    #[serde(rename = "alternate_url")]
    pub url: String,
    #[serde(rename = "published_at", deserialize_with = "deserialize_hh_time")]
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeySkill {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VacancyDetail {
    pub id: String,
    pub name: String,
    #[serde(rename = "alternate_url")]
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub key_skills: Vec<KeySkill>,
    #[serde(rename = "published_at", deserialize_with = "deserialize_hh_time")]
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    items: Vec<VacancyPreview>,
}

pub struct HhClient {
    http: reqwest::Client,
    base_url: String,
    gate: RateGate,
}

impl HhClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            gate: RateGate::new(),
        }
    }

    pub fn with_rate_limit(mut self, max_requests_per_second: u32) -> Self {
        self.gate = RateGate::new().with(super::limiter::per_second(max_requests_per_second));
        self
    }

    /// One page of vacancy previews, ordered as requested.
    pub async fn search(&self, params: &SearchParameters) -> Result<Vec<VacancyPreview>, HhError> {
        params.validate()?;
        self.gate.acquire().await;

        let response = self
            .http
            .get(format!("{}/vacancies", self.base_url))
            .query(&params.to_query())
            .send()
            .await?;
        let response = check_status(response).await?;

        Ok(response.json::<SearchResponse>().await?.items)
    }

    pub async fn vacancy(&self, id: &str) -> Result<VacancyDetail, HhError> {
        self.gate.acquire().await;

        let response = self
            .http
            .get(format!("{}/vacancies/{id}", self.base_url))
            .send()
            .await?;
        let response = check_status(response).await?;

        Ok(response.json::<VacancyDetail>().await?)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, HhError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(HhError::Status { status, body });
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn params() -> SearchParameters {
        SearchParameters {
            text: "rust developer".into(),
            area_id: Some("1".into()),
            experience: Experience::Between1And3,
            schedules: vec![Schedule::Remote, Schedule::Flexible],
            date_from: Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap(),
            order_by_publication_time: true,
            page: 0,
            per_page: 20,
        }
    }

    #[test]
    fn query_carries_all_filters() {
        let query = params().to_query();

        assert!(query.contains(&("text", "rust developer".to_string())));
        assert!(query.contains(&("experience", "between1And3".to_string())));
        assert!(query.contains(&("schedule", "remote".to_string())));
        assert!(query.contains(&("schedule", "flexible".to_string())));
        assert!(query.contains(&("area", "1".to_string())));
        assert!(query.contains(&("order_by", "publication_time".to_string())));
        assert!(query.contains(&("date_from", "2024-02-01T12:00:00+0000".to_string())));
    }

    #[test]
    fn pagination_past_result_cap_is_rejected() {
        let mut p = params();
        p.per_page = 20;
        p.page = 100; // 100 * 20 == 2000, one past the cap
        assert!(matches!(p.validate(), Err(HhError::TooDeepPagination)));

        p.page = 99;
        assert!(p.validate().is_ok());
    }

    #[test]
    fn per_page_bounds_are_enforced() {
        let mut p = params();
        p.per_page = 0;
        assert!(matches!(p.validate(), Err(HhError::InvalidPageSize)));
        p.per_page = 101;
        assert!(matches!(p.validate(), Err(HhError::InvalidPageSize)));
    }

    #[test]
    fn published_at_parses_the_offset_format() {
        let raw = r#"{
            "id": "93536440",
            "name": "Rust developer",
            "alternate_url": "https://hh.ru/vacancy/93536440",
            "published_at": "2024-02-06T15:30:00+0300"
        }"#;
        let preview: VacancyPreview = serde_json::from_str(raw).unwrap();
        assert_eq!(
            preview.published_at,
            Utc.with_ymd_and_hms(2024, 2, 6, 12, 30, 0).unwrap()
        );
    }

    #[test]
    fn missing_key_skills_defaults_to_empty() {
        let raw = r#"{
            "id": "1",
            "name": "Backend engineer",
            "alternate_url": "https://hh.ru/vacancy/1",
            "description": "<p>text</p>",
            "published_at": "2024-02-06T15:30:00+0300"
        }"#;
        let detail: VacancyDetail = serde_json::from_str(raw).unwrap();
        assert!(detail.key_skills.is_empty());
    }
}

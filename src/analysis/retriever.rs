//! Vacancy retrieval: adapts the job-board client to what the pipeline
//! needs (full descriptions, model types, paging that degrades gracefully).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::histogram;
use tokio::time::Instant;
use tracing::warn;

use crate::clients::hh::{HhClient, HhError, SearchParameters, VacancyDetail};
use crate::model::{JobSearch, Vacancy};

/// Fetches vacancies for the analysis pipeline.
#[async_trait]
pub trait VacancyRetriever: Send + Sync {
    /// One page of full vacancies matching the search, newest first.
    async fn fetch_page(
        &self,
        search: &JobSearch,
        date_from: DateTime<Utc>,
        page: u32,
        per_page: u32,
    ) -> anyhow::Result<Vec<Vacancy>>;

    async fn fetch_by_id(&self, id: &str) -> anyhow::Result<Vacancy>;
}

pub struct HhRetriever {
    client: HhClient,
}

impl HhRetriever {
    pub fn new(client: HhClient) -> Self {
        Self { client }
    }

    async fn fetch_detail(&self, id: &str) -> anyhow::Result<Vacancy> {
        let started = Instant::now();
        let detail = self.client.vacancy(id).await?;
        histogram!("analysis_step_duration_seconds", "step" => "info_retrieval")
            .record(started.elapsed().as_secs_f64());
        Ok(into_vacancy(detail))
    }
}

#[async_trait]
impl VacancyRetriever for HhRetriever {
    async fn fetch_page(
        &self,
        search: &JobSearch,
        date_from: DateTime<Utc>,
        page: u32,
        per_page: u32,
    ) -> anyhow::Result<Vec<Vacancy>> {
        let params = SearchParameters {
            text: search.search_text.clone(),
            area_id: search.region_id.clone(),
            experience: search.experience,
            schedules: search.schedules.clone(),
            date_from,
            order_by_publication_time: true,
            page,
            per_page,
        };

        let previews = match self.client.search(&params).await {
            Ok(previews) => previews,
            // The API caps how deep search results go. Treat the cap as the
            // end of the stream so an unusually busy search still completes.
            Err(HhError::TooDeepPagination) => {
                warn!(search_id = search.id, page, "search paging hit the result cap");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err.into()),
        };

        // Previews carry no description, so each vacancy needs a detail fetch
        // before it can be hashed and classified.
        let mut vacancies = Vec::with_capacity(previews.len());
        for preview in previews {
            vacancies.push(self.fetch_detail(&preview.id).await?);
        }
        Ok(vacancies)
    }

    async fn fetch_by_id(&self, id: &str) -> anyhow::Result<Vacancy> {
        self.fetch_detail(id).await
    }
}

fn into_vacancy(detail: VacancyDetail) -> Vacancy {
    Vacancy {
        id: detail.id,
        url: detail.url,
        name: detail.name,
        description: detail.description,
        key_skills: detail.key_skills.into_iter().map(|s| s.name).collect(),
        published_at: detail.published_at,
    }
}

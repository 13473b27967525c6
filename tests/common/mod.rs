//! In-memory store and client fakes for driving full analysis cycles
//! without Postgres or the external APIs.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};

use vacwatch::analysis::{
    Analyzer, AnalyzerConfig, ClassifyError, DedupKey, MatchClassifier, VacancyRetriever,
};
use vacwatch::clients::GenerateError;
use vacwatch::events::EventBus;
use vacwatch::model::{FailedVacancy, JobSearch, Vacancy};
use vacwatch::repo::{FailedStore, NotifiedStore, RecordOutcome, SearchStore};

pub fn search(id: i64, user_id: i64, wish: &str) -> JobSearch {
    use vacwatch::model::Experience;
    let mut s = JobSearch::new(user_id, "rust developer", None, Experience::Between1And3, vec![], wish, 7);
    s.id = id;
    s
}

pub fn vacancy(id: &str, description: &str) -> Vacancy {
    Vacancy {
        id: id.to_string(),
        url: format!("https://hh.ru/vacancy/{id}"),
        name: format!("Vacancy {id}"),
        description: description.to_string(),
        key_skills: vec![],
        published_at: Utc::now(),
    }
}

#[derive(Default)]
pub struct MemorySearchStore {
    pub searches: Mutex<Vec<JobSearch>>,
}

impl MemorySearchStore {
    pub fn with(searches: Vec<JobSearch>) -> Arc<Self> {
        Arc::new(Self {
            searches: Mutex::new(searches),
        })
    }

    pub async fn checkpoint_of(&self, id: i64) -> Option<DateTime<Utc>> {
        self.searches
            .lock()
            .await
            .iter()
            .find(|s| s.id == id)
            .and_then(|s| s.last_seen_published_at)
    }
}

#[async_trait]
impl SearchStore for MemorySearchStore {
    async fn list_page(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<JobSearch>> {
        let searches = self.searches.lock().await;
        Ok(searches
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn get(&self, id: i64) -> anyhow::Result<Option<JobSearch>> {
        Ok(self.searches.lock().await.iter().find(|s| s.id == id).cloned())
    }

    async fn update_checkpoint(&self, id: i64, seen_at: DateTime<Utc>) -> anyhow::Result<()> {
        let mut searches = self.searches.lock().await;
        if let Some(s) = searches.iter_mut().find(|s| s.id == id) {
            s.last_seen_published_at = Some(seen_at);
        }
        Ok(())
    }
}

/// Mirrors the ledger's uniqueness rules: a row matches on vacancy id OR on
/// description hash.
#[derive(Default)]
pub struct MemoryNotifiedStore {
    pub rows: Mutex<Vec<(DedupKey, DateTime<Utc>)>>,
    record_errors: Mutex<VecDeque<String>>,
}

impl MemoryNotifiedStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    /// Script the next `record` call to fail, as a broken database would.
    pub async fn fail_next_record(&self, error: &str) {
        self.record_errors.lock().await.push_back(error.to_string());
    }
}

#[async_trait]
impl NotifiedStore for MemoryNotifiedStore {
    async fn is_notified(
        &self,
        user_id: i64,
        vacancy_id: &str,
        description_hash: &str,
    ) -> anyhow::Result<bool> {
        let mut rows = self.rows.lock().await;
        let mut hit = false;
        for (key, checked_at) in rows.iter_mut() {
            if key.user_id == user_id
                && (key.vacancy_id == vacancy_id || key.description_hash == description_hash)
            {
                *checked_at = Utc::now();
                hit = true;
            }
        }
        Ok(hit)
    }

    async fn record(
        &self,
        user_id: i64,
        vacancy_id: &str,
        description_hash: &str,
    ) -> anyhow::Result<RecordOutcome> {
        if let Some(error) = self.record_errors.lock().await.pop_front() {
            return Err(anyhow::anyhow!(error));
        }
        let mut rows = self.rows.lock().await;
        let duplicate = rows.iter().any(|(key, _)| {
            key.user_id == user_id
                && (key.vacancy_id == vacancy_id || key.description_hash == description_hash)
        });
        if duplicate {
            return Ok(RecordOutcome::AlreadyRecorded);
        }
        rows.push((
            DedupKey {
                user_id,
                vacancy_id: vacancy_id.to_string(),
                description_hash: description_hash.to_string(),
            },
            Utc::now(),
        ));
        Ok(RecordOutcome::Recorded)
    }

    async fn remove_older_than(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|(_, checked_at)| *checked_at >= cutoff);
        Ok((before - rows.len()) as u64)
    }
}

#[derive(Default)]
pub struct MemoryFailedStore {
    pub rows: Mutex<HashMap<(i64, String), FailedVacancy>>,
}

impl MemoryFailedStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn seed(&self, search_id: i64, vacancy_id: &str, attempts: i32) {
        let now = Utc::now();
        self.rows.lock().await.insert(
            (search_id, vacancy_id.to_string()),
            FailedVacancy {
                search_id,
                vacancy_id: vacancy_id.to_string(),
                error: "seeded".into(),
                attempts,
                created_at: now,
                updated_at: now,
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn attempts_of(&self, search_id: i64, vacancy_id: &str) -> Option<i32> {
        self.rows
            .lock()
            .await
            .get(&(search_id, vacancy_id.to_string()))
            .map(|row| row.attempts)
    }
}

#[async_trait]
impl FailedStore for MemoryFailedStore {
    async fn upsert(&self, search_id: i64, vacancy_id: &str, error: &str) -> anyhow::Result<()> {
        let mut rows = self.rows.lock().await;
        let now = Utc::now();
        rows.entry((search_id, vacancy_id.to_string()))
            .and_modify(|row| {
                row.attempts += 1;
                row.error = error.to_string();
                row.updated_at = now;
            })
            .or_insert(FailedVacancy {
                search_id,
                vacancy_id: vacancy_id.to_string(),
                error: error.to_string(),
                attempts: 1,
                created_at: now,
                updated_at: now,
            });
        Ok(())
    }

    async fn list_all(&self) -> anyhow::Result<Vec<FailedVacancy>> {
        Ok(self.rows.lock().await.values().cloned().collect())
    }

    async fn purge_stale(
        &self,
        max_attempts: i32,
        older_than: DateTime<Utc>,
    ) -> anyhow::Result<u64> {
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|_, row| row.attempts <= max_attempts && row.updated_at >= older_than);
        Ok((before - rows.len()) as u64)
    }
}

/// Serves a fixed vacancy list in pages, newest first, like the real board.
pub struct StaticRetriever {
    pub vacancies: Vec<Vacancy>,
}

impl StaticRetriever {
    pub fn with(vacancies: Vec<Vacancy>) -> Arc<Self> {
        Arc::new(Self { vacancies })
    }
}

#[async_trait]
impl VacancyRetriever for StaticRetriever {
    async fn fetch_page(
        &self,
        _search: &JobSearch,
        _date_from: DateTime<Utc>,
        page: u32,
        per_page: u32,
    ) -> anyhow::Result<Vec<Vacancy>> {
        let start = (page * per_page) as usize;
        let end = (start + per_page as usize).min(self.vacancies.len());
        if start >= self.vacancies.len() {
            return Ok(Vec::new());
        }
        Ok(self.vacancies[start..end].to_vec())
    }

    async fn fetch_by_id(&self, id: &str) -> anyhow::Result<Vacancy> {
        self.vacancies
            .iter()
            .find(|v| v.id == id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no vacancy {id}"))
    }
}

/// Errors every page fetch for one search and serves the fixed list to the
/// rest, for failure-isolation scenarios.
pub struct SplitRetriever {
    pub failing_search: i64,
    pub vacancies: Vec<Vacancy>,
}

impl SplitRetriever {
    pub fn with(failing_search: i64, vacancies: Vec<Vacancy>) -> Arc<Self> {
        Arc::new(Self {
            failing_search,
            vacancies,
        })
    }
}

#[async_trait]
impl VacancyRetriever for SplitRetriever {
    async fn fetch_page(
        &self,
        search: &JobSearch,
        _date_from: DateTime<Utc>,
        page: u32,
        per_page: u32,
    ) -> anyhow::Result<Vec<Vacancy>> {
        if search.id == self.failing_search {
            anyhow::bail!("connection reset by peer");
        }
        let start = (page * per_page) as usize;
        let end = (start + per_page as usize).min(self.vacancies.len());
        if start >= self.vacancies.len() {
            return Ok(Vec::new());
        }
        Ok(self.vacancies[start..end].to_vec())
    }

    async fn fetch_by_id(&self, id: &str) -> anyhow::Result<Vacancy> {
        self.vacancies
            .iter()
            .find(|v| v.id == id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no vacancy {id}"))
    }
}

/// Serves no search pages at all, only detail fetches, and counts them.
pub struct CountingRetriever {
    pub vacancies: Vec<Vacancy>,
    pub detail_fetches: AtomicUsize,
}

impl CountingRetriever {
    pub fn with(vacancies: Vec<Vacancy>) -> Arc<Self> {
        Arc::new(Self {
            vacancies,
            detail_fetches: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl VacancyRetriever for CountingRetriever {
    async fn fetch_page(
        &self,
        _search: &JobSearch,
        _date_from: DateTime<Utc>,
        _page: u32,
        _per_page: u32,
    ) -> anyhow::Result<Vec<Vacancy>> {
        Ok(Vec::new())
    }

    async fn fetch_by_id(&self, id: &str) -> anyhow::Result<Vacancy> {
        self.detail_fetches.fetch_add(1, Ordering::SeqCst);
        self.vacancies
            .iter()
            .find(|v| v.id == id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no vacancy {id}"))
    }
}

/// Pops one scripted verdict per classification; an empty queue means "yes".
pub struct QueueClassifier {
    pub script: Mutex<VecDeque<Result<bool, String>>>,
}

impl QueueClassifier {
    pub fn with(script: Vec<Result<bool, String>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
        })
    }

    pub async fn remaining(&self) -> usize {
        self.script.lock().await.len()
    }
}

#[async_trait]
impl MatchClassifier for QueueClassifier {
    async fn matches(&self, _search: &JobSearch, vacancy: &Vacancy) -> Result<bool, ClassifyError> {
        let verdict = self.script.lock().await.pop_front();
        match verdict {
            Some(Ok(matched)) => Ok(matched),
            Some(Err(answer)) => Err(ClassifyError::UnexpectedAnswer {
                answer,
                url: vacancy.url.clone(),
            }),
            None => Ok(true),
        }
    }
}

/// Takes long enough per verdict that a cancellation always lands first.
pub struct SlowClassifier;

#[async_trait]
impl MatchClassifier for SlowClassifier {
    async fn matches(&self, _search: &JobSearch, _vacancy: &Vacancy) -> Result<bool, ClassifyError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Err(ClassifyError::Generation(GenerateError::MalformedResponse))
    }
}

pub struct Harness {
    pub bus: EventBus,
    pub searches: Arc<MemorySearchStore>,
    pub notified: Arc<MemoryNotifiedStore>,
    pub failed: Arc<MemoryFailedStore>,
    pub cycles: mpsc::Receiver<()>,
}

impl Harness {
    /// Spawn an analyzer over the fakes and hand back the handles the tests
    /// assert on. The interval is long enough that only the first cycle runs
    /// within a test's lifetime.
    pub fn start(
        searches: Vec<JobSearch>,
        retriever: Arc<dyn VacancyRetriever>,
        classifier: Arc<dyn MatchClassifier>,
    ) -> Self {
        let bus = EventBus::new();
        let search_store = MemorySearchStore::with(searches);
        let notified = MemoryNotifiedStore::new();
        let failed = MemoryFailedStore::new();
        let (cycle_tx, cycle_rx) = mpsc::channel(4);

        let analyzer = Analyzer::new(
            bus.clone(),
            classifier,
            retriever,
            search_store.clone(),
            notified.clone(),
            failed.clone(),
            AnalyzerConfig {
                interval: Duration::from_secs(3600),
                page_size: 20,
                workers: 2,
                request_buffer: 16,
                max_failed_attempts: 3,
            },
        )
        .with_cycle_notifier(cycle_tx);
        tokio::spawn(analyzer.run());

        Self {
            bus,
            searches: search_store,
            notified,
            failed,
            cycles: cycle_rx,
        }
    }

    pub async fn wait_for_cycle(&mut self) {
        tokio::time::timeout(Duration::from_secs(30), self.cycles.recv())
            .await
            .expect("analysis cycle did not finish in time")
            .expect("analyzer stopped before completing a cycle");
    }
}

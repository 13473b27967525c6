//! The periodic analysis loop.
//!
//! One cycle is a crawl pass (page every saved search since its checkpoint,
//! classify new vacancies with a worker pool) followed by a retry pass
//! (re-fetch everything in the failed queue and run it through the same
//! pool) and a purge of retry items that succeeded or ran out of attempts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use metrics::{counter, histogram};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::analysis::classifier::MatchClassifier;
use crate::analysis::dedup::DedupKey;
use crate::analysis::error_sink;
use crate::analysis::retriever::VacancyRetriever;
use crate::events::{EventBus, SearchChanged, VacancyFound};
use crate::model::{AnalysisError, AnalysisRequest, JobSearch, Vacancy};
use crate::repo::{FailedStore, NotifiedStore, RecordOutcome, SearchStore};

#[derive(Clone)]
pub struct AnalyzerConfig {
    /// Pause between cycles, measured from the end of one to the start of
    /// the next.
    pub interval: Duration,
    pub page_size: u32,
    pub workers: usize,
    pub request_buffer: usize,
    pub max_failed_attempts: i32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3 * 60 * 60),
            page_size: 20,
            workers: 4,
            request_buffer: 64,
            max_failed_attempts: 3,
        }
    }
}

struct Inner {
    bus: EventBus,
    classifier: Arc<dyn MatchClassifier>,
    retriever: Arc<dyn VacancyRetriever>,
    searches: Arc<dyn SearchStore>,
    notified: Arc<dyn NotifiedStore>,
    failed: Arc<dyn FailedStore>,
    cfg: AnalyzerConfig,
    /// Cancellation scope per in-flight search crawl, so an edit or delete
    /// stops the analysis before it notifies on stale criteria.
    scopes: DashMap<i64, CancellationToken>,
}

pub struct Analyzer {
    inner: Arc<Inner>,
    interval: Duration,
    cycle_notifier: Option<mpsc::Sender<()>>,
}

impl Analyzer {
    pub fn new(
        bus: EventBus,
        classifier: Arc<dyn MatchClassifier>,
        retriever: Arc<dyn VacancyRetriever>,
        searches: Arc<dyn SearchStore>,
        notified: Arc<dyn NotifiedStore>,
        failed: Arc<dyn FailedStore>,
        cfg: AnalyzerConfig,
    ) -> Self {
        let interval = cfg.interval;
        Self {
            inner: Arc::new(Inner {
                bus,
                classifier,
                retriever,
                searches,
                notified,
                failed,
                cfg,
                scopes: DashMap::new(),
            }),
            interval,
            cycle_notifier: None,
        }
    }

    /// Receives a `()` after every completed cycle. Used by tests to wait
    /// for a cycle instead of sleeping.
    pub fn with_cycle_notifier(mut self, notifier: mpsc::Sender<()>) -> Self {
        self.cycle_notifier = Some(notifier);
        self
    }

    pub async fn run(mut self) {
        let inner = Arc::clone(&self.inner);
        let changed_rx = inner.bus.subscribe_changed();
        tokio::spawn(watch_search_changes(Arc::clone(&inner), changed_rx));

        loop {
            let started = Instant::now();
            inner.run_cycle().await;

            let elapsed = started.elapsed();
            histogram!("analysis_cycle_duration_seconds").record(elapsed.as_secs_f64());
            info!(elapsed_secs = elapsed.as_secs(), "analysis cycle finished");

            if let Some(notifier) = &self.cycle_notifier {
                let _ = notifier.send(()).await;
            }

            if let Some(extended) = extended_interval(self.interval, elapsed) {
                warn!(
                    new_interval_secs = extended.as_secs(),
                    "cycle outlasted the interval, extending it"
                );
                self.interval = extended;
            }
            tokio::time::sleep(self.interval.saturating_sub(elapsed)).await;
        }
    }
}

/// When a cycle takes longer than the interval, stretch the interval to the
/// cycle duration plus an hour of slack instead of crawling back to back.
fn extended_interval(interval: Duration, elapsed: Duration) -> Option<Duration> {
    if elapsed > interval {
        Some(elapsed + Duration::from_secs(3600))
    } else {
        None
    }
}

async fn watch_search_changes(inner: Arc<Inner>, mut rx: broadcast::Receiver<SearchChanged>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if let Some((_, token)) = inner.scopes.remove(&event.search_id) {
                    debug!(search_id = event.search_id, kind = ?event.kind, "cancelling in-flight analysis");
                    token.cancel();
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                // Missed cancellations only cost extra work on a search that
                // no longer needs it; the dedup ledger still holds.
                warn!(missed, "search-change subscriber lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

impl Inner {
    async fn run_cycle(self: &Arc<Self>) {
        self.crawl_pass().await;
        self.retry_pass().await;
    }

    /// Page through every saved search and classify its new vacancies.
    async fn crawl_pass(self: &Arc<Self>) {
        let (err_tx, err_rx) = mpsc::channel::<AnalysisError>(self.cfg.request_buffer);
        let sink = error_sink::spawn(Arc::clone(&self.failed), err_rx);

        let mut offset = 0i64;
        loop {
            let page = match self.searches.list_page(self.cfg.page_size as i64, offset).await {
                Ok(page) => page,
                Err(err) => {
                    error!(error = %err, "could not list saved searches, aborting crawl pass");
                    break;
                }
            };
            if page.is_empty() {
                break;
            }
            offset += page.len() as i64;

            let mut batch = JoinSet::new();
            for search in page {
                let inner = Arc::clone(self);
                let err_tx = err_tx.clone();
                let token = CancellationToken::new();
                inner.scopes.insert(search.id, token.clone());

                batch.spawn(async move {
                    let search_id = search.id;
                    inner.analyze_search(Arc::new(search), err_tx, token).await;
                    inner.scopes.remove(&search_id);
                });
            }
            while batch.join_next().await.is_some() {}
        }

        drop(err_tx);
        match sink.await {
            Ok(saved) if saved > 0 => info!(saved, "crawl pass queued failures for retry"),
            Ok(_) => {}
            Err(err) => error!(error = %err, "error sink task panicked"),
        }
    }

    /// Crawl one search from its checkpoint forward, feeding vacancies to a
    /// pool of classification workers.
    async fn analyze_search(
        self: &Arc<Self>,
        search: Arc<JobSearch>,
        err_tx: mpsc::Sender<AnalysisError>,
        token: CancellationToken,
    ) {
        let date_from = match search.last_seen_published_at {
            Some(checkpoint) => checkpoint,
            None if search.initial_search_days == 0 => search.created_at,
            None => Utc::now() - chrono::Duration::days(search.initial_search_days),
        };

        let (req_tx, req_rx) = mpsc::channel::<AnalysisRequest>(self.cfg.request_buffer);
        let mut workers = self.spawn_workers(req_rx, err_tx, token.clone());

        let mut checkpoint = None;
        let mut fetch_failed = false;
        let mut cancelled = false;
        let mut page = 0u32;
        loop {
            if token.is_cancelled() {
                cancelled = true;
                break;
            }

            let vacancies = match self
                .retriever
                .fetch_page(&search, date_from, page, self.cfg.page_size)
                .await
            {
                Ok(vacancies) => vacancies,
                Err(err) => {
                    warn!(search_id = search.id, page, error = %err, "vacancy page fetch failed");
                    fetch_failed = true;
                    break;
                }
            };
            if vacancies.is_empty() {
                break;
            }

            // Results come newest first, so the head of the first page is
            // the checkpoint for the next cycle.
            if checkpoint.is_none() {
                checkpoint = vacancies.first().map(|v| v.published_at);
            }

            for vacancy in vacancies {
                let request = AnalysisRequest {
                    search: Arc::clone(&search),
                    vacancy,
                };
                if req_tx.send(request).await.is_err() {
                    break;
                }
            }
            page += 1;
        }

        drop(req_tx);
        while workers.join_next().await.is_some() {}

        // A failed fetch means pages beyond the failure were never seen, and
        // a cancelled crawl is abandoned outright; either way the checkpoint
        // stays put so the next cycle re-covers the window.
        if fetch_failed || cancelled {
            return;
        }
        if let Some(seen_at) = checkpoint {
            if let Err(err) = self.searches.update_checkpoint(search.id, seen_at).await {
                error!(search_id = search.id, error = %err, "could not advance crawl checkpoint");
            }
        }
    }

    fn spawn_workers(
        self: &Arc<Self>,
        req_rx: mpsc::Receiver<AnalysisRequest>,
        err_tx: mpsc::Sender<AnalysisError>,
        token: CancellationToken,
    ) -> JoinSet<()> {
        let req_rx = Arc::new(Mutex::new(req_rx));
        let mut workers = JoinSet::new();
        for _ in 0..self.cfg.workers.max(1) {
            let inner = Arc::clone(self);
            let req_rx = Arc::clone(&req_rx);
            let err_tx = err_tx.clone();
            let token = token.clone();
            workers.spawn(async move {
                loop {
                    let request = { req_rx.lock().await.recv().await };
                    let Some(request) = request else { break };
                    inner.process_request(request, &err_tx, &token).await;
                }
            });
        }
        workers
    }

    /// Dedup-check, classify and notify for one (search, vacancy) pair.
    async fn process_request(
        &self,
        request: AnalysisRequest,
        err_tx: &mpsc::Sender<AnalysisError>,
        token: &CancellationToken,
    ) {
        let search = &request.search;
        let vacancy = &request.vacancy;
        let key = DedupKey::for_description(search.user_id, &vacancy.id, &vacancy.description);

        match self
            .notified
            .is_notified(key.user_id, &key.vacancy_id, &key.description_hash)
            .await
        {
            Ok(true) => {
                counter!("analysis_vacancies_skipped_total").increment(1);
                return;
            }
            Ok(false) => {}
            Err(err) => {
                self.report_failure(err_tx, search.id, &vacancy.id, &err.to_string()).await;
                return;
            }
        }

        let started = Instant::now();
        let verdict = tokio::select! {
            _ = token.cancelled() => return,
            verdict = self.classifier.matches(search, vacancy) => verdict,
        };
        histogram!("analysis_step_duration_seconds", "step" => "ai_analysis")
            .record(started.elapsed().as_secs_f64());

        match verdict {
            Ok(true) => {
                counter!("analysis_vacancies_approved_total").increment(1);
                match self
                    .notified
                    .record(key.user_id, &key.vacancy_id, &key.description_hash)
                    .await
                {
                    Ok(RecordOutcome::Recorded) => {
                        self.bus.publish_found(VacancyFound {
                            search: (**search).clone(),
                            name: vacancy.name.clone(),
                            url: vacancy.url.clone(),
                        });
                    }
                    Ok(RecordOutcome::AlreadyRecorded) => {
                        debug!(vacancy_id = %vacancy.id, "lost the notification race, staying silent");
                    }
                    Err(err) => {
                        self.report_failure(err_tx, search.id, &vacancy.id, &err.to_string()).await;
                        return;
                    }
                }
            }
            Ok(false) => {
                counter!("analysis_vacancies_rejected_total").increment(1);
            }
            Err(err) => {
                counter!("analysis_vacancies_failed_total").increment(1);
                self.report_failure(err_tx, search.id, &vacancy.id, &err.to_string()).await;
                return;
            }
        }

        counter!("analysis_vacancies_handled_total").increment(1);
    }

    async fn report_failure(
        &self,
        err_tx: &mpsc::Sender<AnalysisError>,
        search_id: i64,
        vacancy_id: &str,
        error: &str,
    ) {
        let _ = err_tx
            .send(AnalysisError {
                search_id,
                vacancy_id: vacancy_id.to_string(),
                error: error.to_string(),
            })
            .await;
    }

    /// Re-run everything in the failed queue, then purge what either
    /// succeeded (left stale) or exceeded the attempt ceiling.
    async fn retry_pass(self: &Arc<Self>) {
        let pass_started = Utc::now();

        let items = match self.failed.list_all().await {
            Ok(items) => items,
            Err(err) => {
                error!(error = %err, "could not load failed vacancies, skipping retry pass");
                return;
            }
        };

        if !items.is_empty() {
            info!(count = items.len(), "retrying failed vacancies");

            let (err_tx, err_rx) = mpsc::channel::<AnalysisError>(self.cfg.request_buffer);
            let sink = error_sink::spawn(Arc::clone(&self.failed), err_rx);
            let (req_tx, req_rx) = mpsc::channel::<AnalysisRequest>(self.cfg.request_buffer);
            let mut workers = self.spawn_workers(req_rx, err_tx.clone(), CancellationToken::new());

            // Searches and vacancies repeat across items, so resolve each
            // once per pass. A missing search means it was deleted; its
            // items will be swept by the purge below.
            let mut search_cache: HashMap<i64, Option<Arc<JobSearch>>> = HashMap::new();
            let mut vacancy_cache: HashMap<String, Vacancy> = HashMap::new();
            for item in items {
                let search = match search_cache.get(&item.search_id) {
                    Some(cached) => cached.clone(),
                    None => {
                        let fetched = match self.searches.get(item.search_id).await {
                            Ok(found) => found.map(Arc::new),
                            Err(err) => {
                                error!(search_id = item.search_id, error = %err, "search lookup failed");
                                None
                            }
                        };
                        search_cache.insert(item.search_id, fetched.clone());
                        fetched
                    }
                };
                let Some(search) = search else { continue };

                let vacancy = match vacancy_cache.get(&item.vacancy_id) {
                    Some(cached) => Ok(cached.clone()),
                    None => self.retriever.fetch_by_id(&item.vacancy_id).await,
                };
                match vacancy {
                    Ok(vacancy) => {
                        vacancy_cache.insert(item.vacancy_id.clone(), vacancy.clone());
                        let request = AnalysisRequest { search, vacancy };
                        if req_tx.send(request).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        self.report_failure(&err_tx, item.search_id, &item.vacancy_id, &err.to_string())
                            .await;
                    }
                }
            }

            drop(req_tx);
            drop(err_tx);
            while workers.join_next().await.is_some() {}
            if let Err(err) = sink.await {
                error!(error = %err, "error sink task panicked");
            }
        }

        match self.failed.purge_stale(self.cfg.max_failed_attempts, pass_started).await {
            Ok(purged) if purged > 0 => {
                info!(purged, "purged settled retry items");
            }
            Ok(_) => {}
            Err(err) => error!(error = %err, "failed-vacancies purge failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_is_kept_when_the_cycle_fits() {
        let interval = Duration::from_secs(3 * 60 * 60);
        assert_eq!(extended_interval(interval, Duration::from_secs(60)), None);
        assert_eq!(extended_interval(interval, interval), None);
    }

    #[test]
    fn slow_cycle_extends_the_interval_by_an_hour_of_slack() {
        let interval = Duration::from_secs(3 * 60 * 60);
        let elapsed = Duration::from_secs(4 * 60 * 60);
        assert_eq!(
            extended_interval(interval, elapsed),
            Some(elapsed + Duration::from_secs(3600))
        );
    }
}

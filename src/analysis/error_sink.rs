//! Single-writer sink that drains classification failures from the worker
//! pool into the failed-vacancies queue, so workers never block on the
//! database and upserts for the same pair never race each other.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::model::AnalysisError;
use crate::repo::FailedStore;

/// Drain the channel until every sender is dropped. Returns the number of
/// failures persisted.
pub fn spawn(
    failed: Arc<dyn FailedStore>,
    mut rx: mpsc::Receiver<AnalysisError>,
) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut saved = 0usize;
        while let Some(item) = rx.recv().await {
            match failed.upsert(item.search_id, item.vacancy_id.as_str(), &item.error).await {
                Ok(()) => {
                    saved += 1;
                    info!(
                        search_id = item.search_id,
                        vacancy_id = %item.vacancy_id,
                        "queued vacancy for retry"
                    );
                }
                Err(err) => {
                    // The failure is lost for this cycle; the next crawl will
                    // surface the vacancy again if it still matters.
                    error!(
                        search_id = item.search_id,
                        vacancy_id = %item.vacancy_id,
                        error = %err,
                        "could not persist failed vacancy"
                    );
                }
            }
        }
        saved
    })
}

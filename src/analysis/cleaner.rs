//! Retention sweep for the notified-vacancies ledger.
//!
//! Rows are refreshed every time a crawl sees the same vacancy again, so a
//! row untouched for the retention window belongs to a posting that left
//! the board and can be forgotten.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::repo::NotifiedStore;

const SWEEP_EVERY: Duration = Duration::from_secs(24 * 60 * 60);

pub fn spawn(notified: Arc<dyn NotifiedStore>, retention_days: i64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_EVERY);
        loop {
            ticker.tick().await;
            let cutoff = chrono::Utc::now() - chrono::Duration::days(retention_days);
            match notified.remove_older_than(cutoff).await {
                Ok(removed) => {
                    counter!("notified_ledger_purged_total").increment(removed);
                    if removed > 0 {
                        info!(removed, retention_days, "purged stale notification records");
                    }
                }
                Err(err) => error!(error = %err, "notification ledger sweep failed"),
            }
        }
    })
}

//! In-process event bus decoupling the analysis pipeline from notification
//! delivery and from the search-management front-end.
//!
//! Delivery is at-most-once per subscriber: slow receivers may observe
//! `Lagged` and miss events. The dedup ledger, not the bus, is the system of
//! record for "was this user already notified".

use tokio::sync::broadcast;

use crate::model::JobSearch;

const DEFAULT_CAPACITY: usize = 1024;

/// Published when a vacancy passed both deduplication and AI matching.
#[derive(Debug, Clone)]
pub struct VacancyFound {
    pub search: JobSearch,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchChangeKind {
    Edited,
    Deleted,
}

/// Published by the front-end when a saved search is edited or deleted;
/// consumed by the pipeline to cancel any in-flight analysis for it.
#[derive(Debug, Clone)]
pub struct SearchChanged {
    pub search_id: i64,
    pub kind: SearchChangeKind,
}

#[derive(Clone)]
pub struct EventBus {
    found: broadcast::Sender<VacancyFound>,
    changed: broadcast::Sender<SearchChanged>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (found, _) = broadcast::channel(capacity);
        let (changed, _) = broadcast::channel(capacity);
        Self { found, changed }
    }

    /// Fire-and-forget publish; returns the number of live subscribers.
    pub fn publish_found(&self, event: VacancyFound) -> usize {
        self.found.send(event).unwrap_or(0)
    }

    pub fn publish_changed(&self, event: SearchChanged) -> usize {
        self.changed.send(event).unwrap_or(0)
    }

    pub fn subscribe_found(&self) -> broadcast::Receiver<VacancyFound> {
        self.found.subscribe()
    }

    pub fn subscribe_changed(&self) -> broadcast::Receiver<SearchChanged> {
        self.changed.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

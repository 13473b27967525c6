//! Persistence layer: trait seams for the pipeline plus Postgres
//! implementations as thin `Clone` wrappers around a shared pool.

pub mod failed;
pub mod notified;
pub mod searches;

pub use failed::{FailedStore, PgFailedStore};
pub use notified::{NotifiedStore, PgNotifiedStore, RecordOutcome};
pub use searches::{PgSearchStore, SearchStore};

/// Postgres error code for unique-constraint violations.
pub(crate) const UNIQUE_VIOLATION: &str = "23505";

//! The vacancy analysis pipeline: crawl saved searches, dedup against the
//! notification ledger, classify with the AI backend, retry failures.

pub mod analyzer;
pub mod classifier;
pub mod cleaner;
pub mod dedup;
pub mod error_sink;
pub mod retriever;

pub use analyzer::{Analyzer, AnalyzerConfig};
pub use classifier::{AiMatchClassifier, ClassifyError, MatchClassifier};
pub use dedup::{content_hash, normalize_description, DedupKey};
pub use retriever::{HhRetriever, VacancyRetriever};

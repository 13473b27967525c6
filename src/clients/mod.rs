//! Outbound API clients. Every call acquires its rate-limiter gate before
//! touching the network.

pub mod gemini;
pub mod hh;
pub mod limiter;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("generation api returned status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("empty or non-text response from generation api")]
    MalformedResponse,
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl GenerateError {
    /// 5xx-class failures are worth an in-client retry before giving up.
    pub fn is_transient(&self) -> bool {
        matches!(self, GenerateError::Status { status, .. } if status.is_server_error())
    }
}

/// Contract of the generative-text backend used for match classification.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerateError>;
}

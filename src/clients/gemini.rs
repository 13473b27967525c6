//! Client for the Gemini `generateContent` REST API.
//!
//! The free tier enforces separate per-minute and per-day ceilings, so both
//! limiters gate every call. Server-side 5xx responses get a bounded retry
//! with a fixed delay before the error surfaces to the caller.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::clients::limiter::{self, RateGate};
use crate::clients::{GenerateError, TextGenerator};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<RequestContent>,
}

#[derive(Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    gate: RateGate,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            gate: RateGate::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_minute_rate_limit(mut self, max_requests_per_minute: u32) -> Self {
        self.gate = self.gate.with(limiter::per_minute(max_requests_per_minute));
        self
    }

    pub fn with_day_rate_limit(mut self, max_requests_per_day: u32) -> Self {
        self.gate = self.gate.with(limiter::per_day(max_requests_per_day));
        self
    }

    async fn try_generate(&self, prompt: &str) -> Result<String, GenerateError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let request = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart {
                    text: prompt.to_string(),
                }],
            }],
        };

        let response = self.http.post(url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerateError::Status { status, body });
        }

        let response: GenerateResponse = response.json().await?;
        extract_text(response).ok_or(GenerateError::MalformedResponse)
    }
}

fn extract_text(response: GenerateResponse) -> Option<String> {
    response
        .candidates
        .into_iter()
        .next()?
        .content
        .parts
        .into_iter()
        .next()?
        .text
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerateError> {
        let mut last_error = None;

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                warn!("generation api returned a server error, retrying");
                tokio::time::sleep(RETRY_DELAY).await;
            }

            self.gate.acquire().await;
            match self.try_generate(prompt).await {
                Ok(text) => return Ok(text),
                Err(err) if err.is_transient() => last_error = Some(err),
                Err(err) => return Err(err),
            }
        }

        Err(last_error.unwrap_or(GenerateError::MalformedResponse))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_text_is_extracted_from_first_candidate() {
        let raw = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "да"}], "role": "model"}}
            ]
        }"#;
        let response: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(extract_text(response).as_deref(), Some("да"));
    }

    #[test]
    fn empty_candidates_yield_no_text() {
        let response: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert!(extract_text(response).is_none());
    }

    #[test]
    fn non_text_part_yields_no_text() {
        let raw = r#"{"candidates": [{"content": {"parts": [{}]}}]}"#;
        let response: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert!(extract_text(response).is_none());
    }
}

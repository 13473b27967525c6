use std::time::Duration;

use crate::clients::{gemini, hh};

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub analysis_interval: Duration,
    pub page_size: u32,
    pub workers: usize,
    pub request_buffer: usize,
    pub max_failed_attempts: i32,
    pub notified_retention_days: i64,
    pub hh_base_url: String,
    pub hh_requests_per_second: u32,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_requests_per_minute: u32,
    pub gemini_requests_per_day: u32,
    pub admin_addr: Option<String>,
    pub migrate_on_startup: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL is missing"))?;

        let gemini_api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| anyhow::anyhow!("GEMINI_API_KEY is missing"))?;

        let analysis_interval =
            env_or_fallback("VACWATCH_ANALYSIS_INTERVAL_SECS", "ANALYSIS_INTERVAL_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(3 * 60 * 60));

        let page_size = env_or_fallback("VACWATCH_PAGE_SIZE", "PAGE_SIZE")
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(20)
            .clamp(1, 100);

        let workers = env_or_fallback("VACWATCH_WORKERS", "WORKERS")
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(4)
            .clamp(1, 64);

        let request_buffer = env_or_fallback("VACWATCH_REQUEST_BUFFER", "REQUEST_BUFFER")
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(64)
            .clamp(1, 4096);

        let max_failed_attempts =
            env_or_fallback("VACWATCH_MAX_FAILED_ATTEMPTS", "MAX_FAILED_ATTEMPTS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(3);

        let notified_retention_days =
            env_or_fallback("VACWATCH_NOTIFIED_RETENTION_DAYS", "NOTIFIED_RETENTION_DAYS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);

        let hh_base_url = env_or_fallback("VACWATCH_HH_BASE_URL", "HH_BASE_URL")
            .unwrap_or_else(|| hh::DEFAULT_BASE_URL.to_string());

        let hh_requests_per_second = env_or_fallback("VACWATCH_HH_RPS", "HH_RPS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        let gemini_model = env_or_fallback("VACWATCH_GEMINI_MODEL", "GEMINI_MODEL")
            .unwrap_or_else(|| "gemini-1.5-flash".to_string());

        let gemini_requests_per_minute = env_or_fallback("VACWATCH_GEMINI_RPM", "GEMINI_RPM")
            .and_then(|s| s.parse().ok())
            .unwrap_or(15);

        let gemini_requests_per_day = env_or_fallback("VACWATCH_GEMINI_RPD", "GEMINI_RPD")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1500);

        let admin_addr = env_or_fallback("VACWATCH_ADMIN_ADDR", "ADMIN_ADDR")
            .and_then(|s| normalize_optional_addr(&s));

        let migrate_on_startup = env_bool("VACWATCH_MIGRATE_ON_STARTUP").unwrap_or(true);

        Ok(Self {
            database_url,
            analysis_interval,
            page_size,
            workers,
            request_buffer,
            max_failed_attempts,
            notified_retention_days,
            hh_base_url,
            hh_requests_per_second,
            gemini_api_key,
            gemini_model,
            gemini_requests_per_minute,
            gemini_requests_per_day,
            admin_addr,
            migrate_on_startup,
        })
    }
}

pub fn gemini_base_url_or_default() -> String {
    env_or_fallback("VACWATCH_GEMINI_BASE_URL", "GEMINI_BASE_URL")
        .unwrap_or_else(|| gemini::DEFAULT_BASE_URL.to_string())
}

fn env_or_fallback(primary: &str, fallback: &str) -> Option<String> {
    std::env::var(primary)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| std::env::var(fallback).ok().filter(|s| !s.trim().is_empty()))
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

fn normalize_optional_addr(value: &str) -> Option<String> {
    let v = value.trim();
    if v.is_empty() {
        return None;
    }
    if matches!(v.to_lowercase().as_str(), "0" | "off" | "false" | "none") {
        return None;
    }
    Some(v.to_string())
}

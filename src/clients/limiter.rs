//! Composition helpers over the `governor` rate limiter so independent
//! ceilings (per-minute and per-day, say) gate the same call path.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{Quota, RateLimiter};

pub type DirectLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

pub fn per_second(max_requests: u32) -> Arc<DirectLimiter> {
    let quota = Quota::per_second(nonzero(max_requests));
    Arc::new(RateLimiter::direct(quota))
}

pub fn per_minute(max_requests: u32) -> Arc<DirectLimiter> {
    let quota = Quota::per_minute(nonzero(max_requests));
    Arc::new(RateLimiter::direct(quota))
}

pub fn per_day(max_requests: u32) -> Arc<DirectLimiter> {
    let max_requests = max_requests.max(1);
    let period = Duration::from_secs_f64(86_400.0 / max_requests as f64);
    // Up to an hour's share of the daily ceiling may be spent as a burst,
    // so the limiter paces the day without throttling a short spike the
    // ceiling itself would allow.
    let burst = (max_requests / 24).max(1);
    let quota = Quota::with_period(period)
        .expect("daily quota period must be non-zero")
        .allow_burst(nonzero(burst));
    Arc::new(RateLimiter::direct(quota))
}

fn nonzero(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value.max(1)).expect("clamped to at least 1")
}

/// An ordered set of limiters that must all admit a request before it runs.
/// An empty gate admits everything.
#[derive(Clone, Default)]
pub struct RateGate {
    limiters: Vec<Arc<DirectLimiter>>,
}

impl RateGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, limiter: Arc<DirectLimiter>) -> Self {
        self.limiters.push(limiter);
        self
    }

    pub async fn acquire(&self) {
        for limiter in &self.limiters {
            limiter.until_ready().await;
        }
    }
}

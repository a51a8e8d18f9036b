//! ratelimit.rs — per-source request budget limiter.
//!
//! Two constraints per source: a minimum spacing between call starts
//! (60s / requests_per_minute) and an hourly reservoir
//! (requests_per_hour per rolling window start). `schedule` holds the
//! per-source lock across the wrapped call, so at most one request per
//! source is in flight and queued callers inherit the delays in order.
//!
//! The registry hands out one limiter per source, created lazily and
//! injected into adapters at construction; nothing here is process-global.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::config::{RateLimitConfig, SourceBudget};
use crate::types::SourceId;

const HOUR: Duration = Duration::from_secs(3600);

#[derive(Debug)]
pub struct RateLimiter {
    budget: SourceBudget,
    min_gap: Duration,
    state: Mutex<LimiterState>,
}

#[derive(Debug, Default)]
struct LimiterState {
    last_start: Option<Instant>,
    window_start: Option<Instant>,
    window_count: u32,
}

impl RateLimiter {
    pub fn new(budget: SourceBudget) -> Self {
        let rpm = budget.requests_per_minute.max(1);
        Self {
            budget,
            min_gap: Duration::from_secs_f64(60.0 / f64::from(rpm)),
            state: Mutex::new(LimiterState::default()),
        }
    }

    pub fn budget(&self) -> SourceBudget {
        self.budget
    }

    /// Run `op` once the budget allows it. Delays, never rejects; the
    /// wrapped operation's own result (including errors) passes through
    /// untouched.
    pub async fn schedule<T, F, Fut>(&self, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut st = self.state.lock().await;

        // hourly reservoir: wait out the window when exhausted
        let now = Instant::now();
        match st.window_start {
            Some(start) if now.duration_since(start) < HOUR => {
                if st.window_count >= self.budget.requests_per_hour {
                    let wait = HOUR - now.duration_since(start);
                    tracing::warn!(wait_secs = wait.as_secs(), "hourly request budget exhausted");
                    sleep(wait).await;
                    st.window_start = Some(Instant::now());
                    st.window_count = 0;
                }
            }
            _ => {
                st.window_start = Some(now);
                st.window_count = 0;
            }
        }

        // minimum spacing between call starts
        if let Some(last) = st.last_start {
            let since = Instant::now().duration_since(last);
            if since < self.min_gap {
                sleep(self.min_gap - since).await;
            }
        }

        st.last_start = Some(Instant::now());
        st.window_count += 1;

        op().await
    }
}

/// Lazy per-source limiter cache; owns nothing but the mapping.
#[derive(Debug)]
pub struct RateLimiterRegistry {
    cfg: RateLimitConfig,
    limiters: std::sync::Mutex<HashMap<SourceId, Arc<RateLimiter>>>,
}

impl RateLimiterRegistry {
    pub fn new(cfg: RateLimitConfig) -> Self {
        Self {
            cfg,
            limiters: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// The limiter for `source`, created on first use and shared afterwards.
    pub fn for_source(&self, source: SourceId) -> Arc<RateLimiter> {
        let mut map = self.limiters.lock().expect("limiter registry mutex poisoned");
        map.entry(source)
            .or_insert_with(|| Arc::new(RateLimiter::new(self.cfg.budget_for(source))))
            .clone()
    }
}

//! Per-IP token buckets.
//!
//! Capacity comes from the matched route's metadata; refill is one token
//! per whole elapsed minute, capped at capacity. A background task evicts
//! buckets that have been idle for more than five minutes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;

use crate::error::error_response;
use crate::middleware::client_ip;
use crate::routes::{DEFAULT_META, route_meta};
use crate::state::AppState;

const IDLE_EVICTION: Duration = Duration::from_secs(5 * 60);
const REAPER_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    last_refill: Instant,
    last_seen: Instant,
}

/// `ip → bucket`, guarded by one lock held only for bucket arithmetic.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn try_acquire(&self, key: &str, capacity: u32) -> bool {
        self.try_acquire_at(key, capacity, Instant::now())
    }

    fn try_acquire_at(&self, key: &str, capacity: u32, now: Instant) -> bool {
        let mut buckets = self.buckets.lock().expect("rate limiter lock poisoned");
        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            tokens: capacity,
            last_refill: now,
            last_seen: now,
        });

        // Whole minutes only: a burst past capacity stays rejected until a
        // full minute has elapsed.
        let minutes = now.duration_since(bucket.last_refill).as_secs() / 60;
        if minutes > 0 {
            bucket.tokens = bucket.tokens.saturating_add(minutes as u32).min(capacity);
            bucket.last_refill += Duration::from_secs(minutes * 60);
        }
        bucket.last_seen = now;

        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            true
        } else {
            false
        }
    }

    pub fn evict_idle(&self) {
        self.evict_idle_at(Instant::now());
    }

    fn evict_idle_at(&self, now: Instant) {
        let mut buckets = self.buckets.lock().expect("rate limiter lock poisoned");
        buckets.retain(|_, bucket| now.duration_since(bucket.last_seen) <= IDLE_EVICTION);
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().expect("rate limiter lock poisoned").len()
    }
}

/// Periodically drop idle buckets.
pub fn spawn_reaper(limiter: Arc<RateLimiter>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(REAPER_INTERVAL).await;
            limiter.evict_idle();
            debug!("rate limiter holds {} buckets", limiter.bucket_count());
        }
    })
}

pub async fn enforce(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let limit = route_meta(req.method().as_str(), req.uri().path())
        .map_or(DEFAULT_META.rate_limit, |meta| meta.rate_limit);
    if limit == 0 {
        return next.run(req).await;
    }
    let ip = client_ip(&req);
    if state.rate_limiter.try_acquire(&ip, limit) {
        next.run(req).await
    } else {
        error_response(
            StatusCode::TOO_MANY_REQUESTS,
            "rate limit exceeded, try again in a minute",
        )
    }
}

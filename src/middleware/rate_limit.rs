//! Rate limiting middleware.
//!
//! In-memory fixed-window counter per client address. Bursts straddling a
//! window boundary can briefly exceed the nominal rate.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Configuration for rate limiting.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Maximum requests per window.
    pub max_requests: u32,
    /// Window duration.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 3,
            window: Duration::from_secs(120),
        }
    }
}

/// Shared limiter handle; clones see the same counters.
#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Arc<Mutex<HashMap<String, RateWindow>>>,
}

struct RateWindow {
    window_start: Instant,
    count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed { .. })
    }
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    pub fn is_allowed(&self, client_id: &str) -> bool {
        self.check_at(client_id, Instant::now()).is_allowed()
    }

    /// Count one request from `client_id` arriving at `now`.
    pub fn check_at(&self, client_id: &str, now: Instant) -> RateLimitDecision {
        let mut state = self.state.lock();

        let Some(entry) = state.get_mut(client_id) else {
            state.insert(
                client_id.to_string(),
                RateWindow {
                    window_start: now,
                    count: 1,
                },
            );
            return RateLimitDecision::Allowed {
                remaining: self.config.max_requests.saturating_sub(1),
            };
        };

        let elapsed = now.saturating_duration_since(entry.window_start);
        if elapsed > self.config.window {
            entry.window_start = now;
            entry.count = 1;
            return RateLimitDecision::Allowed {
                remaining: self.config.max_requests.saturating_sub(1),
            };
        }

        if entry.count < self.config.max_requests {
            entry.count += 1;
            return RateLimitDecision::Allowed {
                remaining: self.config.max_requests - entry.count,
            };
        }

        RateLimitDecision::Limited {
            retry_after: self.config.window - elapsed,
        }
    }

    /// Drop windows idle for more than two window lengths.
    pub fn prune(&self, now: Instant) -> usize {
        let mut state = self.state.lock();
        let before = state.len();
        let horizon = self.config.window * 2;
        state.retain(|_, entry| now.saturating_duration_since(entry.window_start) < horizon);
        before - state.len()
    }

    /// Number of tracked clients.
    pub fn len(&self) -> usize {
        self.state.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Periodically drop idle client windows, once per window length.
pub fn spawn_pruner(limiter: RateLimiter) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(limiter.config.window);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let removed = limiter.prune(Instant::now());
            if removed > 0 {
                debug!(removed, tracked = limiter.len(), "🧹 Pruned idle rate limit windows");
            }
        }
    })
}

/// Client identifier: the peer IP when the server exposes connect info.
pub fn client_id(request: &Request<Body>) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Rate limiting middleware function.
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client = client_id(&request);

    match limiter.check_at(&client, Instant::now()) {
        RateLimitDecision::Allowed { remaining } => {
            debug!(client = %client, remaining, "Rate limit check passed");
            next.run(request).await
        }
        RateLimitDecision::Limited { retry_after } => {
            // Round up so clients never retry early
            let retry_secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            warn!(
                client = %client,
                path = %request.uri().path(),
                retry_after_secs = retry_secs,
                "Rate limit exceeded"
            );

            let body = serde_json::json!({
                "error": "rate_limited",
                "message": "Too Many Requests",
                "retry_after_seconds": retry_secs,
            });

            (
                StatusCode::TOO_MANY_REQUESTS,
                [("Retry-After", retry_secs.to_string())],
                axum::Json(body),
            )
                .into_response()
        }
    }
}

//! Per-IP request throttling for the store API
//!
//! Fixed windows: each source address may issue `max_requests` within one
//! `window`; the counter resets when the window that started with its first
//! request has elapsed.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Body returned with a 429
pub const RATE_LIMIT_MESSAGE: &str = "Too many requests. Try again later.";

/// Configuration for rate limiting
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests allowed per source within one window (0 = unlimited)
    pub max_requests: u32,
    /// Window length
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
        }
    }
}

/// Rate limiter result for requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestResult {
    /// Request allowed
    Allowed,
    /// Rate limited
    RateLimited,
}

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

/// Thread-safe per-IP fixed-window limiter
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<IpAddr, Window>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Count a request from `ip` and decide whether it may proceed
    pub fn check_request(&self, ip: IpAddr) -> RequestResult {
        if self.config.max_requests == 0 {
            return RequestResult::Allowed;
        }

        let now = Instant::now();
        let mut windows = self.windows.lock();
        let window = windows.entry(ip).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.duration_since(window.started) >= self.config.window {
            window.started = now;
            window.count = 0;
        }

        if window.count >= self.config.max_requests {
            debug!(ip = %ip, "Rate limited request");
            metrics::counter!("storefront_rate_limited_requests_total").increment(1);
            return RequestResult::RateLimited;
        }
        window.count += 1;
        RequestResult::Allowed
    }

    /// Drop windows that have fully elapsed
    pub fn cleanup_stale(&self) {
        let now = Instant::now();
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|_, w| now.duration_since(w.started) < self.config.window);
        let removed = before - windows.len();
        if removed > 0 {
            debug!(removed, "Cleaned up stale rate limit windows");
        }
    }

    /// Number of sources currently tracked
    pub fn tracked_sources(&self) -> usize {
        self.windows.lock().len()
    }
}

/// axum middleware applying the limiter to the peer address
///
/// Requests without connection info (e.g. in-process calls) share one
/// bucket.
pub async fn throttle(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    match limiter.check_request(ip) {
        RequestResult::Allowed => next.run(request).await,
        RequestResult::RateLimited => {
            warn!(ip = %ip, path = %request.uri().path(), "Request rejected by rate limiter");
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({ "error": RATE_LIMIT_MESSAGE })),
            )
                .into_response()
        }
    }
}

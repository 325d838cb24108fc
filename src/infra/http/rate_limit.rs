//! Fixed-window request limiting and the request gate middleware.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderValue, Method, Request};
use axum::middleware::Next;
use axum::response::Response;
use dashmap::DashMap;
use metrics::counter;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::config::{RateLimitSettings, WindowSettings};

use super::error::ApiError;

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";

const REJECTED_TOTAL: &str = "portfolio_rate_limit_rejected_total";
const DEFAULT_CLASS: &str = "default";
const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    pub window: Duration,
    pub limit: u32,
}

impl RatePolicy {
    pub fn new(window: Duration, limit: u32) -> Self {
        Self { window, limit }
    }

    pub fn per_seconds(limit: u32, window_seconds: u64) -> Self {
        Self::new(Duration::from_secs(window_seconds), limit)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("rate limit window must be longer than zero")]
    ZeroWindow,
    #[error("rate limit must allow at least one request")]
    ZeroLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed {
        limit: u32,
        remaining: u32,
        reset_after: Duration,
    },
    Rejected {
        limit: u32,
        retry_after: Duration,
    },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

#[derive(Debug)]
struct Window {
    count: u32,
    reset_at: Instant,
}

/// Per-key fixed-window counters.
///
/// A window opens on the first request for a key and lasts `policy.window`;
/// a request at or after `reset_at` starts a fresh window.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&self, key: &str, policy: RatePolicy) -> Result<RateDecision, RateLimitError> {
        self.check_at(key, policy, Instant::now())
    }

    pub fn check_at(
        &self,
        key: &str,
        policy: RatePolicy,
        now: Instant,
    ) -> Result<RateDecision, RateLimitError> {
        if policy.window.is_zero() {
            return Err(RateLimitError::ZeroWindow);
        }
        if policy.limit == 0 {
            return Err(RateLimitError::ZeroLimit);
        }

        // the entry guard holds the shard lock for the whole read-modify-write
        let mut window = self.windows.entry(key.to_string()).or_insert_with(|| Window {
            count: 0,
            reset_at: now + policy.window,
        });
        if now >= window.reset_at {
            window.count = 0;
            window.reset_at = now + policy.window;
        }
        window.count = window.count.saturating_add(1);

        let reset_after = window.reset_at.saturating_duration_since(now);
        if window.count > policy.limit {
            return Ok(RateDecision::Rejected {
                limit: policy.limit,
                retry_after: reset_after,
            });
        }

        Ok(RateDecision::Allowed {
            limit: policy.limit,
            remaining: policy.limit - window.count,
            reset_after,
        })
    }

    /// Drop windows that have already reset. Returns how many were removed.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, window| window.reset_at > now);
        before.saturating_sub(self.windows.len())
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    #[cfg(test)]
    fn count(&self, key: &str) -> Option<u32> {
        self.windows.get(key).map(|window| window.count)
    }
}

/// Periodically remove expired windows until the returned task is aborted.
pub fn spawn_sweeper(limiter: Arc<RateLimiter>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let removed = limiter.sweep_at(Instant::now());
            if removed > 0 {
                debug!(
                    target = "portfolio::http::rate_limit",
                    removed,
                    remaining = limiter.len(),
                    "swept expired rate-limit windows"
                );
            }
        }
    })
}

#[derive(Debug, Clone)]
struct RouteRule {
    prefix: String,
    methods: Vec<Method>,
    policy: RatePolicy,
}

impl RouteRule {
    fn matches(&self, method: &Method, path: &str) -> bool {
        let path_matches = path == self.prefix
            || path
                .strip_prefix(self.prefix.as_str())
                .is_some_and(|rest| rest.starts_with('/'));
        path_matches && (self.methods.is_empty() || self.methods.contains(method))
    }
}

/// Route-prefix → policy table with a fallback for everything else.
#[derive(Debug, Clone)]
pub struct RouteRateLimits {
    rules: Vec<RouteRule>,
    default: RatePolicy,
}

impl RouteRateLimits {
    pub fn new(default: RatePolicy) -> Self {
        Self {
            rules: Vec::new(),
            default,
        }
    }

    /// Add a prefix rule for every method. The longest matching prefix wins.
    pub fn route(self, prefix: impl Into<String>, policy: RatePolicy) -> Self {
        self.route_methods(prefix, Vec::new(), policy)
    }

    /// Add a prefix rule that only applies to `methods`.
    pub fn route_methods(
        mut self,
        prefix: impl Into<String>,
        methods: Vec<Method>,
        policy: RatePolicy,
    ) -> Self {
        let prefix = prefix.into().trim_end_matches('/').to_string();
        self.rules
            .retain(|rule| rule.prefix != prefix || rule.methods != methods);
        self.rules.push(RouteRule {
            prefix,
            methods,
            policy,
        });
        self.rules.sort_by(|a, b| {
            b.prefix
                .len()
                .cmp(&a.prefix.len())
                .then_with(|| b.methods.len().cmp(&a.methods.len()))
        });
        self
    }

    /// Route class and policy for a request.
    pub fn resolve<'a>(&'a self, method: &Method, path: &str) -> (&'a str, RatePolicy) {
        self.rules
            .iter()
            .find(|rule| rule.matches(method, path))
            .map(|rule| (rule.prefix.as_str(), rule.policy))
            .unwrap_or((DEFAULT_CLASS, self.default))
    }
}

impl From<&RateLimitSettings> for RouteRateLimits {
    fn from(settings: &RateLimitSettings) -> Self {
        let policy = |window: &WindowSettings| {
            RatePolicy::per_seconds(
                window.max_requests.get(),
                u64::from(window.window_seconds.get()),
            )
        };
        settings
            .routes
            .iter()
            .fold(Self::new(policy(&settings.default)), |table, route| {
                table.route_methods(
                    route.prefix.clone(),
                    route.methods.clone(),
                    policy(&route.window),
                )
            })
    }
}

/// State of the request gate middleware.
#[derive(Debug, Clone)]
pub struct RequestGate {
    pub limiter: Arc<RateLimiter>,
    pub routes: Arc<RouteRateLimits>,
    /// Key clients by `X-Forwarded-For`/`X-Real-IP`. Only safe behind a proxy
    /// that overwrites those headers; otherwise the socket peer is used.
    pub trust_forwarded_headers: bool,
}

impl RequestGate {
    pub fn new(limiter: Arc<RateLimiter>, routes: RouteRateLimits) -> Self {
        Self {
            limiter,
            routes: Arc::new(routes),
            trust_forwarded_headers: false,
        }
    }

    pub fn trust_forwarded_headers(mut self, trust: bool) -> Self {
        self.trust_forwarded_headers = trust;
        self
    }
}

/// Count the request against its route's window; reject with 429 once the
/// window is used up, otherwise stamp the remaining budget on the response.
pub async fn rate_limit(
    State(gate): State<RequestGate>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let (class, policy) = gate.routes.resolve(request.method(), request.uri().path());
    let class = class.to_string();
    let client = client_identity(&request, gate.trust_forwarded_headers);
    let key = format!("{class}|{client}");

    let decision = match gate.limiter.check(&key, policy) {
        Ok(decision) => decision,
        Err(err) => {
            warn!(
                target = "portfolio::http::rate_limit",
                route = %class,
                error = %err,
                "rate limiter misconfigured; allowing request"
            );
            return next.run(request).await;
        }
    };

    match decision {
        RateDecision::Rejected { limit, retry_after } => {
            let retry_after = ceil_secs(retry_after);
            counter!(REJECTED_TOTAL, "route" => class.clone()).increment(1);
            warn!(
                target = "portfolio::http::rate_limit",
                route = %class,
                client = %client,
                retry_after,
                "rate limit exceeded"
            );
            let mut response = ApiError::rate_limited(retry_after);
            stamp(response.headers_mut(), limit, 0, retry_after);
            response
        }
        RateDecision::Allowed {
            limit,
            remaining,
            reset_after,
        } => {
            let mut response = next.run(request).await;
            stamp(response.headers_mut(), limit, remaining, ceil_secs(reset_after));
            response
        }
    }
}

fn stamp(headers: &mut HeaderMap, limit: u32, remaining: u32, reset_secs: u64) {
    headers.insert(HEADER_LIMIT, HeaderValue::from(limit));
    headers.insert(HEADER_REMAINING, HeaderValue::from(remaining));
    headers.insert(HEADER_RESET, HeaderValue::from(reset_secs));
}

/// Whole seconds, rounded up, never below one.
fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
    secs.max(1)
}

/// Client address. With `trust_forwarded` the first `X-Forwarded-For` hop,
/// then `X-Real-IP`, are preferred; the socket peer is the fallback.
pub fn client_identity<B>(request: &Request<B>, trust_forwarded: bool) -> String {
    if trust_forwarded && let Some(ip) = forwarded_client(request.headers()) {
        return ip;
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

fn forwarded_client(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(ip) = forwarded {
        return Some(ip.to_string());
    }

    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

//! Fixed-window rate limiting.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::{AuthError, Guard, GuardDecision, RequestMeta};

/// Rate limit settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per window and caller.
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

fn default_max_requests() -> u32 {
    60
}

fn default_window_secs() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

#[derive(Debug, Default)]
struct Buckets {
    windows: HashMap<String, Window>,
    last_prune: Option<Instant>,
}

/// Counts requests per caller in fixed windows.
///
/// Callers are keyed by API key when one is sent, otherwise by user id.
/// Anonymous callers without a key share one bucket. Expired windows are
/// swept at most once per window length, so the map holds only callers seen
/// in roughly the last two windows.
#[derive(Debug)]
pub struct RateLimit {
    max_requests: u32,
    window: Duration,
    buckets: Mutex<Buckets>,
}

impl RateLimit {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            buckets: Mutex::new(Buckets::default()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, Duration::from_secs(config.window_secs))
    }

    fn key(meta: &RequestMeta) -> String {
        match (&meta.api_key, meta.principal.user_id()) {
            (Some(key), _) => format!("key:{key}"),
            (None, Some(user)) => format!("user:{user}"),
            (None, None) => "anonymous".to_string(),
        }
    }

    /// Count one request at `now`.
    pub fn check_at(&self, meta: &RequestMeta, now: Instant) -> GuardDecision {
        let key = Self::key(meta);
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let due = buckets
            .last_prune
            .map_or(true, |at| now.saturating_duration_since(at) >= self.window);
        if due {
            self.sweep(&mut buckets, now);
        }

        let window = buckets.windows.entry(key).or_insert(Window { started: now, count: 0 });
        if now.duration_since(window.started) >= self.window {
            *window = Window { started: now, count: 0 };
        }
        if window.count >= self.max_requests {
            let elapsed = now.duration_since(window.started);
            let retry_after_secs = self.window.saturating_sub(elapsed).as_secs().max(1);
            return AuthError::RateLimited { retry_after_secs }.into();
        }
        window.count += 1;
        GuardDecision::Allow
    }

    /// Drop windows that have expired.
    pub fn prune(&self, now: Instant) {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        self.sweep(&mut buckets, now);
    }

    /// Number of callers currently tracked.
    pub fn tracked(&self) -> usize {
        self.buckets.lock().unwrap_or_else(|e| e.into_inner()).windows.len()
    }

    fn sweep(&self, buckets: &mut Buckets, now: Instant) {
        buckets
            .windows
            .retain(|_, w| now.saturating_duration_since(w.started) < self.window);
        buckets.last_prune = Some(now);
    }
}

impl Guard for RateLimit {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn check(&self, meta: &RequestMeta) -> GuardDecision {
        self.check_at(meta, Instant::now())
    }
}

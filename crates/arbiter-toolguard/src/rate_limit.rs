//! Per-scope rate limiting, stage 1 of the tool guard pipeline.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Where a rate-limit bucket is scoped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Limited per session.
    Session,
    /// Limited per agent.
    Agent,
    /// Limited across the whole process.
    Global,
}

impl Scope {
    fn key(&self, scope_id: &str, tool_name: &str) -> (u8, String, String) {
        let tag = match self {
            Scope::Session => 0,
            Scope::Agent => 1,
            Scope::Global => 2,
        };
        (tag, scope_id.to_string(), tool_name.to_string())
    }
}

/// Configuration for a rate-limit bucket.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Maximum calls allowed within `window_ms`.
    pub max_calls: usize,
    /// Width of the rolling window, in milliseconds.
    pub window_ms: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls: 60,
            window_ms: 60_000,
        }
    }
}

/// Tracks call timestamps per `(scope, scope_id, tool_name)` bucket.
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<(u8, String, String), VecDeque<i64>>>,
}

impl RateLimiter {
    /// Construct a limiter with the given config.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Check and record a call. Returns `true` if under the limit (and
    /// records the timestamp), `false` if the bucket is already full.
    pub fn check_and_record(&self, scope: Scope, scope_id: &str, tool_name: &str, now: i64) -> bool {
        let key = scope.key(scope_id, tool_name);
        let mut guard = self.buckets.lock().expect("rate limiter mutex poisoned");
        let bucket = guard.entry(key).or_default();
        while let Some(&front) = bucket.front() {
            if now - front >= self.config.window_ms {
                bucket.pop_front();
            } else {
                break;
            }
        }
        if bucket.len() >= self.config.max_calls {
            return false;
        }
        bucket.push_back(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_calls_under_the_limit() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_calls: 2,
            window_ms: 1000,
        });
        assert!(limiter.check_and_record(Scope::Session, "s1", "bash", 0));
        assert!(limiter.check_and_record(Scope::Session, "s1", "bash", 10));
        assert!(!limiter.check_and_record(Scope::Session, "s1", "bash", 20));
    }

    #[test]
    fn window_slides_and_frees_capacity() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_calls: 1,
            window_ms: 100,
        });
        assert!(limiter.check_and_record(Scope::Agent, "a1", "bash", 0));
        assert!(!limiter.check_and_record(Scope::Agent, "a1", "bash", 50));
        assert!(limiter.check_and_record(Scope::Agent, "a1", "bash", 200));
    }

    #[test]
    fn scopes_and_tools_are_independent_buckets() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_calls: 1,
            window_ms: 1000,
        });
        assert!(limiter.check_and_record(Scope::Session, "s1", "bash", 0));
        assert!(limiter.check_and_record(Scope::Agent, "s1", "bash", 0));
        assert!(limiter.check_and_record(Scope::Session, "s1", "curl", 0));
    }
}

/// Per-user rate limiting for authenticated routes
///
/// Token bucket held in process memory, one bucket per user id in a sharded
/// `DashMap`, so concurrent users rarely contend on the same lock:
/// - tokens refill at `requests_per_minute / 60` per second
/// - each request consumes 1 token
/// - the bucket holds at most `requests_per_minute` tokens (burst size)
///
/// Runs after JWT authentication, so the caller's `AuthContext` is available.
///
/// # Headers
///
/// - `X-RateLimit-Limit`: requests allowed per minute
/// - `X-RateLimit-Remaining`: whole tokens left
/// - `X-RateLimit-Reset`: seconds until the bucket is full again
/// - `Retry-After`: seconds to wait (429 responses only)

use crate::app::AppState;
use crate::error::ApiError;
use axum::{
    extract::{Extension, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use foodbridge_shared::auth::middleware::AuthContext;
use std::time::Instant;
use uuid::Uuid;

/// Buckets are pruned once the map grows past this many users
const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn full(capacity: u32, now: Instant) -> Self {
        TokenBucket {
            tokens: capacity as f64,
            last_refill: now,
        }
    }

    fn refill(&mut self, rate: f64, capacity: u32, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(capacity as f64);
        self.last_refill = now;
    }

    fn try_consume(&mut self) -> bool {
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn seconds_until(&self, target: f64, rate: f64) -> u64 {
        let deficit = target - self.tokens;
        if deficit <= 0.0 {
            0
        } else {
            (deficit / rate).ceil() as u64
        }
    }
}

/// Outcome of one rate limit check
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,

    /// Seconds until the bucket is full
    pub reset_after: u64,

    /// Seconds until one token is available; 0 when allowed
    pub retry_after: u64,
}

impl RateLimitDecision {
    fn write_headers(&self, headers: &mut HeaderMap) {
        headers.insert("X-RateLimit-Limit", HeaderValue::from(self.limit));
        headers.insert("X-RateLimit-Remaining", HeaderValue::from(self.remaining));
        headers.insert("X-RateLimit-Reset", HeaderValue::from(self.reset_after));
    }
}

/// Shared limiter state, one per process
#[derive(Debug)]
pub struct RateLimiter {
    capacity: u32,
    refill_rate: f64,
    buckets: DashMap<Uuid, TokenBucket>,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        let capacity = requests_per_minute.max(1);
        Self {
            capacity,
            refill_rate: capacity as f64 / 60.0,
            buckets: DashMap::new(),
        }
    }

    pub fn check(&self, user_id: Uuid) -> RateLimitDecision {
        self.check_at(user_id, Instant::now())
    }

    fn check_at(&self, user_id: Uuid, now: Instant) -> RateLimitDecision {
        if self.buckets.len() > PRUNE_THRESHOLD {
            let (rate, capacity) = (self.refill_rate, self.capacity);
            // Full buckets carry no state worth keeping
            self.buckets.retain(|_, bucket| {
                let mut refilled = *bucket;
                refilled.refill(rate, capacity, now);
                refilled.tokens < capacity as f64
            });
        }

        // The entry guard holds this user's shard until the decision is built
        let mut bucket = self
            .buckets
            .entry(user_id)
            .or_insert_with(|| TokenBucket::full(self.capacity, now));
        bucket.refill(self.refill_rate, self.capacity, now);
        let allowed = bucket.try_consume();

        RateLimitDecision {
            allowed,
            limit: self.capacity,
            remaining: bucket.tokens.floor() as u32,
            reset_after: bucket.seconds_until(self.capacity as f64, self.refill_rate),
            retry_after: if allowed {
                0
            } else {
                bucket.seconds_until(1.0, self.refill_rate).max(1)
            },
        }
    }
}

/// Rate limiting middleware
///
/// # Errors
///
/// - 429 Too Many Requests when the caller's bucket is empty
pub async fn rate_limit_layer(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let decision = state.rate_limiter.check(auth.user_id);

    if !decision.allowed {
        tracing::warn!(user_id = %auth.user_id, retry_after = decision.retry_after, "Rate limit exceeded");
        return Err(ApiError::RateLimitExceeded {
            retry_after: decision.retry_after,
            message: format!(
                "Rate limit exceeded. Try again in {} seconds",
                decision.retry_after
            ),
        });
    }

    let mut response = next.run(request).await;
    decision.write_headers(response.headers_mut());

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_bucket_refill_and_cap() {
        let start = Instant::now();
        let mut bucket = TokenBucket {
            tokens: 5.0,
            last_refill: start,
        };

        bucket.refill(1.0, 100, start + Duration::from_secs(10));
        assert!((bucket.tokens - 15.0).abs() < 1e-9);

        bucket.refill(1.0, 100, start + Duration::from_secs(1000));
        assert_eq!(bucket.tokens, 100.0);
    }

    #[test]
    fn test_bucket_consume() {
        let mut bucket = TokenBucket::full(2, Instant::now());
        assert!(bucket.try_consume());
        assert!(bucket.try_consume());
        assert!(!bucket.try_consume());
        assert_eq!(bucket.tokens, 0.0);
    }

    #[test]
    fn test_seconds_until() {
        let bucket = TokenBucket {
            tokens: 2.0,
            last_refill: Instant::now(),
        };
        assert_eq!(bucket.seconds_until(5.0, 1.0), 3);
        assert_eq!(bucket.seconds_until(1.0, 1.0), 0);
    }

    #[test]
    fn test_limiter_blocks_after_burst() {
        let limiter = RateLimiter::new(3);
        let user = Uuid::new_v4();
        let now = Instant::now();

        for expected_remaining in [2, 1, 0] {
            let decision = limiter.check_at(user, now);
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
            assert_eq!(decision.limit, 3);
        }

        let blocked = limiter.check_at(user, now);
        assert!(!blocked.allowed);
        // 3 per minute refills one token every 20 seconds
        assert_eq!(blocked.retry_after, 20);

        let later = limiter.check_at(user, now + Duration::from_secs(20));
        assert!(later.allowed);
    }

    #[test]
    fn test_limiter_is_per_user() {
        let limiter = RateLimiter::new(1);
        let now = Instant::now();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        assert!(limiter.check_at(a, now).allowed);
        assert!(!limiter.check_at(a, now).allowed);
        assert!(limiter.check_at(b, now).allowed);
    }

    #[test]
    fn test_concurrent_checks_never_overspend() {
        let limiter = RateLimiter::new(50);
        let user = Uuid::new_v4();
        let now = Instant::now();

        let allowed: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        (0..10)
                            .filter(|_| limiter.check_at(user, now).allowed)
                            .count()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(allowed, 50);
    }

    #[test]
    fn test_full_buckets_are_pruned() {
        let limiter = RateLimiter::new(10);
        let start = Instant::now();
        for _ in 0..=PRUNE_THRESHOLD {
            limiter.check_at(Uuid::new_v4(), start);
        }
        assert!(limiter.buckets.len() > PRUNE_THRESHOLD);

        // A minute later every bucket is full again and gets dropped
        limiter.check_at(Uuid::new_v4(), start + Duration::from_secs(60));
        assert_eq!(limiter.buckets.len(), 1);
    }

    #[test]
    fn test_headers_written() {
        let decision = RateLimiter::new(60).check(Uuid::new_v4());
        let mut headers = HeaderMap::new();
        decision.write_headers(&mut headers);

        assert_eq!(headers.get("X-RateLimit-Limit").unwrap(), "60");
        assert_eq!(headers.get("X-RateLimit-Remaining").unwrap(), "59");
        assert_eq!(headers.get("X-RateLimit-Reset").unwrap(), "1");
    }
}

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::auth::CurrentUser;
use crate::config::RateLimitConfig;
use crate::error::app_error::AppError;
use async_trait::async_trait;
use rocket::http::Status;
use rocket::outcome::try_outcome;
use rocket::request::{FromRequest, Outcome, Request};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::{RefOr, Response as OpenApiResponse, Responses};
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use tokio::sync::Mutex;
use tracing::warn;

/// The memory store sweeps expired windows whenever it holds more keys than
/// this. A soft bound, not a hard cap.
const SWEEP_THRESHOLD: usize = 100;

/// Admission counter backend. The in-memory store bounds abuse per process
/// instance only; deployments that need a global limit configure the Redis
/// store instead, making the limiter's scope a configuration choice.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Fixed-window check: the first request for a key (or the first after
    /// its window elapsed) opens a window with count 1 and is allowed;
    /// requests within the window are blocked once the count exceeds
    /// `max_requests`. Near a window boundary up to `2 * max_requests` can
    /// land in a short span; that imprecision is accepted.
    async fn is_rate_limited(&self, key: &str, max_requests: u32, window: Duration) -> Result<bool, AppError>;
}

#[derive(Debug)]
struct Counter {
    count: u32,
    reset_at: Instant,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    counters: Mutex<HashMap<String, Counter>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn is_rate_limited(&self, key: &str, max_requests: u32, window: Duration) -> Result<bool, AppError> {
        let now = Instant::now();
        let mut counters = self.counters.lock().await;

        if counters.len() > SWEEP_THRESHOLD {
            counters.retain(|_, counter| counter.reset_at > now);
        }

        match counters.get_mut(key) {
            Some(counter) if counter.reset_at > now => {
                counter.count += 1;
                Ok(counter.count > max_requests)
            }
            _ => {
                counters.insert(
                    key.to_string(),
                    Counter {
                        count: 1,
                        reset_at: now + window,
                    },
                );
                Ok(false)
            }
        }
    }
}

/// Shared fixed-window counter in Redis: INCR the key, set its expiry when the
/// window opens. A Redis failure fails open; admission control must not take
/// the API down with it.
pub struct RedisStore {
    conn: redis::aio::ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl RateLimitStore for RedisStore {
    async fn is_rate_limited(&self, key: &str, max_requests: u32, window: Duration) -> Result<bool, AppError> {
        let mut conn = self.conn.clone();

        let result = async {
            let count: i64 = redis::cmd("INCR").arg(key).query_async(&mut conn).await?;
            if count == 1 {
                let () = redis::cmd("PEXPIRE")
                    .arg(key)
                    .arg(window.as_millis() as i64)
                    .query_async(&mut conn)
                    .await?;
            }
            Ok::<i64, redis::RedisError>(count)
        }
        .await;

        match result {
            Ok(count) => Ok(count > i64::from(max_requests)),
            Err(e) => {
                warn!(error = %e, key = %key, "redis rate limit check failed, allowing request");
                Ok(false)
            }
        }
    }
}

/// Buckets keyed per user: general AI calls and sandbox executions carry
/// separate budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RateLimitBucket {
    Ai,
    Execute,
}

impl RateLimitBucket {
    fn key(self, user_id: &str) -> String {
        match self {
            RateLimitBucket::Ai => format!("ai:{user_id}"),
            RateLimitBucket::Execute => format!("execute:{user_id}"),
        }
    }
}

pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.config.window_seconds.max(1))
    }

    pub fn retry_after_secs(&self) -> u64 {
        self.config.window_seconds.max(1)
    }

    async fn check(&self, bucket: RateLimitBucket, user_id: &str) -> Result<bool, AppError> {
        let max = match bucket {
            RateLimitBucket::Ai => self.config.ai_max_requests,
            RateLimitBucket::Execute => self.config.execute_max_requests,
        };
        self.store.is_rate_limited(&bucket.key(user_id), max, self.window()).await
    }
}

/// Retry hint stashed for the 429 catcher.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitRetryAfter(pub u64);

/// Guard for AI-proxying endpoints: authenticates, then applies the per-user
/// AI budget. Carries the resolved user so handlers do not resolve twice.
pub struct AiRateLimit(pub CurrentUser);

/// Guard for the execution sandbox endpoint, with its own budget.
pub struct ExecuteRateLimit(pub CurrentUser);

async fn admit(request: &Request<'_>, bucket: RateLimitBucket) -> Outcome<CurrentUser, AppError> {
    let user = try_outcome!(request.guard::<CurrentUser>().await);

    let Some(limiter) = request.rocket().state::<RateLimiter>() else {
        return Outcome::Success(user);
    };

    match limiter.check(bucket, &user.id).await {
        Ok(false) => Outcome::Success(user),
        Ok(true) => {
            let retry_after = limiter.retry_after_secs();
            request.local_cache(|| Some(RateLimitRetryAfter(retry_after)));
            warn!(
                user_id = %user.id,
                bucket = ?bucket,
                method = %request.method(),
                uri = %request.uri(),
                retry_after_secs = %retry_after,
                "rate limit exceeded"
            );
            Outcome::Error((Status::TooManyRequests, AppError::RateLimited))
        }
        Err(e) => Outcome::Error((Status::from(&e), e)),
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AiRateLimit {
    type Error = AppError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        admit(request, RateLimitBucket::Ai).await.map(AiRateLimit)
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ExecuteRateLimit {
    type Error = AppError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        admit(request, RateLimitBucket::Execute).await.map(ExecuteRateLimit)
    }
}

fn rate_limited_responses() -> rocket_okapi::Result<Responses> {
    let mut responses = Responses::default();
    for (code, description) in [("401", "Unauthorized"), ("429", "Too Many Requests")] {
        responses.responses.insert(
            code.to_string(),
            RefOr::Object(OpenApiResponse {
                description: description.to_string(),
                ..Default::default()
            }),
        );
    }
    Ok(responses)
}

impl<'a> OpenApiFromRequest<'a> for AiRateLimit {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }

    fn get_responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        rate_limited_responses()
    }
}

impl<'a> OpenApiFromRequest<'a> for ExecuteRateLimit {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }

    fn get_responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        rate_limited_responses()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[rocket::async_test]
    async fn first_n_allowed_then_blocked() {
        let store = MemoryStore::new();

        for call in 1..=20 {
            let limited = store.is_rate_limited("ai:user-1", 20, WINDOW).await.unwrap();
            assert!(!limited, "call {call} should be allowed");
        }
        assert!(store.is_rate_limited("ai:user-1", 20, WINDOW).await.unwrap());
        // Stays blocked within the window.
        assert!(store.is_rate_limited("ai:user-1", 20, WINDOW).await.unwrap());
    }

    #[rocket::async_test]
    async fn window_rollover_allows_again() {
        let store = MemoryStore::new();
        let window = Duration::from_millis(50);

        assert!(!store.is_rate_limited("ai:user-1", 1, window).await.unwrap());
        assert!(store.is_rate_limited("ai:user-1", 1, window).await.unwrap());

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(!store.is_rate_limited("ai:user-1", 1, window).await.unwrap());
    }

    #[rocket::async_test]
    async fn keys_are_independent() {
        let store = MemoryStore::new();

        assert!(!store.is_rate_limited("ai:user-1", 1, WINDOW).await.unwrap());
        assert!(store.is_rate_limited("ai:user-1", 1, WINDOW).await.unwrap());
        assert!(!store.is_rate_limited("ai:user-2", 1, WINDOW).await.unwrap());
        assert!(!store.is_rate_limited("execute:user-1", 1, WINDOW).await.unwrap());
    }

    #[rocket::async_test]
    async fn sweep_removes_elapsed_windows() {
        let store = MemoryStore::new();
        let short = Duration::from_millis(10);

        for i in 0..SWEEP_THRESHOLD + 1 {
            store.is_rate_limited(&format!("ai:stale-{i}"), 5, short).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(30)).await;

        // This call finds the map over threshold and sweeps the dead keys.
        store.is_rate_limited("ai:fresh", 5, WINDOW).await.unwrap();

        let counters = store.counters.lock().await;
        assert_eq!(counters.len(), 1);
        assert!(counters.contains_key("ai:fresh"));
    }

    #[rocket::async_test]
    async fn live_keys_survive_the_sweep() {
        let store = MemoryStore::new();

        store.is_rate_limited("ai:keep", 5, WINDOW).await.unwrap();
        for i in 0..SWEEP_THRESHOLD + 1 {
            store.is_rate_limited(&format!("ai:stale-{i}"), 5, Duration::from_millis(1)).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.is_rate_limited("ai:fresh", 5, WINDOW).await.unwrap();

        let counters = store.counters.lock().await;
        assert!(counters.contains_key("ai:keep"));
        assert!(counters.contains_key("ai:fresh"));
    }

    #[rocket::async_test]
    async fn limiter_buckets_use_separate_budgets() {
        let limiter = RateLimiter::new(
            Arc::new(MemoryStore::new()),
            RateLimitConfig {
                store: "memory".into(),
                redis_url: String::new(),
                ai_max_requests: 1,
                execute_max_requests: 2,
                window_seconds: 60,
            },
        );

        assert!(!limiter.check(RateLimitBucket::Ai, "u").await.unwrap());
        assert!(limiter.check(RateLimitBucket::Ai, "u").await.unwrap());

        assert!(!limiter.check(RateLimitBucket::Execute, "u").await.unwrap());
        assert!(!limiter.check(RateLimitBucket::Execute, "u").await.unwrap());
        assert!(limiter.check(RateLimitBucket::Execute, "u").await.unwrap());
    }

    #[test]
    fn bucket_keys_are_prefixed_by_kind() {
        assert_eq!(RateLimitBucket::Ai.key("user-1"), "ai:user-1");
        assert_eq!(RateLimitBucket::Execute.key("user-1"), "execute:user-1");
    }
}

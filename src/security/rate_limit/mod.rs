//! Sliding-window rate limiting.
//!
//! # Data Flow
//! ```text
//! check(identifier)
//!     → clock.rs (now, epoch ms)
//!     → backend.record(key, now, policy)   (bounded by backend timeout)
//!         → memory.rs (DashMap, per-process)
//!         → redis_store.rs (sorted set + Lua, shared)
//!     → RateLimitResult { allowed, limit, remaining, reset }
//! ```
//!
//! # Design Decisions
//! - Backend chosen once at startup from configuration
//! - Backend failure or timeout fails open: the request is allowed and an
//!   error is logged. A sustained outage therefore disables rate limiting;
//!   watch `gateway_backend_failures_total`.
//! - Denied checks do not consume a slot

pub mod clock;
pub mod memory;
pub mod redis_store;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::config::{RateLimitBackendKind, RateLimitConfig, WindowPolicy};
use crate::observability::metrics;
use crate::observability::GatewayLogger;

pub use clock::{Clock, ManualClock, SystemClock};
pub use memory::MemoryBackend;
pub use redis_store::RedisBackend;

/// Identifier used when the caller cannot be identified.
pub const UNKNOWN_IDENTIFIER: &str = "unknown";

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limit store error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("rate limit store timed out after {0:?}")]
    Timeout(Duration),
    #[error("unexpected reply from rate limit store: {0}")]
    UnexpectedReply(String),
    #[error("redis backend selected but no redis_url configured")]
    MissingRedisUrl,
}

/// What a backend observed for one key after purging expired entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowOutcome {
    pub allowed: bool,
    /// Timestamps in the window, including this request if allowed.
    pub count: u32,
    /// Oldest timestamp still in the window.
    pub oldest_ms: i64,
}

/// Counter store behind a limiter.
///
/// Implementations must purge, count and append atomically per key.
#[async_trait]
pub trait RateLimitBackend: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn record(
        &self,
        key: &str,
        now_ms: i64,
        policy: &WindowPolicy,
    ) -> Result<WindowOutcome, RateLimitError>;
}

/// Outcome of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at_ms: i64,
}

impl RateLimitResult {
    pub fn reset_at(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.reset_at_ms)
            .single()
            .unwrap_or_else(Utc::now)
    }

    /// Seconds until the window frees a slot, rounded up.
    pub fn retry_after_secs(&self, now_ms: i64) -> u64 {
        let wait_ms = (self.reset_at_ms - now_ms).max(0) as u64;
        wait_ms.div_ceil(1000)
    }
}

pub struct SlidingWindowLimiter {
    name: &'static str,
    policy: WindowPolicy,
    backend: Arc<dyn RateLimitBackend>,
    clock: Arc<dyn Clock>,
    key_prefix: String,
    timeout: Duration,
    logger: Option<GatewayLogger>,
}

impl std::fmt::Debug for SlidingWindowLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidingWindowLimiter")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl SlidingWindowLimiter {
    pub fn new(
        name: &'static str,
        policy: WindowPolicy,
        backend: Arc<dyn RateLimitBackend>,
    ) -> Self {
        Self {
            name,
            policy,
            backend,
            clock: Arc::new(SystemClock),
            key_prefix: String::new(),
            timeout: Duration::from_millis(250),
            logger: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_logger(mut self, logger: GatewayLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn policy(&self) -> WindowPolicy {
        self.policy
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Check and record one request for `identifier`.
    ///
    /// Never fails: backend errors and timeouts allow the request.
    pub async fn check(&self, identifier: &str) -> RateLimitResult {
        let identifier = if identifier.trim().is_empty() {
            UNKNOWN_IDENTIFIER
        } else {
            identifier
        };
        let key = format!("{}{}:{}", self.key_prefix, self.name, identifier);
        let now_ms = self.clock.now_ms();
        let window_ms = self.policy.window().as_millis() as i64;

        let outcome = match tokio::time::timeout(
            self.timeout,
            self.backend.record(&key, now_ms, &self.policy),
        )
        .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => return self.fail_open(e, now_ms),
            Err(_) => return self.fail_open(RateLimitError::Timeout(self.timeout), now_ms),
        };

        let remaining = if outcome.allowed {
            self.policy.max_requests.saturating_sub(outcome.count)
        } else {
            0
        };
        RateLimitResult {
            allowed: outcome.allowed,
            limit: self.policy.max_requests,
            remaining,
            reset_at_ms: outcome.oldest_ms + window_ms,
        }
    }

    fn fail_open(&self, error: RateLimitError, now_ms: i64) -> RateLimitResult {
        metrics::record_backend_failure(self.name);
        let data = serde_json::json!({
            "limiter": self.name,
            "backend": self.backend.name(),
        });
        match &self.logger {
            Some(logger) => {
                logger.error(
                    "Rate limit backend failed, allowing request",
                    Some(&error),
                    Some(data),
                );
            }
            None => tracing::error!(
                limiter = self.name,
                backend = self.backend.name(),
                error = %error,
                "Rate limit backend failed, allowing request"
            ),
        }

        RateLimitResult {
            allowed: true,
            limit: self.policy.max_requests,
            remaining: self.policy.max_requests,
            reset_at_ms: now_ms + self.policy.window().as_millis() as i64,
        }
    }
}

/// The two limiters the gateway applies.
#[derive(Debug)]
pub struct RateLimiters {
    /// Anonymous traffic, keyed by client IP.
    pub public: SlidingWindowLimiter,
    /// Authenticated admins, keyed by user id.
    pub admin: SlidingWindowLimiter,
}

impl RateLimiters {
    /// Build both limiters on the configured backend.
    ///
    /// # Errors
    /// Returns error if the redis backend is selected and cannot connect.
    pub async fn connect(
        config: &RateLimitConfig,
        logger: Option<GatewayLogger>,
    ) -> Result<Self, RateLimitError> {
        let (public_backend, admin_backend) = match config.backend {
            RateLimitBackendKind::Memory => {
                let public: Arc<dyn RateLimitBackend> =
                    Arc::new(MemoryBackend::new(config.memory_capacity));
                let admin: Arc<dyn RateLimitBackend> =
                    Arc::new(MemoryBackend::new(config.memory_capacity));
                (public, admin)
            }
            RateLimitBackendKind::Redis => {
                let url = config
                    .redis_url
                    .as_deref()
                    .ok_or(RateLimitError::MissingRedisUrl)?;
                let backend: Arc<dyn RateLimitBackend> =
                    Arc::new(RedisBackend::connect(url).await?);
                (backend.clone(), backend)
            }
        };
        tracing::info!(backend = public_backend.name(), "Rate limit backend ready");

        Ok(Self::with_backends(
            config,
            public_backend,
            admin_backend,
            Arc::new(SystemClock),
            logger,
        ))
    }

    pub fn with_backends(
        config: &RateLimitConfig,
        public_backend: Arc<dyn RateLimitBackend>,
        admin_backend: Arc<dyn RateLimitBackend>,
        clock: Arc<dyn Clock>,
        logger: Option<GatewayLogger>,
    ) -> Self {
        let build = |name: &'static str, policy: WindowPolicy, backend: Arc<dyn RateLimitBackend>| {
            let limiter = SlidingWindowLimiter::new(name, policy, backend)
                .with_clock(clock.clone())
                .with_key_prefix(config.key_prefix.clone())
                .with_timeout(config.backend_timeout());
            match &logger {
                Some(logger) => limiter.with_logger(logger.clone()),
                None => limiter,
            }
        };
        Self {
            public: build("public", config.public, public_backend),
            admin: build("admin", config.admin, admin_backend),
        }
    }
}

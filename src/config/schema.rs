//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the edge gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Deployment profile; drives sampling and cookie flags.
    pub environment: Environment,

    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Application the gateway forwards allowed traffic to.
    pub upstream: UpstreamConfig,

    /// Path prefixes that select gateway policy.
    pub routes: RoutesConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// CSRF token configuration.
    pub csrf: CsrfConfig,

    /// Session provider used by the auth gate.
    pub auth: AuthConfig,

    /// Structured logger settings.
    pub logging: LoggingConfig,

    /// External telemetry sink.
    pub telemetry: TelemetryConfig,

    /// Metrics exporter settings.
    pub observability: ObservabilityConfig,

    /// Request hardening settings.
    pub security: SecurityConfig,
}

impl GatewayConfig {
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

/// Deployment profile.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment '{}'", other)),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Upstream application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream address (e.g., "127.0.0.1:3000").
    pub address: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3000".to_string(),
        }
    }
}

/// Route prefixes the orchestrator classifies requests by.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutesConfig {
    pub public_api_prefix: String,
    pub admin_api_prefix: String,
    pub admin_page_prefix: String,
    /// Login page admin page requests are redirected to.
    pub login_path: String,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            public_api_prefix: "/api/public".to_string(),
            admin_api_prefix: "/api/admin".to_string(),
            admin_page_prefix: "/admin".to_string(),
            login_path: "/login".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Which store backs the rate limiter.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitBackendKind {
    #[default]
    Memory,
    Redis,
}

impl std::str::FromStr for RateLimitBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(RateLimitBackendKind::Memory),
            "redis" => Ok(RateLimitBackendKind::Redis),
            other => Err(format!("unknown rate limit backend '{}'", other)),
        }
    }
}

/// A single sliding-window policy.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct WindowPolicy {
    /// Maximum requests allowed inside one window.
    pub max_requests: u32,
    /// Window length in seconds.
    pub window_secs: u64,
}

impl WindowPolicy {
    /// Windows are whole seconds, matching the config file.
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Counter store, chosen once at startup.
    pub backend: RateLimitBackendKind,

    /// Redis connection URL (required for the redis backend).
    pub redis_url: Option<String>,

    /// Prefix for every key written to the shared store.
    pub key_prefix: String,

    /// Backend calls slower than this count as failures (fail open).
    pub backend_timeout_ms: u64,

    /// Anonymous traffic, keyed by client IP.
    pub public: WindowPolicy,

    /// Authenticated admin traffic, keyed by user id.
    pub admin: WindowPolicy,

    /// Maximum identifiers tracked by the in-process store.
    pub memory_capacity: usize,

    /// Skip rate limiting entirely (development only).
    pub dev_bypass: bool,
}

impl RateLimitConfig {
    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: RateLimitBackendKind::Memory,
            redis_url: None,
            key_prefix: "gateway:rl:".to_string(),
            backend_timeout_ms: 250,
            public: WindowPolicy {
                max_requests: 10,
                window_secs: 10,
            },
            admin: WindowPolicy {
                max_requests: 100,
                window_secs: 60,
            },
            memory_capacity: 100_000,
            dev_bypass: false,
        }
    }
}

/// CSRF token configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CsrfConfig {
    /// HMAC signing key. Required in production.
    pub secret: Option<String>,
    pub cookie_name: String,
    pub header_name: String,
    /// Path of the issuance endpoint.
    pub issue_path: String,
    pub cookie_max_age_secs: u64,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            secret: None,
            cookie_name: "__Host-csrf-token".to_string(),
            header_name: "X-CSRF-Token".to_string(),
            issue_path: "/api/csrf-token".to_string(),
            cookie_max_age_secs: 7200,
        }
    }
}

/// Session provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Provider endpoint returning the user for a set of session cookies.
    pub user_endpoint: Option<String>,
    /// API key sent to the provider, if it requires one.
    pub api_key: Option<String>,
    /// Cookies whose names start with this prefix are forwarded.
    pub session_cookie_prefix: String,
    pub timeout_ms: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            user_endpoint: None,
            api_key: None,
            session_cookie_prefix: "sb-".to_string(),
            timeout_ms: 2000,
        }
    }
}

impl AuthConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Per-level sample rates in `[0, 1]`.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct SampleRates {
    pub debug: f64,
    pub info: f64,
    pub warn: f64,
    pub error: f64,
}

impl SampleRates {
    pub const ALL: SampleRates = SampleRates {
        debug: 1.0,
        info: 1.0,
        warn: 1.0,
        error: 1.0,
    };

    /// Rates derived from the deployment profile.
    pub fn for_environment(environment: Environment) -> Self {
        match environment {
            Environment::Development => Self::ALL,
            Environment::Production => SampleRates {
                debug: 0.05,
                info: 0.25,
                warn: 0.75,
                error: 1.0,
            },
        }
    }
}

/// Structured logger configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// Defaults to JSON in production, pretty in development.
    pub format: Option<LogFormat>,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: Option<String>,
    /// Overrides the environment-derived sample rates.
    pub sample_rates: Option<SampleRates>,
}

impl LoggingConfig {
    pub fn effective_format(&self, environment: Environment) -> LogFormat {
        self.format.unwrap_or(match environment {
            Environment::Development => LogFormat::Pretty,
            Environment::Production => LogFormat::Json,
        })
    }

    pub fn effective_rates(&self, environment: Environment) -> SampleRates {
        let mut rates = self
            .sample_rates
            .unwrap_or_else(|| SampleRates::for_environment(environment));
        rates.error = 1.0;
        rates
    }
}

/// External telemetry sink configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Ingestion endpoint; telemetry is disabled when unset.
    pub endpoint: Option<String>,
    pub timeout_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: 2000,
        }
    }
}

impl TelemetryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,
    /// Take the client IP from the first X-Forwarded-For hop.
    pub trust_forwarded_for: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
            trust_forwarded_for: false,
        }
    }
}

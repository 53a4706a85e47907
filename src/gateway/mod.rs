//! Gateway orchestrator.
//!
//! # Data Flow
//! ```text
//! Request
//!     → RequestContext (request id, client ip, user agent)
//!     → route.rs (PUBLIC_API | ADMIN_API | ADMIN_PAGE | unmatched)
//!     → middleware.rs
//!         PUBLIC_API: rate limit by IP → forward | 429
//!         ADMIN_API:  [mutating] CSRF → 403
//!                     auth → rate limit by user id (admin) or IP → forward | 429
//!         ADMIN_PAGE: auth → forward | redirect to login
//!         unmatched:  forward
//!     → one completion log line, X-Request-ID on every response
//! ```
//!
//! # Design Decisions
//! - Steps within one request are strictly sequential
//! - CSRF runs before any auth or rate-limit work
//! - Panics in downstream handlers become a generic 500

pub mod middleware;
pub mod route;

use std::sync::Arc;

use axum::Router;

use crate::auth::{AuthGate, HttpSessionProvider, NoSessionProvider, SessionProvider};
use crate::config::GatewayConfig;
use crate::observability::{GatewayLogger, HttpTelemetrySink, Telemetry};
use crate::security::csrf::CsrfError;
use crate::security::rate_limit::RateLimitError;
use crate::security::{CsrfGuard, RateLimiters};

pub use route::{RouteClass, RouteTable};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Csrf(#[from] CsrfError),
    #[error(transparent)]
    RateLimit(#[from] RateLimitError),
    #[error("failed to build session provider: {0}")]
    Provider(#[from] crate::auth::ProviderError),
    #[error("failed to build telemetry sink: {0}")]
    Telemetry(#[from] crate::observability::TelemetryError),
}

/// Collaborators the orchestrator composes.
pub struct GatewayParts {
    pub csrf: CsrfGuard,
    pub auth: AuthGate,
    pub limiters: RateLimiters,
    pub logger: GatewayLogger,
}

#[derive(Debug)]
pub(crate) struct GatewayInner {
    pub(crate) routes: RouteTable,
    pub(crate) login_path: String,
    pub(crate) csrf: CsrfGuard,
    pub(crate) auth: AuthGate,
    pub(crate) limiters: RateLimiters,
    pub(crate) logger: GatewayLogger,
    pub(crate) rate_limit_enabled: bool,
    pub(crate) trust_forwarded_for: bool,
}

/// Shared handle to the orchestrator. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Gateway {
    pub(crate) inner: Arc<GatewayInner>,
}

impl Gateway {
    pub fn new(config: &GatewayConfig, parts: GatewayParts) -> Self {
        let bypass = config.rate_limit.dev_bypass && !config.is_production();
        if bypass {
            tracing::warn!("Rate limiting bypassed (development only)");
        }

        Self {
            inner: Arc::new(GatewayInner {
                routes: RouteTable::new(&config.routes),
                login_path: config.routes.login_path.clone(),
                csrf: parts.csrf,
                auth: parts.auth,
                limiters: parts.limiters,
                logger: parts.logger,
                rate_limit_enabled: config.rate_limit.enabled && !bypass,
                trust_forwarded_for: config.security.trust_forwarded_for,
            }),
        }
    }

    /// Build every collaborator from configuration.
    ///
    /// # Errors
    /// Returns error if the CSRF key is missing in production, the redis
    /// backend cannot connect, or an HTTP adapter cannot be built.
    pub async fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let telemetry = match &config.telemetry.endpoint {
            Some(endpoint) => Telemetry::new(Arc::new(HttpTelemetrySink::new(
                endpoint.clone(),
                config.telemetry.timeout(),
            )?)),
            None => Telemetry::default(),
        };
        let logger = GatewayLogger::from_config(config, telemetry.clone());

        let provider: Arc<dyn SessionProvider> = match &config.auth.user_endpoint {
            Some(endpoint) => Arc::new(HttpSessionProvider::new(
                endpoint.clone(),
                config.auth.api_key.clone(),
                config.auth.timeout(),
            )?),
            None => {
                tracing::warn!("No session provider configured, admin routes will treat every caller as anonymous");
                Arc::new(NoSessionProvider)
            }
        };

        let parts = GatewayParts {
            csrf: CsrfGuard::from_config(&config.csrf, config.environment)?,
            auth: AuthGate::new(provider, config.auth.session_cookie_prefix.clone(), telemetry)
                .with_logger(logger.clone()),
            limiters: RateLimiters::connect(&config.rate_limit, Some(logger.clone())).await?,
            logger,
        };
        Ok(Self::new(config, parts))
    }

    /// Wrap `router` so every request passes through the gateway.
    pub fn apply<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(axum::middleware::from_fn_with_state(
            self.clone(),
            middleware::gateway_middleware,
        ))
    }

    pub fn csrf(&self) -> &CsrfGuard {
        &self.inner.csrf
    }

    pub fn logger(&self) -> &GatewayLogger {
        &self.inner.logger
    }
}

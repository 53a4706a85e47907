//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (overlay GATEWAY_* environment variables)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → read once by main.rs to build the gateway
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the signing key and rate limit backend
//!   are fixed for the lifetime of the process
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load, load_config, ConfigError};
pub use schema::{
    AuthConfig, CsrfConfig, Environment, GatewayConfig, ListenerConfig, LogFormat, LoggingConfig,
    ObservabilityConfig, RateLimitBackendKind, RateLimitConfig, RoutesConfig, SampleRates,
    SecurityConfig, TelemetryConfig, TimeoutConfig, UpstreamConfig, WindowPolicy,
};
pub use validation::{validate_config, ValidationError};

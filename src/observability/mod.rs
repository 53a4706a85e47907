//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Ingress:
//!     → context.rs (request id + metadata, task-local for the request)
//!
//! Any component:
//!     → logging.rs (sample, enrich with context)
//!         → sanitize.rs (redact PII from message and data)
//!         → tracing event (stdout, JSON or pretty)
//!         → telemetry.rs (warn → breadcrumb, error → exception; fire-and-forget)
//!     → metrics.rs (counters, histograms)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through all subsystems via the task-local context
//! - Metrics are cheap (atomic increments)
//! - Telemetry failures never surface to callers

pub mod context;
pub mod logging;
pub mod metrics;
pub mod sanitize;
pub mod telemetry;

pub use context::{ContextOptions, RequestContext};
pub use logging::{GatewayLogger, LogEntry, LogLevel, RequestSummary};
pub use sanitize::{sanitize_str, sanitize_value, Sanitizer};
pub use telemetry::{
    Breadcrumb, ExceptionReport, HttpTelemetrySink, NoopTelemetry, Severity, Telemetry,
    TelemetryError, TelemetrySink,
};

//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber (JSON in production, pretty in development)
//! - Sample, sanitize and enrich gateway log entries
//! - Forward warnings and errors to the telemetry sink
//! - Summarize each completed HTTP exchange with duration-based escalation
//!
//! # Design Decisions
//! - Entries are emitted as `tracing` events on target `edge_gateway::log`
//! - Errors are never sampled out
//! - Message and data always pass through the PII sanitizer first

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{GatewayConfig, LogFormat, SampleRates};
use crate::observability::context::RequestContext;
use crate::observability::metrics;
use crate::observability::sanitize::Sanitizer;
use crate::observability::telemetry::{Breadcrumb, ExceptionReport, Severity, Telemetry};

/// Requests slower than this are logged at WARN or above.
pub const SLOW_REQUEST: Duration = Duration::from_millis(1000);
/// Requests slower than this are logged at ERROR.
pub const VERY_SLOW_REQUEST: Duration = Duration::from_millis(5000);
pub const SLOW_MARKER: &str = "[SLOW]";
pub const VERY_SLOW_MARKER: &str = "[VERY_SLOW]";

/// Install the global tracing subscriber.
pub fn init_tracing(config: &GatewayConfig) {
    let default_filter = config
        .logging
        .filter
        .clone()
        .unwrap_or_else(|| "edge_gateway=info,tower_http=info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());
    let registry = tracing_subscriber::registry().with(filter);

    match config.logging.effective_format(config.environment) {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Nominal level for an HTTP status.
    pub fn for_status(status: u16) -> Self {
        match status {
            500.. => LogLevel::Error,
            400..=499 => LogLevel::Warn,
            _ => LogLevel::Info,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub message: String,
    /// Debug representation and source chain; development only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// One emitted log line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Facts about one completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct RequestSummary {
    pub method: String,
    pub path: String,
    pub status: u16,
    pub duration: Duration,
}

/// Severity and message suffix for a request summary.
pub fn request_level(status: u16, duration: Duration) -> (LogLevel, Option<&'static str>) {
    let nominal = LogLevel::for_status(status);
    if duration > VERY_SLOW_REQUEST {
        (nominal.max(LogLevel::Error), Some(VERY_SLOW_MARKER))
    } else if duration > SLOW_REQUEST {
        (nominal.max(LogLevel::Warn), Some(SLOW_MARKER))
    } else {
        (nominal, None)
    }
}

/// Sampling, sanitizing logger shared by all gateway components.
#[derive(Debug, Clone)]
pub struct GatewayLogger {
    rates: SampleRates,
    sanitizer: Sanitizer,
    telemetry: Telemetry,
    include_error_detail: bool,
}

impl GatewayLogger {
    pub fn new(rates: SampleRates, telemetry: Telemetry) -> Self {
        Self {
            rates,
            sanitizer: Sanitizer::default(),
            telemetry,
            include_error_detail: false,
        }
    }

    pub fn from_config(config: &GatewayConfig, telemetry: Telemetry) -> Self {
        Self::new(config.logging.effective_rates(config.environment), telemetry)
            .with_error_detail(!config.is_production())
    }

    pub fn with_error_detail(mut self, include: bool) -> Self {
        self.include_error_detail = include;
        self
    }

    pub fn with_sanitizer(mut self, sanitizer: Sanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn debug(&self, message: &str, data: Option<Value>) -> Option<LogEntry> {
        self.log(LogLevel::Debug, message, data, None)
    }

    pub fn info(&self, message: &str, data: Option<Value>) -> Option<LogEntry> {
        self.log(LogLevel::Info, message, data, None)
    }

    pub fn warn(&self, message: &str, data: Option<Value>) -> Option<LogEntry> {
        self.log(LogLevel::Warn, message, data, None)
    }

    pub fn error(
        &self,
        message: &str,
        error: Option<&(dyn std::error::Error + 'static)>,
        data: Option<Value>,
    ) -> Option<LogEntry> {
        let info = error.map(|e| self.error_info(e));
        self.log(LogLevel::Error, message, data, info)
    }

    /// Log the completion of one HTTP exchange.
    pub fn request(&self, summary: &RequestSummary) -> Option<LogEntry> {
        let duration_ms = summary.duration.as_millis();
        let (level, marker) = request_level(summary.status, summary.duration);
        let mut message = format!(
            "{} {} {} {}ms",
            summary.method, summary.path, summary.status, duration_ms
        );
        if let Some(marker) = marker {
            message.push(' ');
            message.push_str(marker);
        }

        let mut data = serde_json::json!({
            "method": summary.method,
            "path": summary.path,
            "status": summary.status,
            "durationMs": duration_ms as u64,
        });
        if let Some(ctx) = RequestContext::current() {
            if let Some(ip) = ctx.client_ip() {
                data["clientIp"] = Value::from(ip);
            }
            if let Some(agent) = ctx.user_agent() {
                data["userAgent"] = Value::from(agent);
            }
        }
        self.log(level, &message, Some(data), None)
    }

    fn log(
        &self,
        level: LogLevel,
        message: &str,
        data: Option<Value>,
        error: Option<ErrorInfo>,
    ) -> Option<LogEntry> {
        if !self.sampled(level) {
            metrics::record_sampled_out(level.as_str());
            return None;
        }

        let ctx = RequestContext::current();
        let entry = LogEntry {
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            level,
            message: self.sanitizer.sanitize_str(message),
            data: data.map(|d| self.sanitizer.sanitize_value(&d)),
            error,
            request_id: ctx.as_ref().map(|c| c.request_id().to_string()),
            user_id: ctx.as_ref().and_then(|c| c.user_id().map(str::to_string)),
        };

        emit(&entry);
        self.forward(&entry);
        Some(entry)
    }

    fn sampled(&self, level: LogLevel) -> bool {
        let rate = match level {
            LogLevel::Debug => self.rates.debug,
            LogLevel::Info => self.rates.info,
            LogLevel::Warn => self.rates.warn,
            LogLevel::Error => return true,
        };
        rate >= 1.0 || fastrand::f64() < rate
    }

    fn forward(&self, entry: &LogEntry) {
        match entry.level {
            LogLevel::Warn => self.telemetry.add_breadcrumb(Breadcrumb {
                category: "log".to_string(),
                message: entry.message.clone(),
                level: Severity::Warning,
                data: entry.data.clone(),
            }),
            LogLevel::Error => self.telemetry.capture_exception(ExceptionReport {
                message: entry.message.clone(),
                error: entry.error.as_ref().map(|e| e.message.clone()),
                request_id: entry.request_id.clone(),
                user_id: entry.user_id.clone(),
            }),
            LogLevel::Debug | LogLevel::Info => {}
        }
    }

    fn error_info(&self, error: &(dyn std::error::Error + 'static)) -> ErrorInfo {
        let detail = self.include_error_detail.then(|| {
            let mut detail = format!("{:?}", error);
            let mut source = error.source();
            while let Some(cause) = source {
                detail.push_str("\ncaused by: ");
                detail.push_str(&cause.to_string());
                source = cause.source();
            }
            self.sanitizer.sanitize_str(&detail)
        });
        ErrorInfo {
            message: self.sanitizer.sanitize_str(&error.to_string()),
            detail,
        }
    }
}

fn emit(entry: &LogEntry) {
    let data = entry.data.as_ref().map(Value::to_string);
    let error = entry.error.as_ref().map(|e| e.message.as_str());

    macro_rules! emit_at {
        ($level:expr) => {
            tracing::event!(
                target: "edge_gateway::log",
                $level,
                request_id = entry.request_id.as_deref(),
                user_id = entry.user_id.as_deref(),
                data = data.as_deref(),
                error = error,
                "{}",
                entry.message
            )
        };
    }

    match entry.level {
        LogLevel::Debug => emit_at!(tracing::Level::DEBUG),
        LogLevel::Info => emit_at!(tracing::Level::INFO),
        LogLevel::Warn => emit_at!(tracing::Level::WARN),
        LogLevel::Error => emit_at!(tracing::Level::ERROR),
    }
}

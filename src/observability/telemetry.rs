//! External error-telemetry sink.
//!
//! The gateway only produces events; ingestion belongs to a third party.
//! Every delivery is best-effort: [`Telemetry`] spawns the call and drops
//! its result, so a slow or failing sink never affects the request.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::observability::metrics;

/// Severity attached to telemetry events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

/// An unexpected failure.
#[derive(Debug, Clone, Serialize)]
pub struct ExceptionReport {
    pub message: String,
    pub error: Option<String>,
    pub request_id: Option<String>,
    pub user_id: Option<String>,
}

/// A trail marker recorded ahead of later events.
#[derive(Debug, Clone, Serialize)]
pub struct Breadcrumb {
    pub category: String,
    pub message: String,
    pub level: Severity,
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("telemetry transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("telemetry endpoint rejected event with status {0}")]
    Rejected(u16),
}

/// Destination for exceptions, breadcrumbs and messages.
#[async_trait]
pub trait TelemetrySink: Send + Sync + 'static {
    async fn capture_exception(&self, report: ExceptionReport) -> Result<(), TelemetryError>;
    async fn add_breadcrumb(&self, breadcrumb: Breadcrumb) -> Result<(), TelemetryError>;
    async fn capture_message(&self, message: String, level: Severity)
        -> Result<(), TelemetryError>;
}

/// Sink used when no endpoint is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

#[async_trait]
impl TelemetrySink for NoopTelemetry {
    async fn capture_exception(&self, _report: ExceptionReport) -> Result<(), TelemetryError> {
        Ok(())
    }

    async fn add_breadcrumb(&self, _breadcrumb: Breadcrumb) -> Result<(), TelemetryError> {
        Ok(())
    }

    async fn capture_message(
        &self,
        _message: String,
        _level: Severity,
    ) -> Result<(), TelemetryError> {
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Envelope<'a> {
    Exception(&'a ExceptionReport),
    Breadcrumb(&'a Breadcrumb),
    Message { message: &'a str, level: Severity },
}

/// POSTs each event as JSON to an ingestion endpoint.
#[derive(Debug, Clone)]
pub struct HttpTelemetrySink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTelemetrySink {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, TelemetryError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    async fn send(&self, envelope: Envelope<'_>) -> Result<(), TelemetryError> {
        let response = self.client.post(&self.endpoint).json(&envelope).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(TelemetryError::Rejected(response.status().as_u16()))
        }
    }
}

#[async_trait]
impl TelemetrySink for HttpTelemetrySink {
    async fn capture_exception(&self, report: ExceptionReport) -> Result<(), TelemetryError> {
        self.send(Envelope::Exception(&report)).await
    }

    async fn add_breadcrumb(&self, breadcrumb: Breadcrumb) -> Result<(), TelemetryError> {
        self.send(Envelope::Breadcrumb(&breadcrumb)).await
    }

    async fn capture_message(
        &self,
        message: String,
        level: Severity,
    ) -> Result<(), TelemetryError> {
        self.send(Envelope::Message {
            message: &message,
            level,
        })
        .await
    }
}

/// Fire-and-forget front for a [`TelemetrySink`].
#[derive(Clone)]
pub struct Telemetry {
    sink: Arc<dyn TelemetrySink>,
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry").finish_non_exhaustive()
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new(Arc::new(NoopTelemetry))
    }
}

impl Telemetry {
    pub fn new(sink: Arc<dyn TelemetrySink>) -> Self {
        Self { sink }
    }

    pub fn capture_exception(&self, report: ExceptionReport) {
        let sink = self.sink.clone();
        dispatch("exception", async move { sink.capture_exception(report).await });
    }

    pub fn add_breadcrumb(&self, breadcrumb: Breadcrumb) {
        let sink = self.sink.clone();
        dispatch("breadcrumb", async move { sink.add_breadcrumb(breadcrumb).await });
    }

    pub fn capture_message(&self, message: impl Into<String>, level: Severity) {
        let sink = self.sink.clone();
        let message = message.into();
        dispatch("message", async move { sink.capture_message(message, level).await });
    }
}

fn dispatch<F>(kind: &'static str, delivery: F)
where
    F: std::future::Future<Output = Result<(), TelemetryError>> + Send + 'static,
{
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        tracing::debug!(kind, "No runtime available, telemetry event dropped");
        return;
    };
    handle.spawn(async move {
        if let Err(e) = delivery.await {
            metrics::record_telemetry_failure(kind);
            tracing::debug!(kind, error = %e, "Telemetry delivery failed");
        }
    });
}

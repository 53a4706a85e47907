//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tower::ServiceExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Layer;

use edge_gateway::auth::{AuthGate, ProviderError, SessionProvider, User};
use edge_gateway::config::{GatewayConfig, WindowPolicy};
use edge_gateway::gateway::{Gateway, GatewayParts};
use edge_gateway::observability::{
    Breadcrumb, ExceptionReport, GatewayLogger, Severity, Telemetry, TelemetryError, TelemetrySink,
};
use edge_gateway::security::rate_limit::{
    Clock, MemoryBackend, RateLimitBackend, RateLimitError, RateLimiters, WindowOutcome,
};
use edge_gateway::security::CsrfGuard;

pub const SECRET: &str = "integration-test-secret-0123456789abcdef";
pub const CLIENT: &str = "198.51.100.23:51515";

/// Config used by most tests: 10/10s public, 100/60s admin, signing key set.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.csrf.secret = Some(SECRET.to_string());
    config.rate_limit.public = WindowPolicy::new(10, 10);
    config.rate_limit.admin = WindowPolicy::new(100, 60);
    config
}

/// Telemetry sink that keeps everything it receives.
#[derive(Default)]
pub struct RecordingTelemetry {
    pub exceptions: Mutex<Vec<ExceptionReport>>,
    pub breadcrumbs: Mutex<Vec<Breadcrumb>>,
    pub messages: Mutex<Vec<(String, Severity)>>,
}

impl RecordingTelemetry {
    pub fn exception_count(&self) -> usize {
        self.exceptions.lock().unwrap().len()
    }

    pub fn breadcrumb_messages(&self) -> Vec<String> {
        self.breadcrumbs
            .lock()
            .unwrap()
            .iter()
            .map(|b| b.message.clone())
            .collect()
    }
}

#[async_trait]
impl TelemetrySink for RecordingTelemetry {
    async fn capture_exception(&self, report: ExceptionReport) -> Result<(), TelemetryError> {
        self.exceptions.lock().unwrap().push(report);
        Ok(())
    }

    async fn add_breadcrumb(&self, breadcrumb: Breadcrumb) -> Result<(), TelemetryError> {
        self.breadcrumbs.lock().unwrap().push(breadcrumb);
        Ok(())
    }

    async fn capture_message(
        &self,
        message: String,
        level: Severity,
    ) -> Result<(), TelemetryError> {
        self.messages.lock().unwrap().push((message, level));
        Ok(())
    }
}

/// One event emitted by the gateway logger.
#[derive(Debug, Clone)]
pub struct CapturedLog {
    pub level: tracing::Level,
    pub message: String,
}

/// Tracing layer keeping every `edge_gateway::log` event.
#[derive(Clone, Default)]
pub struct LogCapture {
    captured: Arc<Mutex<Vec<CapturedLog>>>,
}

impl LogCapture {
    /// Install a fresh capture as this thread's default subscriber.
    ///
    /// Only sees events from the current thread, so use it with the
    /// single-threaded `#[tokio::test]` runtime.
    pub fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        let capture = Self::default();
        let subscriber = tracing_subscriber::registry().with(capture.clone());
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    /// Completion lines for `method path`, whatever their status.
    pub fn summaries(&self, method: &str, path: &str) -> Vec<CapturedLog> {
        let prefix = format!("{} {} ", method, path);
        self.captured
            .lock()
            .unwrap()
            .iter()
            .filter(|log| log.message.starts_with(&prefix))
            .cloned()
            .collect()
    }
}

impl<S> Layer<S> for LogCapture
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        if event.metadata().target() != "edge_gateway::log" {
            return;
        }
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);
        self.captured.lock().unwrap().push(CapturedLog {
            level: *event.metadata().level(),
            message: visitor.0,
        });
    }
}

struct MessageVisitor(String);

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{:?}", value);
        }
    }
}

/// Session provider keyed by the `sb-session` cookie value:
/// `admin` → admin user, `member` → regular user, `broken` → provider error.
#[derive(Default)]
pub struct ScriptedProvider {
    pub calls: AtomicUsize,
}

#[async_trait]
impl SessionProvider for ScriptedProvider {
    async fn current_user(
        &self,
        cookies: &[(String, String)],
    ) -> Result<Option<User>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let session = cookies
            .iter()
            .find(|(name, _)| name == "sb-session")
            .map(|(_, value)| value.as_str());
        match session {
            Some("admin") => Ok(Some(User {
                id: "admin-1".into(),
                email: Some("root@example.com".into()),
                roles: vec!["admin".into()],
                ..User::default()
            })),
            Some("member") => Ok(Some(User {
                id: "member-1".into(),
                role: Some("member".into()),
                ..User::default()
            })),
            Some("broken") => Err(ProviderError::Status(503)),
            _ => Ok(None),
        }
    }
}

/// Memory backend that counts how often it is consulted.
pub struct CountingBackend {
    inner: MemoryBackend,
    pub calls: AtomicUsize,
}

impl Default for CountingBackend {
    fn default() -> Self {
        Self {
            inner: MemoryBackend::new(1_000),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RateLimitBackend for CountingBackend {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn record(
        &self,
        key: &str,
        now_ms: i64,
        policy: &WindowPolicy,
    ) -> Result<WindowOutcome, RateLimitError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.record(key, now_ms, policy).await
    }
}

/// Backend that is always down.
pub struct UnreachableBackend;

#[async_trait]
impl RateLimitBackend for UnreachableBackend {
    fn name(&self) -> &'static str {
        "unreachable"
    }

    async fn record(
        &self,
        _key: &str,
        _now_ms: i64,
        _policy: &WindowPolicy,
    ) -> Result<WindowOutcome, RateLimitError> {
        Err(RateLimitError::UnexpectedReply("connection refused".into()))
    }
}

/// Everything a test may want to inspect after driving the gateway.
pub struct Harness {
    pub gateway: Gateway,
    pub telemetry: Arc<RecordingTelemetry>,
    pub provider: Arc<ScriptedProvider>,
    pub public_backend: Arc<CountingBackend>,
    pub admin_backend: Arc<CountingBackend>,
    pub hits: Arc<AtomicUsize>,
}

impl Harness {
    pub fn new(config: &GatewayConfig) -> Self {
        Self::with_backends(
            config,
            Arc::new(CountingBackend::default()),
            Arc::new(CountingBackend::default()),
            None,
        )
    }

    pub fn with_backends(
        config: &GatewayConfig,
        public_backend: Arc<CountingBackend>,
        admin_backend: Arc<CountingBackend>,
        override_backend: Option<Arc<dyn RateLimitBackend>>,
    ) -> Self {
        let telemetry = Arc::new(RecordingTelemetry::default());
        let provider = Arc::new(ScriptedProvider::default());
        let telemetry_handle = Telemetry::new(telemetry.clone());
        let logger = GatewayLogger::from_config(config, telemetry_handle.clone());

        let counting_public: Arc<dyn RateLimitBackend> = public_backend.clone();
        let counting_admin: Arc<dyn RateLimitBackend> = admin_backend.clone();
        let (public, admin) = match override_backend {
            Some(backend) => (backend.clone(), backend),
            None => (counting_public, counting_admin),
        };
        let clock: Arc<dyn Clock> = Arc::new(edge_gateway::security::rate_limit::SystemClock);

        let parts = GatewayParts {
            csrf: CsrfGuard::from_config(&config.csrf, config.environment).unwrap(),
            auth: AuthGate::new(provider.clone(), "sb-", telemetry_handle)
                .with_logger(logger.clone()),
            limiters: RateLimiters::with_backends(
                &config.rate_limit,
                public,
                admin,
                clock,
                Some(logger.clone()),
            ),
            logger,
        };

        Self {
            gateway: Gateway::new(config, parts),
            telemetry,
            provider,
            public_backend,
            admin_backend,
            hits: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Application routes wrapped by the gateway.
    pub fn app(&self) -> Router {
        let routes = Router::new()
            .route("/api/public/items", get(counted))
            .route("/api/admin/users", get(counted).post(counted).delete(counted))
            .route("/admin/dashboard", get(counted))
            .route("/boom", get(exploding))
            .fallback(counted)
            .with_state(self.hits.clone());
        self.gateway.apply(routes)
    }

    pub fn hit_count(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn counted(State(hits): State<Arc<AtomicUsize>>) -> &'static str {
    hits.fetch_add(1, Ordering::SeqCst);
    "ok"
}

async fn exploding() -> &'static str {
    panic!("handler exploded")
}

/// Request builder pre-populated with the client's socket address.
pub fn request(method: &str, uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .extension(ConnectInfo(CLIENT.parse::<SocketAddr>().unwrap()))
}

pub async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn json_body(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn header<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

/// Poll `condition` until it holds or a second has passed.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Start a mock upstream that answers every request with `status` and `body`.
pub async fn start_mock_upstream(status: StatusCode, body: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut buf = [0u8; 4096];
                        let _ = tokio::io::AsyncReadExt::read(&mut socket, &mut buf).await;
                        let response = format!(
                            "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status.as_u16(),
                            status.canonical_reason().unwrap_or("Unknown"),
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
    addr
}

/// Start an upstream that accepts connections and never answers.
pub async fn start_silent_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                while let Ok(n) = tokio::io::AsyncReadExt::read(&mut socket, &mut buf).await {
                    if n == 0 {
                        break;
                    }
                }
            });
        }
    });
    addr
}

/// An address nothing is listening on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

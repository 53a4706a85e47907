//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the built-in handlers
//! - Wire up middleware (gateway, timeout, body limit, tracing)
//! - Serve the CSRF token issuance endpoint
//! - Forward everything else to the upstream application
//! - Bind server to listener and drain on shutdown

use std::future::Future;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{
        header,
        uri::{Authority, PathAndQuery, Scheme},
        HeaderValue, Uri,
    },
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::GatewayConfig;
use crate::gateway::Gateway;
use crate::http::response;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid upstream address '{0}'")]
    InvalidUpstream(String),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Gateway,
    pub client: Client<HttpConnector, Body>,
    pub upstream: Authority,
}

/// HTTP server fronting the upstream application.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: &GatewayConfig, gateway: Gateway) -> Result<Self, ServerError> {
        let upstream = Authority::from_str(&config.upstream.address)
            .map_err(|_| ServerError::InvalidUpstream(config.upstream.address.clone()))?;
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        let state = AppState {
            gateway,
            client,
            upstream,
        };
        Ok(Self {
            router: Self::build_router(config, state),
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let gateway = state.gateway.clone();
        // The timeout sits inside the gateway so a 408 still gets a request
        // id and a completion log line.
        let routes = Router::new()
            .route("/health", get(health_handler))
            .route(&config.csrf.issue_path, get(csrf_token_handler))
            .fallback(proxy_handler)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .with_state(state);

        gateway
            .apply(routes)
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(TraceLayer::new_for_http())
    }

    /// The fully layered router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET <issue_path>
/// Mints a token and sets it as the double-submit cookie.
async fn csrf_token_handler(State(state): State<AppState>) -> Response {
    let csrf = state.gateway.csrf();
    let Some(token) = csrf.issue() else {
        return response::service_unavailable("CSRF token issuance requires a signing key");
    };

    let mut response = Json(json!({ "csrfToken": token.as_str() })).into_response();
    let headers = response.headers_mut();
    if let Some(cookie) = csrf.cookie_header(&token) {
        headers.insert(header::SET_COOKIE, cookie);
    }
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

/// Forward the request to the upstream application.
async fn proxy_handler(State(state): State<AppState>, request: Request) -> Response {
    let (mut parts, body) = request.into_parts();

    let mut uri_parts = parts.uri.clone().into_parts();
    uri_parts.scheme = Some(Scheme::HTTP);
    uri_parts.authority = Some(state.upstream.clone());
    if uri_parts.path_and_query.is_none() {
        uri_parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    match Uri::from_parts(uri_parts) {
        Ok(uri) => parts.uri = uri,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build upstream URI");
            return response::bad_gateway();
        }
    }

    match state.client.request(Request::from_parts(parts, body)).await {
        Ok(upstream_response) => upstream_response.map(Body::new),
        Err(e) => {
            state.gateway.logger().error(
                "Upstream request failed",
                Some(&e),
                Some(json!({ "upstream": state.upstream.as_str() })),
            );
            response::bad_gateway()
        }
    }
}

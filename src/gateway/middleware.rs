//! Per-request decision sequence.

use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{uri::PathAndQuery, HeaderValue, Uri},
    middleware::Next,
    response::Response,
};
use futures_util::FutureExt;
use tracing::Instrument;

use super::{route, Gateway, GatewayInner, RouteClass};
use crate::http::request::{self, X_REQUEST_ID};
use crate::http::response;
use crate::observability::{metrics, ContextOptions, RequestContext, RequestSummary};
use crate::security::csrf;
use crate::security::rate_limit::{SlidingWindowLimiter, UNKNOWN_IDENTIFIER};

#[derive(Debug, thiserror::Error)]
#[error("handler panicked: {0}")]
struct HandlerPanic(String);

/// Axum middleware running the gateway for one request.
pub async fn gateway_middleware(
    State(gateway): State<Gateway>,
    mut request: Request,
    next: Next,
) -> Response {
    let inner = gateway.inner.clone();
    normalize_uri(&mut request);
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let headers = request.headers();

    let ctx = RequestContext::create(ContextOptions {
        request_id: headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        client_ip: request::client_ip(headers, peer, inner.trust_forwarded_for),
        user_agent: request::user_agent(headers),
        method: Some(request.method().to_string()),
        path: Some(request.uri().path().to_string()),
    });

    let span = tracing::info_span!(
        "request",
        request_id = %ctx.request_id(),
        method = %request.method(),
        path = %request.uri().path(),
    );

    ctx.clone()
        .run(handle(inner, ctx, request, next).instrument(span))
        .await
}

async fn handle(
    inner: Arc<GatewayInner>,
    ctx: RequestContext,
    mut request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let route = inner.routes.classify(&path);

    let request_id = HeaderValue::from_str(ctx.request_id()).ok();
    if let Some(id) = &request_id {
        request.headers_mut().insert(X_REQUEST_ID, id.clone());
    }

    let outcome = AssertUnwindSafe(dispatch(&inner, &ctx, route, request, next))
        .catch_unwind()
        .await;
    let mut response = match outcome {
        Ok(response) => response,
        Err(panic) => {
            let error = HandlerPanic(panic_message(panic.as_ref()));
            inner
                .logger
                .error("Unhandled panic while processing request", Some(&error), None);
            response::internal_error(ctx.request_id())
        }
    };

    if let Some(id) = request_id {
        response.headers_mut().insert(X_REQUEST_ID, id);
    }

    let status = response.status().as_u16();
    let duration = ctx.elapsed();
    inner.logger.request(&RequestSummary {
        method,
        path,
        status,
        duration,
    });
    metrics::record_request(route.as_str(), status, duration);
    response
}

async fn dispatch(
    inner: &GatewayInner,
    ctx: &RequestContext,
    route: RouteClass,
    request: Request,
    next: Next,
) -> Response {
    match route {
        RouteClass::Unmatched => next.run(request).await,

        RouteClass::PublicApi => {
            let ip = client_identifier(ctx);
            rate_limited(inner, &inner.limiters.public, &ip, request, next).await
        }

        RouteClass::AdminApi => {
            if csrf::requires_protection(request.method()) && !inner.csrf.check(request.headers())
            {
                metrics::record_csrf_rejected();
                tracing::debug!(surface = ?inner.csrf.surface(), "CSRF verification failed");
                return response::csrf_rejected();
            }

            let check = inner.auth.check_admin(request.headers()).await;
            if let Some(user) = &check.user {
                ctx.set_user_id(user.id.clone());
            }

            match check.user {
                Some(user) if check.is_admin => {
                    rate_limited(inner, &inner.limiters.admin, &user.id, request, next).await
                }
                _ => {
                    let ip = client_identifier(ctx);
                    rate_limited(inner, &inner.limiters.public, &ip, request, next).await
                }
            }
        }

        RouteClass::AdminPage => {
            let check = inner.auth.check_admin(request.headers()).await;
            if let Some(user) = &check.user {
                ctx.set_user_id(user.id.clone());
            }
            if !check.is_admin {
                let original = request
                    .uri()
                    .path_and_query()
                    .map(|pq| pq.as_str())
                    .unwrap_or("/");
                return response::login_redirect(&inner.login_path, original);
            }
            next.run(request).await
        }
    }
}

async fn rate_limited(
    inner: &GatewayInner,
    limiter: &SlidingWindowLimiter,
    identifier: &str,
    request: Request,
    next: Next,
) -> Response {
    if !inner.rate_limit_enabled {
        return next.run(request).await;
    }

    let result = limiter.check(identifier).await;
    if !result.allowed {
        metrics::record_rate_limited(limiter.name());
        return response::too_many_requests(&result, limiter.now_ms());
    }

    let mut response = next.run(request).await;
    response::insert_rate_limit_headers(response.headers_mut(), &result);
    response
}

/// Rewrite the request path to its canonical form so the upstream sees the
/// same path the gateway classified.
fn normalize_uri(request: &mut Request) {
    let uri = request.uri();
    let path = route::normalize_path(uri.path());
    if path == uri.path() {
        return;
    }

    let path_and_query = match uri.query() {
        Some(query) => format!("{}?{}", path, query),
        None => path,
    };
    let mut parts = uri.clone().into_parts();
    match PathAndQuery::try_from(path_and_query) {
        Ok(pq) => parts.path_and_query = Some(pq),
        Err(e) => {
            tracing::debug!(error = %e, "Normalized path rejected, keeping original");
            return;
        }
    }
    match Uri::from_parts(parts) {
        Ok(normalized) => *request.uri_mut() = normalized,
        Err(e) => tracing::debug!(error = %e, "Normalized URI rejected, keeping original"),
    }
}

fn client_identifier(ctx: &RequestContext) -> String {
    ctx.client_ip().unwrap_or(UNKNOWN_IDENTIFIER).to_string()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

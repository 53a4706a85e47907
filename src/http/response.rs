//! Responses produced by the gateway itself.
//!
//! # Responsibilities
//! - Policy denials (429 rate limit, 403 CSRF) with their documented bodies
//! - Rate-limit headers on both denied and forwarded responses
//! - Generic 500/502/503 bodies that never leak internal detail

use axum::{
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde_json::json;

use crate::security::RateLimitResult;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// `X-RateLimit-*` headers. Reset is in epoch seconds, rounded up.
pub fn insert_rate_limit_headers(headers: &mut HeaderMap, result: &RateLimitResult) {
    let reset_secs = (result.reset_at_ms.max(0) as u64).div_ceil(1000);
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(result.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(result.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(reset_secs));
}

/// 429 with `Retry-After` and the rate-limit headers.
pub fn too_many_requests(result: &RateLimitResult, now_ms: i64) -> Response {
    let retry_after = result.retry_after_secs(now_ms).max(1);
    let body = json!({
        "error": "Too Many Requests",
        "message": format!("Rate limit exceeded. Try again in {} seconds.", retry_after),
        "limit": result.limit,
        "remaining": result.remaining,
        "reset": result.reset_at().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
    });

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    let headers = response.headers_mut();
    insert_rate_limit_headers(headers, result);
    headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
    response
}

pub fn csrf_rejected() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({
            "ok": false,
            "error": "CSRF token validation failed",
            "code": "CSRF_ERROR",
        })),
    )
        .into_response()
}

/// Redirect to the login page, preserving where the caller was going.
pub fn login_redirect(login_path: &str, original: &str) -> Response {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("redirect", original)
        .finish();
    Redirect::temporary(&format!("{}?{}", login_path, query)).into_response()
}

pub fn internal_error(request_id: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": "Internal Server Error",
            "requestId": request_id,
        })),
    )
        .into_response()
}

pub fn bad_gateway() -> Response {
    (
        StatusCode::BAD_GATEWAY,
        Json(json!({ "error": "Bad Gateway" })),
    )
        .into_response()
}

pub fn service_unavailable(message: &str) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "error": "Service Unavailable", "message": message })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn denied() -> RateLimitResult {
        RateLimitResult {
            allowed: false,
            limit: 10,
            remaining: 0,
            reset_at_ms: 1_700_000_010_500,
        }
    }

    #[tokio::test]
    async fn rate_limit_response_shape() {
        let response = too_many_requests(&denied(), 1_700_000_002_000);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "9");
        assert_eq!(response.headers()[X_RATELIMIT_LIMIT], "10");
        assert_eq!(response.headers()[X_RATELIMIT_REMAINING], "0");
        assert_eq!(response.headers()[X_RATELIMIT_RESET], "1700000011");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"], "Too Many Requests");
        assert_eq!(body["limit"], 10);
        assert_eq!(body["remaining"], 0);
        assert_eq!(body["reset"], "2023-11-14T22:13:30.500Z");
    }

    #[tokio::test]
    async fn csrf_response_shape() {
        let response = csrf_rejected();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["ok"], false);
        assert_eq!(body["code"], "CSRF_ERROR");
    }

    #[test]
    fn login_redirect_encodes_target() {
        let response = login_redirect("/login", "/admin/users?page=2");
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            response.headers()[header::LOCATION],
            "/login?redirect=%2Fadmin%2Fusers%3Fpage%3D2"
        );
    }
}

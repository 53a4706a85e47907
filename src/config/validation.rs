//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, rates in [0, 1])
//! - Enforce production-only requirements (CSRF secret, no dev bypass)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::{GatewayConfig, RateLimitBackendKind, SampleRates, WindowPolicy};

/// Minimum CSRF signing key length in bytes.
pub const MIN_CSRF_SECRET_LEN: usize = 32;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            "must be a socket address",
        ));
    }
    if config.upstream.address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "upstream.address",
            "must be a socket address",
        ));
    }

    check_prefix(&mut errors, "routes.public_api_prefix", &config.routes.public_api_prefix);
    check_prefix(&mut errors, "routes.admin_api_prefix", &config.routes.admin_api_prefix);
    check_prefix(&mut errors, "routes.admin_page_prefix", &config.routes.admin_page_prefix);
    check_prefix(&mut errors, "routes.login_path", &config.routes.login_path);
    check_prefix(&mut errors, "csrf.issue_path", &config.csrf.issue_path);

    let rl = &config.rate_limit;
    check_policy(&mut errors, "rate_limit.public", &rl.public);
    check_policy(&mut errors, "rate_limit.admin", &rl.admin);
    if rl.backend == RateLimitBackendKind::Redis
        && rl.redis_url.as_deref().map_or(true, |u| u.trim().is_empty())
    {
        errors.push(ValidationError::new(
            "rate_limit.redis_url",
            "required when backend = \"redis\"",
        ));
    }
    if rl.backend_timeout_ms == 0 {
        errors.push(ValidationError::new(
            "rate_limit.backend_timeout_ms",
            "must be greater than 0",
        ));
    }
    if rl.memory_capacity == 0 {
        errors.push(ValidationError::new(
            "rate_limit.memory_capacity",
            "must be greater than 0",
        ));
    }
    if rl.dev_bypass && config.is_production() {
        errors.push(ValidationError::new(
            "rate_limit.dev_bypass",
            "must not be enabled in production",
        ));
    }

    match config.csrf.secret.as_deref() {
        None | Some("") if config.is_production() => errors.push(ValidationError::new(
            "csrf.secret",
            "required in production (set GATEWAY_CSRF_SECRET)",
        )),
        Some(secret) if !secret.is_empty() && secret.len() < MIN_CSRF_SECRET_LEN => {
            errors.push(ValidationError::new(
                "csrf.secret",
                format!("must be at least {} bytes", MIN_CSRF_SECRET_LEN),
            ))
        }
        _ => {}
    }
    if config.csrf.header_name.trim().is_empty() || config.csrf.cookie_name.trim().is_empty() {
        errors.push(ValidationError::new(
            "csrf",
            "cookie_name and header_name must not be empty",
        ));
    }

    if let Some(rates) = &config.logging.sample_rates {
        check_rates(&mut errors, rates);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_prefix(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if !value.starts_with('/') {
        errors.push(ValidationError::new(field, "must start with '/'"));
    }
}

fn check_policy(errors: &mut Vec<ValidationError>, field: &str, policy: &WindowPolicy) {
    if policy.max_requests == 0 {
        errors.push(ValidationError::new(
            format!("{}.max_requests", field),
            "must be greater than 0",
        ));
    }
    if policy.window_secs == 0 {
        errors.push(ValidationError::new(
            format!("{}.window_secs", field),
            "must be greater than 0",
        ));
    }
}

fn check_rates(errors: &mut Vec<ValidationError>, rates: &SampleRates) {
    for (name, rate) in [
        ("debug", rates.debug),
        ("info", rates.info),
        ("warn", rates.warn),
        ("error", rates.error),
    ] {
        if !(0.0..=1.0).contains(&rate) {
            errors.push(ValidationError::new(
                format!("logging.sample_rates.{}", name),
                "must be within [0, 1]",
            ));
        }
    }
}

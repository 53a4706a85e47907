//! Configuration loading from disk and the process environment.

use std::fs;
use std::path::Path;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid value for {var}: {reason}")]
    Env { var: &'static str, reason: String },
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: GatewayConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load the optional file, overlay the process environment, then validate.
pub fn load(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let mut config = match path {
        Some(path) => toml::from_str(&fs::read_to_string(path)?)?,
        None => GatewayConfig::default(),
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Overlay `GATEWAY_*` variables onto `config`.
///
/// `lookup` abstracts the environment so tests need not mutate process state.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("GATEWAY_ENV") {
        config.environment = v.parse().map_err(|reason| ConfigError::Env {
            var: "GATEWAY_ENV",
            reason,
        })?;
    }
    if let Some(v) = get("GATEWAY_BIND") {
        config.listener.bind_address = v;
    }
    if let Some(v) = get("GATEWAY_UPSTREAM") {
        config.upstream.address = v;
    }
    if let Some(v) = get("GATEWAY_CSRF_SECRET") {
        config.csrf.secret = Some(v);
    }
    if let Some(v) = get("GATEWAY_RATE_LIMIT_BACKEND") {
        config.rate_limit.backend = v.parse().map_err(|reason| ConfigError::Env {
            var: "GATEWAY_RATE_LIMIT_BACKEND",
            reason,
        })?;
    }
    if let Some(v) = get("GATEWAY_REDIS_URL") {
        config.rate_limit.redis_url = Some(v);
    }
    if let Some(v) = get("GATEWAY_DEV_BYPASS_RATE_LIMIT") {
        config.rate_limit.dev_bypass = parse_bool(&v).ok_or_else(|| ConfigError::Env {
            var: "GATEWAY_DEV_BYPASS_RATE_LIMIT",
            reason: format!("'{}' is not a boolean", v),
        })?;
    }
    if let Some(v) = get("GATEWAY_AUTH_URL") {
        config.auth.user_endpoint = Some(v);
    }
    if let Some(v) = get("GATEWAY_AUTH_API_KEY") {
        config.auth.api_key = Some(v);
    }
    if let Some(v) = get("GATEWAY_TELEMETRY_URL") {
        config.telemetry.endpoint = Some(v);
    }
    if let Some(v) = get("GATEWAY_LOG_FORMAT") {
        config.logging.format = Some(match v.to_ascii_lowercase().as_str() {
            "json" => crate::config::schema::LogFormat::Json,
            "pretty" => crate::config::schema::LogFormat::Pretty,
            _ => {
                return Err(ConfigError::Env {
                    var: "GATEWAY_LOG_FORMAT",
                    reason: format!("'{}' is not json or pretty", v),
                })
            }
        });
    }

    Ok(())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

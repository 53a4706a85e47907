//! Session provider adapter.
//!
//! Session validation belongs to the external auth provider. The gateway
//! only forwards the caller's session cookies and reads back a user.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

/// Projection of the provider's user record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, alias = "is_admin")]
    pub is_admin: bool,
}

impl User {
    /// Exact, case-sensitive `admin` in the role list or singular role, or
    /// the explicit flag.
    pub fn has_admin_role(&self) -> bool {
        self.is_admin
            || self.role.as_deref() == Some(ADMIN_ROLE)
            || self.roles.iter().any(|r| r == ADMIN_ROLE)
    }
}

pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("session provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("session provider returned status {0}")]
    Status(u16),
}

#[async_trait]
pub trait SessionProvider: Send + Sync + 'static {
    /// Resolve the user owning `cookies`.
    ///
    /// `Ok(None)` means the session is absent, expired or rejected.
    async fn current_user(
        &self,
        cookies: &[(String, String)],
    ) -> Result<Option<User>, ProviderError>;
}

/// Provider that never finds a session.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSessionProvider;

#[async_trait]
impl SessionProvider for NoSessionProvider {
    async fn current_user(
        &self,
        _cookies: &[(String, String)],
    ) -> Result<Option<User>, ProviderError> {
        Ok(None)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum UserReply {
    Bare(User),
    Wrapped { user: Option<User> },
}

/// Resolves users over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSessionProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpSessionProvider {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }
}

#[async_trait]
impl SessionProvider for HttpSessionProvider {
    async fn current_user(
        &self,
        cookies: &[(String, String)],
    ) -> Result<Option<User>, ProviderError> {
        if cookies.is_empty() {
            return Ok(None);
        }

        let cookie_header = cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ");

        let mut request = self
            .client
            .get(&self.endpoint)
            .header(reqwest::header::COOKIE, cookie_header);
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key);
        }

        let response = request.send().await?;
        match response.status() {
            StatusCode::OK => match response.json::<UserReply>().await? {
                UserReply::Bare(user) => Ok(Some(user)),
                UserReply::Wrapped { user } => Ok(user),
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => Ok(None),
            other => Err(ProviderError::Status(other.as_u16())),
        }
    }
}

//! Admin capability check.

use std::sync::Arc;

use axum::http::HeaderMap;

use super::provider::{SessionProvider, User};
use crate::http::request;
use crate::observability::{Breadcrumb, GatewayLogger, Severity, Telemetry};

/// Result of an admin check. Never an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminCheck {
    pub is_admin: bool,
    pub user: Option<User>,
}

impl AdminCheck {
    pub fn denied() -> Self {
        Self::default()
    }
}

#[derive(Clone)]
pub struct AuthGate {
    provider: Arc<dyn SessionProvider>,
    cookie_prefix: String,
    telemetry: Telemetry,
    logger: Option<GatewayLogger>,
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGate")
            .field("cookie_prefix", &self.cookie_prefix)
            .finish_non_exhaustive()
    }
}

impl AuthGate {
    pub fn new(
        provider: Arc<dyn SessionProvider>,
        cookie_prefix: impl Into<String>,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            provider,
            cookie_prefix: cookie_prefix.into(),
            telemetry,
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: GatewayLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Session cookies forwarded to the provider.
    pub fn session_cookies(&self, headers: &HeaderMap) -> Vec<(String, String)> {
        request::cookies(headers)
            .into_iter()
            .filter(|(name, _)| name.starts_with(&self.cookie_prefix))
            .collect()
    }

    /// Resolve the caller and decide admin capability.
    ///
    /// Provider failures count as unauthenticated.
    pub async fn check_admin(&self, headers: &HeaderMap) -> AdminCheck {
        let cookies = self.session_cookies(headers);
        if cookies.is_empty() {
            self.report_denial("no session", None);
            return AdminCheck::denied();
        }

        match self.provider.current_user(&cookies).await {
            Ok(Some(user)) if user.has_admin_role() => AdminCheck {
                is_admin: true,
                user: Some(user),
            },
            Ok(Some(user)) => {
                self.report_denial("user lacks admin role", Some(&user.id));
                AdminCheck {
                    is_admin: false,
                    user: Some(user),
                }
            }
            Ok(None) => {
                self.report_denial("session rejected", None);
                AdminCheck::denied()
            }
            Err(e) => {
                match &self.logger {
                    Some(logger) => {
                        logger.error("Session provider failed", Some(&e), None);
                    }
                    None => tracing::error!(error = %e, "Session provider failed"),
                }
                AdminCheck::denied()
            }
        }
    }

    fn report_denial(&self, reason: &str, user_id: Option<&str>) {
        tracing::debug!(reason, user_id, "Admin check denied");
        self.telemetry.add_breadcrumb(Breadcrumb {
            category: "auth".to_string(),
            message: format!("Admin check denied: {}", reason),
            level: Severity::Warning,
            data: user_id.map(|id| serde_json::json!({ "userId": id })),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::provider::ProviderError;
    use async_trait::async_trait;
    use axum::http::{header::COOKIE, HeaderValue};

    struct Scripted(Result<Option<User>, u16>);

    #[async_trait]
    impl SessionProvider for Scripted {
        async fn current_user(
            &self,
            cookies: &[(String, String)],
        ) -> Result<Option<User>, ProviderError> {
            assert!(cookies.iter().all(|(name, _)| name.starts_with("sb-")));
            match &self.0 {
                Ok(user) => Ok(user.clone()),
                Err(status) => Err(ProviderError::Status(*status)),
            }
        }
    }

    fn gate(reply: Result<Option<User>, u16>) -> AuthGate {
        AuthGate::new(Arc::new(Scripted(reply)), "sb-", Telemetry::default())
    }

    fn with_session() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; sb-access-token=abc; sb-refresh-token=def"),
        );
        headers
    }

    fn user(role: &str) -> User {
        User {
            id: "user-42".into(),
            role: Some(role.into()),
            ..User::default()
        }
    }

    #[test]
    fn only_prefixed_cookies_are_forwarded() {
        let cookies = gate(Ok(None)).session_cookies(&with_session());
        let names: Vec<_> = cookies.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["sb-access-token", "sb-refresh-token"]);
    }

    #[tokio::test]
    async fn admin_user_is_admin() {
        let check = gate(Ok(Some(user("admin")))).check_admin(&with_session()).await;
        assert!(check.is_admin);
        assert_eq!(check.user.unwrap().id, "user-42");
    }

    #[tokio::test]
    async fn non_admin_keeps_user() {
        let check = gate(Ok(Some(user("Admin")))).check_admin(&with_session()).await;
        assert!(!check.is_admin);
        assert!(check.user.is_some());
    }

    #[tokio::test]
    async fn provider_error_is_unauthenticated() {
        let check = gate(Err(500)).check_admin(&with_session()).await;
        assert_eq!(check, AdminCheck::denied());
    }

    #[tokio::test]
    async fn no_cookies_skips_provider() {
        let check = gate(Err(500)).check_admin(&HeaderMap::new()).await;
        assert_eq!(check, AdminCheck::denied());
    }
}

//! Per-request context propagation.
//!
//! A [`RequestContext`] is created at ingress and made implicitly available to
//! everything awaited inside [`RequestContext::run`] through a Tokio task-local.
//! Tasks spawned with `tokio::spawn` do not inherit it, so concurrent requests
//! never observe each other's context. Outside a scope [`RequestContext::current`]
//! returns `None` and correlation fields are simply omitted.

use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use uuid::Uuid;

tokio::task_local! {
    static CURRENT: RequestContext;
}

/// Longest client-supplied request id that is reused verbatim.
const MAX_REQUEST_ID_LEN: usize = 128;

/// Inputs for [`RequestContext::create`].
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    /// Reused when it is a well-formed id, otherwise a UUID v4 is generated.
    pub request_id: Option<String>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub method: Option<String>,
    pub path: Option<String>,
}

#[derive(Debug)]
struct ContextInner {
    request_id: String,
    user_id: OnceLock<String>,
    client_ip: Option<String>,
    user_agent: Option<String>,
    method: Option<String>,
    path: Option<String>,
    start_time_ms: i64,
    started: Instant,
}

/// Metadata for one in-flight request. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RequestContext {
    inner: Arc<ContextInner>,
}

impl RequestContext {
    pub fn create(options: ContextOptions) -> Self {
        let request_id = options
            .request_id
            .as_deref()
            .and_then(accept_request_id)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            inner: Arc::new(ContextInner {
                request_id,
                user_id: OnceLock::new(),
                client_ip: options.client_ip,
                user_agent: options.user_agent,
                method: options.method,
                path: options.path,
                start_time_ms: chrono::Utc::now().timestamp_millis(),
                started: Instant::now(),
            }),
        }
    }

    /// Run `fut` with this context retrievable through [`RequestContext::current`].
    pub async fn run<F>(self, fut: F) -> F::Output
    where
        F: Future,
    {
        CURRENT.scope(self, fut).await
    }

    /// Synchronous counterpart of [`RequestContext::run`].
    pub fn run_sync<R>(self, f: impl FnOnce() -> R) -> R {
        CURRENT.sync_scope(self, f)
    }

    /// The context of the enclosing scope, if any.
    pub fn current() -> Option<RequestContext> {
        CURRENT.try_with(Clone::clone).ok()
    }

    /// Record the authenticated user. Only the first call has any effect.
    pub fn set_user_id(&self, user_id: impl Into<String>) -> bool {
        self.inner.user_id.set(user_id.into()).is_ok()
    }

    pub fn request_id(&self) -> &str {
        &self.inner.request_id
    }

    pub fn user_id(&self) -> Option<&str> {
        self.inner.user_id.get().map(String::as_str)
    }

    pub fn client_ip(&self) -> Option<&str> {
        self.inner.client_ip.as_deref()
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.inner.user_agent.as_deref()
    }

    pub fn method(&self) -> Option<&str> {
        self.inner.method.as_deref()
    }

    pub fn path(&self) -> Option<&str> {
        self.inner.path.as_deref()
    }

    pub fn start_time_ms(&self) -> i64 {
        self.inner.start_time_ms
    }

    pub fn elapsed(&self) -> Duration {
        self.inner.started.elapsed()
    }
}

fn accept_request_id(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let well_formed = !raw.is_empty()
        && raw.len() <= MAX_REQUEST_ID_LEN
        && raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
    well_formed.then(|| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_id_when_missing_or_malformed() {
        let ctx = RequestContext::create(ContextOptions::default());
        assert_eq!(ctx.request_id().len(), 36);

        let ctx = RequestContext::create(ContextOptions {
            request_id: Some("bad id\r\n".into()),
            ..Default::default()
        });
        assert_ne!(ctx.request_id(), "bad id\r\n");

        let ctx = RequestContext::create(ContextOptions {
            request_id: Some("edge-42.a_b".into()),
            ..Default::default()
        });
        assert_eq!(ctx.request_id(), "edge-42.a_b");
    }

    #[test]
    fn user_id_is_set_at_most_once() {
        let ctx = RequestContext::create(ContextOptions::default());
        assert!(ctx.user_id().is_none());
        assert!(ctx.set_user_id("u-1"));
        assert!(!ctx.set_user_id("u-2"));
        assert_eq!(ctx.user_id(), Some("u-1"));
    }

    #[test]
    fn current_is_none_outside_scope() {
        assert!(RequestContext::current().is_none());
        let ctx = RequestContext::create(ContextOptions::default());
        let id = ctx.request_id().to_string();
        let seen = ctx.run_sync(|| RequestContext::current().map(|c| c.request_id().to_string()));
        assert_eq!(seen, Some(id));
        assert!(RequestContext::current().is_none());
    }

    #[tokio::test]
    async fn survives_await_points() {
        let ctx = RequestContext::create(ContextOptions {
            request_id: Some("req-1".into()),
            ..Default::default()
        });
        let seen = ctx
            .run(async {
                tokio::task::yield_now().await;
                tokio::time::sleep(Duration::from_millis(1)).await;
                RequestContext::current().map(|c| c.request_id().to_string())
            })
            .await;
        assert_eq!(seen.as_deref(), Some("req-1"));
    }

    #[tokio::test]
    async fn concurrent_scopes_are_isolated() {
        let mut handles = Vec::new();
        for i in 0..16 {
            handles.push(tokio::spawn(async move {
                let ctx = RequestContext::create(ContextOptions {
                    request_id: Some(format!("req-{}", i)),
                    ..Default::default()
                });
                ctx.run(async move {
                    for _ in 0..5 {
                        tokio::task::yield_now().await;
                        let current = RequestContext::current().unwrap();
                        assert_eq!(current.request_id(), format!("req-{}", i));
                    }
                })
                .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn spawned_tasks_do_not_inherit() {
        let ctx = RequestContext::create(ContextOptions::default());
        let inherited = ctx
            .run(async { tokio::spawn(async { RequestContext::current().is_some() }).await })
            .await
            .unwrap();
        assert!(!inherited);
    }
}

//! Request-scoped context available to tool handlers
//!
//! The dispatcher builds a [`RequestContext`] from `params._meta` and scopes
//! it around the handler future with a task-local, so tool code can reach
//! the session, the progress token, and the raw meta without threading them
//! through every signature.

use serde_json::{Value, json};
use std::sync::Arc;

use rapidmcp_protocol::{McpResult, RequestId, types::meta};

use crate::session::{Session, SessionManager};

tokio::task_local! {
    static CURRENT: RequestContext;
}

/// Context injected per dispatched request
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Id of the request being handled, if any
    pub request_id: Option<RequestId>,
    /// Session the request arrived on, if the transport injected one
    pub session: Option<Arc<Session>>,
    /// Progress token from `params._meta.progressToken`
    pub progress_token: Option<Value>,
    /// Raw `_meta` mapping as received
    pub meta: Option<Value>,
}

impl RequestContext {
    /// Build a context from request params and the session table
    ///
    /// The transport injects `_meta.session_id`; the dispatcher never
    /// overrides an existing value.
    pub fn from_params(
        request_id: Option<RequestId>,
        params: &Value,
        sessions: &SessionManager,
    ) -> Self {
        let meta_value = params.get("_meta").cloned();
        let session = meta_value
            .as_ref()
            .and_then(|m| m.get(meta::SESSION_ID))
            .and_then(Value::as_str)
            .and_then(|id| sessions.get(id));
        let progress_token = meta_value
            .as_ref()
            .and_then(|m| m.get(meta::PROGRESS_TOKEN))
            .cloned();
        Self {
            request_id,
            session,
            progress_token,
            meta: meta_value,
        }
    }

    /// The context of the currently executing handler, if inside one
    pub fn current() -> Option<RequestContext> {
        CURRENT.try_with(RequestContext::clone).ok()
    }

    /// Run a future with this context installed as the current one
    pub async fn scope<F>(context: RequestContext, fut: F) -> F::Output
    where
        F: std::future::Future,
    {
        CURRENT.scope(context, fut).await
    }

    /// Session id, when a session is attached
    pub fn session_id(&self) -> Option<&str> {
        self.session.as_deref().map(Session::session_id)
    }

    /// Emit a `notifications/progress` update using the caller's token
    ///
    /// No-op when the request carried no progress token or no session.
    pub fn send_progress(&self, progress: f64, total: Option<f64>) -> McpResult<()> {
        let (Some(session), Some(token)) = (&self.session, &self.progress_token) else {
            return Ok(());
        };
        let mut params = json!({
            "progressToken": token,
            "progress": progress,
        });
        if let Some(total) = total {
            params["total"] = json!(total);
        }
        session.send_notification("notifications/progress", params)
    }

    /// Emit a `notifications/message` log entry on the session
    pub fn send_log(&self, level: &str, data: Value) -> McpResult<()> {
        let Some(session) = &self.session else {
            return Ok(());
        };
        session.send_notification(
            "notifications/message",
            json!({ "level": level, "data": data }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn context_reads_meta_fields() {
        let sessions = SessionManager::new(10);
        let session = Arc::new(Session::detached("abc"));
        sessions.insert(Arc::clone(&session));

        let params = json!({
            "name": "tool",
            "_meta": {
                "session_id": "abc",
                "progressToken": "tok-1",
                "custom": {"k": "v"},
            }
        });
        let ctx = RequestContext::from_params(Some(RequestId::from(7)), &params, &sessions);
        assert_eq!(ctx.session_id(), Some("abc"));
        assert_eq!(ctx.progress_token, Some(json!("tok-1")));
        assert_eq!(ctx.meta.as_ref().unwrap()["custom"], json!({"k": "v"}));
        assert_eq!(ctx.request_id, Some(RequestId::Number(7)));
    }

    #[tokio::test]
    async fn current_is_visible_only_inside_scope() {
        assert!(RequestContext::current().is_none());

        let ctx = RequestContext {
            request_id: Some(RequestId::from("r1")),
            ..Default::default()
        };
        let seen = RequestContext::scope(ctx, async {
            RequestContext::current().and_then(|c| c.request_id)
        })
        .await;
        assert_eq!(seen, Some(RequestId::from("r1")));

        assert!(RequestContext::current().is_none());
    }

    #[test]
    fn progress_without_token_is_noop() {
        let ctx = RequestContext::default();
        assert!(ctx.send_progress(0.5, Some(1.0)).is_ok());
    }
}

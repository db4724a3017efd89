//! Declarative description of one logical API call.

use crate::client::error_classification::UnauthorizedPolicy;
use crate::transport::JSON_CONTENT_TYPE;
use crate::types::{Download, Reply};
use bytes::Bytes;
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Hook run around every network attempt.
pub type LifecycleHook = Box<dyn FnMut() + Send>;
/// Terminal callback receiving the final reply.
pub type ReplyHandler = Box<dyn FnOnce(Reply) + Send>;
pub type DownloadHandler = Box<dyn FnOnce(Download) + Send>;

/// Request body. JSON values are serialized only for JSON content types.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Json(Value),
    Raw(Bytes),
}

impl Body {
    pub(crate) fn encode(&self, content_type: &str) -> Bytes {
        match self {
            Body::Raw(bytes) => bytes.clone(),
            Body::Json(Value::String(text)) if !is_json(content_type) => {
                Bytes::from(text.clone())
            }
            Body::Json(value) => Bytes::from(value.to_string()),
        }
    }
}

pub(crate) fn is_json(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|essence| essence.trim().eq_ignore_ascii_case(JSON_CONTENT_TYPE))
        .unwrap_or(false)
}

/// Everything the executor needs for one call: the request, how to treat it, and
/// where to report.
///
/// Built with the fluent setters and consumed by [`crate::ApiClient::call`].
pub struct CallDescriptor {
    pub(crate) url: String,
    pub(crate) method: Method,
    pub(crate) content_type: String,
    pub(crate) body: Option<Body>,
    pub(crate) allow_cache: bool,
    pub(crate) reload_on_unauthorized: bool,
    pub(crate) retry_after: Option<Duration>,
    pub(crate) cancel: Option<CancellationToken>,
    pub(crate) on_enter: Option<LifecycleHook>,
    pub(crate) on_exit: Option<LifecycleHook>,
    pub(crate) on_success: Option<ReplyHandler>,
    pub(crate) on_failure: Option<ReplyHandler>,
    pub(crate) on_finalize: Option<ReplyHandler>,
}

impl CallDescriptor {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            content_type: JSON_CONTENT_TYPE.to_string(),
            body: None,
            allow_cache: false,
            reload_on_unauthorized: true,
            retry_after: None,
            cancel: None,
            on_enter: None,
            on_exit: None,
            on_success: None,
            on_failure: None,
            on_finalize: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(Body::Json(body));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(Body::Raw(body.into()));
        self
    }

    /// Serve from and store into the session response cache.
    pub fn allow_cache(mut self, allow: bool) -> Self {
        self.allow_cache = allow;
        self
    }

    /// When false, a 401 goes through the failure path instead of reloading.
    pub fn reload_on_unauthorized(mut self, reload: bool) -> Self {
        self.reload_on_unauthorized = reload;
        self
    }

    /// Delay before the first retry, instead of the client's default.
    pub fn retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }

    /// Once `token` is cancelled no further attempt is made and no callback runs.
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn on_enter(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.on_enter = Some(Box::new(hook));
        self
    }

    pub fn on_exit(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.on_exit = Some(Box::new(hook));
        self
    }

    pub fn on_success(mut self, handler: impl FnOnce(Reply) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(handler));
        self
    }

    pub fn on_failure(mut self, handler: impl FnOnce(Reply) + Send + 'static) -> Self {
        self.on_failure = Some(Box::new(handler));
        self
    }

    pub fn on_finalize(mut self, handler: impl FnOnce(Reply) + Send + 'static) -> Self {
        self.on_finalize = Some(Box::new(handler));
        self
    }

    pub(crate) fn unauthorized_policy(&self) -> UnauthorizedPolicy {
        if self.reload_on_unauthorized {
            UnauthorizedPolicy::Reload
        } else {
            UnauthorizedPolicy::Fail
        }
    }
}

impl std::fmt::Debug for CallDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallDescriptor")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("content_type", &self.content_type)
            .field("allow_cache", &self.allow_cache)
            .field("reload_on_unauthorized", &self.reload_on_unauthorized)
            .finish_non_exhaustive()
    }
}

/// A binary download. Never cached; a 401 always reloads.
pub struct DownloadDescriptor {
    pub(crate) url: String,
    pub(crate) retry_after: Option<Duration>,
    pub(crate) cancel: Option<CancellationToken>,
    pub(crate) on_enter: Option<LifecycleHook>,
    pub(crate) on_exit: Option<LifecycleHook>,
    pub(crate) on_success: Option<DownloadHandler>,
    pub(crate) on_failure: Option<ReplyHandler>,
}

impl DownloadDescriptor {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            retry_after: None,
            cancel: None,
            on_enter: None,
            on_exit: None,
            on_success: None,
            on_failure: None,
        }
    }

    pub fn retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn on_enter(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.on_enter = Some(Box::new(hook));
        self
    }

    pub fn on_exit(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.on_exit = Some(Box::new(hook));
        self
    }

    pub fn on_success(mut self, handler: impl FnOnce(Download) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(handler));
        self
    }

    pub fn on_failure(mut self, handler: impl FnOnce(Reply) + Send + 'static) -> Self {
        self.on_failure = Some(Box::new(handler));
        self
    }
}

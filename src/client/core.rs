use crate::cache::ResponseCache;
use crate::client::policy::Backoff;
use crate::quota::{self, QuotaStore};
use crate::shell::{MessageCatalog, MessageKey, Notifier, Shell};
use crate::storage::Storage;
use crate::transport::{ApiRequest, RawResponse, Transport};
use crate::types::{Reply, ResponseEnvelope, SyntheticCause};
use arc_swap::ArcSwap;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, SET_COOKIE};
use reqwest::Method;
use std::sync::Arc;
use tracing::debug;

pub const XSRF_HEADER: &str = "x-xsrf-token";
pub const XSRF_COOKIE: &str = "XSRF-TOKEN";

/// API client for the triage platform.
///
/// Cheap to clone; clones share the transport, storage areas and collaborators.
#[derive(Clone)]
pub struct ApiClient {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) cache: Arc<ResponseCache>,
    pub(crate) durable: Arc<dyn Storage>,
    pub(crate) quota: Arc<dyn QuotaStore>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) shell: Arc<dyn Shell>,
    pub(crate) messages: Arc<dyn MessageCatalog>,
    pub(crate) backoff: Backoff,
    pub(crate) bootstrap_path: String,
    pub(crate) xsrf_token: Arc<ArcSwap<String>>,
    pub(crate) server_version: Arc<ArcSwap<String>>,
}

/// What one network attempt produced, before validation.
pub(crate) enum Exchanged {
    /// Body decoded as JSON; `None` when it is not an envelope.
    Decoded(Option<ResponseEnvelope>),
    Synthesized(SyntheticCause),
}

pub(crate) struct Exchange {
    pub headers: Option<HeaderMap>,
    pub result: Exchanged,
}

impl ApiClient {
    pub fn builder() -> crate::client::builder::ApiClientBuilder {
        crate::client::builder::ApiClientBuilder::new()
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn session_storage(&self) -> &Arc<dyn Storage> {
        self.cache.storage()
    }

    pub fn durable_storage(&self) -> &Arc<dyn Storage> {
        &self.durable
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Version reported in synthesized envelopes.
    pub fn server_version(&self) -> String {
        (**self.server_version.load()).clone()
    }

    pub fn xsrf_token(&self) -> String {
        (**self.xsrf_token.load()).clone()
    }

    pub fn set_xsrf_token(&self, token: impl Into<String>) {
        self.xsrf_token.store(Arc::new(token.into()));
    }

    pub(crate) fn set_server_version(&self, version: impl Into<String>) {
        self.server_version.store(Arc::new(version.into()));
    }

    pub(crate) fn build_request(
        &self,
        method: &Method,
        url: &str,
        content_type: Option<&str>,
        body: Option<Bytes>,
    ) -> ApiRequest {
        let mut headers = HeaderMap::new();
        if let Some(ct) = content_type.and_then(|ct| HeaderValue::from_str(ct).ok()) {
            headers.insert(CONTENT_TYPE, ct);
        }
        let token = self.xsrf_token();
        if let Ok(value) = HeaderValue::from_str(&token) {
            headers.insert(HeaderName::from_static(XSRF_HEADER), value);
        }
        ApiRequest {
            method: method.clone(),
            url: url.to_string(),
            headers,
            body,
        }
    }

    /// Send `request` and keep the raw response, or `None` on transport failure.
    pub(crate) async fn send(&self, request: &ApiRequest) -> Option<RawResponse> {
        match self.transport.send(request).await {
            Ok(resp) => {
                self.capture_xsrf(&resp.headers);
                Some(resp)
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "transport failure");
                None
            }
        }
    }

    /// One attempt: send, then decode unless the gateway reported 502.
    pub(crate) async fn exchange(&self, request: &ApiRequest) -> Exchange {
        let Some(resp) = self.send(request).await else {
            return Exchange {
                headers: None,
                result: Exchanged::Synthesized(SyntheticCause::Transport),
            };
        };
        let headers = resp.headers.clone();
        let result = self.decode(resp).await;
        Exchange {
            headers: Some(headers),
            result,
        }
    }

    pub(crate) async fn decode(&self, resp: RawResponse) -> Exchanged {
        if resp.status == 502 {
            return Exchanged::Synthesized(SyntheticCause::Unreachable);
        }
        let status = resp.status;
        let body = match resp.bytes().await {
            Ok(body) => body,
            Err(e) => {
                debug!(http_status = status, error = %e, "failed to read response body");
                return Exchanged::Synthesized(SyntheticCause::Transport);
            }
        };
        match serde_json::from_slice::<serde_json::Value>(&body) {
            Ok(value) => Exchanged::Decoded(ResponseEnvelope::from_value(value)),
            Err(e) => {
                debug!(http_status = status, error = %e, "response body is not JSON");
                Exchanged::Synthesized(SyntheticCause::Transport)
            }
        }
    }

    /// Report quota headers, then turn the attempt into a reply. `None` means the
    /// response was not a usable envelope.
    pub(crate) fn settle(&self, exchange: Exchange) -> Option<Reply> {
        if let Some(headers) = &exchange.headers {
            quota::observe(headers, self.quota.as_ref());
        }
        match exchange.result {
            Exchanged::Decoded(envelope) => envelope.map(Reply::Server),
            Exchanged::Synthesized(cause) => Some(self.synthesize(cause)),
        }
    }

    pub(crate) fn synthesize(&self, cause: SyntheticCause) -> Reply {
        let (status, key) = match cause {
            SyntheticCause::Unreachable => (502, MessageKey::Unreachable),
            SyntheticCause::Transport => (400, MessageKey::Invalid),
        };
        Reply::Synthesized {
            cause,
            envelope: ResponseEnvelope::synthesized(
                status,
                self.messages.message(key),
                self.server_version(),
            ),
        }
    }

    pub(crate) fn notify_invalid(&self, duration: Option<std::time::Duration>) {
        self.notifier
            .show_error(&self.messages.message(MessageKey::Invalid), duration);
    }

    /// Pick up a refreshed XSRF token from `Set-Cookie`.
    fn capture_xsrf(&self, headers: &HeaderMap) {
        for value in headers.get_all(SET_COOKIE) {
            let Ok(cookie) = value.to_str() else { continue };
            let pair = cookie.split(';').next().unwrap_or_default().trim();
            if let Some((name, token)) = pair.split_once('=') {
                if name.trim() == XSRF_COOKIE && !token.is_empty() {
                    self.set_xsrf_token(token.trim());
                }
            }
        }
    }
}

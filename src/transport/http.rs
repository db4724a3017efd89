use super::{ApiRequest, RawResponse, Transport, TransportError};
use crate::config::ClientConfig;
use crate::Result;
use async_trait::async_trait;
use futures::TryStreamExt;
use keyring::Entry;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::Proxy;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const KEYRING_SERVICE: &str = "triage-client";

#[derive(Clone)]
struct ApiKey {
    user: HeaderValue,
    key: HeaderValue,
}

/// reqwest-backed transport.
///
/// Cookies live in a jar scoped by domain, so session cookies only travel back to
/// the server that set them. API-key headers are only attached to requests whose
/// origin matches the base URL.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<ApiKey>,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)?;

        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout())
            .cookie_provider(Arc::new(Jar::default()))
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(Some(Duration::from_secs(config.pool_idle_timeout_secs)));

        if let Some(proxy_url) = &config.proxy_url {
            if let Ok(proxy) = Proxy::all(proxy_url) {
                builder = builder.proxy(proxy);
            }
        }

        let client = builder
            .build()
            .map_err(|e| crate::Error::Transport(TransportError::Http(e)))?;

        let api_key = config.api_user.as_deref().and_then(Self::get_api_key);

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    fn get_api_key(user: &str) -> Option<ApiKey> {
        // 1. Try Keyring
        let key = Entry::new(KEYRING_SERVICE, user)
            .ok()
            .and_then(|entry| entry.get_password().ok())
            // 2. Try Environment Variable
            .or_else(|| env::var("TRIAGE_APIKEY").ok())?;
        Some(ApiKey {
            user: HeaderValue::from_str(user).ok()?,
            key: HeaderValue::from_str(&key).ok()?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn resolve(&self, url: &str) -> std::result::Result<Url, TransportError> {
        self.base_url.join(url).map_err(|source| TransportError::Url {
            url: url.to_string(),
            source,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> std::result::Result<RawResponse, TransportError> {
        let url = self.resolve(&request.url)?;
        let same_origin = url.origin() == self.base_url.origin();

        let mut req = self
            .client
            .request(request.method.clone(), url)
            .headers(request.headers.clone());

        if same_origin {
            if let Some(api_key) = &self.api_key {
                req = req
                    .header(HeaderName::from_static("x-user"), api_key.user.clone())
                    .header(HeaderName::from_static("x-apikey"), api_key.key.clone());
            }
        }

        if let Some(body) = &request.body {
            req = req.body(body.clone());
        }

        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let body = resp
            .bytes_stream()
            .map_err(|e| crate::Error::Transport(TransportError::Http(e)));

        Ok(RawResponse {
            status,
            headers,
            body: Box::pin(body),
        })
    }
}

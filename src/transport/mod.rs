//! Network transport abstraction.
//!
//! The executor only needs "send one request, get status, headers and a body
//! stream". [`HttpTransport`] does that over reqwest; tests plug in scripted
//! implementations.

mod http;

pub use http::HttpTransport;

use crate::BoxStream;
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use reqwest::header::HeaderMap;
use reqwest::Method;

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A fully built outbound request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Absolute, or relative to the transport's base URL.
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// Status, headers and the not-yet-read body of a response.
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: BoxStream<'static, Bytes>,
}

impl RawResponse {
    /// Response with an in-memory body; handy for transports that are not HTTP.
    pub fn from_bytes(status: u16, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self {
            status,
            headers,
            body: Box::pin(futures::stream::once(async move { Ok(body) })),
        }
    }

    /// Read the whole body.
    pub async fn bytes(self) -> crate::Result<Bytes> {
        let chunks: Vec<Bytes> = self.body.try_collect().await?;
        if chunks.len() == 1 {
            return Ok(chunks.into_iter().next().unwrap_or_default());
        }
        let mut out = Vec::with_capacity(chunks.iter().map(Bytes::len).sum());
        for chunk in chunks {
            out.extend_from_slice(&chunk);
        }
        Ok(Bytes::from(out))
    }
}

impl std::fmt::Debug for RawResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse, TransportError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid request URL {url}: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Transport error: {0}")]
    Other(String),
}

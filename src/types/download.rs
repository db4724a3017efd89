use crate::BoxStream;
use bytes::Bytes;
use futures::TryStreamExt;
use std::fmt;

/// A successful binary download: metadata from the response headers plus the
/// body, still streaming.
pub struct Download {
    pub filename: Option<String>,
    pub size: Option<u64>,
    pub content_type: Option<String>,
    pub server_version: String,
    pub body: BoxStream<'static, Bytes>,
}

impl Download {
    /// Drain the body into memory.
    pub async fn bytes(self) -> crate::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.size.unwrap_or(0).min(64 * 1024 * 1024) as usize);
        let mut body = self.body;
        while let Some(chunk) = body.try_next().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }
}

impl fmt::Debug for Download {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Download")
            .field("filename", &self.filename)
            .field("size", &self.size)
            .field("content_type", &self.content_type)
            .field("server_version", &self.server_version)
            .finish_non_exhaustive()
    }
}

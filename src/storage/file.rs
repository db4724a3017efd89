use super::Storage;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    items: Vec<(String, String)>,
}

/// Durable storage area persisted as a single JSON document.
///
/// Every mutation rewrites the file; the lock is held across the write so the
/// file always reflects the latest in-memory state.
pub struct FileStorage {
    path: PathBuf,
    doc: Mutex<Document>,
}

impl FileStorage {
    /// Open (or lazily create) `<dir>/<name>.json`.
    pub async fn open(dir: impl AsRef<Path>, name: &str) -> Result<Self> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{name}.json"));
        let doc = match tokio::fs::read(&path).await {
            Ok(raw) => serde_json::from_slice(&raw).map_err(|e| {
                Error::storage_with_context(
                    format!("corrupt storage file: {e}"),
                    ErrorContext::new()
                        .with_details(path.display().to_string())
                        .with_source("file_storage"),
                )
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Document::default(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), entries = doc.items.len(), "opened file storage");
        Ok(Self {
            path,
            doc: Mutex::new(doc),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, doc: &Document) -> Result<()> {
        let raw = serde_json::to_vec_pretty(doc)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, raw).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let doc = self.doc.lock().await;
        Ok(doc
            .items
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut doc = self.doc.lock().await;
        match doc.items.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => doc.items.push((key.to_string(), value.to_string())),
        }
        self.persist(&doc).await
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let mut doc = self.doc.lock().await;
        let before = doc.items.len();
        doc.items.retain(|(k, _)| k != key);
        if doc.items.len() == before {
            return Ok(false);
        }
        self.persist(&doc).await?;
        Ok(true)
    }

    async fn clear(&self) -> Result<()> {
        let mut doc = self.doc.lock().await;
        doc.items.clear();
        self.persist(&doc).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let doc = self.doc.lock().await;
        Ok(doc.items.iter().map(|(k, _)| k.clone()).collect())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

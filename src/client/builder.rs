use crate::cache::ResponseCache;
use crate::client::core::ApiClient;
use crate::client::policy::Backoff;
use crate::config::ClientConfig;
use crate::quota::{InMemoryQuotaStore, QuotaStore};
use crate::shell::{EnglishMessages, HeadlessShell, MessageCatalog, Notifier, Shell};
use crate::storage::{FileStorage, MemoryStorage, Storage};
use crate::transport::{HttpTransport, Transport};
use crate::Result;
use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Builder for [`ApiClient`].
///
/// Every collaborator has a default, so `ApiClient::builder().build().await` gives
/// a working headless client against `http://localhost`.
pub struct ApiClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    session_storage: Option<Arc<dyn Storage>>,
    durable_storage: Option<Arc<dyn Storage>>,
    quota: Option<Arc<dyn QuotaStore>>,
    notifier: Option<Arc<dyn Notifier>>,
    shell: Option<Arc<dyn Shell>>,
    messages: Option<Arc<dyn MessageCatalog>>,
}

impl ApiClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            transport: None,
            session_storage: None,
            durable_storage: None,
            quota: None,
            notifier: None,
            shell: None,
            messages: None,
        }
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Shorthand for setting `base_url` on the current config.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    /// Replace the HTTP transport, mostly for tests.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Storage area backing the response cache. Cleared on sign-out.
    pub fn session_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.session_storage = Some(storage);
        self
    }

    /// Storage that outlives the session (login parameters).
    pub fn durable_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.durable_storage = Some(storage);
        self
    }

    pub fn quota_store(mut self, quota: Arc<dyn QuotaStore>) -> Self {
        self.quota = Some(quota);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn shell(mut self, shell: Arc<dyn Shell>) -> Self {
        self.shell = Some(shell);
        self
    }

    pub fn messages(mut self, messages: Arc<dyn MessageCatalog>) -> Self {
        self.messages = Some(messages);
        self
    }

    /// Build the client.
    pub async fn build(self) -> Result<ApiClient> {
        let config = self.config;
        config.validate()?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => Arc::new(HttpTransport::new(&config)?),
        };

        let session = self
            .session_storage
            .unwrap_or_else(|| Arc::new(MemoryStorage::new(config.session_storage_bytes)));

        let durable: Arc<dyn Storage> = match (self.durable_storage, &config.state_dir) {
            (Some(s), _) => s,
            (None, Some(dir)) => Arc::new(FileStorage::open(dir, "durable").await?),
            (None, None) => Arc::new(MemoryStorage::unbounded()),
        };
        debug!(
            session = session.name(),
            durable = durable.name(),
            base_url = %config.base_url,
            "building api client"
        );

        Ok(ApiClient {
            transport,
            cache: Arc::new(ResponseCache::new(session)),
            durable,
            quota: self
                .quota
                .unwrap_or_else(|| Arc::new(InMemoryQuotaStore::new())),
            notifier: self.notifier.unwrap_or_else(crate::shell::tracing_notifier),
            shell: self.shell.unwrap_or_else(|| Arc::new(HeadlessShell::new())),
            messages: self.messages.unwrap_or_else(|| Arc::new(EnglishMessages)),
            backoff: Backoff::new(
                Duration::from_millis(config.initial_retry_ms),
                Duration::from_millis(config.max_retry_ms),
            ),
            bootstrap_path: config.bootstrap_path.clone(),
            xsrf_token: Arc::new(ArcSwap::from_pointee(
                config.xsrf_token.clone().unwrap_or_default(),
            )),
            server_version: Arc::new(ArcSwap::from_pointee(config.server_version.clone())),
        })
    }
}

impl Default for ApiClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

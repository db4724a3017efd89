//! Client configuration: YAML file, environment overrides, defaults.

use crate::{Error, ErrorContext, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BOOTSTRAP_PATH: &str = "/api/v4/user/whoami/";
pub const DEFAULT_SERVER_VERSION: &str = "4.5.0.0";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Origin every relative call URL is resolved against.
    pub base_url: String,
    pub bootstrap_path: String,
    pub timeout_secs: u64,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout_secs: u64,
    pub proxy_url: Option<String>,
    /// Used until the server sets an `XSRF-TOKEN` cookie.
    pub xsrf_token: Option<String>,
    /// When set, `x-user`/`x-apikey` headers are sent on same-origin requests. The key
    /// comes from the system keyring or `TRIAGE_APIKEY`.
    pub api_user: Option<String>,
    pub initial_retry_ms: u64,
    pub max_retry_ms: u64,
    /// Byte quota of the session storage area backing the response cache.
    pub session_storage_bytes: usize,
    /// Directory for durable client state. In-memory when unset.
    pub state_dir: Option<PathBuf>,
    /// Server version reported in synthesized envelopes until bootstrap learns the real one.
    pub server_version: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost".to_string(),
            bootstrap_path: DEFAULT_BOOTSTRAP_PATH.to_string(),
            timeout_secs: 30,
            pool_max_idle_per_host: 32,
            pool_idle_timeout_secs: 90,
            proxy_url: None,
            xsrf_token: None,
            api_user: None,
            initial_retry_ms: 32,
            max_retry_ms: 10_000,
            session_storage_bytes: 5 * 1024 * 1024,
            state_dir: None,
            server_version: DEFAULT_SERVER_VERSION.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: ClientConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&text)
    }

    /// Defaults overlaid with `TRIAGE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Environment variables win over file values.
    pub fn apply_env(&mut self) {
        if let Ok(url) = env::var("TRIAGE_BASE_URL") {
            self.base_url = url;
        }
        if let Some(secs) = env::var("TRIAGE_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            self.timeout_secs = secs;
        }
        if let Ok(proxy) = env::var("TRIAGE_PROXY_URL") {
            self.proxy_url = Some(proxy);
        }
        if let Ok(token) = env::var("TRIAGE_XSRF_TOKEN") {
            self.xsrf_token = Some(token);
        }
        if let Ok(user) = env::var("TRIAGE_API_USER") {
            self.api_user = Some(user);
        }
        if let Ok(dir) = env::var("TRIAGE_STATE_DIR") {
            self.state_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.base_url).map_err(|e| {
            Error::configuration_with_context(
                format!("base_url is not an absolute URL: {e}"),
                ErrorContext::new()
                    .with_field_path("base_url")
                    .with_details(self.base_url.clone())
                    .with_source("client_config"),
            )
        })?;
        if self.initial_retry_ms == 0 || self.initial_retry_ms > self.max_retry_ms {
            return Err(Error::configuration_with_context(
                "initial_retry_ms must be positive and not above max_retry_ms",
                ErrorContext::new()
                    .with_field_path("initial_retry_ms")
                    .with_details(format!(
                        "initial={} max={}",
                        self.initial_retry_ms, self.max_retry_ms
                    ))
                    .with_source("client_config"),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

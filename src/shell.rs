//! Collaborators the client reports to instead of acting on the UI itself.
//!
//! | Trait | Default | Receives |
//! |-------|---------|----------|
//! | [`Notifier`] | [`TracingNotifier`] | user-visible error notifications |
//! | [`Shell`] | [`HeadlessShell`] | top-level view switches and reload requests |
//! | [`SessionSink`] | [`SessionState`] | bootstrap results (user, configuration, login options) |
//! | [`MessageCatalog`] | [`EnglishMessages`] | human-readable text for synthesized errors |

use crate::types::{AppView, Configuration, LoginParams, WhoAmI};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{info, warn};

/// Duration used for notifications that must stay up while the client keeps retrying.
pub const PERSISTENT_NOTIFICATION: Duration = Duration::from_secs(30);

pub trait Notifier: Send + Sync {
    /// Show an error. `None` means the notifier's default duration.
    fn show_error(&self, message: &str, duration: Option<Duration>);
    /// Close whatever notification is currently shown.
    fn dismiss(&self);
}

/// Notifier that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn show_error(&self, message: &str, duration: Option<Duration>) {
        warn!(
            duration_ms = duration.map(|d| d.as_millis() as u64),
            "{}", message
        );
    }
    fn dismiss(&self) {}
}

pub fn tracing_notifier() -> Arc<dyn Notifier> {
    Arc::new(TracingNotifier)
}

/// Application shell: selects the rendered view and performs full reloads.
pub trait Shell: Send + Sync {
    fn switch_view(&self, view: AppView);
    /// Discard in-memory state and restart the bootstrap sequence.
    fn reload(&self);
}

/// Shell for non-UI hosts: remembers the current view and counts reload requests.
#[derive(Debug)]
pub struct HeadlessShell {
    view: RwLock<AppView>,
    reloads: AtomicU64,
}

impl HeadlessShell {
    pub fn new() -> Self {
        Self {
            view: RwLock::new(AppView::Loading),
            reloads: AtomicU64::new(0),
        }
    }

    pub fn view(&self) -> AppView {
        self.view.read().map(|v| *v).unwrap_or(AppView::Loading)
    }

    pub fn reload_requests(&self) -> u64 {
        self.reloads.load(Ordering::Relaxed)
    }
}

impl Default for HeadlessShell {
    fn default() -> Self {
        Self::new()
    }
}

impl Shell for HeadlessShell {
    fn switch_view(&self, view: AppView) {
        if let Ok(mut current) = self.view.write() {
            *current = view;
        }
        info!(view = %view, "application view switched");
    }

    fn reload(&self) {
        self.reloads.fetch_add(1, Ordering::Relaxed);
        info!("application reload requested");
    }
}

/// Receives what the bootstrap handshake learned about the session.
pub trait SessionSink: Send + Sync {
    fn set_configuration(&self, configuration: Configuration);
    fn set_login_params(&self, params: LoginParams);
    fn set_user(&self, user: WhoAmI);
    fn set_ready(&self, ready: bool);
}

/// Session sink holding the latest values for later inspection.
#[derive(Debug, Default)]
pub struct SessionState {
    configuration: RwLock<Option<Configuration>>,
    login_params: RwLock<Option<LoginParams>>,
    user: RwLock<Option<WhoAmI>>,
    ready: AtomicBool,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn configuration(&self) -> Option<Configuration> {
        self.configuration.read().ok().and_then(|c| c.clone())
    }
    pub fn login_params(&self) -> Option<LoginParams> {
        self.login_params.read().ok().and_then(|p| p.clone())
    }
    pub fn user(&self) -> Option<WhoAmI> {
        self.user.read().ok().and_then(|u| u.clone())
    }
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }
}

impl SessionSink for SessionState {
    fn set_configuration(&self, configuration: Configuration) {
        if let Ok(mut slot) = self.configuration.write() {
            *slot = Some(configuration);
        }
    }
    fn set_login_params(&self, params: LoginParams) {
        if let Ok(mut slot) = self.login_params.write() {
            *slot = Some(params);
        }
    }
    fn set_user(&self, user: WhoAmI) {
        if let Ok(mut slot) = self.user.write() {
            *slot = Some(user);
        }
    }
    fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKey {
    /// The server answer could not be used.
    Invalid,
    /// The gateway could not reach the API server.
    Unreachable,
}

impl MessageKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKey::Invalid => "api.invalid",
            MessageKey::Unreachable => "api.unreachable",
        }
    }
}

/// Localized-string provider.
pub trait MessageCatalog: Send + Sync {
    fn message(&self, key: MessageKey) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EnglishMessages;

impl MessageCatalog for EnglishMessages {
    fn message(&self, key: MessageKey) -> String {
        match key {
            MessageKey::Invalid => "Invalid data returned by the API server".to_string(),
            MessageKey::Unreachable => "API server unreachable, retrying...".to_string(),
        }
    }
}

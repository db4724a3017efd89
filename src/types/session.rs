use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Top-level application views selected by the bootstrap handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppView {
    Loading,
    Locked,
    Login,
    Tos,
    Routes,
    Quota,
}

impl AppView {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppView::Loading => "loading",
            AppView::Locked => "locked",
            AppView::Login => "login",
            AppView::Tos => "tos",
            AppView::Routes => "routes",
            AppView::Quota => "quota",
        }
    }
}

impl fmt::Display for AppView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sign-in options returned with a 401 from the bootstrap endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginParams {
    pub oauth_providers: Vec<String>,
    pub allow_userpass_login: bool,
    pub allow_signup: bool,
    pub allow_pw_rest: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfiguration {
    /// Whether users must accept the terms of service before using the UI.
    pub tos: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfiguration {
    pub version: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Organisation configuration shipped with the current user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub ui: UiConfiguration,
    pub system: SystemConfiguration,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The authenticated user as returned by the bootstrap endpoint.
///
/// Only the fields the session layer acts on are typed; everything else is kept
/// in `extra` for the consumers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhoAmI {
    pub username: Option<String>,
    /// The server sends either a flag or the acceptance timestamp.
    #[serde(deserialize_with = "truthy")]
    pub agrees_with_tos: bool,
    pub configuration: Configuration,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WhoAmI {
    pub fn must_accept_tos(&self) -> bool {
        !self.agrees_with_tos && self.configuration.ui.tos
    }
}

fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => false,
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    })
}

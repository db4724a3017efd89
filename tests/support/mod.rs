//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use triage_client::quota::QuotaStore;
use triage_client::shell::{Notifier, Shell};
use triage_client::storage::{MemoryStorage, Storage};
use triage_client::transport::{ApiRequest, RawResponse, Transport, TransportError};
use triage_client::{ApiClient, AppView};

/// One canned transport answer.
#[derive(Debug, Clone)]
pub enum Scripted {
    Response {
        status: u16,
        headers: Vec<(&'static str, String)>,
        body: Vec<u8>,
    },
    Unreachable,
}

impl Scripted {
    /// An envelope whose HTTP status matches `api_status_code`.
    pub fn envelope(status: u16, message: &str, payload: Value) -> Self {
        Scripted::Response {
            status,
            headers: vec![("content-type", "application/json".into())],
            body: json!({
                "api_error_message": message,
                "api_response": payload,
                "api_server_version": "4.5.0.42",
                "api_status_code": status,
            })
            .to_string()
            .into_bytes(),
        }
    }

    pub fn ok(payload: Value) -> Self {
        Self::envelope(200, "", payload)
    }

    pub fn status(status: u16) -> Self {
        Scripted::Response {
            status,
            headers: Vec::new(),
            body: b"<html>bad gateway</html>".to_vec(),
        }
    }

    pub fn json(status: u16, body: Value) -> Self {
        Scripted::Response {
            status,
            headers: vec![("content-type", "application/json".into())],
            body: body.to_string().into_bytes(),
        }
    }

    pub fn raw(status: u16, headers: Vec<(&'static str, String)>, body: &[u8]) -> Self {
        Scripted::Response {
            status,
            headers,
            body: body.to_vec(),
        }
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Scripted::Response { headers, .. } = &mut self {
            headers.push((name, value.to_string()));
        }
        self
    }
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub at: Instant,
    pub request: ApiRequest,
}

/// Transport that plays back a fixed script and records what it was asked.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<Recorded>>,
}

impl ScriptedTransport {
    pub fn new(script: impl IntoIterator<Item = Scripted>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Time between consecutive requests.
    pub fn gaps(&self) -> Vec<Duration> {
        let requests = self.requests();
        requests
            .windows(2)
            .map(|w| w[1].at.duration_since(w[0].at))
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse, TransportError> {
        self.requests.lock().unwrap().push(Recorded {
            at: Instant::now(),
            request: request.clone(),
        });
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Response {
                status,
                headers,
                body,
            }) => {
                let mut map = HeaderMap::new();
                for (name, value) in headers {
                    map.append(
                        HeaderName::from_static(name),
                        HeaderValue::from_str(&value).unwrap(),
                    );
                }
                Ok(RawResponse::from_bytes(status, map, body))
            }
            Some(Scripted::Unreachable) => {
                Err(TransportError::Other("connection refused".into()))
            }
            None => Err(TransportError::Other("script exhausted".into())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Note {
    Error(String, Option<Duration>),
    Dismiss,
}

#[derive(Default)]
pub struct RecordingNotifier {
    notes: Mutex<Vec<Note>>,
}

impl RecordingNotifier {
    pub fn notes(&self) -> Vec<Note> {
        self.notes.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<(String, Option<Duration>)> {
        self.notes()
            .into_iter()
            .filter_map(|n| match n {
                Note::Error(m, d) => Some((m, d)),
                Note::Dismiss => None,
            })
            .collect()
    }

    pub fn dismissals(&self) -> usize {
        self.notes().iter().filter(|n| **n == Note::Dismiss).count()
    }
}

impl Notifier for RecordingNotifier {
    fn show_error(&self, message: &str, duration: Option<Duration>) {
        self.notes
            .lock()
            .unwrap()
            .push(Note::Error(message.to_string(), duration));
    }

    fn dismiss(&self) {
        self.notes.lock().unwrap().push(Note::Dismiss);
    }
}

#[derive(Default)]
pub struct RecordingShell {
    views: Mutex<Vec<AppView>>,
    reloads: Mutex<usize>,
}

impl RecordingShell {
    pub fn views(&self) -> Vec<AppView> {
        self.views.lock().unwrap().clone()
    }

    pub fn reloads(&self) -> usize {
        *self.reloads.lock().unwrap()
    }
}

impl Shell for RecordingShell {
    fn switch_view(&self, view: AppView) {
        self.views.lock().unwrap().push(view);
    }

    fn reload(&self) {
        *self.reloads.lock().unwrap() += 1;
    }
}

#[derive(Default)]
pub struct RecordingQuota {
    pub api: Mutex<Vec<i64>>,
    pub submission: Mutex<Vec<i64>>,
}

impl QuotaStore for RecordingQuota {
    fn set_api_quota(&self, remaining: i64) {
        self.api.lock().unwrap().push(remaining);
    }

    fn set_submission_quota(&self, remaining: i64) {
        self.submission.lock().unwrap().push(remaining);
    }
}

/// Ordered event log shared by callbacks.
#[derive(Clone, Default)]
pub struct Events(Arc<Mutex<Vec<String>>>);

impl Events {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn take(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn hook(&self, name: &'static str) -> impl FnMut() + Send + 'static {
        let events = self.clone();
        move || events.push(name)
    }
}

/// A client wired to scripted and recording collaborators.
pub struct Harness {
    pub client: ApiClient,
    pub transport: Arc<ScriptedTransport>,
    pub notifier: Arc<RecordingNotifier>,
    pub shell: Arc<RecordingShell>,
    pub quota: Arc<RecordingQuota>,
    pub session: Arc<MemoryStorage>,
    pub durable: Arc<MemoryStorage>,
}

impl Harness {
    pub async fn new(script: impl IntoIterator<Item = Scripted>) -> Self {
        Self::with_session(script, MemoryStorage::unbounded()).await
    }

    pub async fn with_session(
        script: impl IntoIterator<Item = Scripted>,
        session: MemoryStorage,
    ) -> Self {
        let transport = ScriptedTransport::new(script);
        let notifier = Arc::new(RecordingNotifier::default());
        let shell = Arc::new(RecordingShell::default());
        let quota = Arc::new(RecordingQuota::default());
        let session = Arc::new(session);
        let durable = Arc::new(MemoryStorage::unbounded());
        let client = ApiClient::builder()
            .base_url("https://triage.test")
            .transport(transport.clone())
            .notifier(notifier.clone())
            .shell(shell.clone())
            .quota_store(quota.clone())
            .session_storage(session.clone() as Arc<dyn Storage>)
            .durable_storage(durable.clone() as Arc<dyn Storage>)
            .build()
            .await
            .unwrap();
        Self {
            client,
            transport,
            notifier,
            shell,
            quota,
            session,
            durable,
        }
    }
}

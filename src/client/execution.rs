//! Generic call executor: the retry loop around single exchanges.

use crate::cache::CacheKey;
use crate::client::core::ApiClient;
use crate::client::descriptor::{CallDescriptor, ReplyHandler};
use crate::client::error_classification::{classify, Outcome};
use crate::shell::PERSISTENT_NOTIFICATION;
use crate::types::Reply;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

impl ApiClient {
    /// Run one logical call to completion.
    ///
    /// Nothing is returned: every outcome is reported through the descriptor's
    /// callbacks, the notifier, or the shell (reload).
    pub async fn call(&self, descriptor: CallDescriptor) {
        let policy = descriptor.unauthorized_policy();
        let CallDescriptor {
            url,
            method,
            content_type,
            body,
            allow_cache,
            retry_after,
            cancel,
            mut on_enter,
            mut on_exit,
            on_success,
            on_failure,
            on_finalize,
            ..
        } = descriptor;

        let call_id = Uuid::new_v4();
        let cancel = cancel.unwrap_or_else(CancellationToken::new);
        let cache_key = CacheKey::new(url.as_str());
        let body = body.map(|b| b.encode(&content_type));
        let content_type = Some(content_type.as_str()).filter(|ct| !ct.is_empty());
        let mut retry = match retry_after {
            Some(delay) => self.backoff.starting_at(delay),
            None => self.backoff.start(),
        };

        loop {
            if cancel.is_cancelled() {
                debug!(call_id = %call_id, url = %url, "call cancelled");
                return;
            }

            if let Some(hook) = on_enter.as_mut() {
                hook();
            }

            if allow_cache {
                if let Some(envelope) = self.cache.get(&cache_key).await {
                    debug!(call_id = %call_id, url = %url, "served from response cache");
                    let reply = Reply::Cached(envelope);
                    if let Some(handler) = on_success {
                        handler(reply.clone());
                    }
                    finalize(on_finalize, reply);
                    return;
                }
            }

            let request = self.build_request(&method, &url, content_type, body.clone());
            let exchange = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(call_id = %call_id, url = %url, "call cancelled in flight");
                    return;
                }
                exchange = self.exchange(&request) => exchange,
            };

            if let Some(hook) = on_exit.as_mut() {
                hook();
            }

            let Some(reply) = self.settle(exchange) else {
                warn!(call_id = %call_id, url = %url, "response is not an API envelope");
                self.notify_invalid(None);
                return;
            };

            match classify(reply.envelope(), policy) {
                Outcome::HardReload(reason) => {
                    info!(
                        call_id = %call_id,
                        url = %url,
                        http_status = reply.status_code(),
                        reason = ?reason,
                        "reloading application"
                    );
                    self.shell.reload();
                    return;
                }
                Outcome::Retry { notify } => {
                    if notify {
                        self.notifier
                            .show_error(reply.error_message(), Some(PERSISTENT_NOTIFICATION));
                    }
                    let delay = retry.delay();
                    info!(
                        call_id = %call_id,
                        url = %url,
                        http_status = reply.status_code(),
                        attempt = retry.attempt(),
                        delay_ms = delay.as_millis() as u64,
                        "call retrying"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            debug!(call_id = %call_id, url = %url, "call cancelled during backoff");
                            return;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    retry = retry.next();
                }
                Outcome::Failure | Outcome::SignIn => {
                    if retry.is_retry() {
                        self.notifier.dismiss();
                    }
                    info!(
                        call_id = %call_id,
                        url = %url,
                        http_status = reply.status_code(),
                        error = reply.error_message(),
                        "call failed"
                    );
                    match on_failure {
                        Some(handler) => handler(reply.clone()),
                        None => self.notifier.show_error(reply.error_message(), None),
                    }
                    finalize(on_finalize, reply);
                    return;
                }
                Outcome::Success => {
                    if retry.is_retry() {
                        self.notifier.dismiss();
                    }
                    if allow_cache {
                        self.cache.put(&cache_key, reply.envelope()).await;
                    }
                    if let Some(handler) = on_success {
                        handler(reply.clone());
                    }
                    finalize(on_finalize, reply);
                    return;
                }
            }
        }
    }

    /// Run [`ApiClient::call`] on a detached task.
    pub fn spawn_call(&self, descriptor: CallDescriptor) -> JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move { client.call(descriptor).await })
    }

    /// Run `descriptor` and hand back its outcome instead of calling back.
    ///
    /// The payload of a success is `Ok`, a terminal failure is `Err` with the full
    /// reply. `None` means no outcome reached the caller: the application was
    /// reloaded, the response was not an envelope, or the call was cancelled. Any
    /// success or failure handlers already on `descriptor` are replaced.
    pub async fn fetch(&self, descriptor: CallDescriptor) -> Option<Result<Value, Reply>> {
        let slot = Arc::new(Mutex::new(None));
        let (ok, err) = (slot.clone(), slot.clone());
        let descriptor = descriptor
            .on_success(move |reply| {
                *lock(&ok) = Some(Ok(reply.into_envelope().payload));
            })
            .on_failure(move |reply| {
                *lock(&err) = Some(Err(reply));
            });
        self.call(descriptor).await;
        let outcome = lock(&slot).take();
        outcome
    }
}

fn lock<T>(slot: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn finalize(handler: Option<ReplyHandler>, reply: Reply) {
    if let Some(handler) = handler {
        handler(reply);
    }
}

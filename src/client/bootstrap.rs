//! Session bootstrap: decides which top-level view the application shows.

use crate::client::core::ApiClient;
use crate::client::error_classification::{classify, Outcome, ReloadReason, UnauthorizedPolicy};
use crate::shell::{SessionSink, PERSISTENT_NOTIFICATION};
use crate::storage::LOGIN_PARAMS_KEY;
use crate::transport::JSON_CONTENT_TYPE;
use crate::types::{AppView, Configuration, LoginParams, Reply, WhoAmI};
use reqwest::Method;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

impl ApiClient {
    /// Ask the server who we are and move the shell to the matching view.
    ///
    /// Retries transient failures with backoff while showing `loading`. Returns the
    /// view the shell was left on; a cancelled bootstrap returns `loading`.
    pub async fn bootstrap(
        &self,
        sink: &dyn SessionSink,
        cancel: Option<CancellationToken>,
    ) -> AppView {
        let cancel = cancel.unwrap_or_else(CancellationToken::new);
        let mut retry = self.backoff.start();

        loop {
            if cancel.is_cancelled() {
                return AppView::Loading;
            }

            // Rebuilt per attempt so a rotated XSRF cookie is picked up.
            let request = self.build_request(
                &Method::GET,
                &self.bootstrap_path,
                Some(JSON_CONTENT_TYPE),
                None,
            );

            let exchange = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(url = %self.bootstrap_path, "bootstrap cancelled in flight");
                    return AppView::Loading;
                }
                exchange = self.exchange(&request) => exchange,
            };

            let Some(reply) = self.settle(exchange) else {
                return self.bootstrap_invalid();
            };
            let status = reply.status_code();

            let view = match classify(reply.envelope(), UnauthorizedPolicy::SignIn) {
                Outcome::HardReload(ReloadReason::DailyQuota) => Some(AppView::Quota),
                Outcome::SignIn => Some(self.enter_login(sink, &reply).await),
                Outcome::Success => match serde_json::from_value::<WhoAmI>(reply.payload().clone()) {
                    Ok(user) => Some(self.enter_session(sink, user)),
                    Err(e) => {
                        debug!(error = %e, "bootstrap payload is not a user");
                        return self.bootstrap_invalid();
                    }
                },
                Outcome::Failure if status == 403 => {
                    let configuration =
                        serde_json::from_value::<Configuration>(reply.payload().clone())
                            .unwrap_or_default();
                    sink.set_configuration(configuration);
                    Some(AppView::Locked)
                }
                // Reload is not possible with the sign-in policy; treat it as transient.
                Outcome::HardReload(ReloadReason::Unauthorized)
                | Outcome::Retry { .. }
                | Outcome::Failure => None,
            };

            if let Some(view) = view {
                if retry.is_retry() {
                    self.notifier.dismiss();
                }
                info!(
                    url = %self.bootstrap_path,
                    http_status = status,
                    view = %view,
                    "bootstrap finished"
                );
                self.shell.switch_view(view);
                return view;
            }

            if status != 503 {
                self.notifier
                    .show_error(reply.error_message(), Some(PERSISTENT_NOTIFICATION));
            }
            let delay = retry.delay();
            info!(
                url = %self.bootstrap_path,
                http_status = status,
                attempt = retry.attempt(),
                delay_ms = delay.as_millis() as u64,
                view = %AppView::Loading,
                "bootstrap retrying"
            );
            self.shell.switch_view(AppView::Loading);
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(url = %self.bootstrap_path, "bootstrap cancelled during backoff");
                    return AppView::Loading;
                }
                _ = tokio::time::sleep(delay) => {}
            }
            retry = retry.next();
        }
    }

    fn bootstrap_invalid(&self) -> AppView {
        warn!(url = %self.bootstrap_path, "bootstrap response is not an API envelope");
        self.notify_invalid(Some(PERSISTENT_NOTIFICATION));
        self.shell.switch_view(AppView::Loading);
        AppView::Loading
    }

    async fn enter_login(&self, sink: &dyn SessionSink, reply: &Reply) -> AppView {
        let params =
            serde_json::from_value::<LoginParams>(reply.payload().clone()).unwrap_or_default();
        match serde_json::to_string(reply.payload()) {
            Ok(raw) => {
                if let Err(e) = self.durable.set(LOGIN_PARAMS_KEY, &raw).await {
                    warn!(storage = self.durable.name(), error = %e, "could not persist login parameters");
                }
            }
            Err(e) => warn!(error = %e, "could not encode login parameters"),
        }
        if let Err(e) = self.cache.clear().await {
            warn!(error = %e, "could not clear session storage");
        }
        sink.set_login_params(params);
        AppView::Login
    }

    fn enter_session(&self, sink: &dyn SessionSink, user: WhoAmI) -> AppView {
        if let Some(version) = user.configuration.system.version.as_deref() {
            if !version.is_empty() {
                self.set_server_version(version);
            }
        }
        let view = if user.must_accept_tos() {
            AppView::Tos
        } else {
            AppView::Routes
        };
        sink.set_configuration(user.configuration.clone());
        sink.set_user(user);
        sink.set_ready(true);
        view
    }
}

//! Binary downloads: same retry skeleton as [`ApiClient::call`], but a 200 body is
//! handed over as a byte stream instead of being decoded.

use crate::client::core::{ApiClient, Exchange, Exchanged};
use crate::client::descriptor::DownloadDescriptor;
use crate::client::error_classification::{classify, Outcome, UnauthorizedPolicy};
use crate::quota;
use crate::shell::PERSISTENT_NOTIFICATION;
use crate::transport::RawResponse;
use crate::types::{Download, SyntheticCause};
use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use regex::Regex;
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Method;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

static EXTENDED_FILENAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)filename\*\s*=\s*([A-Za-z0-9_-]+)'[^']*'([^;\s]+)"#)
        .unwrap()
});

static PLAIN_FILENAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:^|;)\s*filename\s*=\s*(?:"((?:[^"\\]|\\.)*)"|([^;\s]+))"#)
        .unwrap()
});

/// Extract the file name from a `Content-Disposition` value.
///
/// `filename*` (RFC 5987) wins over `filename`. Only UTF-8 and ISO-8859-1
/// charsets are decoded; others fall back to the plain parameter.
pub fn parse_content_disposition(value: &str) -> Option<String> {
    if let Some(caps) = EXTENDED_FILENAME.captures(value) {
        let charset = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let encoded = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        let decoded = if charset.eq_ignore_ascii_case("utf-8") {
            percent_decode_str(encoded).decode_utf8().ok().map(|s| s.into_owned())
        } else if charset.eq_ignore_ascii_case("iso-8859-1") {
            Some(
                percent_decode_str(encoded)
                    .map(|b| b as char)
                    .collect::<String>(),
            )
        } else {
            None
        };
        if let Some(name) = decoded.filter(|n| !n.is_empty()) {
            return Some(name);
        }
    }

    let caps = PLAIN_FILENAME.captures(value)?;
    let name = match (caps.get(1), caps.get(2)) {
        (Some(quoted), _) => quoted.as_str().replace("\\\"", "\"").replace("\\\\", "\\"),
        (None, Some(bare)) => bare.as_str().to_string(),
        (None, None) => return None,
    };
    Some(name).filter(|n| !n.is_empty())
}

fn header_str<'a>(headers: &'a HeaderMap, name: reqwest::header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

impl ApiClient {
    /// Fetch a binary resource.
    ///
    /// A 200 goes to `on_success` with the body still streaming. Non-200 responses
    /// are decoded as envelopes and classified like generic calls, except that a
    /// 401 always reloads.
    pub async fn download(&self, descriptor: DownloadDescriptor) {
        let DownloadDescriptor {
            url,
            retry_after,
            cancel,
            mut on_enter,
            mut on_exit,
            on_success,
            on_failure,
        } = descriptor;

        let call_id = Uuid::new_v4();
        let cancel = cancel.unwrap_or_else(CancellationToken::new);
        let mut retry = match retry_after {
            Some(delay) => self.backoff.starting_at(delay),
            None => self.backoff.start(),
        };

        loop {
            if cancel.is_cancelled() {
                return;
            }
            if let Some(hook) = on_enter.as_mut() {
                hook();
            }

            let request = self.build_request(&Method::GET, &url, None, None);

            let response = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(call_id = %call_id, url = %url, "download cancelled in flight");
                    return;
                }
                response = self.send(&request) => response,
            };

            if let Some(hook) = on_exit.as_mut() {
                hook();
            }

            let exchange = match response {
                Some(resp) if resp.status == 200 => {
                    quota::observe(&resp.headers, self.quota.as_ref());
                    if retry.is_retry() {
                        self.notifier.dismiss();
                    }
                    let download = self.download_from(resp);
                    info!(
                        call_id = %call_id,
                        url = %url,
                        http_status = 200u16,
                        size = ?download.size,
                        "download ready"
                    );
                    if let Some(handler) = on_success {
                        handler(download);
                    }
                    return;
                }
                Some(resp) => {
                    let headers = resp.headers.clone();
                    Exchange {
                        headers: Some(headers),
                        result: self.decode(resp).await,
                    }
                }
                None => Exchange {
                    headers: None,
                    result: Exchanged::Synthesized(SyntheticCause::Transport),
                },
            };

            let Some(reply) = self.settle(exchange) else {
                warn!(call_id = %call_id, url = %url, "download error is not an API envelope");
                self.notify_invalid(None);
                return;
            };

            match classify(reply.envelope(), UnauthorizedPolicy::Reload) {
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
                        "download retrying"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    retry = retry.next();
                }
                // The HTTP status was not 200, whatever the envelope claims.
                Outcome::Failure | Outcome::SignIn | Outcome::Success => {
                    if retry.is_retry() {
                        self.notifier.dismiss();
                    }
                    info!(
                        call_id = %call_id,
                        url = %url,
                        http_status = reply.status_code(),
                        error = reply.error_message(),
                        "download failed"
                    );
                    match on_failure {
                        Some(handler) => handler(reply),
                        None => self.notifier.show_error(reply.error_message(), None),
                    }
                    return;
                }
            }
        }
    }

    fn download_from(&self, resp: RawResponse) -> Download {
        let headers = &resp.headers;
        Download {
            filename: header_str(headers, CONTENT_DISPOSITION).and_then(parse_content_disposition),
            size: header_str(headers, CONTENT_LENGTH).and_then(|v| v.trim().parse().ok()),
            content_type: header_str(headers, CONTENT_TYPE).map(str::to_string),
            server_version: self.server_version(),
            body: resp.body,
        }
    }
}

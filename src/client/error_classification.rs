//! Response classification.
//!
//! The server reports quota exhaustion only through message text, so the quota
//! rules below match substrings. They are kept in this one place so a structured
//! error code can replace them without touching the call sites.

use crate::types::ResponseEnvelope;

/// What a 401 means for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthorizedPolicy {
    /// Session expired: reload the application.
    Reload,
    /// Report it like any other failure.
    Fail,
    /// Sign-in flow: move to the login view.
    SignIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadReason {
    Unauthorized,
    DailyQuota,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    HardReload(ReloadReason),
    SignIn,
    /// Repeat the call after the current delay. `notify` asks for a user-visible
    /// notification on this attempt.
    Retry { notify: bool },
    Failure,
    Success,
}

/// 503 reporting the account-wide daily API quota as spent.
pub fn is_daily_quota_exhausted(status: u16, message: &str) -> bool {
    status == 503 && message.contains("quota") && message.contains("daily") && message.contains("API")
}

/// 503 reporting a concurrency quota that will free up on its own.
pub fn is_concurrent_quota_limited(status: u16, message: &str) -> bool {
    status == 503 && message.contains("quota") && !message.contains("submission")
}

pub fn classify(envelope: &ResponseEnvelope, unauthorized: UnauthorizedPolicy) -> Outcome {
    let status = envelope.status_code;
    let message = envelope.error_message.as_str();

    if status == 401 && unauthorized == UnauthorizedPolicy::Reload {
        return Outcome::HardReload(ReloadReason::Unauthorized);
    }
    if is_daily_quota_exhausted(status, message) {
        return Outcome::HardReload(ReloadReason::DailyQuota);
    }
    if status == 401 && unauthorized == UnauthorizedPolicy::SignIn {
        return Outcome::SignIn;
    }
    if status == 502 {
        return Outcome::Retry { notify: true };
    }
    if is_concurrent_quota_limited(status, message) {
        return Outcome::Retry { notify: false };
    }
    if !envelope.is_success() {
        return Outcome::Failure;
    }
    Outcome::Success
}

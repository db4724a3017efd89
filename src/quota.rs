//! Quota observer: remaining-quota counters reported in response headers.

use reqwest::header::HeaderMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::debug;

pub const API_QUOTA_HEADER: &str = "x-remaining-quota-api";
pub const SUBMISSION_QUOTA_HEADER: &str = "x-remaining-quota-submission";

/// External store receiving quota counters. The client only ever writes to it.
pub trait QuotaStore: Send + Sync {
    fn set_api_quota(&self, remaining: i64);
    fn set_submission_quota(&self, remaining: i64);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotaSnapshot {
    pub api: Option<i64>,
    pub submission: Option<i64>,
}

/// Quota store keeping the last reported values in memory.
#[derive(Debug)]
pub struct InMemoryQuotaStore {
    api: AtomicI64,
    submission: AtomicI64,
}

// Sentinel for "never reported".
const UNSET: i64 = i64::MIN;

impl InMemoryQuotaStore {
    pub fn new() -> Self {
        Self {
            api: AtomicI64::new(UNSET),
            submission: AtomicI64::new(UNSET),
        }
    }

    pub fn snapshot(&self) -> QuotaSnapshot {
        let read = |v: &AtomicI64| Some(v.load(Ordering::Relaxed)).filter(|n| *n != UNSET);
        QuotaSnapshot {
            api: read(&self.api),
            submission: read(&self.submission),
        }
    }
}

impl Default for InMemoryQuotaStore {
    fn default() -> Self {
        Self::new()
    }
}

impl QuotaStore for InMemoryQuotaStore {
    fn set_api_quota(&self, remaining: i64) {
        self.api.store(remaining, Ordering::Relaxed);
    }
    fn set_submission_quota(&self, remaining: i64) {
        self.submission.store(remaining, Ordering::Relaxed);
    }
}

/// Forward whichever quota headers are present to `store`.
pub fn observe(headers: &HeaderMap, store: &dyn QuotaStore) {
    if let Some(n) = header_int(headers, API_QUOTA_HEADER) {
        store.set_api_quota(n);
    }
    if let Some(n) = header_int(headers, SUBMISSION_QUOTA_HEADER) {
        store.set_submission_quota(n);
    }
}

fn header_int(headers: &HeaderMap, name: &str) -> Option<i64> {
    let raw = headers.get(name)?.to_str().ok()?.trim();
    if raw.is_empty() {
        return None;
    }
    let parsed = parse_leading_int(raw);
    if parsed.is_none() {
        debug!(header = name, value = raw, "ignoring non-numeric quota header");
    }
    parsed
}

/// Integer prefix of `raw` (optional sign, then digits), e.g. `"42 left"` -> 42.
fn parse_leading_int(raw: &str) -> Option<i64> {
    let sign_len = usize::from(raw.starts_with(['-', '+']));
    let digits = raw[sign_len..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits == 0 {
        return None;
    }
    raw[..sign_len + digits].parse().ok()
}

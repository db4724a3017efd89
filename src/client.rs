//! API client: call executor, session bootstrap and binary downloads.
//!
//! Implementation details are split into submodules under `src/client/`.

pub mod builder;
mod bootstrap;
pub mod core;
pub mod descriptor;
pub mod download;
pub mod error_classification;
mod execution;
pub mod policy;

pub use builder::ApiClientBuilder;
pub use core::ApiClient;
pub use descriptor::{Body, CallDescriptor, DownloadDescriptor};
pub use download::parse_content_disposition;
pub use error_classification::{classify, Outcome, ReloadReason, UnauthorizedPolicy};
pub use policy::{Backoff, RetryState};

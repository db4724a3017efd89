//! # triage-client
//!
//! API access and session bootstrap for a threat-triage web platform.
//!
//! Every server response is a JSON envelope
//! (`api_error_message`, `api_response`, `api_server_version`, `api_status_code`).
//! The client validates it, classifies it and acts: retries transient failures
//! with exponential backoff, reloads on expired sessions or a spent daily quota,
//! caches explicitly cacheable responses for the session and reports the
//! remaining quota counters the server sends in response headers.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use triage_client::{ApiClient, CallDescriptor};
//! use triage_client::shell::SessionState;
//!
//! #[tokio::main]
//! async fn main() -> triage_client::Result<()> {
//!     let client = ApiClient::builder()
//!         .base_url("https://triage.example.com")
//!         .build()
//!         .await?;
//!
//!     let session = SessionState::new();
//!     let view = client.bootstrap(&session, None).await;
//!     println!("landed on {view}");
//!
//!     client
//!         .call(
//!             CallDescriptor::get("/api/v4/search/alert/?query=*")
//!                 .allow_cache(true)
//!                 .on_success(|reply| println!("{}", reply.payload())),
//!         )
//!         .await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Call executor, bootstrap sequencer, downloads, builder |
//! | [`cache`] | Session response cache with quarter eviction |
//! | [`config`] | YAML/env configuration |
//! | [`quota`] | Remaining-quota header observer |
//! | [`shell`] | Notifier, view shell and session sink collaborators |
//! | [`storage`] | Session and durable key/value areas |
//! | [`transport`] | Transport trait and the reqwest implementation |
//! | [`types`] | Envelope, session objects, downloads |

pub mod cache;
pub mod client;
pub mod config;
pub mod quota;
pub mod shell;
pub mod storage;
pub mod transport;
pub mod types;

pub use client::{ApiClient, ApiClientBuilder, Body, CallDescriptor, DownloadDescriptor};
pub use config::ClientConfig;
pub use types::{AppView, Download, Reply, ResponseEnvelope, WhoAmI};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A pinned, boxed stream of `Result<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};

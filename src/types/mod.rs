//! Core type definitions: the response envelope, session objects and downloads.

pub mod download;
pub mod envelope;
pub mod session;

pub use download::Download;
pub use envelope::{is_envelope, Reply, ResponseEnvelope, SyntheticCause};
pub use session::{AppView, Configuration, LoginParams, WhoAmI};

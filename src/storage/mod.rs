//! Client-side key/value storage areas.
//!
//! Two areas exist: a session-scoped one (response cache, cleared when the
//! session ends or the user is signed out) and a durable one (login parameters,
//! kept across reloads). Both implement [`Storage`].
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`MemoryStorage`] | Ordered in-memory store with a byte quota; default for both areas |
//! | [`FileStorage`] | JSON file on disk; durable area when a state directory is configured |

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::Result;
use async_trait::async_trait;

/// Durable storage key holding the last login parameters.
pub const LOGIN_PARAMS_KEY: &str = "loginParams";

/// Ordered string key/value store.
///
/// `keys()` reports insertion order; overwriting a key keeps its position. `set`
/// returns [`crate::Error::StorageFull`] when the area has no room left.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<bool>;
    async fn clear(&self) -> Result<()>;
    async fn keys(&self) -> Result<Vec<String>>;
    async fn len(&self) -> Result<usize> {
        Ok(self.keys().await?.len())
    }
    fn name(&self) -> &'static str;
}

pub mod composite;
pub mod env;
pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::flag::{Flag, FlagStatus, FlagType};

pub use composite::CompositeStore;
pub use env::{EnvStore, DEFAULT_ENV_PREFIX};
pub use memory::MemoryStore;

/// Filter for [`FlagStore::list`]. Populated fields are conjunctive.
#[derive(Debug, Clone, Default)]
pub struct FlagFilter {
    pub flag_type: Option<FlagType>,
    pub status: Option<FlagStatus>,
    pub key_prefix: Option<String>,
}

impl FlagFilter {
    pub fn matches(&self, flag: &Flag) -> bool {
        if let Some(flag_type) = self.flag_type {
            if flag.flag_type != flag_type {
                return false;
            }
        }
        if let Some(status) = self.status {
            if flag.status != status {
                return false;
            }
        }
        if let Some(prefix) = &self.key_prefix {
            if !flag.key.starts_with(prefix.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Abstraction over feature flag persistence.
///
/// Reads must be safe under concurrent access; writes need not be
/// transactional across keys. Callers treat every method as potentially
/// blocking on I/O and must not assume same-thread completion.
#[async_trait]
pub trait FlagStore: Send + Sync {
    /// Fetch a flag definition by key. `None` is a store miss, not a
    /// disabled flag.
    async fn get(&self, key: &str) -> Result<Option<Flag>>;

    /// Create or replace a flag. The store stamps `created_at` (preserved
    /// across updates) and `updated_at`, and returns the stored record.
    async fn set(&self, flag: Flag) -> Result<Flag>;

    /// Remove a flag. Returns whether a definition existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// List flag definitions, optionally narrowed by `filter`.
    async fn list(&self, filter: Option<&FlagFilter>) -> Result<Vec<Flag>>;
}

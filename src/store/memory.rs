use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{FlagFilter, FlagStore};
use crate::error::Result;
use crate::flag::Flag;

/// Key-unique in-memory store. The default backend for tests and
/// single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    flags: RwLock<HashMap<String, Flag>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FlagStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Flag>> {
        Ok(self.flags.read().await.get(key).cloned())
    }

    async fn set(&self, mut flag: Flag) -> Result<Flag> {
        let mut flags = self.flags.write().await;
        let now = Utc::now();
        if let Some(existing) = flags.get(&flag.key) {
            flag.created_at = existing.created_at;
        } else {
            flag.created_at = now;
        }
        flag.updated_at = now;
        flags.insert(flag.key.clone(), flag.clone());
        Ok(flag)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.flags.write().await.remove(key).is_some())
    }

    async fn list(&self, filter: Option<&FlagFilter>) -> Result<Vec<Flag>> {
        let flags = self.flags.read().await;
        let mut listed: Vec<Flag> = flags
            .values()
            .filter(|flag| filter.map_or(true, |query| query.matches(flag)))
            .cloned()
            .collect();
        listed.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(listed)
    }
}

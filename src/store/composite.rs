use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::{FlagFilter, FlagStore};
use crate::error::{Error, Result};
use crate::flag::Flag;

/// Layers an ordered list of stores: `get` returns the first hit, `list`
/// unions with the earliest store winning on key collision. Writes go to
/// the primary (first) store.
pub struct CompositeStore {
    stores: Vec<Arc<dyn FlagStore>>,
}

impl CompositeStore {
    pub fn new(stores: Vec<Arc<dyn FlagStore>>) -> Self {
        Self { stores }
    }

    fn primary(&self) -> Result<&Arc<dyn FlagStore>> {
        self.stores.first().ok_or_else(|| {
            Error::StoreUnavailable("composite store has no backing stores".to_string())
        })
    }
}

#[async_trait]
impl FlagStore for CompositeStore {
    async fn get(&self, key: &str) -> Result<Option<Flag>> {
        for store in &self.stores {
            if let Some(flag) = store.get(key).await? {
                return Ok(Some(flag));
            }
        }
        Ok(None)
    }

    async fn set(&self, flag: Flag) -> Result<Flag> {
        self.primary()?.set(flag).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.primary()?.delete(key).await
    }

    async fn list(&self, filter: Option<&FlagFilter>) -> Result<Vec<Flag>> {
        let mut merged: HashMap<String, Flag> = HashMap::new();
        for store in &self.stores {
            for flag in store.list(filter).await? {
                // earliest store wins on key collision
                merged.entry(flag.key.clone()).or_insert(flag);
            }
        }
        let mut listed: Vec<Flag> = merged.into_values().collect();
        listed.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(listed)
    }
}

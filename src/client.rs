use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::cache::{CacheSweeper, EvaluationCache};
use crate::config::ClientOptions;
use crate::error::{Error, Result};
use crate::evaluation::{evaluate_flag, EvaluationContext, EvaluationReason, EvaluationResult};
use crate::flag::{validate_flag, Flag};
use crate::store::env::env_override;
use crate::store::FlagStore;

/// Orchestrates the evaluation pipeline: environment override, cache
/// lookup, store fetch, engine evaluation, cache write, and side effects.
///
/// Evaluation never fails; store errors degrade to the disabled default.
/// Management operations (`create_flag`, `set_flag`, `delete_flag`)
/// propagate typed errors.
pub struct FeatureFlagClient {
    store: Arc<dyn FlagStore>,
    cache: Arc<EvaluationCache>,
    options: ClientOptions,
}

impl FeatureFlagClient {
    pub fn new(store: Arc<dyn FlagStore>) -> Self {
        Self::with_options(store, ClientOptions::default())
    }

    pub fn with_options(store: Arc<dyn FlagStore>, options: ClientOptions) -> Self {
        let cache = Arc::new(EvaluationCache::new(options.cache_ttl));
        Self {
            store,
            cache,
            options,
        }
    }

    pub fn store(&self) -> &Arc<dyn FlagStore> {
        &self.store
    }

    /// Evaluate a flag with the full precedence chain.
    pub async fn evaluate(&self, key: &str, context: Option<&EvaluationContext>) -> EvaluationResult {
        // Environment overrides bypass flag content entirely; the flag
        // does not even have to exist
        if let Some(prefix) = &self.options.env_prefix {
            if let Some(value) = env_override(prefix, key) {
                return self.finish(EvaluationResult::new(
                    key,
                    value,
                    EvaluationReason::EnvOverride,
                ));
            }
        }

        let anonymous = EvaluationContext::default();
        let context = context.unwrap_or(&anonymous);
        let fingerprint = context.fingerprint();

        if let Some(result) = self.cache.get(key, &fingerprint).await {
            return self.finish(result);
        }

        let flag = match self.fetch_flag(key).await {
            Ok(flag) => flag,
            Err(err) => {
                // degrade without caching; the next call retries the store
                warn!(flag_key = key, error = %err, "store lookup failed, serving disabled default");
                return self.finish(self.missing(key));
            }
        };

        let result = match flag {
            Some(flag) => evaluate_flag(&flag, context, Utc::now()),
            None => self.missing(key),
        };

        self.cache.insert(key, &fingerprint, result.clone()).await;
        self.finish(result)
    }

    pub async fn is_enabled(&self, key: &str, context: Option<&EvaluationContext>) -> bool {
        self.evaluate(key, context).await.value
    }

    pub async fn get_variant(
        &self,
        key: &str,
        context: Option<&EvaluationContext>,
    ) -> Option<String> {
        self.evaluate(key, context).await.variant
    }

    /// Evaluate a set of keys. Per-key values match what individual
    /// `is_enabled` calls with the same context would return.
    pub async fn evaluate_all(
        &self,
        keys: &[&str],
        context: Option<&EvaluationContext>,
    ) -> HashMap<String, bool> {
        let mut results = HashMap::new();
        for key in keys {
            results.insert((*key).to_string(), self.is_enabled(key, context).await);
        }
        results
    }

    /// Evaluate every stored flag, e.g. for client-side hydration.
    pub async fn get_all_flags(
        &self,
        context: Option<&EvaluationContext>,
    ) -> HashMap<String, EvaluationResult> {
        let flags = match self.store.list(None).await {
            Ok(flags) => flags,
            Err(err) => {
                warn!(error = %err, "store list failed, returning no flags");
                return HashMap::new();
            }
        };

        let mut results = HashMap::new();
        for flag in flags {
            results.insert(flag.key.clone(), self.evaluate(&flag.key, context).await);
        }
        results
    }

    // MANAGEMENT

    /// Create a new flag; fails with `AlreadyExists` if the key is taken.
    pub async fn create_flag(&self, flag: Flag) -> Result<Flag> {
        validate_flag(&flag)?;
        if self.store.get(&flag.key).await?.is_some() {
            return Err(Error::AlreadyExists(flag.key));
        }
        let stored = self.store.set(flag).await?;
        self.invalidate_after_write(&stored.key).await;
        Ok(stored)
    }

    /// Create or update a flag. Cached evaluations keep serving the old
    /// definition until the entry expires, unless `invalidate_on_write`
    /// is set or the cache is cleared explicitly.
    pub async fn set_flag(&self, flag: Flag) -> Result<Flag> {
        validate_flag(&flag)?;
        let stored = self.store.set(flag).await?;
        self.invalidate_after_write(&stored.key).await;
        Ok(stored)
    }

    /// Delete a flag; fails with `NotFound` if no definition exists.
    pub async fn delete_flag(&self, key: &str) -> Result<()> {
        if !self.store.delete(key).await? {
            return Err(Error::NotFound(key.to_string()));
        }
        self.invalidate_after_write(key).await;
        Ok(())
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    pub async fn clear_cache_key(&self, key: &str) {
        self.cache.clear_key(key).await;
    }

    /// Spawn a background task that periodically drops expired cache
    /// entries. The returned handle cancels the task on drop.
    pub fn start_cache_sweeper(&self, interval: Duration) -> CacheSweeper {
        self.cache.start_sweeper(interval)
    }

    async fn fetch_flag(&self, key: &str) -> Result<Option<Flag>> {
        match self.options.store_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.store.get(key))
                .await
                .map_err(|_| {
                    Error::StoreUnavailable(format!("store get timed out after {:?}", timeout))
                })?,
            None => self.store.get(key).await,
        }
    }

    fn missing(&self, key: &str) -> EvaluationResult {
        match self.options.default_flags.get(key) {
            Some(value) => EvaluationResult::new(key, *value, EvaluationReason::Default),
            None => EvaluationResult::new(key, false, EvaluationReason::FlagDisabled),
        }
    }

    async fn invalidate_after_write(&self, key: &str) {
        if self.options.invalidate_on_write {
            self.cache.clear_key(key).await;
        }
    }

    fn finish(&self, result: EvaluationResult) -> EvaluationResult {
        if self.options.enable_logging {
            debug!(
                flag_key = %result.flag_key,
                value = result.value,
                reason = %result.reason,
                "flag evaluated"
            );
        }
        if let Some(callback) = &self.options.on_evaluation {
            callback(&result);
        }
        result
    }
}

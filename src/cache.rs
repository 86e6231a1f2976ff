use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::evaluation::EvaluationResult;

/// Cache entries live for one minute unless configured otherwise.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct CacheEntry {
    result: EvaluationResult,
    expires_at: Instant,
}

/// Memoizes evaluation results keyed by `(flag_key, context fingerprint)`.
///
/// Process-local and eventually consistent: a flag update written through
/// the store is not visible until the matching entry expires or is cleared
/// explicitly. Entries are immutable once written; a lost update between
/// concurrent evaluations only costs a re-evaluation.
#[derive(Debug)]
pub struct EvaluationCache {
    ttl: Duration,
    entries: RwLock<HashMap<(String, String), CacheEntry>>,
}

impl EvaluationCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, flag_key: &str, fingerprint: &str) -> Option<EvaluationResult> {
        let entries = self.entries.read().await;
        let entry = entries.get(&(flag_key.to_string(), fingerprint.to_string()))?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.result.clone())
    }

    pub async fn insert(&self, flag_key: &str, fingerprint: &str, result: EvaluationResult) {
        let entry = CacheEntry {
            result,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries
            .write()
            .await
            .insert((flag_key.to_string(), fingerprint.to_string()), entry);
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Drop all entries for one flag, across contexts.
    pub async fn clear_key(&self, flag_key: &str) {
        self.entries
            .write()
            .await
            .retain(|(key, _), _| key != flag_key);
    }

    /// Remove expired entries. Safe to fire from a timer; a re-entrant run
    /// finds nothing left to remove.
    pub async fn purge_expired(&self) {
        let now = Instant::now();
        self.entries
            .write()
            .await
            .retain(|_, entry| entry.expires_at > now);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Spawn a background task that periodically purges expired entries.
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) -> CacheSweeper {
        let cache = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // the first tick fires immediately; skip it
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cache.purge_expired().await;
            }
        });
        CacheSweeper { handle }
    }
}

/// Handle for the background cache sweeper. The task is aborted when the
/// handle is dropped.
#[derive(Debug)]
pub struct CacheSweeper {
    handle: JoinHandle<()>,
}

impl CacheSweeper {
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for CacheSweeper {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

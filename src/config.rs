use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use std::env;

use crate::cache::DEFAULT_CACHE_TTL;
use crate::evaluation::EvaluationResult;
use crate::store::DEFAULT_ENV_PREFIX;

/// Side-effect hook fired after every evaluation.
pub type EvaluationCallback = Arc<dyn Fn(&EvaluationResult) + Send + Sync>;

/// Options for [`FeatureFlagClient`](crate::client::FeatureFlagClient).
#[derive(Clone)]
pub struct ClientOptions {
    /// Fallback values for flags missing from the store.
    pub default_flags: HashMap<String, bool>,
    /// Prefix for environment variable overrides. `None` disables the
    /// override check entirely.
    pub env_prefix: Option<String>,
    pub cache_ttl: Duration,
    /// Emit a structured log line per evaluation.
    pub enable_logging: bool,
    /// Clear matching cache entries when a flag is written or deleted
    /// through the client. Off by default: stale reads up to one TTL are
    /// the documented trade-off.
    pub invalidate_on_write: bool,
    /// Upper bound on a single store lookup. A lookup that exceeds it
    /// degrades to the disabled default instead of blocking the request.
    pub store_timeout: Option<Duration>,
    pub on_evaluation: Option<EvaluationCallback>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            default_flags: HashMap::new(),
            env_prefix: Some(DEFAULT_ENV_PREFIX.to_string()),
            cache_ttl: DEFAULT_CACHE_TTL,
            enable_logging: false,
            invalidate_on_write: false,
            store_timeout: None,
            on_evaluation: None,
        }
    }
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build options from the process environment (and `.env` if present).
    ///
    /// Recognized variables: `FEATURE_FLAGS_CACHE_TTL_SECS`,
    /// `FEATURE_FLAGS_ENV_PREFIX`, `FEATURE_FLAGS_LOGGING`,
    /// `FEATURE_FLAGS_STORE_TIMEOUT_MS`. Anything absent keeps its
    /// default.
    pub fn from_env() -> Self {
        let _ = dotenv().is_ok();

        let mut options = Self::default();

        if let Ok(value) = env::var("FEATURE_FLAGS_CACHE_TTL_SECS") {
            if let Ok(secs) = value.parse::<u64>() {
                options.cache_ttl = Duration::from_secs(secs);
            }
        }

        if let Ok(prefix) = env::var("FEATURE_FLAGS_ENV_PREFIX") {
            options.env_prefix = Some(prefix);
        }

        if let Ok(value) = env::var("FEATURE_FLAGS_LOGGING") {
            options.enable_logging = matches!(value.as_str(), "true" | "1");
        }

        if let Ok(value) = env::var("FEATURE_FLAGS_STORE_TIMEOUT_MS") {
            if let Ok(millis) = value.parse::<u64>() {
                options.store_timeout = Some(Duration::from_millis(millis));
            }
        }

        options
    }

    pub fn with_default_flag(mut self, key: impl Into<String>, value: bool) -> Self {
        self.default_flags.insert(key.into(), value);
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    pub fn without_env_overrides(mut self) -> Self {
        self.env_prefix = None;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.enable_logging = enabled;
        self
    }

    pub fn with_invalidate_on_write(mut self, enabled: bool) -> Self {
        self.invalidate_on_write = enabled;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = Some(timeout);
        self
    }

    pub fn with_on_evaluation<F>(mut self, callback: F) -> Self
    where
        F: Fn(&EvaluationResult) + Send + Sync + 'static,
    {
        self.on_evaluation = Some(Arc::new(callback));
        self
    }
}

//! Deterministic feature flag evaluation.
//!
//! The crate centers on a [`FeatureFlagClient`] that decides whether a
//! capability is active and which experiment variant a subject sees,
//! consistently and without a network round trip per check:
//!
//! - typed flag definitions ([`Flag`]) with boolean, percentage,
//!   user-targeted, variant, regional and kill-switch shapes;
//! - stable bucketing, so the same `(flag key, subject)` pair always lands
//!   in the same rollout bucket and variant;
//! - pluggable persistence ([`FlagStore`]): in-memory,
//!   environment-variable-backed, and layered composite stores;
//! - a per-client TTL cache that trades freshness for read latency;
//! - axum middleware and guards for request-scoped gating.
//!
//! ```no_run
//! use std::sync::Arc;
//! use feature_flags::{EvaluationContext, FeatureFlagClient, Flag, MemoryStore};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let client = FeatureFlagClient::new(Arc::new(MemoryStore::new()));
//! client
//!     .set_flag(Flag::percentage("new-checkout", "New checkout", 25))
//!     .await
//!     .unwrap();
//!
//! let ctx = EvaluationContext::new().with_user_id("user-1");
//! if client.is_enabled("new-checkout", Some(&ctx)).await {
//!     // serve the new flow
//! }
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod flag;
pub mod middleware;
pub mod store;

pub use cache::{CacheSweeper, EvaluationCache, DEFAULT_CACHE_TTL};
pub use client::FeatureFlagClient;
pub use config::{ClientOptions, EvaluationCallback};
pub use error::{Error, Result};
pub use evaluation::{
    evaluate_flag, EvaluationContext, EvaluationReason, EvaluationResult,
};
pub use flag::{
    validate_flag, validate_flag_key, validate_rollout_percentage, Flag, FlagStatus, FlagType,
    Region, Schedule, Variant,
};
pub use store::{
    CompositeStore, EnvStore, FlagFilter, FlagStore, MemoryStore, DEFAULT_ENV_PREFIX,
};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use feature_flags::{
    ClientOptions, Error, EvaluationContext, EvaluationReason, FeatureFlagClient, Flag,
    FlagFilter, FlagStore, MemoryStore, Variant,
};

fn client() -> FeatureFlagClient {
    FeatureFlagClient::new(Arc::new(MemoryStore::new()))
}

fn user(id: &str) -> EvaluationContext {
    EvaluationContext::new().with_user_id(id)
}

#[tokio::test]
async fn environment_override_wins_without_a_stored_flag() {
    std::env::set_var("FEATURE_FLAG_CLIENT_OVERRIDE_ON", "true");
    std::env::set_var("FEATURE_FLAG_CLIENT_OVERRIDE_OFF", "0");

    let client = client();

    let result = client.evaluate("client-override-on", None).await;
    assert!(result.value);
    assert_eq!(result.reason, EvaluationReason::EnvOverride);

    assert!(!client.is_enabled("client-override-off", None).await);

    // unset falls through to the stored definition
    client
        .set_flag(Flag::boolean("client-override-unset", "Unset", true))
        .await
        .unwrap();
    let result = client.evaluate("client-override-unset", None).await;
    assert!(result.value);
    assert_eq!(result.reason, EvaluationReason::Default);

    std::env::remove_var("FEATURE_FLAG_CLIENT_OVERRIDE_ON");
    std::env::remove_var("FEATURE_FLAG_CLIENT_OVERRIDE_OFF");
}

#[tokio::test]
async fn environment_override_beats_a_disabled_flag() {
    std::env::set_var("FEATURE_FLAG_CLIENT_OVERRIDE_BEATS", "1");

    let client = client();
    client
        .set_flag(Flag::boolean("client-override-beats", "Beats", false))
        .await
        .unwrap();

    let result = client.evaluate("client-override-beats", None).await;
    assert!(result.value);
    assert_eq!(result.reason, EvaluationReason::EnvOverride);

    std::env::remove_var("FEATURE_FLAG_CLIENT_OVERRIDE_BEATS");
}

#[tokio::test]
async fn missing_flag_uses_configured_default() {
    let store = Arc::new(MemoryStore::new());
    let client = FeatureFlagClient::with_options(
        store,
        ClientOptions::new().with_default_flag("client-default-on", true),
    );

    let result = client.evaluate("client-default-on", None).await;
    assert!(result.value);
    assert_eq!(result.reason, EvaluationReason::Default);

    let result = client.evaluate("client-default-missing", None).await;
    assert!(!result.value);
    assert_eq!(result.reason, EvaluationReason::FlagDisabled);
}

#[tokio::test]
async fn cached_result_survives_a_direct_store_write() {
    let store = Arc::new(MemoryStore::new());
    let client = FeatureFlagClient::new(store.clone());

    client
        .set_flag(Flag::boolean("client-cached", "Cached", true))
        .await
        .unwrap();
    assert!(client.is_enabled("client-cached", None).await);

    // mutate the store underneath the client
    store
        .set(Flag::boolean("client-cached", "Cached", false))
        .await
        .unwrap();

    // still served from cache within the TTL window
    assert!(client.is_enabled("client-cached", None).await);

    client.clear_cache().await;
    assert!(!client.is_enabled("client-cached", None).await);
}

#[tokio::test]
async fn invalidate_on_write_reflects_updates_immediately() {
    let store = Arc::new(MemoryStore::new());
    let client = FeatureFlagClient::with_options(
        store,
        ClientOptions::new().with_invalidate_on_write(true),
    );

    client
        .set_flag(Flag::boolean("client-fresh", "Fresh", true))
        .await
        .unwrap();
    assert!(client.is_enabled("client-fresh", None).await);

    client
        .set_flag(Flag::boolean("client-fresh", "Fresh", false))
        .await
        .unwrap();
    assert!(!client.is_enabled("client-fresh", None).await);
}

#[tokio::test]
async fn cache_entries_expire_after_the_ttl() {
    let store = Arc::new(MemoryStore::new());
    let client = FeatureFlagClient::with_options(
        store.clone(),
        ClientOptions::new().with_cache_ttl(Duration::from_millis(200)),
    );

    client
        .set_flag(Flag::boolean("client-ttl", "Ttl", true))
        .await
        .unwrap();
    assert!(client.is_enabled("client-ttl", None).await);

    store
        .set(Flag::boolean("client-ttl", "Ttl", false))
        .await
        .unwrap();
    assert!(client.is_enabled("client-ttl", None).await);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!client.is_enabled("client-ttl", None).await);
}

#[tokio::test]
async fn batch_matches_individual_evaluations() {
    let client = client();
    client
        .set_flag(Flag::boolean("client-batch-a", "A", true))
        .await
        .unwrap();
    client
        .set_flag(Flag::boolean("client-batch-b", "B", false))
        .await
        .unwrap();
    client
        .set_flag(Flag::percentage("client-batch-c", "C", 50))
        .await
        .unwrap();

    let ctx = user("batch-user");
    let keys = ["client-batch-a", "client-batch-b", "client-batch-c"];
    let batch = client.evaluate_all(&keys, Some(&ctx)).await;

    for key in keys {
        assert_eq!(
            batch.get(key).copied(),
            Some(client.is_enabled(key, Some(&ctx)).await),
            "mismatch for {}",
            key
        );
    }
}

#[tokio::test]
async fn get_all_flags_evaluates_every_definition() {
    let client = client();
    client
        .set_flag(Flag::boolean("client-all-a", "A", true))
        .await
        .unwrap();
    client
        .set_flag(Flag::variant(
            "client-all-b",
            "B",
            vec![Variant::new("control", 100)],
        ))
        .await
        .unwrap();

    let all = client.get_all_flags(Some(&user("all-user"))).await;
    assert_eq!(all.len(), 2);
    assert!(all["client-all-a"].value);
    assert_eq!(all["client-all-b"].variant.as_deref(), Some("control"));
}

#[tokio::test]
async fn full_rollout_and_single_variant_end_to_end() {
    let client = client();

    client
        .create_flag(Flag::percentage("rollout-flag", "Rollout", 100))
        .await
        .unwrap();
    assert!(client.is_enabled("rollout-flag", Some(&user("user-1"))).await);

    client
        .create_flag(Flag::variant(
            "ab-test",
            "AB test",
            vec![Variant::new("control", 100)],
        ))
        .await
        .unwrap();

    let result = client.evaluate("ab-test", Some(&user("user-1"))).await;
    assert!(result.value);
    assert_eq!(result.variant.as_deref(), Some("control"));
    assert_eq!(result.reason, EvaluationReason::Variant);
}

#[tokio::test]
async fn rollout_is_deterministic_across_cache_clears() {
    let client = client();
    client
        .set_flag(Flag::percentage("client-det", "Det", 50))
        .await
        .unwrap();

    let ctx = user("consistent-user");
    let first = client.is_enabled("client-det", Some(&ctx)).await;
    for _ in 0..10 {
        client.clear_cache().await;
        assert_eq!(client.is_enabled("client-det", Some(&ctx)).await, first);
    }
}

#[tokio::test]
async fn management_errors_are_typed() {
    let client = client();

    client
        .create_flag(Flag::boolean("client-dup", "Dup", true))
        .await
        .unwrap();
    let duplicate = client
        .create_flag(Flag::boolean("client-dup", "Dup", true))
        .await;
    assert!(matches!(duplicate, Err(Error::AlreadyExists(_))));

    let missing = client.delete_flag("client-never-existed").await;
    assert!(matches!(missing, Err(Error::NotFound(_))));

    let invalid = client
        .create_flag(Flag::boolean("Not A Key", "Invalid", true))
        .await;
    assert!(matches!(invalid, Err(Error::Validation(_))));
}

#[tokio::test]
async fn evaluation_callback_fires_per_evaluation() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();

    let client = FeatureFlagClient::with_options(
        Arc::new(MemoryStore::new()),
        ClientOptions::new().with_on_evaluation(move |result| {
            assert_eq!(result.flag_key, "client-callback");
            seen.fetch_add(1, Ordering::SeqCst);
        }),
    );

    client.is_enabled("client-callback", None).await;
    client.is_enabled("client-callback", None).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// Store that always fails, standing in for an unreachable backend.
struct BrokenStore;

#[async_trait]
impl FlagStore for BrokenStore {
    async fn get(&self, _key: &str) -> feature_flags::Result<Option<Flag>> {
        Err(Error::StoreUnavailable("connection refused".to_string()))
    }

    async fn set(&self, _flag: Flag) -> feature_flags::Result<Flag> {
        Err(Error::StoreUnavailable("connection refused".to_string()))
    }

    async fn delete(&self, _key: &str) -> feature_flags::Result<bool> {
        Err(Error::StoreUnavailable("connection refused".to_string()))
    }

    async fn list(&self, _filter: Option<&FlagFilter>) -> feature_flags::Result<Vec<Flag>> {
        Err(Error::StoreUnavailable("connection refused".to_string()))
    }
}

// Store whose reads hang long enough to trip the client timeout.
struct SlowStore(MemoryStore);

#[async_trait]
impl FlagStore for SlowStore {
    async fn get(&self, key: &str) -> feature_flags::Result<Option<Flag>> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.0.get(key).await
    }

    async fn set(&self, flag: Flag) -> feature_flags::Result<Flag> {
        self.0.set(flag).await
    }

    async fn delete(&self, key: &str) -> feature_flags::Result<bool> {
        self.0.delete(key).await
    }

    async fn list(&self, filter: Option<&FlagFilter>) -> feature_flags::Result<Vec<Flag>> {
        self.0.list(filter).await
    }
}

#[tokio::test]
async fn broken_store_degrades_to_disabled() {
    let client = FeatureFlagClient::new(Arc::new(BrokenStore));

    let result = client.evaluate("client-broken", None).await;
    assert!(!result.value);
    assert_eq!(result.reason, EvaluationReason::FlagDisabled);

    // management operations do propagate the failure
    let write = client.set_flag(Flag::boolean("client-broken", "X", true)).await;
    assert!(matches!(write, Err(Error::StoreUnavailable(_))));

    assert!(client.get_all_flags(None).await.is_empty());
}

#[tokio::test]
async fn slow_store_trips_the_timeout() {
    let slow = SlowStore(MemoryStore::new());
    slow.set(Flag::boolean("client-slow", "Slow", true))
        .await
        .unwrap();

    let client = FeatureFlagClient::with_options(
        Arc::new(slow),
        ClientOptions::new().with_store_timeout(Duration::from_millis(20)),
    );

    let result = client.evaluate("client-slow", None).await;
    assert!(!result.value);
    assert_eq!(result.reason, EvaluationReason::FlagDisabled);
}

// Store that fails until told otherwise.
struct FlakyStore {
    inner: MemoryStore,
    failing: std::sync::atomic::AtomicBool,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            failing: std::sync::atomic::AtomicBool::new(false),
        }
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl FlagStore for FlakyStore {
    async fn get(&self, key: &str) -> feature_flags::Result<Option<Flag>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable("flaky".to_string()));
        }
        self.inner.get(key).await
    }

    async fn set(&self, flag: Flag) -> feature_flags::Result<Flag> {
        self.inner.set(flag).await
    }

    async fn delete(&self, key: &str) -> feature_flags::Result<bool> {
        self.inner.delete(key).await
    }

    async fn list(&self, filter: Option<&FlagFilter>) -> feature_flags::Result<Vec<Flag>> {
        self.inner.list(filter).await
    }
}

#[tokio::test]
async fn degraded_results_are_not_cached() {
    let store = Arc::new(FlakyStore::new());
    store
        .set(Flag::boolean("client-retry", "Retry", true))
        .await
        .unwrap();

    let client = FeatureFlagClient::new(store.clone());

    store.set_failing(true);
    assert!(!client.is_enabled("client-retry", None).await);

    // the degraded answer was not cached, so recovery is immediate
    store.set_failing(false);
    assert!(client.is_enabled("client-retry", None).await);
}

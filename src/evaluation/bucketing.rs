use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::flag::Variant;

/// Sentinel subject used when a context carries no identifier, so that
/// anonymous traffic still buckets consistently.
pub const ANONYMOUS_SUBJECT: &str = "anonymous";

/// Consistent 32-bit hash over `flag_key` and the subject identifier.
///
/// `DefaultHasher::new()` always starts from the same keys, so the same
/// `(flag_key, subject)` pair yields the same bucket across process
/// restarts and across instances. No random seed, no stored assignments.
pub fn bucket_hash(flag_key: &str, subject: &str) -> u32 {
    let mut hasher = DefaultHasher::new();
    format!("{}:{}", flag_key, subject).hash(&mut hasher);
    hasher.finish() as u32
}

/// Consistent hashing for percentage rollout
/// Ensures the same subject always gets the same result for a given percentage
pub fn in_percentage(flag_key: &str, subject: &str, percentage: u8) -> bool {
    if percentage == 0 {
        return false;
    }
    if percentage >= 100 {
        return true;
    }

    // Map hash to 0-99 range
    let bucket = bucket_hash(flag_key, subject) % 100;

    // The subject is in the rollout if their bucket is less than the percentage
    bucket < u32::from(percentage)
}

/// Pick a variant by weighted bucketing: `hash mod total_weight`, then walk
/// the cumulative weight boundaries in list order. Returns `None` when the
/// list is empty or every weight is zero.
pub fn select_variant(flag_key: &str, subject: Option<&str>, variants: &[Variant]) -> Option<String> {
    let total: u32 = variants.iter().map(|v| v.weight).sum();
    if total == 0 {
        return None;
    }

    let point = bucket_hash(flag_key, subject.unwrap_or(ANONYMOUS_SUBJECT)) % total;

    let mut cumulative = 0u32;
    for variant in variants {
        cumulative += variant.weight;
        if point < cumulative {
            return Some(variant.key.clone());
        }
    }

    None
}

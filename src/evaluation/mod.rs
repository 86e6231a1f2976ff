pub mod bucketing;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::flag::{Flag, FlagStatus, FlagType, Region};

// Request context for evaluation. Not persisted; constructed per call and
// owned by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationContext {
    pub user_id: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    pub region: Option<Region>,
    pub session_id: Option<String>,
    // BTreeMap keeps the serialized fingerprint deterministic
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_groups(mut self, groups: Vec<String>) -> Self {
        self.groups = groups;
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Identifier used for bucketing: user id, then session id, then email.
    pub fn subject_id(&self) -> Option<&str> {
        self.user_id
            .as_deref()
            .or(self.session_id.as_deref())
            .or(self.email.as_deref())
    }

    /// Canonical serialized form. Two contexts are cache-equivalent iff
    /// their fingerprints are identical.
    pub fn fingerprint(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Which precedence rule produced an evaluation result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvaluationReason {
    Default,
    FlagDisabled,
    Scheduled,
    KillSwitch,
    EnvOverride,
    Percentage,
    UserTargeted,
    Variant,
    Regional,
}

impl EvaluationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationReason::Default => "default",
            EvaluationReason::FlagDisabled => "flag-disabled",
            EvaluationReason::Scheduled => "scheduled",
            EvaluationReason::KillSwitch => "kill-switch",
            EvaluationReason::EnvOverride => "env-override",
            EvaluationReason::Percentage => "percentage",
            EvaluationReason::UserTargeted => "user-targeted",
            EvaluationReason::Variant => "variant",
            EvaluationReason::Regional => "regional",
        }
    }
}

impl fmt::Display for EvaluationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Flag evaluation result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationResult {
    pub flag_key: String,
    pub value: bool,
    pub variant: Option<String>,
    pub reason: EvaluationReason,
}

impl EvaluationResult {
    pub fn new(flag_key: impl Into<String>, value: bool, reason: EvaluationReason) -> Self {
        Self {
            flag_key: flag_key.into(),
            value,
            variant: None,
            reason,
        }
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }
}

/// Evaluate a flag definition against a request context.
///
/// Rules apply in strict order, short-circuiting at the first match:
/// tripped kill switch, disabled status, schedule window, then the
/// type-specific rule, then the configured default. Environment overrides
/// and missing-flag defaults precede flag existence and are handled by the
/// client before this function runs. Pure with respect to the store.
pub fn evaluate_flag(
    flag: &Flag,
    context: &EvaluationContext,
    now: DateTime<Utc>,
) -> EvaluationResult {
    // Step 1: a tripped kill switch forces the capability off, regardless
    // of the configured default
    if flag.flag_type == FlagType::KillSwitch && flag.status == FlagStatus::Disabled {
        return EvaluationResult::new(&flag.key, false, EvaluationReason::KillSwitch);
    }

    // Step 2: disabled flags never evaluate further
    if flag.status == FlagStatus::Disabled {
        return EvaluationResult::new(&flag.key, false, EvaluationReason::FlagDisabled);
    }

    // Step 3: scheduled flags are inactive outside their window
    if flag.status == FlagStatus::Scheduled {
        let window = flag.schedule.unwrap_or_default();
        if !window.contains(now) {
            return EvaluationResult::new(&flag.key, false, EvaluationReason::Scheduled);
        }
    }

    // Step 4: type-specific evaluation. The flag is active at this point
    // (enabled, or scheduled inside its window).
    match flag.flag_type {
        FlagType::Boolean => EvaluationResult::new(&flag.key, true, EvaluationReason::Default),

        FlagType::Percentage => {
            let percentage = flag.percentage.unwrap_or(0);
            let included = match context.subject_id() {
                Some(subject) => bucketing::in_percentage(&flag.key, subject, percentage),
                // no subject id: excluded unless the rollout is total
                None => percentage >= 100,
            };
            EvaluationResult::new(&flag.key, included, EvaluationReason::Percentage)
        }

        FlagType::UserTargeted => {
            let subject_match = context
                .subject_id()
                .is_some_and(|subject| flag.targeted_users.iter().any(|u| u == subject));
            let group_match = context
                .groups
                .iter()
                .any(|g| flag.targeted_groups.contains(g));
            EvaluationResult::new(
                &flag.key,
                subject_match || group_match,
                EvaluationReason::UserTargeted,
            )
        }

        FlagType::Variant => {
            match bucketing::select_variant(&flag.key, context.subject_id(), &flag.variants) {
                Some(variant) => EvaluationResult::new(&flag.key, true, EvaluationReason::Variant)
                    .with_variant(variant),
                // nothing selectable; fall back to the configured default
                None => {
                    EvaluationResult::new(&flag.key, flag.default_value, EvaluationReason::Default)
                }
            }
        }

        FlagType::Regional => {
            let allowed = match &flag.regions {
                // no region list means available everywhere
                None => true,
                Some(regions) => context
                    .region
                    .map(|r| regions.contains(&r))
                    .unwrap_or(false),
            };
            EvaluationResult::new(&flag.key, allowed, EvaluationReason::Regional)
        }

        // untripped kill switch: the capability runs with its default
        FlagType::KillSwitch => {
            EvaluationResult::new(&flag.key, flag.default_value, EvaluationReason::Default)
        }
    }
}

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// MODELS

/// Discriminator for how a flag is evaluated. Fields on [`Flag`] that are
/// irrelevant to the active type are ignored, never rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlagType {
    Boolean,
    Percentage,
    UserTargeted,
    Variant,
    Regional,
    KillSwitch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagStatus {
    Enabled,
    Disabled,
    Scheduled,
}

/// One arm of an A/B experiment. Weights are relative; they need not sum
/// to 100.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub key: String,
    pub weight: u32,
}

impl Variant {
    pub fn new(key: impl Into<String>, weight: u32) -> Self {
        Self {
            key: key.into(),
            weight,
        }
    }
}

/// Activation window for `scheduled` flags. The window is
/// `[start_at, end_at)`; either bound may be left open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schedule {
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
}

impl Schedule {
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        if let Some(start) = self.start_at {
            if now < start {
                return false;
            }
        }
        if let Some(end) = self.end_at {
            if now >= end {
                return false;
            }
        }
        true
    }
}

/// Known deployment regions for regional flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Region {
    UsEast,
    UsWest,
    EuWest,
    EuCentral,
    ApSoutheast,
    ApNortheast,
    SaEast,
    AfSouth,
    MeSouth,
    Global,
}

impl Region {
    pub const ALL: [Region; 10] = [
        Region::UsEast,
        Region::UsWest,
        Region::EuWest,
        Region::EuCentral,
        Region::ApSoutheast,
        Region::ApNortheast,
        Region::SaEast,
        Region::AfSouth,
        Region::MeSouth,
        Region::Global,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::UsEast => "us-east",
            Region::UsWest => "us-west",
            Region::EuWest => "eu-west",
            Region::EuCentral => "eu-central",
            Region::ApSoutheast => "ap-southeast",
            Region::ApNortheast => "ap-northeast",
            Region::SaEast => "sa-east",
            Region::AfSouth => "af-south",
            Region::MeSouth => "me-south",
            Region::Global => "global",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Region::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("unknown region code '{}'", s)))
    }
}

/// A named, typed configuration unit controlling a capability or an
/// experiment variant. Identified by `key`; `name` and `description` are
/// display metadata with no semantic effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flag {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub flag_type: FlagType,
    pub status: FlagStatus,
    #[serde(default)]
    pub default_value: bool,
    #[serde(default)]
    pub percentage: Option<u8>,
    #[serde(default)]
    pub targeted_users: Vec<String>,
    #[serde(default)]
    pub targeted_groups: Vec<String>,
    #[serde(default)]
    pub variants: Vec<Variant>,
    #[serde(default)]
    pub schedule: Option<Schedule>,
    #[serde(default)]
    pub regions: Option<Vec<Region>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Flag {
    fn base(key: impl Into<String>, name: impl Into<String>, flag_type: FlagType) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            name: name.into(),
            description: None,
            flag_type,
            status: FlagStatus::Enabled,
            default_value: false,
            percentage: None,
            targeted_users: Vec::new(),
            targeted_groups: Vec::new(),
            variants: Vec::new(),
            schedule: None,
            regions: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Simple on/off flag.
    pub fn boolean(key: impl Into<String>, name: impl Into<String>, enabled: bool) -> Self {
        let mut flag = Self::base(key, name, FlagType::Boolean);
        flag.status = if enabled {
            FlagStatus::Enabled
        } else {
            FlagStatus::Disabled
        };
        flag.default_value = enabled;
        flag
    }

    /// Percentage rollout flag.
    pub fn percentage(key: impl Into<String>, name: impl Into<String>, percentage: u8) -> Self {
        let mut flag = Self::base(key, name, FlagType::Percentage);
        flag.percentage = Some(percentage);
        flag
    }

    /// A/B experiment flag with weighted variants.
    pub fn variant(
        key: impl Into<String>,
        name: impl Into<String>,
        variants: Vec<Variant>,
    ) -> Self {
        let mut flag = Self::base(key, name, FlagType::Variant);
        flag.default_value = true;
        flag.variants = variants;
        flag
    }

    /// Flag targeting explicit user ids and/or groups.
    pub fn user_targeted(
        key: impl Into<String>,
        name: impl Into<String>,
        users: Vec<String>,
        groups: Vec<String>,
    ) -> Self {
        let mut flag = Self::base(key, name, FlagType::UserTargeted);
        flag.targeted_users = users;
        flag.targeted_groups = groups;
        flag
    }

    /// Flag restricted to a set of regions.
    pub fn regional(
        key: impl Into<String>,
        name: impl Into<String>,
        regions: Vec<Region>,
    ) -> Self {
        let mut flag = Self::base(key, name, FlagType::Regional);
        flag.regions = Some(regions);
        flag
    }

    /// Emergency shutoff flag. Starts untripped; setting its status to
    /// `disabled` trips it.
    pub fn kill_switch(key: impl Into<String>, name: impl Into<String>) -> Self {
        let mut flag = Self::base(key, name, FlagType::KillSwitch);
        flag.default_value = true;
        flag
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_status(mut self, status: FlagStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_default_value(mut self, default_value: bool) -> Self {
        self.default_value = default_value;
        self
    }

    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.status = FlagStatus::Scheduled;
        self.schedule = Some(schedule);
        self
    }
}

// HELPER FUNCTIONS

/// Validating the flag key
pub fn validate_flag_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::Validation("flag key cannot be empty".to_string()));
    }

    if key.len() > 64 {
        return Err(Error::Validation(
            "flag key is too long (max: 64 characters)".to_string(),
        ));
    }

    if !key.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
        return Err(Error::Validation(
            "flag key must start with a letter".to_string(),
        ));
    }

    if !key
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
    {
        return Err(Error::Validation(
            "flag key can only contain lowercase letters, numbers, underscores and hyphens"
                .to_string(),
        ));
    }

    Ok(())
}

/// Checks that a rollout percentage is between 0 and 100 inclusive
pub fn validate_rollout_percentage(percentage: u8) -> Result<()> {
    if percentage > 100 {
        return Err(Error::Validation(
            "rollout percentage must be between 0 and 100".to_string(),
        ));
    }

    Ok(())
}

/// Validate a full definition before it is written through the store.
pub fn validate_flag(flag: &Flag) -> Result<()> {
    validate_flag_key(&flag.key)?;

    if flag.flag_type == FlagType::Percentage {
        let percentage = flag.percentage.ok_or_else(|| {
            Error::Validation("percentage flags require a rollout percentage".to_string())
        })?;
        validate_rollout_percentage(percentage)?;
    }

    Ok(())
}

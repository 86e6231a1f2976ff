use std::collections::HashMap;
use std::env;

use async_trait::async_trait;

use super::{FlagFilter, FlagStore};
use crate::error::{Error, Result};
use crate::flag::Flag;

/// Prefix used when none is configured.
pub const DEFAULT_ENV_PREFIX: &str = "FEATURE_FLAG_";

/// Translate a flag key into its environment variable name: the key is
/// uppercased and every non-alphanumeric character becomes `_`.
pub fn env_var_name(prefix: &str, key: &str) -> String {
    let mangled: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{}{}", prefix, mangled)
}

/// Parse an environment value into a boolean. `None` when unrecognized.
pub fn parse_env_value(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "enabled" => Some(true),
        "false" | "0" | "disabled" => Some(false),
        _ => None,
    }
}

/// Look up the boolean override for `key` in the process environment.
pub fn env_override(prefix: &str, key: &str) -> Option<bool> {
    env::var(env_var_name(prefix, key))
        .ok()
        .as_deref()
        .and_then(parse_env_value)
}

/// Read-only store backed by process environment variables.
///
/// A flag named `x` resolves by reading `<PREFIX>X`. An unset or
/// unparseable variable is a store miss, not a disabled flag. Seed
/// definitions supply richer flag shapes whose `default_value` the
/// environment may override; keys without one resolve to a plain boolean
/// flag.
#[derive(Debug, Clone)]
pub struct EnvStore {
    prefix: String,
    definitions: HashMap<String, Flag>,
}

impl Default for EnvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvStore {
    pub fn new() -> Self {
        Self::with_prefix(DEFAULT_ENV_PREFIX)
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            definitions: HashMap::new(),
        }
    }

    /// Seed flag definitions that `list` can enumerate.
    pub fn with_definitions(mut self, definitions: Vec<Flag>) -> Self {
        self.definitions = definitions
            .into_iter()
            .map(|flag| (flag.key.clone(), flag))
            .collect();
        self
    }

    fn resolve(&self, key: &str) -> Option<Flag> {
        let value = env_override(&self.prefix, key);
        match (value, self.definitions.get(key)) {
            (Some(value), Some(definition)) => {
                let mut flag = definition.clone();
                flag.default_value = value;
                Some(flag)
            }
            (Some(value), None) => Some(Flag::boolean(key, key, value)),
            (None, Some(definition)) => Some(definition.clone()),
            (None, None) => None,
        }
    }
}

#[async_trait]
impl FlagStore for EnvStore {
    async fn get(&self, key: &str) -> Result<Option<Flag>> {
        Ok(self.resolve(key))
    }

    async fn set(&self, _flag: Flag) -> Result<Flag> {
        Err(Error::ReadOnlyStore)
    }

    async fn delete(&self, _key: &str) -> Result<bool> {
        Err(Error::ReadOnlyStore)
    }

    async fn list(&self, filter: Option<&FlagFilter>) -> Result<Vec<Flag>> {
        let mut listed: Vec<Flag> = self
            .definitions
            .keys()
            .filter_map(|key| self.resolve(key))
            .filter(|flag| filter.map_or(true, |query| query.matches(flag)))
            .collect();
        listed.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(listed)
    }
}

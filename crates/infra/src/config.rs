//! Runtime configuration.
//!
//! Every setting has a default; `SUPPLYLEDGER_*` environment variables
//! override them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use supplyledger_inventory::{DEFAULT_DEPARTMENT_PREFIX, SkuPolicy};

pub const ENV_DATABASE_URL: &str = "SUPPLYLEDGER_DATABASE_URL";
pub const ENV_DEPARTMENT_PREFIX: &str = "SUPPLYLEDGER_DEPARTMENT_PREFIX";
pub const ENV_SKU_PREFIX: &str = "SUPPLYLEDGER_SKU_PREFIX";
pub const ENV_SKU_BASE: &str = "SUPPLYLEDGER_SKU_BASE";
pub const ENV_HISTORY_LIMIT: &str = "SUPPLYLEDGER_HISTORY_LIMIT";
pub const ENV_SEARCH_LIMIT: &str = "SUPPLYLEDGER_SEARCH_LIMIT";

pub const DEFAULT_DATABASE_URL: &str = "sqlite://supplyledger.db";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub database_url: String,
    /// Destination prefix that routes a transfer to a department.
    pub department_prefix: String,
    pub sku_prefix: char,
    pub sku_base: u64,
    /// Rows returned by the movement and adjustment logs.
    pub history_limit: usize,
    /// Rows returned by item and vendor searches.
    pub search_limit: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            department_prefix: DEFAULT_DEPARTMENT_PREFIX.to_string(),
            sku_prefix: SkuPolicy::DEFAULT_PREFIX,
            sku_base: SkuPolicy::DEFAULT_BASE,
            history_limit: 100,
            search_limit: 15,
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        match get(ENV_DATABASE_URL) {
            Some(url) => config.database_url = url.trim().to_string(),
            None => tracing::warn!(
                database_url = DEFAULT_DATABASE_URL,
                "{ENV_DATABASE_URL} not set; using default"
            ),
        }
        if let Some(prefix) = get(ENV_DEPARTMENT_PREFIX) {
            config.department_prefix = prefix.trim().to_string();
        }
        if let Some(raw) = get(ENV_SKU_PREFIX) {
            config.sku_prefix = parse_sku_prefix(&raw)?;
        }
        if let Some(raw) = get(ENV_SKU_BASE) {
            config.sku_base = parse_number(ENV_SKU_BASE, &raw)?;
        }
        if let Some(raw) = get(ENV_HISTORY_LIMIT) {
            config.history_limit = parse_number(ENV_HISTORY_LIMIT, &raw)?;
        }
        if let Some(raw) = get(ENV_SEARCH_LIMIT) {
            config.search_limit = parse_number(ENV_SEARCH_LIMIT, &raw)?;
        }
        Ok(config)
    }

    pub fn sku_policy(&self) -> SkuPolicy {
        SkuPolicy::new(self.sku_prefix, self.sku_base)
    }
}

fn parse_sku_prefix(raw: &str) -> Result<char, ConfigError> {
    let raw = raw.trim();
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_digit() => Ok(c),
        _ => Err(ConfigError::Invalid {
            key: ENV_SKU_PREFIX,
            value: raw.to_string(),
            reason: "expected a single digit".to_string(),
        }),
    }
}

fn parse_number<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use crate::common::parse::parse_duration;
use crate::error::{TsdbError, TsdbResult};
use crate::storage::DuplicatePolicy;

pub const DEFAULT_MAX_SERIES_LIMIT: usize = 30_000;
pub const DEFAULT_MAX_LOGGED_PAYLOAD_BYTES: usize = 4096;

pub const RETENTION_ENV: &str = "PROM_PUSH_RETENTION";
pub const DUPLICATE_POLICY_ENV: &str = "PROM_PUSH_DUPLICATE_POLICY";
pub const MAX_SERIES_ENV: &str = "PROM_PUSH_MAX_SERIES";
pub const MAX_LOGGED_PAYLOAD_ENV: &str = "PROM_PUSH_MAX_LOGGED_PAYLOAD";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// How far behind the newest committed sample the store still accepts writes.
    /// Older samples are rejected as out of bounds and trimmed on commit.
    /// `None` accepts any timestamp.
    pub retention: Option<Duration>,

    /// How a sample repeating the last timestamp of its series with a different value is handled.
    pub duplicate_policy: DuplicatePolicy,

    /// The maximum number of series the store accepts. 0 means no limit.
    pub max_series_limit: usize,

    /// Pushed payloads are logged at debug level, cut to this many bytes.
    pub max_logged_payload_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            retention: None,
            duplicate_policy: DuplicatePolicy::Block,
            max_series_limit: DEFAULT_MAX_SERIES_LIMIT,
            max_logged_payload_bytes: DEFAULT_MAX_LOGGED_PAYLOAD_BYTES,
        }
    }
}

impl Settings {
    /// Defaults overlaid with any `PROM_PUSH_*` environment variables.
    pub fn from_env() -> TsdbResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`Settings::from_env`], reading values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> TsdbResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();
        if let Some(value) = lookup(RETENTION_ENV) {
            let retention = parse_duration(&value).map_err(|e| invalid_setting(RETENTION_ENV, e))?;
            settings.retention = (!retention.is_zero()).then_some(retention);
        }
        if let Some(value) = lookup(DUPLICATE_POLICY_ENV) {
            settings.duplicate_policy = DuplicatePolicy::from_str(&value)
                .map_err(|e| invalid_setting(DUPLICATE_POLICY_ENV, e))?;
        }
        if let Some(value) = lookup(MAX_SERIES_ENV) {
            settings.max_series_limit = parse_setting(MAX_SERIES_ENV, &value)?;
        }
        if let Some(value) = lookup(MAX_LOGGED_PAYLOAD_ENV) {
            settings.max_logged_payload_bytes = parse_setting(MAX_LOGGED_PAYLOAD_ENV, &value)?;
        }
        Ok(settings)
    }

    pub fn from_json(json: &str) -> TsdbResult<Self> {
        serde_json::from_str(json).map_err(|e| TsdbError::InvalidConfiguration(e.to_string()))
    }
}

fn invalid_setting(name: &str, err: TsdbError) -> TsdbError {
    TsdbError::InvalidConfiguration(format!("{name}: {err}"))
}

fn parse_setting<T: FromStr>(name: &str, value: &str) -> TsdbResult<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| invalid_setting(name, TsdbError::InvalidNumber(value.to_string())))
}

static GLOBAL_SETTINGS: OnceLock<Settings> = OnceLock::new();

/// Process wide settings, read from the environment on first use. Malformed variables are
/// logged and replaced by defaults.
pub fn get_global_settings() -> &'static Settings {
    GLOBAL_SETTINGS.get_or_init(|| {
        Settings::from_env().unwrap_or_else(|err| {
            tracing::warn!(error = %err, "Invalid settings in environment, using defaults");
            Settings::default()
        })
    })
}

// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Config service, storage port, and the engine's configuration values.

use chrono::{Duration, FixedOffset, Offset, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

/// Key under which [`HosConfig`] is persisted.
pub const HOS_CONFIG_KEY: &str = "hos";

/// Storage port for raw config blobs (keyed by logical name).
pub trait ConfigStore {
    /// Load a raw config blob. Returns `NotFound` when missing.
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError>;
    /// Persist a raw config blob.
    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError>;
}

/// Error type for config operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Key not present in store.
    #[error("not found")]
    NotFound,
    /// I/O error while reading/writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization/deserialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Catch-all error variant.
    #[error("other: {0}")]
    Other(String),
}

/// Thin service that serializes config values and delegates storage to a `ConfigStore`.
pub struct ConfigService<S> {
    store: S,
}

impl<S> ConfigService<S> {
    /// Create a new service using the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Consume the service and return the inner store.
    pub fn into_inner(self) -> S {
        self.store
    }
}

impl<S> ConfigService<S>
where
    S: ConfigStore,
{
    /// Load and deserialize a config value for `key`. Returns `Ok(None)` if missing.
    pub fn load<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: DeserializeOwned,
    {
        match self.store.load_raw(key) {
            Ok(bytes) => {
                if bytes.is_empty() {
                    return Ok(None);
                }
                let value = serde_json::from_slice(&bytes)?;
                Ok(Some(value))
            }
            Err(ConfigError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Serialize and persist a config value for `key`.
    pub fn save<T>(&self, key: &str, value: &T) -> Result<(), ConfigError>
    where
        T: Serialize,
    {
        let data = serde_json::to_vec_pretty(value)?;
        self.store.save_raw(key, &data)
    }

    /// Load [`HosConfig`], falling back to defaults when absent.
    pub fn load_hos(&self) -> Result<HosConfig, ConfigError> {
        Ok(self.load(HOS_CONFIG_KEY)?.unwrap_or_default())
    }
}

/// Which multi-day cycle limit applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CycleRule {
    /// 60 hours in 7 consecutive days.
    #[serde(rename = "seven_day_60")]
    SevenDay60,
    /// 70 hours in 8 consecutive days.
    #[default]
    #[serde(rename = "eight_day_70")]
    EightDay70,
}

impl CycleRule {
    /// Length of the rolling window in days.
    pub fn days(self) -> i64 {
        match self {
            Self::SevenDay60 => 7,
            Self::EightDay70 => 8,
        }
    }

    /// On-duty limit for the window, in seconds.
    pub fn limit_secs(self) -> i64 {
        match self {
            Self::SevenDay60 => 60 * 3600,
            Self::EightDay70 => 70 * 3600,
        }
    }

    /// Rolling window length.
    pub fn window(self) -> Duration {
        Duration::days(self.days())
    }
}

impl std::str::FromStr for CycleRule {
    type Err = ConfigError;

    /// Accepts `seven_day_60`/`60/7`/`60` and `eight_day_70`/`70/8`/`70`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "seven_day_60" | "60/7" | "7" | "60" => Ok(Self::SevenDay60),
            "eight_day_70" | "70/8" | "8" | "70" => Ok(Self::EightDay70),
            other => Err(ConfigError::Other(format!("unknown cycle rule {other:?}"))),
        }
    }
}

/// Regulatory limits, in seconds. Fixed by regulation; not user-configurable.
pub mod limits {
    /// Maximum driving in one duty period.
    pub const MAX_DRIVE_SECS: i64 = 11 * 3600;
    /// Maximum elapsed time from duty-period start while on duty.
    pub const MAX_DUTY_WINDOW_SECS: i64 = 14 * 3600;
    /// Rest needed to start a new duty period.
    pub const DUTY_RESET_SECS: i64 = 10 * 3600;
    /// Rest needed to restart the multi-day cycle.
    pub const CYCLE_RESTART_SECS: i64 = 34 * 3600;
}

/// Rule-engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    /// Cycle rule in force.
    pub cycle: CycleRule,
    /// Home-terminal offset from UTC in minutes; sets calendar-day boundaries.
    pub utc_offset_minutes: i32,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            cycle: CycleRule::EightDay70,
            utc_offset_minutes: 0,
        }
    }
}

impl RuleConfig {
    /// Offset used for calendar-day bucketing. Out-of-range values fall back to UTC.
    pub fn day_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix())
    }
}

/// Async service tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Bound on waiting for a driver's write slot, in milliseconds.
    pub commit_timeout_ms: u64,
    /// Capacity of the violation notification channel.
    pub notification_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            commit_timeout_ms: 3_000,
            notification_capacity: 256,
        }
    }
}

impl ServiceConfig {
    /// Commit timeout as a std duration.
    pub fn commit_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.commit_timeout_ms)
    }
}

/// Top-level persisted configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HosConfig {
    /// Rule-engine settings.
    pub rules: RuleConfig,
    /// Service settings.
    pub service: ServiceConfig,
}

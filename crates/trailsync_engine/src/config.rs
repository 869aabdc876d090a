//! Engine configuration sourced from the environment.

use crate::error::SyncError;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DB_PATH: &str = "trailsync.db";
pub const DEFAULT_TOLERANCE_M: f64 = 10.0;
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(900);

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub db_path: PathBuf,
    /// Tolerance in meters for the route point filter.
    pub tolerance_m: f64,
    /// How many workouts may fetch routes concurrently.
    pub max_in_flight: usize,
    /// Upper bound for provider requests and chunk waits.
    pub provider_timeout: Duration,
    /// Minimum spacing between incremental sync passes.
    pub sync_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            tolerance_m: DEFAULT_TOLERANCE_M,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
            sync_interval: DEFAULT_SYNC_INTERVAL,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, SyncError> {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    /// Reads configuration through the provided lookup, which keeps tests
    /// away from the process environment. Unset variables fall back to
    /// defaults; values that do not parse are reported as configuration
    /// errors instead of being silently ignored.
    pub fn from_env_with<F>(mut get: F) -> Result<Self, SyncError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let db_path = get("TRAILSYNC_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));
        let tolerance_m = parse_or(
            "TRAILSYNC_TOLERANCE_M",
            get("TRAILSYNC_TOLERANCE_M"),
            DEFAULT_TOLERANCE_M,
        )?;
        let max_in_flight = parse_or(
            "TRAILSYNC_MAX_IN_FLIGHT",
            get("TRAILSYNC_MAX_IN_FLIGHT"),
            DEFAULT_MAX_IN_FLIGHT,
        )?;
        let provider_timeout_secs = parse_or(
            "TRAILSYNC_PROVIDER_TIMEOUT_SECS",
            get("TRAILSYNC_PROVIDER_TIMEOUT_SECS"),
            DEFAULT_PROVIDER_TIMEOUT.as_secs(),
        )?;
        let sync_interval_secs = parse_or(
            "TRAILSYNC_SYNC_INTERVAL_SECS",
            get("TRAILSYNC_SYNC_INTERVAL_SECS"),
            DEFAULT_SYNC_INTERVAL.as_secs(),
        )?;

        let config = Self {
            db_path,
            tolerance_m,
            max_in_flight,
            provider_timeout: Duration::from_secs(provider_timeout_secs),
            sync_interval: Duration::from_secs(sync_interval_secs),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), SyncError> {
        if !self.tolerance_m.is_finite() || self.tolerance_m <= 0.0 {
            return Err(SyncError::Config(format!(
                "TRAILSYNC_TOLERANCE_M must be a positive number, got {}",
                self.tolerance_m
            )));
        }
        if self.max_in_flight == 0 {
            return Err(SyncError::Config(
                "TRAILSYNC_MAX_IN_FLIGHT must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn parse_or<T>(name: &str, raw: Option<String>, default: T) -> Result<T, SyncError>
where
    T: std::str::FromStr,
{
    match raw {
        None => Ok(default),
        Some(s) => s
            .trim()
            .parse::<T>()
            .map_err(|_| SyncError::Config(format!("invalid value for {name}: {s}"))),
    }
}

//! Orchestrator tuning.
//!
//! Every knob has a default suitable for production. Override via
//! environment variables or build a [`TrainConfig`] directly in tests.

use std::time::Duration;

/// Shortest lock lease that can be renewed in time. Leases are renewed
/// every third of the TTL, each renewal bounded by the same period.
pub const MIN_LOCK_TTL: Duration = Duration::from_secs(3);

/// Timeouts, TTLs and retry limits for the orchestrator and its stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainConfig {
    /// Lease of the movement lock, renewed while a movement or sweep runs.
    /// At least [`MIN_LOCK_TTL`].
    pub lock_ttl: Duration,
    /// Age after which an unfinished staging record is reclaimed. Must be
    /// longer than `lock_ttl`.
    pub stuck_threshold: Duration,
    pub staging_ttl: Duration,
    /// Lifetime of a cached generated artifact.
    pub artifact_ttl: Duration,
    /// How long a metadata retry entry is kept before it is dropped.
    pub retry_retention: Duration,
    /// Compare-and-swap attempts per staging update.
    pub cas_max_retries: u32,
    /// Bound on every external call except artifact generation.
    pub step_timeout: Duration,
    pub generation_timeout: Duration,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::from_millis(30_000),
            stuck_threshold: Duration::from_secs(600),
            staging_ttl: Duration::from_secs(7 * 24 * 3600),
            artifact_ttl: Duration::from_secs(24 * 3600),
            retry_retention: Duration::from_secs(7 * 24 * 3600),
            cas_max_retries: 5,
            step_timeout: Duration::from_secs(60),
            generation_timeout: Duration::from_secs(120),
        }
    }
}

impl TrainConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `CHOO_LOCK_TTL_MS` (default: 30000)
    /// - `CHOO_STUCK_THRESHOLD_SECS` (default: 600)
    /// - `CHOO_STAGING_TTL_SECS` (default: 604800)
    /// - `CHOO_ARTIFACT_TTL_SECS` (default: 86400)
    /// - `CHOO_RETRY_RETENTION_SECS` (default: 604800)
    /// - `CHOO_CAS_MAX_RETRIES` (default: 5)
    /// - `CHOO_STEP_TIMEOUT_SECS` (default: 60)
    /// - `CHOO_GENERATION_TIMEOUT_SECS` (default: 120)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            lock_ttl: env_duration("CHOO_LOCK_TTL_MS", Duration::from_millis, defaults.lock_ttl)?,
            stuck_threshold: env_duration(
                "CHOO_STUCK_THRESHOLD_SECS",
                Duration::from_secs,
                defaults.stuck_threshold,
            )?,
            staging_ttl: env_duration(
                "CHOO_STAGING_TTL_SECS",
                Duration::from_secs,
                defaults.staging_ttl,
            )?,
            artifact_ttl: env_duration(
                "CHOO_ARTIFACT_TTL_SECS",
                Duration::from_secs,
                defaults.artifact_ttl,
            )?,
            retry_retention: env_duration(
                "CHOO_RETRY_RETENTION_SECS",
                Duration::from_secs,
                defaults.retry_retention,
            )?,
            cas_max_retries: env_number("CHOO_CAS_MAX_RETRIES")?
                .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
                .unwrap_or(defaults.cas_max_retries),
            step_timeout: env_duration(
                "CHOO_STEP_TIMEOUT_SECS",
                Duration::from_secs,
                defaults.step_timeout,
            )?,
            generation_timeout: env_duration(
                "CHOO_GENERATION_TIMEOUT_SECS",
                Duration::from_secs,
                defaults.generation_timeout,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the orchestrator cannot run safely with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lock_ttl.is_zero() {
            return Err(ConfigError::ZeroDuration("lock_ttl"));
        }
        if self.lock_ttl < MIN_LOCK_TTL {
            return Err(ConfigError::LockTtlTooShort {
                lock_ttl: self.lock_ttl,
                minimum: MIN_LOCK_TTL,
            });
        }
        if self.step_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("step_timeout"));
        }
        if self.generation_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("generation_timeout"));
        }
        if self.stuck_threshold <= self.lock_ttl {
            return Err(ConfigError::StuckThresholdTooShort {
                stuck_threshold: self.stuck_threshold,
                lock_ttl: self.lock_ttl,
            });
        }
        Ok(())
    }
}

fn env_number(var: &'static str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { var, value: raw }),
        Err(_) => Ok(None),
    }
}

fn env_duration(
    var: &'static str,
    unit: fn(u64) -> Duration,
    default: Duration,
) -> Result<Duration, ConfigError> {
    Ok(env_number(var)?.map(unit).unwrap_or(default))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be a non-negative integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("lock TTL {lock_ttl:?} is below the renewable minimum {minimum:?}")]
    LockTtlTooShort { lock_ttl: Duration, minimum: Duration },
    #[error("stuck threshold {stuck_threshold:?} must exceed the lock TTL {lock_ttl:?}")]
    StuckThresholdTooShort {
        stuck_threshold: Duration,
        lock_ttl: Duration,
    },
}

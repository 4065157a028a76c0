use std::time::Duration;

use serde::Deserialize;

use crate::PolicyError;

const DEFAULT_MAX_ATTEMPTS: u32 = 4;
const DEFAULT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
const DEFAULT_MAX_DELAY_MS: u64 = 5_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Configures per-attempt deadline and timeout retry behavior.
///
/// Only deadline failures are retried. The delay inserted after attempt
/// `n` (0-based) is `min(base_delay * 2^n, max_delay)`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(try_from = "RawRetryPolicy")]
pub struct RetryPolicy {
    max_attempts: u32,
    timeout: Duration,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Builds a validated policy. Every field must be positive.
    pub fn new(
        max_attempts: u32,
        timeout: Duration,
        base_delay: Duration,
        max_delay: Duration,
    ) -> Result<Self, PolicyError> {
        if max_attempts == 0 {
            return Err(PolicyError::NotPositive {
                field: "max_attempts",
            });
        }
        for (field, value) in [
            ("timeout", timeout),
            ("base_delay", base_delay),
            ("max_delay", max_delay),
        ] {
            if value.is_zero() {
                return Err(PolicyError::NotPositive { field });
            }
        }
        Ok(Self {
            max_attempts,
            timeout,
            base_delay,
            max_delay,
        })
    }

    /// Builds a policy from millisecond values.
    pub fn from_millis(
        max_attempts: u32,
        timeout_ms: u64,
        base_delay_ms: u64,
        max_delay_ms: u64,
    ) -> Result<Self, PolicyError> {
        Self::new(
            max_attempts,
            Duration::from_millis(timeout_ms),
            Duration::from_millis(base_delay_ms),
            Duration::from_millis(max_delay_ms),
        )
    }

    /// Reads the policy from environment variables.
    ///
    /// Reads:
    /// - `CONDO_FETCH_MAX_ATTEMPTS`
    /// - `CONDO_FETCH_TIMEOUT_MS`
    /// - `CONDO_FETCH_BASE_DELAY_MS`
    /// - `CONDO_FETCH_MAX_DELAY_MS`
    ///
    /// Unset variables fall back to the defaults; unparsable or zero values
    /// are rejected.
    pub fn from_env() -> Result<Self, PolicyError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, PolicyError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        fn read<F, N>(lookup: &F, name: &'static str, default: N) -> Result<N, PolicyError>
        where
            F: Fn(&'static str) -> Option<String>,
            N: std::str::FromStr,
        {
            match lookup(name) {
                None => Ok(default),
                Some(value) => value
                    .trim()
                    .parse()
                    .map_err(|_| PolicyError::InvalidEnv { name, value }),
            }
        }

        Self::from_millis(
            read(&lookup, "CONDO_FETCH_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?,
            read(&lookup, "CONDO_FETCH_TIMEOUT_MS", DEFAULT_TIMEOUT_MS)?,
            read(&lookup, "CONDO_FETCH_BASE_DELAY_MS", DEFAULT_BASE_DELAY_MS)?,
            read(&lookup, "CONDO_FETCH_MAX_DELAY_MS", DEFAULT_MAX_DELAY_MS)?,
        )
    }

    /// Same policy with a different attempt budget.
    pub fn with_max_attempts(self, max_attempts: u32) -> Result<Self, PolicyError> {
        Self::new(max_attempts, self.timeout, self.base_delay, self.max_delay)
    }

    /// Same policy with a different per-attempt deadline.
    pub fn with_timeout(self, timeout: Duration) -> Result<Self, PolicyError> {
        Self::new(self.max_attempts, timeout, self.base_delay, self.max_delay)
    }

    /// Same policy with a different backoff curve.
    pub fn with_backoff(
        self,
        base_delay: Duration,
        max_delay: Duration,
    ) -> Result<Self, PolicyError> {
        Self::new(self.max_attempts, self.timeout, base_delay, max_delay)
    }

    /// Total attempts, including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Deadline applied to each attempt.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Delay after the first timed-out attempt.
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Upper bound for any single delay.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Delay to wait after attempt `attempt` (0-based) timed out.
    ///
    /// Computed at nanosecond precision and saturating, so it never drops
    /// below `base_delay` nor exceeds `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u128.checked_shl(attempt).unwrap_or(u128::MAX);
        let nanos = self
            .base_delay
            .as_nanos()
            .saturating_mul(factor)
            .min(self.max_delay.as_nanos());
        // bounded by max_delay, so both parts fit
        let secs = u64::try_from(nanos / NANOS_PER_SEC).unwrap_or(u64::MAX);
        let subsec = u32::try_from(nanos % NANOS_PER_SEC).unwrap_or(0);
        Duration::new(secs, subsec)
    }
}

#[derive(Deserialize)]
struct RawRetryPolicy {
    #[serde(default = "default_max_attempts")]
    max_attempts: u32,
    #[serde(default = "default_timeout_ms")]
    timeout_ms: u64,
    #[serde(default = "default_base_delay_ms")]
    base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}

fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}

impl TryFrom<RawRetryPolicy> for RetryPolicy {
    type Error = PolicyError;

    fn try_from(raw: RawRetryPolicy) -> Result<Self, Self::Error> {
        Self::from_millis(
            raw.max_attempts,
            raw.timeout_ms,
            raw.base_delay_ms,
            raw.max_delay_ms,
        )
    }
}

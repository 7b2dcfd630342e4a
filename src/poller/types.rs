//! Poll configuration and outcome types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, SearchPollError};

/// Deadline used when `maximum_search_time` is not configured.
pub const DEFAULT_MAX_WAIT_SECONDS: f64 = 65.0;

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Interval tuning for the poll loop.
///
/// The sleep after check `n` (0-based) is `interval_ms * backoff_factor^n`,
/// capped at `max_interval_ms`. A factor of 1.0 polls at a fixed interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    /// Sleep between the first two checks in milliseconds
    pub interval_ms: u64,

    /// Factor by which the interval grows after each check
    pub backoff_factor: f64,

    /// Upper bound on the interval in milliseconds
    pub max_interval_ms: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            backoff_factor: 1.0,
            max_interval_ms: 2000,
        }
    }
}

/// Validated, immutable configuration for one poller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollConfig {
    max_wait: Duration,
    commit_endpoint: Option<Url>,
    settings: PollSettings,
}

impl PollConfig {
    /// Build a config with the default fixed 500 ms interval.
    ///
    /// # Errors
    /// Returns [`SearchPollError::Configuration`] if `max_wait_seconds` is not
    /// a positive finite number.
    pub fn new(max_wait_seconds: f64, commit_endpoint: Option<Url>) -> Result<Self> {
        Self::with_settings(max_wait_seconds, commit_endpoint, PollSettings::default())
    }

    /// Build a config with explicit interval tuning.
    pub fn with_settings(
        max_wait_seconds: f64,
        commit_endpoint: Option<Url>,
        settings: PollSettings,
    ) -> Result<Self> {
        if !max_wait_seconds.is_finite() || max_wait_seconds <= 0.0 {
            return Err(SearchPollError::Configuration(format!(
                "maximum search time must be a positive number of seconds, got {}",
                max_wait_seconds
            )));
        }
        if settings.interval_ms == 0 {
            return Err(SearchPollError::Configuration(
                "poll interval must be at least 1 ms".to_string(),
            ));
        }
        if !settings.backoff_factor.is_finite() || settings.backoff_factor < 1.0 {
            return Err(SearchPollError::Configuration(format!(
                "poll backoff factor must be >= 1.0, got {}",
                settings.backoff_factor
            )));
        }
        if settings.max_interval_ms < settings.interval_ms {
            return Err(SearchPollError::Configuration(format!(
                "max poll interval ({} ms) is below the poll interval ({} ms)",
                settings.max_interval_ms, settings.interval_ms
            )));
        }

        let max_wait = Duration::try_from_secs_f64(max_wait_seconds).map_err(|e| {
            SearchPollError::Configuration(format!(
                "maximum search time of {} seconds is out of range: {}",
                max_wait_seconds, e
            ))
        })?;

        Ok(Self {
            max_wait,
            commit_endpoint,
            settings,
        })
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    pub fn commit_endpoint(&self) -> Option<&Url> {
        self.commit_endpoint.as_ref()
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    /// Sleep to take after the check with the given 0-based index.
    pub fn interval_after(&self, check_index: u32) -> Duration {
        let PollSettings {
            interval_ms,
            backoff_factor,
            max_interval_ms,
        } = self.settings;
        let exponent = i32::try_from(check_index).unwrap_or(i32::MAX);
        let scaled = interval_ms as f64 * backoff_factor.powi(exponent);
        let capped = scaled.min(max_interval_ms as f64);
        Duration::from_millis(capped as u64)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs_f64(DEFAULT_MAX_WAIT_SECONDS),
            commit_endpoint: None,
            settings: PollSettings::default(),
        }
    }
}

/// Result of a single poll invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The predicate returned true.
    Visible { elapsed: Duration, attempts: u32 },
    /// The deadline passed, or the poll was cancelled, before the predicate held.
    TimedOut { waited: Duration, attempts: u32 },
}

impl PollOutcome {
    pub fn is_visible(&self) -> bool {
        matches!(self, PollOutcome::Visible { .. })
    }

    /// Time spent in the poll, in milliseconds, for either variant.
    pub fn elapsed_ms(&self) -> u64 {
        let duration = match self {
            PollOutcome::Visible { elapsed, .. } => elapsed,
            PollOutcome::TimedOut { waited, .. } => waited,
        };
        millis(*duration)
    }

    /// Number of times the predicate was invoked.
    pub fn attempts(&self) -> u32 {
        match self {
            PollOutcome::Visible { attempts, .. } | PollOutcome::TimedOut { attempts, .. } => {
                *attempts
            }
        }
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            PollOutcome::Visible { .. } => "visible",
            PollOutcome::TimedOut { .. } => "timed_out",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_waits_65_seconds() {
        let config = PollConfig::default();
        assert_eq!(config.max_wait(), Duration::from_secs(65));
        assert!(config.commit_endpoint().is_none());
        assert_eq!(config.interval_after(0), Duration::from_millis(500));
    }

    #[test]
    fn test_rejects_non_positive_deadline() {
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let result = PollConfig::new(bad, None);
            assert!(
                matches!(result, Err(SearchPollError::Configuration(_))),
                "deadline {} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_rejects_deadline_too_large_for_duration() {
        for huge in [1e30, f64::MAX] {
            let result = PollConfig::new(huge, None);
            assert!(
                matches!(result, Err(SearchPollError::Configuration(_))),
                "deadline {} should be rejected",
                huge
            );
        }
    }

    #[test]
    fn test_accepts_fractional_deadline() {
        let config = PollConfig::new(0.25, None).unwrap();
        assert_eq!(config.max_wait(), Duration::from_millis(250));
    }

    #[test]
    fn test_rejects_bad_interval_settings() {
        let zero_interval = PollSettings {
            interval_ms: 0,
            ..Default::default()
        };
        assert!(PollConfig::with_settings(5.0, None, zero_interval).is_err());

        let shrinking = PollSettings {
            backoff_factor: 0.5,
            ..Default::default()
        };
        assert!(PollConfig::with_settings(5.0, None, shrinking).is_err());

        let inverted = PollSettings {
            interval_ms: 1000,
            max_interval_ms: 100,
            ..Default::default()
        };
        assert!(PollConfig::with_settings(5.0, None, inverted).is_err());
    }

    #[test]
    fn test_backoff_grows_then_caps() {
        let settings = PollSettings {
            interval_ms: 250,
            backoff_factor: 1.5,
            max_interval_ms: 600,
        };
        let config = PollConfig::with_settings(10.0, None, settings).unwrap();

        assert_eq!(config.interval_after(0), Duration::from_millis(250));
        assert_eq!(config.interval_after(1), Duration::from_millis(375));
        assert_eq!(config.interval_after(2), Duration::from_millis(562));
        assert_eq!(config.interval_after(3), Duration::from_millis(600));
        assert_eq!(config.interval_after(u32::MAX), Duration::from_millis(600));
    }

    #[test]
    fn test_outcome_accessors() {
        let visible = PollOutcome::Visible {
            elapsed: Duration::from_millis(1250),
            attempts: 3,
        };
        let timed_out = PollOutcome::TimedOut {
            waited: Duration::from_secs(1),
            attempts: 3,
        };

        assert!(visible.is_visible());
        assert!(!timed_out.is_visible());
        assert_eq!(visible.elapsed_ms(), 1250);
        assert_eq!(timed_out.elapsed_ms(), 1000);
        assert_eq!(timed_out.attempts(), 3);
    }
}

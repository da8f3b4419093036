//! Attempt policies: when a retry call gives up.
//!
//! A policy is pure data. It describes the termination conditions of one
//! retry call but never executes anything, which keeps it cheap to build per
//! call, easy to compare in tests and easy to load from configuration.

use std::fmt;
use std::time::Duration;

/// Delay between attempts when none is configured.
pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

/// Termination conditions for a single retry call.
///
/// # Bounds Behavior
///
/// At least one bound MUST be set:
/// - `timeout`: wall-clock limit for the whole call
/// - `max_retries`: retries allowed after the first failure, so `N` retries
///   means up to `N + 1` invocations of the operation
///
/// The named constructors always set a bound. [`AttemptPolicy::new`] and the
/// configuration path return [`ConfigError::Unbounded`] when neither is given.
///
/// # Examples
///
/// ```rust
/// use eventually::AttemptPolicy;
/// use std::time::Duration;
///
/// let policy = AttemptPolicy::timeout(Duration::from_secs(30))
///     .with_max_retries(5)
///     .with_delay(Duration::from_millis(250));
///
/// assert_eq!(policy.timeout_duration(), Some(Duration::from_secs(30)));
/// assert_eq!(policy.max_retries(), Some(5));
/// assert_eq!(policy.delay(), Duration::from_millis(250));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptPolicy {
    timeout: Option<Duration>,
    max_retries: Option<u32>,
    delay: Duration,
}

impl AttemptPolicy {
    /// Build a policy from optional bounds, failing if both are absent.
    ///
    /// ```rust
    /// use eventually::{AttemptPolicy, ConfigError};
    ///
    /// assert_eq!(AttemptPolicy::new(None, None), Err(ConfigError::Unbounded));
    /// assert!(AttemptPolicy::new(None, Some(3)).is_ok());
    /// ```
    pub fn new(timeout: Option<Duration>, max_retries: Option<u32>) -> Result<Self, ConfigError> {
        let policy = Self {
            timeout,
            max_retries,
            delay: DEFAULT_DELAY,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Retry until `timeout` has elapsed, with the default one second delay.
    ///
    /// A zero `timeout` builds a policy that [`validate`](Self::validate)
    /// rejects; retry calls report it as
    /// [`RetryError::Config`](crate::RetryError::Config) without running
    /// the operation. A timeout too large to fall within representable time
    /// imposes no wall-clock bound.
    pub fn timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            max_retries: None,
            delay: DEFAULT_DELAY,
        }
    }

    /// Retry at most `max_retries` times after the first failure, with the
    /// default one second delay.
    pub fn retries(max_retries: u32) -> Self {
        Self {
            timeout: None,
            max_retries: Some(max_retries),
            delay: DEFAULT_DELAY,
        }
    }

    /// Add (or replace) the wall-clock bound. See [`AttemptPolicy::timeout`]
    /// for zero and oversized values.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Add (or replace) the retry bound.
    pub fn with_max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    /// Set the pause between attempts. `Duration::ZERO` retries immediately.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Get the wall-clock bound.
    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout
    }

    /// Get the retry bound.
    pub fn max_retries(&self) -> Option<u32> {
        self.max_retries
    }

    /// Get the pause between attempts.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Check that the policy terminates.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match (self.timeout, self.max_retries) {
            (None, None) => Err(ConfigError::Unbounded),
            (Some(t), _) if t.is_zero() => Err(ConfigError::ZeroTimeout),
            _ => Ok(()),
        }
    }
}

/// Policy settings as they appear in a test-suite configuration file.
///
/// Durations are given in (fractional) seconds.
///
/// ```rust
/// # #[cfg(feature = "serde")] {
/// use eventually::{AttemptPolicy, PolicyConfig};
///
/// let config: PolicyConfig =
///     serde_json::from_str(r#"{ "max_retries": 20, "delay_secs": 0.5 }"#).unwrap();
/// let policy = AttemptPolicy::try_from(config).unwrap();
///
/// assert_eq!(policy.max_retries(), Some(20));
/// # }
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct PolicyConfig {
    /// Wall-clock bound in seconds.
    pub timeout_secs: Option<f64>,
    /// Retries allowed after the first failure.
    pub max_retries: Option<u32>,
    /// Pause between attempts in seconds; one second when absent.
    pub delay_secs: Option<f64>,
}

impl TryFrom<PolicyConfig> for AttemptPolicy {
    type Error = ConfigError;

    fn try_from(config: PolicyConfig) -> Result<Self, Self::Error> {
        let timeout = config
            .timeout_secs
            .map(|secs| seconds("timeout_secs", secs))
            .transpose()?;
        let mut policy = AttemptPolicy::new(timeout, config.max_retries)?;
        if let Some(secs) = config.delay_secs {
            policy = policy.with_delay(seconds("delay_secs", secs)?);
        }
        Ok(policy)
    }
}

impl From<&AttemptPolicy> for PolicyConfig {
    fn from(policy: &AttemptPolicy) -> Self {
        Self {
            timeout_secs: policy.timeout.map(|t| t.as_secs_f64()),
            max_retries: policy.max_retries,
            delay_secs: Some(policy.delay.as_secs_f64()),
        }
    }
}

fn seconds(field: &'static str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::InvalidSeconds { field, value })
}

/// A policy that cannot be used.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Neither a timeout nor a retry bound was given.
    Unbounded,
    /// The timeout was zero, so no attempt could ever run.
    ZeroTimeout,
    /// A duration field was negative, NaN or too large.
    InvalidSeconds {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected value.
        value: f64,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbounded => {
                write!(f, "attempt policy must have a timeout or a retry bound")
            }
            Self::ZeroTimeout => write!(f, "attempt policy timeout must be positive"),
            Self::InvalidSeconds { field, value } => {
                write!(f, "{} must be a non-negative number of seconds, got {}", field, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod policy_tests {
    use super::*;

    #[test]
    fn test_named_constructors_set_one_bound() {
        let policy = AttemptPolicy::timeout(Duration::from_secs(5));
        assert_eq!(policy.timeout_duration(), Some(Duration::from_secs(5)));
        assert_eq!(policy.max_retries(), None);
        assert_eq!(policy.delay(), DEFAULT_DELAY);

        let policy = AttemptPolicy::retries(3);
        assert_eq!(policy.timeout_duration(), None);
        assert_eq!(policy.max_retries(), Some(3));
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_new_without_bounds_is_rejected() {
        assert_eq!(AttemptPolicy::new(None, None), Err(ConfigError::Unbounded));
    }

    #[test]
    fn test_new_with_both_bounds() {
        let policy = AttemptPolicy::new(Some(Duration::from_secs(2)), Some(4)).unwrap();
        assert_eq!(policy.timeout_duration(), Some(Duration::from_secs(2)));
        assert_eq!(policy.max_retries(), Some(4));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        assert_eq!(
            AttemptPolicy::new(Some(Duration::ZERO), None),
            Err(ConfigError::ZeroTimeout)
        );
        assert_eq!(
            AttemptPolicy::timeout(Duration::ZERO).validate(),
            Err(ConfigError::ZeroTimeout)
        );
    }

    #[test]
    fn test_zero_retries_is_allowed() {
        let policy = AttemptPolicy::new(None, Some(0)).unwrap();
        assert_eq!(policy.max_retries(), Some(0));
    }

    #[test]
    fn test_config_defaults_delay() {
        let config = PolicyConfig {
            timeout_secs: Some(1.5),
            ..PolicyConfig::default()
        };
        let policy = AttemptPolicy::try_from(config).unwrap();
        assert_eq!(policy.timeout_duration(), Some(Duration::from_millis(1500)));
        assert_eq!(policy.delay(), DEFAULT_DELAY);
    }

    #[test]
    fn test_config_rejects_negative_delay() {
        let config = PolicyConfig {
            max_retries: Some(1),
            delay_secs: Some(-1.0),
            ..PolicyConfig::default()
        };
        assert_eq!(
            AttemptPolicy::try_from(config),
            Err(ConfigError::InvalidSeconds {
                field: "delay_secs",
                value: -1.0
            })
        );
    }

    #[test]
    fn test_config_rejects_nan_timeout() {
        let config = PolicyConfig {
            timeout_secs: Some(f64::NAN),
            ..PolicyConfig::default()
        };
        assert!(matches!(
            AttemptPolicy::try_from(config),
            Err(ConfigError::InvalidSeconds {
                field: "timeout_secs",
                ..
            })
        ));
    }

    #[test]
    fn test_config_without_bounds_is_rejected() {
        assert_eq!(
            AttemptPolicy::try_from(PolicyConfig::default()),
            Err(ConfigError::Unbounded)
        );
    }

    #[test]
    fn test_policy_to_config() {
        let policy = AttemptPolicy::retries(7).with_delay(Duration::from_millis(500));
        let config = PolicyConfig::from(&policy);
        assert_eq!(config.max_retries, Some(7));
        assert_eq!(config.delay_secs, Some(0.5));
        assert_eq!(AttemptPolicy::try_from(config), Ok(policy));
    }

    #[test]
    fn test_config_error_display() {
        assert!(ConfigError::Unbounded.to_string().contains("timeout or a retry bound"));
        let err = ConfigError::InvalidSeconds {
            field: "delay_secs",
            value: -2.0,
        };
        assert!(err.to_string().contains("delay_secs"));
    }

    #[test]
    fn test_huge_config_timeout_runs_without_a_deadline() {
        let config = PolicyConfig {
            timeout_secs: Some(1e19),
            delay_secs: Some(0.0),
            ..PolicyConfig::default()
        };
        let policy = AttemptPolicy::try_from(config).unwrap();

        let result = crate::Retry::new(policy).run(|| Ok::<_, &str>("booted"));
        assert_eq!(result, Ok("booted"));
    }

    #[test]
    fn test_zero_timeout_from_any_constructor_fails_validation() {
        let zero = Duration::ZERO;
        assert_eq!(AttemptPolicy::new(Some(zero), None), Err(ConfigError::ZeroTimeout));
        assert_eq!(
            AttemptPolicy::timeout(zero).validate(),
            Err(ConfigError::ZeroTimeout)
        );
        assert_eq!(
            AttemptPolicy::retries(2).with_timeout(zero).validate(),
            Err(ConfigError::ZeroTimeout)
        );
        let config = PolicyConfig {
            timeout_secs: Some(0.0),
            ..PolicyConfig::default()
        };
        assert_eq!(AttemptPolicy::try_from(config), Err(ConfigError::ZeroTimeout));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_config_from_json() {
        let config: PolicyConfig =
            serde_json::from_str(r#"{ "timeout_secs": 270, "delay_secs": 0 }"#).unwrap();
        let policy = AttemptPolicy::try_from(config).unwrap();
        assert_eq!(policy.timeout_duration(), Some(Duration::from_secs(270)));
        assert_eq!(policy.delay(), Duration::ZERO);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_config_rejects_unknown_fields() {
        let parsed = serde_json::from_str::<PolicyConfig>(r#"{ "max_attempts": 3 }"#);
        assert!(parsed.is_err());
    }
}

//! Terminal failures of a retry call.

use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

use crate::classify::{Classify, Verdict};
use crate::deadline::Interrupt;
use crate::policy::ConfigError;

/// Why a retry call gave up.
///
/// Transient failures never escape on their own; the last one seen rides
/// along inside [`TimedOut`] or [`Exhausted`] so the report can show it.
///
/// # Examples
///
/// ```rust
/// use eventually::{AttemptPolicy, Retry, RetryError};
/// use std::time::Duration;
///
/// let policy = AttemptPolicy::retries(2).with_delay(Duration::ZERO);
/// let result: Result<(), _> = Retry::new(policy)
///     .named("Tor operation")
///     .run(|| Err("circuit not established"));
///
/// match result {
///     Err(RetryError::Exhausted(exhausted)) => {
///         assert_eq!(exhausted.attempts, 3); // 1 initial + 2 retries
///         assert_eq!(exhausted.last_error, Some("circuit not established"));
///     }
///     other => panic!("expected exhaustion, got {:?}", other),
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RetryError<E> {
    /// The policy was unusable; the operation never ran.
    Config(ConfigError),
    /// The operation reported a programming error; passed through verbatim.
    Fatal(E),
    /// An enclosing call's deadline expired while this call was running.
    Interrupted(Interrupt),
    /// This call's own timeout elapsed.
    TimedOut(TimedOut<E>),
    /// This call used up its retries.
    Exhausted(Exhausted<E>),
}

/// The wall-clock bound of a retry call elapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedOut<E> {
    /// Caller-supplied message, or the default timeout message.
    pub message: Cow<'static, str>,
    /// The bound that was exceeded.
    pub timeout: Duration,
    /// Attempts started before giving up.
    pub attempts: u32,
    /// Time spent in the call.
    pub elapsed: Duration,
    /// The last transient failure, if any attempt failed with an error.
    pub last_error: Option<E>,
}

/// The retry bound of a retry call was used up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exhausted<E> {
    /// Name of the operation, used in the report.
    pub operation: Cow<'static, str>,
    /// The configured retry bound.
    pub max_retries: u32,
    /// Total attempts made (initial + retries).
    pub attempts: u32,
    /// Time spent in the call.
    pub elapsed: Duration,
    /// The last transient failure, if any attempt failed with an error.
    pub last_error: Option<E>,
}

impl<E> RetryError<E> {
    /// Returns true if this call's own timeout elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut(_))
    }

    /// Returns true if this call used up its retries.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted(_))
    }

    /// Returns true if the policy was rejected before the first attempt.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if the operation reported a programming error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// Get the fatal error or the last transient failure.
    pub fn error(&self) -> Option<&E> {
        match self {
            Self::Fatal(e) => Some(e),
            Self::TimedOut(t) => t.last_error.as_ref(),
            Self::Exhausted(x) => x.last_error.as_ref(),
            Self::Config(_) | Self::Interrupted(_) => None,
        }
    }

    /// Extract the fatal error or the last transient failure.
    pub fn into_error(self) -> Option<E> {
        match self {
            Self::Fatal(e) => Some(e),
            Self::TimedOut(t) => t.last_error,
            Self::Exhausted(x) => x.last_error,
            Self::Config(_) | Self::Interrupted(_) => None,
        }
    }

    /// Transform the carried operation error, keeping the termination reason.
    pub fn map_err<F, M>(self, f: M) -> RetryError<F>
    where
        M: FnOnce(E) -> F,
    {
        match self {
            Self::Config(c) => RetryError::Config(c),
            Self::Fatal(e) => RetryError::Fatal(f(e)),
            Self::Interrupted(i) => RetryError::Interrupted(i),
            Self::TimedOut(t) => RetryError::TimedOut(TimedOut {
                message: t.message,
                timeout: t.timeout,
                attempts: t.attempts,
                elapsed: t.elapsed,
                last_error: t.last_error.map(f),
            }),
            Self::Exhausted(x) => RetryError::Exhausted(Exhausted {
                operation: x.operation,
                max_retries: x.max_retries,
                attempts: x.attempts,
                elapsed: x.elapsed,
                last_error: x.last_error.map(f),
            }),
        }
    }
}

// A nested call's give-up is an ordinary transient failure to the call
// around it; fatal errors, bad policies and foreign deadlines keep
// travelling outwards.
impl<E> Classify for RetryError<E> {
    fn verdict(&self) -> Verdict {
        match self {
            Self::Config(_) | Self::Fatal(_) => Verdict::Fatal,
            _ => Verdict::Transient,
        }
    }

    fn interruption(&self) -> Option<Interrupt> {
        match self {
            Self::Interrupted(interrupt) => Some(*interrupt),
            _ => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(c) => write!(f, "{}", c),
            Self::Fatal(e) => write!(f, "{}", e),
            Self::Interrupted(interrupt) => write!(f, "{}", interrupt),
            Self::TimedOut(t) => write!(f, "{}", t),
            Self::Exhausted(x) => write!(f, "{}", x),
        }
    }
}

impl<E: fmt::Display> fmt::Display for TimedOut<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(e) = &self.last_error {
            write!(f, "\nlast ignored error was: {}", e)?;
        }
        Ok(())
    }
}

impl<E: fmt::Display> fmt::Display for Exhausted<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed (despite retrying {} times)",
            self.operation, self.max_retries
        )?;
        match &self.last_error {
            Some(e) => write!(f, " with\n{}", e),
            None => write!(f, ": condition never held"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(c) => Some(c),
            Self::Fatal(e) => Some(e),
            Self::Interrupted(interrupt) => Some(interrupt),
            Self::TimedOut(t) => std::error::Error::source(t),
            Self::Exhausted(x) => std::error::Error::source(x),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for TimedOut<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.last_error
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl<E: std::error::Error + 'static> std::error::Error for Exhausted<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.last_error
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

//! Deciding which failures are worth another attempt.
//!
//! Retrying is only sound for failures that might go away on their own:
//! network jitter, a service that is still starting, a widget that has not
//! rendered yet. A typo in a step definition will fail the same way forever,
//! and retrying it only hides the bug behind a timeout. Each error type
//! therefore classifies itself into a [`Verdict`] that the retry loop
//! evaluates explicitly.

use std::convert::Infallible;
use std::fmt;

use crate::deadline::Interrupt;

/// Whether a failure may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// Expected to possibly resolve itself; record it and try again.
    Transient,
    /// A programming error; propagate immediately, never retry.
    Fatal,
}

/// Classification of operation failures for the retry loop.
///
/// Both methods have defaults, so an error type that is always transient
/// only needs an empty impl:
///
/// ```rust
/// use eventually::Classify;
///
/// #[derive(Debug)]
/// struct PortClosed;
///
/// impl Classify for PortClosed {}
/// ```
pub trait Classify {
    /// Retry or propagate.
    fn verdict(&self) -> Verdict {
        Verdict::Transient
    }

    /// The deadline marker carried by this failure, if it is one.
    ///
    /// A retry call catches only its own marker and hands every other one
    /// back to its caller untouched.
    fn interruption(&self) -> Option<Interrupt> {
        None
    }
}

impl Classify for Infallible {}

impl Classify for String {}

impl Classify for &'static str {}

impl Classify for std::io::Error {}

impl Classify for Box<dyn std::error::Error + Send + Sync> {}

impl Classify for Interrupt {
    fn interruption(&self) -> Option<Interrupt> {
        Some(*self)
    }
}

/// A ready-made step error that carries its own classification.
///
/// Step code that mixes deadline checkpoints with domain failures can use
/// `Fault<E>` as its error type: `?` on a checkpoint produces
/// [`Fault::Interrupted`], and the step marks its own failures as either
/// transient or fatal.
///
/// ```rust
/// use eventually::{deadline, Fault};
///
/// fn file_exists(path: &str) -> Result<bool, Fault<String>> {
///     deadline::checkpoint()?;
///     if path.is_empty() {
///         return Err(Fault::Fatal("empty path".to_string()));
///     }
///     Ok(path.starts_with('/'))
/// }
///
/// assert!(file_exists("/run/live-additional-software/installed").unwrap());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault<E> {
    /// May succeed on a later attempt.
    Transient(E),
    /// Will never succeed; do not retry.
    Fatal(E),
    /// An enclosing retry call ran out of time.
    Interrupted(Interrupt),
}

impl<E> Fault<E> {
    /// Get the underlying error, if this is not an interruption.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Transient(e) | Self::Fatal(e) => Some(e),
            Self::Interrupted(_) => None,
        }
    }
}

impl<E> From<Interrupt> for Fault<E> {
    fn from(interrupt: Interrupt) -> Self {
        Self::Interrupted(interrupt)
    }
}

impl<E> Classify for Fault<E> {
    fn verdict(&self) -> Verdict {
        match self {
            Self::Fatal(_) => Verdict::Fatal,
            Self::Transient(_) | Self::Interrupted(_) => Verdict::Transient,
        }
    }

    fn interruption(&self) -> Option<Interrupt> {
        match self {
            Self::Interrupted(interrupt) => Some(*interrupt),
            _ => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for Fault<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient(e) => write!(f, "{}", e),
            Self::Fatal(e) => write!(f, "fatal: {}", e),
            Self::Interrupted(interrupt) => write!(f, "{}", interrupt),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for Fault<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transient(e) | Self::Fatal(e) => Some(e),
            Self::Interrupted(_) => None,
        }
    }
}

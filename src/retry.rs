//! The retry loop.
//!
//! [`Retry`] runs an operation until it succeeds, its [`AttemptPolicy`] gives
//! up, or it reports a programming error. Two flavours share one loop:
//!
//! - [`Retry::run`]: retry until the operation returns `Ok`
//! - [`Retry::run_until`]: retry until it returns a [`Truthy`] value
//!
//! ```rust
//! use eventually::{AttemptPolicy, Retry};
//! use std::time::Duration;
//!
//! let mut polls = 0;
//! let installed = Retry::new(AttemptPolicy::timeout(Duration::from_secs(5)).with_delay(Duration::ZERO))
//!     .run_until(|| {
//!         polls += 1;
//!         Ok::<_, std::io::Error>(polls == 3)
//!     });
//!
//! assert!(installed.unwrap());
//! ```

use std::borrow::Cow;
use std::fmt;
use std::time::{Duration, Instant};

use crate::classify::{Classify, Verdict};
use crate::deadline::{self, Interrupt, Scope};
use crate::error::{Exhausted, RetryError, TimedOut};
use crate::policy::AttemptPolicy;
use crate::truthy::Truthy;

const DEFAULT_OPERATION: &str = "Operation";

type Recovery<'r, E> = Box<dyn FnMut() -> Result<(), E> + 'r>;
type Hook<'r, E> = Box<dyn FnMut(&RetryEvent<'_, E>) + 'r>;

/// Information about a failed attempt, passed to [`Retry::on_retry`].
#[derive(Debug, Clone)]
pub struct RetryEvent<'a, E> {
    /// Name of the operation being retried.
    pub operation: &'a str,
    /// Which attempt just failed (1-indexed).
    pub attempt: u32,
    /// The configured retry bound, if any.
    pub max_retries: Option<u32>,
    /// The error from the failed attempt; `None` when it returned a falsy value.
    pub error: Option<&'a E>,
    /// Total elapsed time since the first attempt.
    pub elapsed: Duration,
}

/// A configured retry call.
///
/// Built fresh for every call; the attempt counter, last failure and start
/// time live only for the duration of [`run`](Retry::run) or
/// [`run_until`](Retry::run_until).
pub struct Retry<'r, E> {
    policy: AttemptPolicy,
    operation: Cow<'static, str>,
    message: Option<Cow<'static, str>>,
    recovery: Option<Recovery<'r, E>>,
    on_retry: Option<Hook<'r, E>>,
}

/// Per-call bookkeeping.
#[derive(Debug)]
pub(crate) struct Attempts<E> {
    pub(crate) start: Instant,
    pub(crate) started: u32,
    pub(crate) failed: u32,
    pub(crate) last_error: Option<E>,
}

impl<E> Attempts<E> {
    pub(crate) fn new() -> Self {
        Self {
            start: Instant::now(),
            started: 0,
            failed: 0,
            last_error: None,
        }
    }

    pub(crate) fn begin_attempt(&mut self) {
        self.started += 1;
    }
}

impl<'r, E> Retry<'r, E> {
    /// Create a retry call governed by `policy`.
    pub fn new(policy: AttemptPolicy) -> Self {
        Self {
            policy,
            operation: Cow::Borrowed(DEFAULT_OPERATION),
            message: None,
            recovery: None,
            on_retry: None,
        }
    }

    /// Name the operation for logs and for the exhaustion report.
    pub fn named(mut self, operation: impl Into<Cow<'static, str>>) -> Self {
        self.operation = operation.into();
        self
    }

    /// Replace the default message of the timeout failure.
    pub fn message(mut self, message: impl Into<Cow<'static, str>>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Run `recovery` after every failed attempt to restore the operation's
    /// preconditions.
    ///
    /// Only policies with a retry bound run recovery, and they run it after
    /// the final failed attempt too, right before giving up. A recovery
    /// error is classified like an operation error: fatal ones propagate,
    /// transient ones become the last recorded failure.
    pub fn recover_with<R>(mut self, recovery: R) -> Self
    where
        R: FnMut() -> Result<(), E> + 'r,
    {
        self.recovery = Some(Box::new(recovery));
        self
    }

    /// Observe every failed attempt.
    pub fn on_retry<H>(mut self, hook: H) -> Self
    where
        H: FnMut(&RetryEvent<'_, E>) + 'r,
    {
        self.on_retry = Some(Box::new(hook));
        self
    }

    /// Get the policy.
    pub fn policy(&self) -> &AttemptPolicy {
        &self.policy
    }

    /// Get the operation name.
    pub fn operation_name(&self) -> &str {
        &self.operation
    }
}

impl<E> Retry<'_, E>
where
    E: Classify + fmt::Display,
{
    /// Retry `operation` until it returns `Ok`.
    pub fn run<T, F>(self, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
    {
        self.execute(move || operation().map(Some))
    }

    /// Retry `operation` until it returns a truthy value.
    ///
    /// A falsy value is a failed attempt without an error: it counts
    /// towards the retry bound and triggers recovery, but leaves the last
    /// recorded error as it was.
    pub fn run_until<V, F>(self, mut operation: F) -> Result<V, RetryError<E>>
    where
        V: Truthy,
        F: FnMut() -> Result<V, E>,
    {
        self.execute(move || operation().map(|value| value.is_truthy().then_some(value)))
    }

    /// Run `operation` exactly once, without retrying or a deadline.
    fn pass_through<V, F>(self, mut operation: F) -> Result<V, RetryError<E>>
    where
        F: FnMut() -> Result<V, E>,
    {
        let mut state = Attempts::new();
        state.begin_attempt();
        let error = match operation() {
            Ok(value) => return Ok(value),
            Err(error) => self.triage(error, None, &mut state)?,
        };
        state.last_error = Some(error);
        Err(self.exhausted(0, &mut state))
    }

    fn execute<V, F>(mut self, mut attempt: F) -> Result<V, RetryError<E>>
    where
        F: FnMut() -> Result<Option<V>, E>,
    {
        self.policy.validate().map_err(RetryError::Config)?;

        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!("retry", operation = %self.operation).entered();

        let mut state = Attempts::new();
        // A timeout past the end of representable time never fires.
        let scope = self
            .policy
            .timeout_duration()
            .and_then(|timeout| state.start.checked_add(timeout))
            .map(Scope::enter);
        let own = scope.as_ref().map(Scope::interrupt);

        loop {
            if let Err(interrupt) = deadline::checkpoint() {
                return Err(self.interrupted(interrupt, own, &mut state));
            }

            state.begin_attempt();
            let errored = match attempt() {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => false,
                Err(error) => {
                    let error = self.triage(error, own, &mut state)?;
                    state.last_error = Some(error);
                    true
                }
            };

            self.after_failure(&mut state, errored, own)?;

            if let Err(interrupt) = deadline::sleep(self.policy.delay()) {
                return Err(self.interrupted(interrupt, own, &mut state));
            }
        }
    }

    /// Sort a failure into "record and retry" or "stop now".
    pub(crate) fn triage(
        &self,
        error: E,
        own: Option<Interrupt>,
        state: &mut Attempts<E>,
    ) -> Result<E, RetryError<E>> {
        if let Some(interrupt) = error.interruption() {
            return Err(self.interrupted(interrupt, own, state));
        }
        match error.verdict() {
            Verdict::Transient => Ok(error),
            Verdict::Fatal => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    operation = %self.operation,
                    error = %error,
                    "{} hit a fatal error, not retrying",
                    self.operation
                );
                Err(RetryError::Fatal(error))
            }
        }
    }

    /// Report a failed attempt, run recovery and enforce the retry bound.
    pub(crate) fn after_failure(
        &mut self,
        state: &mut Attempts<E>,
        errored: bool,
        own: Option<Interrupt>,
    ) -> Result<(), RetryError<E>> {
        state.failed += 1;
        let max_retries = self.policy.max_retries();
        let error = if errored {
            state.last_error.as_ref()
        } else {
            None
        };

        #[cfg(feature = "tracing")]
        {
            let reason: &dyn fmt::Display = match error {
                Some(e) => e,
                None => &"condition not met",
            };
            match max_retries {
                Some(max) => tracing::debug!(
                    operation = %self.operation,
                    attempt = state.failed,
                    max_retries = max,
                    "{} failed (try {} of {}) with: {}",
                    self.operation,
                    state.failed,
                    max.saturating_add(1),
                    reason
                ),
                None => tracing::debug!(
                    operation = %self.operation,
                    attempt = state.failed,
                    "{} failed (try {}) with: {}",
                    self.operation,
                    state.failed,
                    reason
                ),
            }
        }

        if let Some(hook) = self.on_retry.as_mut() {
            hook(&RetryEvent {
                operation: &*self.operation,
                attempt: state.failed,
                max_retries,
                error,
                elapsed: state.start.elapsed(),
            });
        }

        let Some(max) = max_retries else {
            return Ok(());
        };

        if let Some(recover) = self.recovery.as_mut() {
            if let Err(error) = recover() {
                let error = self.triage(error, own, state)?;
                state.last_error = Some(error);
            }
        }

        if state.failed > max {
            return Err(self.exhausted(max, state));
        }
        Ok(())
    }

    /// Resolve a deadline marker: ours becomes a timeout, anyone else's is
    /// handed back unchanged.
    pub(crate) fn interrupted(
        &self,
        interrupt: Interrupt,
        own: Option<Interrupt>,
        state: &mut Attempts<E>,
    ) -> RetryError<E> {
        if own == Some(interrupt) {
            self.timed_out(state)
        } else {
            RetryError::Interrupted(interrupt)
        }
    }

    pub(crate) fn timed_out(&self, state: &mut Attempts<E>) -> RetryError<E> {
        let timeout = self.policy.timeout_duration().unwrap_or_default();
        let message = match &self.message {
            Some(message) => message.clone(),
            None => Cow::Owned(format!("timed out after {:?}", timeout)),
        };
        let timed_out = TimedOut {
            message,
            timeout,
            attempts: state.started,
            elapsed: state.start.elapsed(),
            last_error: state.last_error.take(),
        };

        #[cfg(feature = "tracing")]
        tracing::warn!(
            operation = %self.operation,
            attempts = timed_out.attempts,
            "{}",
            timed_out
        );

        RetryError::TimedOut(timed_out)
    }

    pub(crate) fn exhausted(&self, max_retries: u32, state: &mut Attempts<E>) -> RetryError<E> {
        let exhausted = Exhausted {
            operation: self.operation.clone(),
            max_retries,
            attempts: state.started,
            elapsed: state.start.elapsed(),
            last_error: state.last_error.take(),
        };

        #[cfg(feature = "tracing")]
        tracing::warn!(
            operation = %self.operation,
            attempts = exhausted.attempts,
            "{}",
            exhausted
        );

        RetryError::Exhausted(exhausted)
    }
}

impl<E> fmt::Debug for Retry<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retry")
            .field("policy", &self.policy)
            .field("operation", &self.operation)
            .field("message", &self.message)
            .field("recovery", &self.recovery.is_some())
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

/// Retry `operation` under `policy`, running `recovery` between attempts.
///
/// ```rust
/// use eventually::{retry_with_policy, AttemptPolicy};
/// use std::time::Duration;
///
/// let policy = AttemptPolicy::retries(2).with_delay(Duration::ZERO);
/// let mut outcomes = vec![Ok("ok"), Err("fail"), Err("fail")];
///
/// let result = retry_with_policy(policy, || outcomes.pop().unwrap(), None);
/// assert_eq!(result, Ok("ok"));
/// ```
pub fn retry_with_policy<T, E, F>(
    policy: AttemptPolicy,
    operation: F,
    recovery: Option<&mut dyn FnMut() -> Result<(), E>>,
) -> Result<T, RetryError<E>>
where
    E: Classify + fmt::Display,
    F: FnMut() -> Result<T, E>,
{
    let retry = Retry::new(policy);
    match recovery {
        Some(recover) => retry.recover_with(move || recover()).run(operation),
        None => retry.run(operation),
    }
}

/// Poll `operation` once a second until it returns a truthy value or
/// `timeout` elapses.
///
/// With `None` the operation runs exactly once and its value is returned
/// as is, truthy or not.
pub fn try_for<V, E, F>(timeout: Option<Duration>, operation: F) -> Result<V, RetryError<E>>
where
    V: Truthy,
    E: Classify + fmt::Display,
    F: FnMut() -> Result<V, E>,
{
    match timeout {
        Some(timeout) => Retry::new(AttemptPolicy::timeout(timeout)).run_until(operation),
        None => Retry::new(AttemptPolicy::retries(0)).pass_through(operation),
    }
}

/// Retry `operation` until it returns `Ok` or `policy` gives up.
pub fn try_for_success<T, E, F>(policy: AttemptPolicy, operation: F) -> Result<T, RetryError<E>>
where
    E: Classify + fmt::Display,
    F: FnMut() -> Result<T, E>,
{
    Retry::new(policy).run(operation)
}

/// Run `operation`, retrying immediately up to `max_retries` times.
pub fn retry_action<T, E, F>(max_retries: u32, operation: F) -> Result<T, RetryError<E>>
where
    E: Classify + fmt::Display,
    F: FnMut() -> Result<T, E>,
{
    Retry::new(AttemptPolicy::retries(max_retries).with_delay(Duration::ZERO)).run(operation)
}

//! Async retry calls on tokio.
//!
//! Same loop as the blocking path, with two differences in how time is
//! handled:
//!
//! - the timeout preempts a stuck attempt at its next `.await`, since the
//!   whole loop runs under [`tokio::time::timeout`]
//! - nested calls need no deadline markers: an outer timeout drops the inner
//!   call's future outright, and an inner timeout is an ordinary transient
//!   [`RetryError::TimedOut`] to the outer call
//!
//! Operations should not call the blocking [`deadline`](crate::deadline)
//! helpers; they would park the runtime thread.
//!
//! The returned futures are not `Send`: recovery actions and hooks are
//! boxed without a `Send` bound, so a retry call runs on the task that
//! awaits it rather than through `tokio::spawn`.
//!
//! ```rust
//! use eventually::{AttemptPolicy, Retry};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let mut polls = 0;
//! let result = Retry::new(AttemptPolicy::retries(5).with_delay(Duration::from_millis(1)))
//!     .run_async(|| {
//!         polls += 1;
//!         let ready = polls >= 3;
//!         async move { if ready { Ok("listening") } else { Err("connection refused") } }
//!     })
//!     .await;
//!
//! assert_eq!(result, Ok("listening"));
//! # });
//! ```

use std::fmt;
use std::future::Future;

use crate::classify::Classify;
use crate::error::RetryError;
use crate::retry::{Attempts, Retry};
use crate::truthy::Truthy;

impl<E> Retry<'_, E>
where
    E: Classify + fmt::Display,
{
    /// Retry the future returned by `operation` until it resolves to `Ok`.
    pub async fn run_async<T, F, Fut>(self, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_async(move || {
            let attempt = operation();
            async move { attempt.await.map(Some) }
        })
        .await
    }

    /// Retry the future returned by `operation` until it resolves to a
    /// truthy value.
    pub async fn run_until_async<V, F, Fut>(self, mut operation: F) -> Result<V, RetryError<E>>
    where
        V: Truthy,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        self.execute_async(move || {
            let attempt = operation();
            async move {
                attempt
                    .await
                    .map(|value| value.is_truthy().then_some(value))
            }
        })
        .await
    }

    async fn execute_async<V, A, Fut>(mut self, mut attempt: A) -> Result<V, RetryError<E>>
    where
        A: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<V>, E>>,
    {
        self.policy().validate().map_err(RetryError::Config)?;

        #[cfg(feature = "tracing")]
        let span = tracing::debug_span!("retry", operation = %self.operation_name());

        let mut state = Attempts::new();
        let timeout = self.policy().timeout_duration();

        let looped = self.attempt_loop(&mut state, &mut attempt);
        #[cfg(feature = "tracing")]
        let looped = tracing::Instrument::instrument(looped, span);

        let outcome = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, looped).await.ok(),
            None => Some(looped.await),
        };

        match outcome {
            Some(result) => result,
            None => Err(self.timed_out(&mut state)),
        }
    }

    async fn attempt_loop<V, A, Fut>(
        &mut self,
        state: &mut Attempts<E>,
        attempt: &mut A,
    ) -> Result<V, RetryError<E>>
    where
        A: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<V>, E>>,
    {
        loop {
            state.begin_attempt();
            let errored = match attempt().await {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => false,
                Err(error) => {
                    let error = self.triage(error, None, state)?;
                    state.last_error = Some(error);
                    true
                }
            };

            self.after_failure(state, errored, None)?;

            tokio::time::sleep(self.policy().delay()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Fault;
    use crate::policy::{AttemptPolicy, ConfigError};
    use crate::testing::Counter;
    use std::time::{Duration, Instant};

    fn quick(max_retries: u32) -> AttemptPolicy {
        AttemptPolicy::retries(max_retries).with_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_async_retry_succeeds_on_third_attempt() {
        let mut calls = 0;
        let result = Retry::new(quick(5))
            .run_async(|| {
                calls += 1;
                let n = calls;
                async move {
                    if n < 3 {
                        Err("transient failure")
                    } else {
                        Ok("success")
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("success"));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_async_exhaustion_runs_recovery_every_time() {
        let recoveries = Counter::new();
        let mut calls = 0;

        let result = Retry::new(quick(2))
            .recover_with(recoveries.recovery())
            .run_async(|| {
                calls += 1;
                async { Err::<(), _>("down") }
            })
            .await;

        assert!(result.unwrap_err().is_exhausted());
        assert_eq!(calls, 3);
        assert_eq!(recoveries.get(), 3);
    }

    #[tokio::test]
    async fn test_async_fatal_is_not_retried() {
        let mut calls = 0;
        let result = Retry::new(quick(5))
            .run_async(|| {
                calls += 1;
                async { Err::<(), _>(Fault::Fatal("typo")) }
            })
            .await;

        assert_eq!(result, Err(RetryError::Fatal(Fault::Fatal("typo"))));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_async_timeout_preempts_stuck_attempt() {
        let start = Instant::now();
        let result = Retry::new(AttemptPolicy::timeout(Duration::from_millis(50)))
            .run_async(|| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<(), &str>(())
            })
            .await;

        let err = result.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.error(), None);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_async_inner_timeout_is_transient_to_outer() {
        let mut inner_calls = 0;
        let result = Retry::new(
            AttemptPolicy::timeout(Duration::from_millis(300)).with_delay(Duration::from_millis(1)),
        )
        .run_async(|| {
            inner_calls += 1;
            Retry::new(
                AttemptPolicy::timeout(Duration::from_millis(40))
                    .with_delay(Duration::from_millis(5)),
            )
            .run_async(|| async { Err::<(), _>("still down") })
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.is_timeout());
        assert!(inner_calls > 1);
        let inner = err.error().expect("outer keeps the inner failure");
        assert!(inner.is_timeout());
        assert_eq!(inner.error(), Some(&"still down"));
    }

    #[tokio::test]
    async fn test_async_zero_timeout_never_runs_the_operation() {
        let mut calls = 0;
        let result = Retry::new(AttemptPolicy::retries(3).with_timeout(Duration::ZERO))
            .run_async(|| {
                calls += 1;
                async { Ok::<_, &str>(1) }
            })
            .await;

        assert_eq!(result, Err(RetryError::Config(ConfigError::ZeroTimeout)));
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn test_async_oversized_timeout_runs() {
        let result = Retry::new(AttemptPolicy::timeout(Duration::MAX))
            .run_async(|| async { Ok::<_, &str>("ready") })
            .await;

        assert_eq!(result, Ok("ready"));
    }

    #[tokio::test]
    async fn test_async_run_until() {
        let mut polls = 0;
        let result = Retry::new(quick(5))
            .run_until_async(|| {
                polls += 1;
                let done = polls == 2;
                async move { Ok::<_, &str>(done) }
            })
            .await;

        assert_eq!(result, Ok(true));
        assert_eq!(polls, 2);
    }
}

//! Building blocks for recovery actions.
//!
//! A recovery action runs between failed attempts to put the world back
//! into a state where the next attempt can succeed: force a new Tor circuit,
//! restart a service, reopen an application window. Some of those actions
//! are rate limited by the system they poke, and that limit is state owned
//! by whoever performs the action. [`Cooldown`] is that state.

use std::time::{Duration, Instant};

use crate::deadline::{self, Interrupt};

/// Extra wait on top of the remaining interval, to stay clear of tight
/// timings on the other side.
pub const DEFAULT_MARGIN: Duration = Duration::from_secs(1);

/// Enforces a minimum interval between runs of an action.
///
/// Tor, for instance, honours at most one `NEWNYM` signal per ten seconds;
/// a recovery action that forces a new circuit keeps a `Cooldown` of ten
/// seconds and runs the signal through it.
///
/// ```rust
/// use eventually::recovery::Cooldown;
/// use eventually::Interrupt;
/// use std::time::Duration;
///
/// let mut newnym = Cooldown::new(Duration::from_millis(20)).with_margin(Duration::ZERO);
///
/// newnym.run(|| Ok::<_, Interrupt>(())).unwrap();
/// // A second signal right away has to wait for the interval to pass.
/// assert!(newnym.wait_time() > Duration::ZERO);
/// ```
#[derive(Debug, Clone)]
pub struct Cooldown {
    interval: Duration,
    margin: Duration,
    last_run: Option<Instant>,
}

impl Cooldown {
    /// Create a cooldown of `interval` with the default one second margin.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            margin: DEFAULT_MARGIN,
            last_run: None,
        }
    }

    /// Set the extra wait added when the interval has not passed yet.
    pub fn with_margin(mut self, margin: Duration) -> Self {
        self.margin = margin;
        self
    }

    /// How long the next run has to wait.
    pub fn wait_time(&self) -> Duration {
        match self.last_run {
            Some(last) => {
                let elapsed = last.elapsed();
                if elapsed < self.interval {
                    self.interval - elapsed + self.margin
                } else {
                    Duration::ZERO
                }
            }
            None => Duration::ZERO,
        }
    }

    /// When the action last succeeded.
    pub fn last_run(&self) -> Option<Instant> {
        self.last_run
    }

    /// Wait out the cooldown, then run `action`.
    ///
    /// The wait honours enclosing retry deadlines. The run is only stamped
    /// when `action` succeeds, so a failed attempt does not delay the next.
    pub fn run<T, E, F>(&mut self, action: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<Interrupt>,
    {
        let wait = self.wait_time();
        if !wait.is_zero() {
            #[cfg(feature = "tracing")]
            tracing::debug!(wait = ?wait, "cooling down before next run");
        }
        deadline::sleep(wait)?;
        let value = action()?;
        self.last_run = Some(Instant::now());
        Ok(value)
    }
}

/// Run `first`, then `then`, as one recovery action.
///
/// Stops at the first failure.
pub fn chain<E, A, B>(mut first: A, mut then: B) -> impl FnMut() -> Result<(), E>
where
    A: FnMut() -> Result<(), E>,
    B: FnMut() -> Result<(), E>,
{
    move || {
        first()?;
        then()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Fault;
    use crate::testing::Counter;

    #[test]
    fn test_first_run_does_not_wait() {
        let cooldown = Cooldown::new(Duration::from_secs(10));
        assert_eq!(cooldown.wait_time(), Duration::ZERO);
        assert!(cooldown.last_run().is_none());
    }

    #[test]
    fn test_second_run_waits_interval_plus_margin() {
        let mut cooldown =
            Cooldown::new(Duration::from_millis(40)).with_margin(Duration::from_millis(10));
        let start = Instant::now();

        cooldown.run(|| Ok::<_, Interrupt>(())).unwrap();
        cooldown.run(|| Ok::<_, Interrupt>(())).unwrap();

        assert!(start.elapsed() >= Duration::from_millis(40));
        assert!(cooldown.last_run().is_some());
    }

    #[test]
    fn test_wait_time_after_interval_is_zero() {
        let mut cooldown = Cooldown::new(Duration::from_millis(5)).with_margin(Duration::ZERO);
        cooldown.run(|| Ok::<_, Interrupt>(())).unwrap();
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(cooldown.wait_time(), Duration::ZERO);
    }

    #[test]
    fn test_failed_run_is_not_stamped() {
        let mut cooldown = Cooldown::new(Duration::from_secs(10));
        let result = cooldown.run(|| Err::<(), _>(Fault::Transient("tor control port closed")));
        assert!(result.is_err());
        assert!(cooldown.last_run().is_none());
        assert_eq!(cooldown.wait_time(), Duration::ZERO);
    }

    #[test]
    fn test_chain_runs_both_in_order() {
        let order = std::cell::RefCell::new(Vec::new());
        let mut recover = chain(
            || {
                order.borrow_mut().push("newnym");
                Ok::<(), &str>(())
            },
            || {
                order.borrow_mut().push("reload");
                Ok(())
            },
        );
        recover().unwrap();
        assert_eq!(*order.borrow(), vec!["newnym", "reload"]);
    }

    #[test]
    fn test_chain_stops_at_first_failure() {
        let second = Counter::new();
        let mut recover = chain(|| Err("signal refused"), second.recovery());
        assert_eq!(recover(), Err("signal refused"));
        assert_eq!(second.get(), 0);
    }
}

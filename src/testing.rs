//! Test doubles for code built on retry calls.
//!
//! End-to-end steps talk to a VM; their unit tests should not. These helpers
//! stand in for the flaky collaborator and count what the retry loop did.
//!
//! # Examples
//!
//! ```rust
//! use eventually::testing::{Counter, Script};
//! use eventually::{AttemptPolicy, Retry};
//! use std::time::Duration;
//!
//! let mut circuit = Script::new([Err("no circuit"), Err("no circuit"), Ok("connected")]);
//! let newnym = Counter::new();
//!
//! let result = Retry::new(AttemptPolicy::retries(5).with_delay(Duration::ZERO))
//!     .recover_with(newnym.recovery())
//!     .run(|| circuit.call());
//!
//! assert_eq!(result, Ok("connected"));
//! assert_eq!(circuit.calls(), 3);
//! assert_eq!(newnym.get(), 2);
//! ```

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

/// A scripted operation that plays back a fixed sequence of outcomes.
///
/// Once only one step is left it is repeated forever, so
/// `Script::new([Err(e)])` is an operation that always fails.
#[derive(Debug, Clone)]
pub struct Script<T, E> {
    steps: VecDeque<Result<T, E>>,
    calls: u32,
}

impl<T: Clone, E: Clone> Script<T, E> {
    /// Create a script from its outcomes, in call order.
    ///
    /// # Panics
    ///
    /// Panics if `steps` is empty.
    pub fn new(steps: impl IntoIterator<Item = Result<T, E>>) -> Self {
        let steps: VecDeque<_> = steps.into_iter().collect();
        assert!(!steps.is_empty(), "a script needs at least one step");
        Self { steps, calls: 0 }
    }

    /// An operation that always fails with `error`.
    pub fn failing(error: E) -> Self {
        Self::new([Err(error)])
    }

    /// An operation that fails `n` times with `error`, then returns `value`.
    pub fn failing_then(n: usize, error: E, value: T) -> Self {
        Self::new(std::iter::repeat_n(Err(error), n).chain([Ok(value)]))
    }

    /// Play the next outcome.
    pub fn call(&mut self) -> Result<T, E> {
        self.calls += 1;
        if self.steps.len() > 1 {
            if let Some(step) = self.steps.pop_front() {
                return step;
            }
        }
        self.steps[0].clone()
    }

    /// Number of times the script was played.
    pub fn calls(&self) -> u32 {
        self.calls
    }
}

/// A shared call counter, typically for recovery actions and hooks.
///
/// Clones share the same count.
#[derive(Debug, Clone, Default)]
pub struct Counter(Rc<Cell<u32>>);

impl Counter {
    /// Create a counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one.
    pub fn tick(&self) {
        self.0.set(self.0.get() + 1);
    }

    /// Current count.
    pub fn get(&self) -> u32 {
        self.0.get()
    }

    /// A recovery action that only counts its calls.
    pub fn recovery<E>(&self) -> impl FnMut() -> Result<(), E> + 'static {
        let counter = self.clone();
        move || {
            counter.tick();
            Ok(())
        }
    }
}

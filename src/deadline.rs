//! Per-call deadlines that nest without catching each other.
//!
//! Every retry call with a timeout enters a scope holding a fresh
//! [`Interrupt`] and its deadline. Scopes form a per-thread stack. When a
//! deadline passes, [`checkpoint`] reports the marker of the *outermost*
//! expired scope: the inner calls between that scope and the checkpoint see
//! a marker that is not theirs and hand it up unchanged, so it arrives at
//! exactly the call it belongs to.
//!
//! The model is cooperative. The retry loop checkpoints before every attempt
//! and sleeps through [`sleep`], which never sleeps past the nearest
//! deadline. An operation that blocks for long stretches should do the same
//! to stay interruptible.
//!
//! ```rust
//! use eventually::{deadline, AttemptPolicy, Fault, Retry, RetryError};
//! use std::time::Duration;
//!
//! let policy = AttemptPolicy::timeout(Duration::from_millis(50));
//! let result: Result<(), RetryError<Fault<&str>>> = Retry::new(policy).run(|| {
//!     // A slow poll that stays interruptible.
//!     loop {
//!         deadline::sleep(Duration::from_millis(10))?;
//!     }
//! });
//!
//! assert!(matches!(result, Err(RetryError::TimedOut(_))));
//! ```

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static SCOPES: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// The marker of one retry call's expired deadline.
///
/// Markers compare by identity: two markers are equal only if they were
/// created for the same call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interrupt {
    token: u64,
}

impl Interrupt {
    pub(crate) fn fresh() -> Self {
        Self {
            token: NEXT_TOKEN.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl fmt::Display for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deadline #{} expired", self.token)
    }
}

impl std::error::Error for Interrupt {}

#[derive(Debug)]
struct Frame {
    interrupt: Interrupt,
    deadline: Instant,
}

/// Guard for one entry on the deadline stack. Popped on drop.
#[derive(Debug)]
pub(crate) struct Scope {
    interrupt: Interrupt,
    // The stack is thread-local; the guard must not leave its thread.
    _thread: PhantomData<*const ()>,
}

impl Scope {
    pub(crate) fn enter(deadline: Instant) -> Self {
        let interrupt = Interrupt::fresh();
        SCOPES.with(|scopes| scopes.borrow_mut().push(Frame { interrupt, deadline }));
        Self {
            interrupt,
            _thread: PhantomData,
        }
    }

    pub(crate) fn interrupt(&self) -> Interrupt {
        self.interrupt
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        let _ = SCOPES.try_with(|scopes| {
            scopes
                .borrow_mut()
                .retain(|frame| frame.interrupt != self.interrupt)
        });
    }
}

/// Fail with the outermost expired deadline, if any.
pub fn checkpoint() -> Result<(), Interrupt> {
    let now = Instant::now();
    SCOPES.with(|scopes| {
        match scopes.borrow().iter().find(|frame| frame.deadline <= now) {
            Some(frame) => Err(frame.interrupt),
            None => Ok(()),
        }
    })
}

/// Time left before the nearest enclosing deadline.
///
/// `None` outside of any timeout-bounded retry call.
pub fn remaining() -> Option<Duration> {
    let now = Instant::now();
    SCOPES.with(|scopes| {
        scopes
            .borrow()
            .iter()
            .map(|frame| frame.deadline.saturating_duration_since(now))
            .min()
    })
}

/// Sleep for `duration`, but wake at the nearest enclosing deadline and
/// fail with its marker.
pub fn sleep(duration: Duration) -> Result<(), Interrupt> {
    let pause = match remaining() {
        Some(left) => duration.min(left),
        None => duration,
    };
    if !pause.is_zero() {
        thread::sleep(pause);
    }
    checkpoint()
}

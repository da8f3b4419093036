//! # Eventually
//!
//! > *"It will work. Eventually."*
//!
//! Retry-until-success and nestable timeouts for end-to-end test steps.
//!
//! Tests that drive a virtual machine and its desktop are flaky by nature:
//! services take a while to come up, widgets render late, Tor circuits fail
//! to build. Every step that waits for such a condition needs the same thing:
//! try again until it works, give up after a bound, and say why.
//!
//! - **Bounded**: an [`AttemptPolicy`] always has a timeout, a retry count,
//!   or both
//! - **Honest**: programming errors ([`Verdict::Fatal`]) are never retried,
//!   and the last transient failure is reported when the call gives up
//! - **Nestable**: every timeout-bounded call owns a unique deadline marker,
//!   so an inner call never swallows an outer call's timeout or the reverse
//! - **Recoverable**: a recovery action can run between failed attempts
//!
//! ## Quick Example
//!
//! ```rust
//! use eventually::{AttemptPolicy, Retry, RetryError};
//! use std::time::Duration;
//!
//! let mut tries = 0;
//! let result = Retry::new(AttemptPolicy::retries(3).with_delay(Duration::ZERO))
//!     .named("Tor operation")
//!     .run(|| {
//!         tries += 1;
//!         if tries < 3 { Err("circuit failed") } else { Ok("page loaded") }
//!     });
//!
//! assert_eq!(result, Ok("page loaded"));
//!
//! let result: Result<(), RetryError<&str>> =
//!     Retry::new(AttemptPolicy::timeout(Duration::from_millis(20)))
//!         .run(|| Err("service not up"));
//!
//! assert!(result.unwrap_err().is_timeout());
//! ```
//!
//! ## Features
//!
//! - `tracing` (default): log every failed attempt at `debug` and every
//!   give-up at `warn`
//! - `serde`: deserialize [`PolicyConfig`] from test-suite configuration
//! - `async`: `run_async` / `run_until_async` on tokio

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

mod classify;
pub mod deadline;
mod error;
#[cfg(feature = "async")]
mod future;
mod policy;
pub mod recovery;
mod retry;
pub mod testing;
mod truthy;

// Re-exports
pub use classify::{Classify, Fault, Verdict};
pub use deadline::Interrupt;
pub use error::{Exhausted, RetryError, TimedOut};
pub use policy::{AttemptPolicy, ConfigError, PolicyConfig, DEFAULT_DELAY};
pub use retry::{
    retry_action, retry_action as retry_times, retry_with_policy, try_for, try_for_success, Retry,
    RetryEvent,
};
pub use truthy::Truthy;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::classify::{Classify, Fault, Verdict};
    pub use crate::deadline::{self, Interrupt};
    pub use crate::error::RetryError;
    pub use crate::policy::AttemptPolicy;
    pub use crate::recovery::Cooldown;
    pub use crate::retry::{retry_action, try_for, try_for_success, Retry};
    pub use crate::truthy::Truthy;
}

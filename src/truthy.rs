//! Success values for polling a condition.

/// A value that says whether the polled condition holds yet.
///
/// Used by [`Retry::run_until`](crate::Retry::run_until): an attempt that
/// returns a falsy value counts as a failed attempt without an error.
pub trait Truthy {
    /// Returns true once the condition holds.
    fn is_truthy(&self) -> bool;
}

impl Truthy for bool {
    fn is_truthy(&self) -> bool {
        *self
    }
}

impl<T> Truthy for Option<T> {
    fn is_truthy(&self) -> bool {
        self.is_some()
    }
}

impl<T> Truthy for Vec<T> {
    fn is_truthy(&self) -> bool {
        !self.is_empty()
    }
}

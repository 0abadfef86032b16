//! The "attach reactions" capability shared by our own promises and by
//! foreign promise-like objects.
use std::fmt;

use crate::Value;

/// A one-shot reaction receiving the settled value or reason.
pub type Callback = Box<dyn FnOnce(Value)>;

/// Anything exposing `then(on_fulfilled, on_rejected)`.
///
/// Implementations are expected, but not trusted, to call at most one of the
/// two callbacks at most once. Settling a promise tolerates both being called.
pub trait Thenable {
    fn attach(&self, on_fulfilled: Callback, on_rejected: Callback);
}

/// Adapts a foreign closure of the `then` shape into a [`Thenable`].
pub struct FnThenable<F> {
    attach: F,
}

impl<F> FnThenable<F>
where
    F: Fn(Callback, Callback),
{
    pub fn new(attach: F) -> Self {
        Self { attach }
    }
}

impl<F> Thenable for FnThenable<F>
where
    F: Fn(Callback, Callback),
{
    fn attach(&self, on_fulfilled: Callback, on_rejected: Callback) {
        (self.attach)(on_fulfilled, on_rejected)
    }
}

impl<F> fmt::Debug for FnThenable<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnThenable").finish_non_exhaustive()
    }
}

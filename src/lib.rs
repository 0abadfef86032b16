//! Promises that settle once, run their reactions in order and adopt any
//! thenable they are resolved with.
//!
//! A [`Promise`] never settles inline: every settlement is deferred onto the
//! [`Host`] it was created with. [`EventLoop`] is the host this crate ships;
//! anything implementing [`Defer`] will do.
//!
//! # Examples
//!
//! ```
//! use deferred_promise::{EventLoop, Promise, Value};
//!
//! let mut rt = EventLoop::new();
//! let host = rt.host();
//!
//! let message = Promise::resolve(&host, 1)
//!     .then(|v| Ok(Value::from(v.as_number().unwrap_or_default() + 1.0)))
//!     .then(|_| Err(Value::error("e")))
//!     .then(|_| Ok("skipped".into()))
//!     .catch(|e| Ok(e.message().unwrap_or_default().into()));
//!
//! assert_eq!(rt.block_on(message).unwrap(), Ok(Value::from("e")));
//! ```
pub mod config;
pub mod event_loop;
pub mod future;
pub mod host;
pub mod promise;
pub mod remote;
pub mod thenable;
pub mod value;

mod combinators;

pub use config::{Clock, Config};
pub use event_loop::{EventLoop, Handle};
pub use future::Settled;
pub use host::{Defer, Host, Task};
pub use promise::{Handler, Handlers, Promise, PromiseState, Resolver};
pub use remote::RemoteResolver;
pub use thenable::{Callback, FnThenable, Thenable};
pub use value::Value;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `all` and `race` only accept arrays.
    #[error("{0} is not an array")]
    NotSequence(String),
    #[error("event loop has nothing left to run but the future is still pending")]
    Stalled,
    #[error("event loop exceeded its limit of {0} tasks")]
    TaskLimit(u64),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

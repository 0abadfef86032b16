//! The promise state machine and `then` chaining.
//!
//! A [`Promise`] settles at most once. Settlement is always deferred onto the
//! promise's [`Host`]; when the settled value is a thenable the promise adopts
//! its eventual outcome instead of storing it.
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::host::Host;
use crate::thenable::{Callback, Thenable};
use crate::Value;

/// A user reaction. `Err` is how a reaction throws.
pub type Handler = Box<dyn FnOnce(Value) -> Result<Value, Value>>;

/// Observable state of a promise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseState {
    Pending,
    Fulfilled,
    Rejected,
}

#[derive(Debug, Clone, Copy)]
enum Target {
    Fulfilled,
    Rejected,
}

enum State {
    Pending(Vec<Reaction>),
    Fulfilled(Value),
    Rejected(Value),
}

struct Inner {
    state: State,
    /// Reactions of a settled promise that have not run yet. Reactions
    /// attached meanwhile queue up behind them.
    draining: Option<VecDeque<Reaction>>,
}

/// Internal linkage between a settled parent and whatever waits on it.
struct Reaction {
    on_fulfilled: Callback,
    on_rejected: Callback,
}

impl Reaction {
    /// Routes the parent's outcome through the optional handlers into the
    /// derived promise.
    fn forward(handlers: Handlers, resolver: Resolver) -> Self {
        let Handlers { on_fulfilled, on_rejected } = handlers;
        let fulfilled = resolver.clone();
        Reaction {
            on_fulfilled: Box::new(move |value| match on_fulfilled {
                Some(handler) => fulfilled.settle(handler(value)),
                None => fulfilled.fulfill(value),
            }),
            on_rejected: Box::new(move |reason| match on_rejected {
                Some(handler) => resolver.settle(handler(reason)),
                None => resolver.reject(reason),
            }),
        }
    }

    fn run(self, outcome: Result<Value, Value>) {
        match outcome {
            Ok(value) => (self.on_fulfilled)(value),
            Err(reason) => (self.on_rejected)(reason),
        }
    }
}

/// The optional reaction pair taken by [`Promise::chain`]. A missing handler
/// passes the outcome through unchanged.
#[derive(Default)]
pub struct Handlers {
    pub on_fulfilled: Option<Handler>,
    pub on_rejected: Option<Handler>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_fulfilled<F>(mut self, handler: F) -> Self
    where
        F: FnOnce(Value) -> Result<Value, Value> + 'static,
    {
        self.on_fulfilled = Some(Box::new(handler));
        self
    }

    pub fn on_rejected<F>(mut self, handler: F) -> Self
    where
        F: FnOnce(Value) -> Result<Value, Value> + 'static,
    {
        self.on_rejected = Some(Box::new(handler));
        self
    }
}

/// A deferred value: pending, fulfilled with a value or rejected with a reason.
///
/// Cloning a `Promise` clones the handle, not the state.
///
/// # Examples
///
/// ```
/// use deferred_promise::{EventLoop, Promise, Value};
///
/// let mut rt = EventLoop::new();
/// let promise = Promise::new(&rt.host(), |resolver| {
///     resolver.fulfill(42);
///     Ok(())
/// })
/// .then(|v| Ok(Value::from(v.as_number().unwrap_or_default() + 1.0)));
///
/// assert_eq!(rt.block_on(promise).unwrap(), Ok(Value::from(43)));
/// ```
#[derive(Clone)]
pub struct Promise {
    inner: Rc<RefCell<Inner>>,
    host: Host,
}

/// The settle capabilities handed to an executor.
///
/// Only the first settlement that commits counts; later calls are ignored.
#[derive(Clone)]
pub struct Resolver {
    promise: Promise,
}

impl Resolver {
    /// Fulfills the promise, adopting `value` first if it is a thenable.
    pub fn fulfill(&self, value: impl Into<Value>) {
        self.promise.settle(value.into(), Target::Fulfilled)
    }

    /// Rejects the promise. The reason is stored as-is, even a thenable.
    pub fn reject(&self, reason: impl Into<Value>) {
        self.promise.settle(reason.into(), Target::Rejected)
    }

    /// `Ok` fulfills, `Err` rejects.
    pub fn settle(&self, outcome: Result<Value, Value>) {
        match outcome {
            Ok(value) => self.fulfill(value),
            Err(reason) => self.reject(reason),
        }
    }
}

impl Promise {
    /// Creates a promise and runs `executor` synchronously.
    ///
    /// An executor returning `Err(reason)` rejects the promise with `reason`,
    /// unless it settled the promise first.
    pub fn new<F>(host: &Host, executor: F) -> Self
    where
        F: FnOnce(Resolver) -> Result<(), Value>,
    {
        let (promise, resolver) = Self::with_resolver(host);
        if let Err(reason) = executor(resolver.clone()) {
            resolver.reject(reason);
        }
        promise
    }

    /// Creates a pending promise together with its resolver, for producers
    /// that settle from outside an executor.
    pub fn with_resolver(host: &Host) -> (Self, Resolver) {
        let promise = Promise {
            inner: Rc::new(RefCell::new(Inner {
                state: State::Pending(Vec::new()),
                draining: None,
            })),
            host: host.clone(),
        };
        let resolver = Resolver {
            promise: promise.clone(),
        };
        (promise, resolver)
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn state(&self) -> PromiseState {
        match self.inner.borrow().state {
            State::Pending(_) => PromiseState::Pending,
            State::Fulfilled(_) => PromiseState::Fulfilled,
            State::Rejected(_) => PromiseState::Rejected,
        }
    }

    /// The outcome, once settled: `Ok(value)` or `Err(reason)`.
    pub fn peek(&self) -> Option<Result<Value, Value>> {
        match &self.inner.borrow().state {
            State::Pending(_) => None,
            State::Fulfilled(value) => Some(Ok(value.clone())),
            State::Rejected(reason) => Some(Err(reason.clone())),
        }
    }

    /// Derives a promise settled by running `handlers` against this promise's
    /// outcome. Returns immediately, whatever this promise's state.
    pub fn chain(&self, handlers: Handlers) -> Promise {
        let parent = self.clone();
        Promise::new(&self.host, move |resolver| {
            parent.add_reaction(Reaction::forward(handlers, resolver));
            Ok(())
        })
    }

    /// Reacts to fulfillment; rejections pass through.
    pub fn then<F>(&self, on_fulfilled: F) -> Promise
    where
        F: FnOnce(Value) -> Result<Value, Value> + 'static,
    {
        self.chain(Handlers::new().on_fulfilled(on_fulfilled))
    }

    /// Reacts to both outcomes; exactly one of the handlers runs.
    pub fn then_else<F, R>(&self, on_fulfilled: F, on_rejected: R) -> Promise
    where
        F: FnOnce(Value) -> Result<Value, Value> + 'static,
        R: FnOnce(Value) -> Result<Value, Value> + 'static,
    {
        self.chain(
            Handlers::new()
                .on_fulfilled(on_fulfilled)
                .on_rejected(on_rejected),
        )
    }

    /// Reacts to rejection; fulfillment values pass through.
    pub fn catch<R>(&self, on_rejected: R) -> Promise
    where
        R: FnOnce(Value) -> Result<Value, Value> + 'static,
    {
        self.then_else(Ok, on_rejected)
    }

    fn settle(&self, value: Value, target: Target) {
        let promise = self.clone();
        self.host.defer(Box::new(move || promise.commit(value, target)));
    }

    fn commit(&self, value: Value, target: Target) {
        {
            let mut inner = self.inner.borrow_mut();
            let reactions = match &mut inner.state {
                State::Pending(reactions) => reactions,
                _ => {
                    trace!(?target, "ignoring settlement of a settled promise");
                    return;
                }
            };

            if let (Target::Fulfilled, Some(thenable)) = (target, value.as_thenable()) {
                let thenable = thenable.clone();
                drop(inner);
                self.adopt(thenable);
                return;
            }

            let reactions = std::mem::take(reactions);
            inner.state = match target {
                Target::Fulfilled => State::Fulfilled(value.clone()),
                Target::Rejected => State::Rejected(value.clone()),
            };
            trace!(?target, reactions = reactions.len(), "promise settled");
            inner.draining = Some(VecDeque::from(reactions));
        }

        let outcome = match target {
            Target::Fulfilled => Ok(value),
            Target::Rejected => Err(value),
        };
        loop {
            let reaction = {
                let mut inner = self.inner.borrow_mut();
                match inner.draining.as_mut().and_then(VecDeque::pop_front) {
                    Some(reaction) => reaction,
                    None => {
                        inner.draining = None;
                        break;
                    }
                }
            };
            reaction.run(outcome.clone());
        }
    }

    /// Waits on `thenable` and settles with whatever it eventually produces.
    /// Each step goes back through the host, so deep chains do not grow the
    /// stack.
    fn adopt(&self, thenable: Rc<dyn Thenable>) {
        trace!("adopting thenable");
        let fulfilled = self.clone();
        let rejected = self.clone();
        thenable.attach(
            Box::new(move |value| fulfilled.settle(value, Target::Fulfilled)),
            Box::new(move |reason| rejected.settle(reason, Target::Rejected)),
        );
    }

    fn add_reaction(&self, reaction: Reaction) {
        let mut inner = self.inner.borrow_mut();
        let outcome = match &mut inner.state {
            State::Pending(reactions) => {
                reactions.push(reaction);
                return;
            }
            State::Fulfilled(value) => Ok(value.clone()),
            State::Rejected(reason) => Err(reason.clone()),
        };
        if let Some(queue) = &mut inner.draining {
            queue.push_back(reaction);
            return;
        }
        drop(inner);
        reaction.run(outcome);
    }
}

impl Thenable for Promise {
    fn attach(&self, on_fulfilled: Callback, on_rejected: Callback) {
        self.add_reaction(Reaction {
            on_fulfilled,
            on_rejected,
        });
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::ManualQueue;
    use std::cell::Cell;

    fn host() -> (Rc<ManualQueue>, Host) {
        let queue = ManualQueue::new();
        let host: Host = queue.clone();
        (queue, host)
    }

    #[test]
    fn test_settlement_is_deferred() {
        let (queue, host) = host();
        let promise = Promise::new(&host, |resolver| {
            resolver.fulfill(1);
            Ok(())
        });
        assert_eq!(promise.state(), PromiseState::Pending);
        assert_eq!(queue.len(), 1);

        queue.drain();
        assert_eq!(promise.peek(), Some(Ok(Value::from(1))));
    }

    #[test]
    fn test_first_settlement_wins() {
        let (queue, host) = host();
        let (promise, resolver) = Promise::with_resolver(&host);
        resolver.fulfill("first");
        resolver.reject("second");
        resolver.fulfill("third");
        queue.drain();
        assert_eq!(promise.peek(), Some(Ok(Value::from("first"))));

        resolver.reject("late");
        queue.drain();
        assert_eq!(promise.state(), PromiseState::Fulfilled);
        assert_eq!(promise.peek(), Some(Ok(Value::from("first"))));
    }

    #[test]
    fn test_executor_error_rejects() {
        let (queue, host) = host();
        let promise = Promise::new(&host, |_| Err(Value::error("boom")));
        queue.drain();
        assert_eq!(promise.peek(), Some(Err(Value::error("boom"))));
    }

    #[test]
    fn test_executor_error_after_fulfill_is_ignored() {
        let (queue, host) = host();
        let promise = Promise::new(&host, |resolver| {
            resolver.fulfill(1);
            Err(Value::error("too late"))
        });
        queue.drain();
        assert_eq!(promise.peek(), Some(Ok(Value::from(1))));
    }

    #[test]
    fn test_reactions_run_once_in_order() {
        let (queue, host) = host();
        let (promise, resolver) = Promise::with_resolver(&host);
        let order = Rc::new(RefCell::new(Vec::new()));
        for i in 0..5 {
            let order = order.clone();
            promise.then(move |v| {
                order.borrow_mut().push(i);
                Ok(v)
            });
        }
        resolver.fulfill(());
        resolver.fulfill(());
        queue.drain();
        assert_eq!(*order.borrow(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_reaction_attached_while_draining_runs_last() {
        let (queue, host) = host();
        let (promise, resolver) = Promise::with_resolver(&host);
        let order = Rc::new(RefCell::new(Vec::new()));

        let (parent, first, late) = (promise.clone(), order.clone(), order.clone());
        promise.then(move |v| {
            first.borrow_mut().push("a");
            parent.then(move |v| {
                late.borrow_mut().push("c");
                Ok(v)
            });
            Ok(v)
        });
        let second = order.clone();
        promise.then(move |v| {
            second.borrow_mut().push("b");
            Ok(v)
        });

        resolver.fulfill(());
        queue.drain();
        assert_eq!(*order.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_handler_returning_rejected_promise_rejects_derived() {
        let (queue, host) = host();
        let inner_host = host.clone();
        let derived = Promise::resolve(&host, 1)
            .then(move |_| Ok(Promise::reject(&inner_host, "inner").into()));
        queue.drain();
        assert_eq!(derived.peek(), Some(Err(Value::from("inner"))));
    }

    #[test]
    fn test_reaction_attached_after_settlement_fires() {
        let (queue, host) = host();
        let promise = Promise::new(&host, |resolver| {
            resolver.reject("no");
            Ok(())
        });
        queue.drain();

        let calls = Rc::new(Cell::new(0));
        let seen = calls.clone();
        let derived = promise.catch(move |reason| {
            seen.set(seen.get() + 1);
            Ok(reason)
        });
        queue.drain();
        assert_eq!(calls.get(), 1);
        assert_eq!(derived.peek(), Some(Ok(Value::from("no"))));
    }

    #[test]
    fn test_only_matching_branch_fires() {
        let (queue, host) = host();
        let (promise, resolver) = Promise::with_resolver(&host);
        let derived = promise.then_else(
            |_| Ok("fulfilled".into()),
            |_| Ok("rejected".into()),
        );
        resolver.reject(0);
        queue.drain();
        assert_eq!(derived.peek(), Some(Ok(Value::from("rejected"))));
    }

    #[test]
    fn test_handler_error_only_rejects_derived() {
        let (queue, host) = host();
        let (promise, resolver) = Promise::with_resolver(&host);
        let failing = promise.then(|_| Err(Value::error("handler")));
        let sibling = promise.then(Ok);
        resolver.fulfill(5);
        queue.drain();
        assert_eq!(promise.peek(), Some(Ok(Value::from(5))));
        assert_eq!(failing.peek(), Some(Err(Value::error("handler"))));
        assert_eq!(sibling.peek(), Some(Ok(Value::from(5))));
    }

    #[test]
    fn test_missing_handlers_pass_through() {
        let (queue, host) = host();
        let (promise, resolver) = Promise::with_resolver(&host);
        let derived = promise.chain(Handlers::new());
        resolver.reject("reason");
        queue.drain();
        assert_eq!(derived.peek(), Some(Err(Value::from("reason"))));
    }

    #[test]
    fn test_adopts_pending_promise() {
        let (queue, host) = host();
        let (inner, inner_resolver) = Promise::with_resolver(&host);
        let outer = Promise::new(&host, |resolver| {
            resolver.fulfill(inner.clone());
            Ok(())
        });
        queue.drain();
        assert_eq!(outer.state(), PromiseState::Pending);

        inner_resolver.fulfill("inner");
        queue.drain();
        assert_eq!(outer.peek(), Some(Ok(Value::from("inner"))));
    }

    #[test]
    fn test_adopts_rejection() {
        let (queue, host) = host();
        let inner = Promise::new(&host, |resolver| {
            resolver.reject(Value::error("inner"));
            Ok(())
        });
        let outer = Promise::new(&host, |resolver| {
            resolver.fulfill(inner);
            Ok(())
        });
        queue.drain();
        assert_eq!(outer.peek(), Some(Err(Value::error("inner"))));
    }

    #[test]
    fn test_rejection_reason_is_not_adopted() {
        let (queue, host) = host();
        let thenable = Value::thenable(|on_fulfilled, _| on_fulfilled(1.into()));
        let reason = thenable.clone();
        let promise = Promise::new(&host, move |resolver| {
            resolver.reject(reason);
            Ok(())
        });
        queue.drain();
        assert_eq!(promise.peek(), Some(Err(thenable)));
    }

    #[test]
    fn test_deep_thenable_chain_is_trampolined() {
        let (queue, host) = host();
        let mut value = Value::from("bottom");
        for _ in 0..1_000 {
            let inner = value;
            value = Value::thenable(move |on_fulfilled, _| on_fulfilled(inner.clone()));
        }
        let promise = Promise::new(&host, move |resolver| {
            resolver.fulfill(value);
            Ok(())
        });
        queue.drain();
        assert_eq!(promise.peek(), Some(Ok(Value::from("bottom"))));
    }

    #[test]
    fn test_foreign_thenable_calling_both_callbacks() {
        let (queue, host) = host();
        let foreign = Value::thenable(|on_fulfilled, on_rejected| {
            on_rejected("rejected first".into());
            on_fulfilled("fulfilled second".into());
        });
        let promise = Promise::new(&host, move |resolver| {
            resolver.fulfill(foreign);
            Ok(())
        });
        queue.drain();
        assert_eq!(promise.peek(), Some(Err(Value::from("rejected first"))));
    }
}

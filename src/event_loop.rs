use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::future::{Future, IntoFuture};
use std::pin::pin;
use std::rc::Rc;
use std::sync::atomic::{self, AtomicBool};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use futures::task::{waker, ArcWake};
use tracing::{debug, trace, warn};

use crate::config::{Clock, Config};
use crate::host::{Defer, Host, Task};
use crate::remote::{Message, RemoteResolver};
use crate::{Error, Promise, Resolver, Value};

/// A single-threaded host for promises: a FIFO of deferred tasks plus timers.
///
/// Deferred tasks and timers share one queue ordered by due time, then by
/// insertion, so equal-delay deferrals run in the order they were made.
///
/// # Examples
///
/// ```
/// use deferred_promise::{EventLoop, Promise, Value};
/// use std::time::Duration;
///
/// let mut rt = EventLoop::new();
/// let handle = rt.handle();
/// let promise = Promise::new(&rt.host(), move |resolver| {
///     handle.set_timeout(Duration::from_millis(100), move || resolver.fulfill("foo"));
///     Ok(())
/// });
/// assert_eq!(rt.block_on(promise).unwrap(), Ok(Value::from("foo")));
/// ```
pub struct EventLoop {
    shared: Rc<Shared>,
    config: Config,
    sender: Sender<Message>,
    receiver: Receiver<Message>,
    remotes: HashMap<u64, Resolver>,
    counter: u64,
}

/// A clonable handle onto an [`EventLoop`]'s queue.
#[derive(Clone)]
pub struct Handle {
    shared: Rc<Shared>,
}

struct Shared {
    clock: Clock,
    started: Instant,
    elapsed: Cell<Duration>,
    sequence: Cell<u64>,
    timers: RefCell<BinaryHeap<Timer>>,
}

struct Timer {
    due: Duration,
    sequence: u64,
    task: Task,
}

enum Turn {
    Task(Task),
    Waited,
    Idle,
}

impl EventLoop {
    /// A loop with the default [`Config`]. The environment is not consulted;
    /// see [`EventLoop::from_env`].
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// A loop configured from `PROMISE_CLOCK` and `PROMISE_MAX_TASKS`.
    pub fn from_env() -> Result<Self, Error> {
        Ok(Self::with_config(Config::from_env()?))
    }

    pub fn with_config(config: Config) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            shared: Rc::new(Shared {
                clock: config.clock,
                started: Instant::now(),
                elapsed: Cell::new(Duration::ZERO),
                sequence: Cell::new(0),
                timers: RefCell::new(BinaryHeap::new()),
            }),
            config,
            sender,
            receiver,
            remotes: HashMap::new(),
            counter: 0,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The host to create promises on.
    pub fn host(&self) -> Host {
        self.shared.clone()
    }

    pub fn handle(&self) -> Handle {
        Handle {
            shared: self.shared.clone(),
        }
    }

    /// Time elapsed on this loop's clock.
    pub fn now(&self) -> Duration {
        self.shared.now()
    }

    /// A pending promise settled from another thread through the returned
    /// [`RemoteResolver`].
    pub fn remote(&mut self) -> (Promise, RemoteResolver) {
        let id = self.counter;
        self.counter += 1;

        let (promise, resolver) = Promise::with_resolver(&self.host());
        self.remotes.insert(id, resolver);
        debug!(id, "remote resolver registered");

        (promise, RemoteResolver::new(id, self.sender.clone()))
    }

    /// Runs tasks until none are queued and no remote resolver is
    /// outstanding.
    pub fn run(&mut self) -> Result<(), Error> {
        self.drive(true)
    }

    /// Runs tasks until none are queued, without waiting on remote resolvers.
    pub fn run_until_stalled(&mut self) -> Result<(), Error> {
        self.drive(false)
    }

    /// Runs the loop until `future` completes.
    ///
    /// Fails with [`Error::Stalled`] once nothing is left that could wake the
    /// future.
    pub fn block_on<F: IntoFuture>(&mut self, future: F) -> Result<F::Output, Error> {
        let mut future = pin!(future.into_future());
        let woken = Arc::new(Woken(AtomicBool::new(true)));
        let waker = waker(woken.clone());
        let mut cx = Context::from_waker(&waker);
        let mut tasks = 0;

        loop {
            if woken.0.swap(false, atomic::Ordering::AcqRel) {
                if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
                    return Ok(output);
                }
            }
            match self.turn(true) {
                Turn::Task(task) => self.run_task(task, &mut tasks)?,
                Turn::Waited => (),
                Turn::Idle => {
                    debug!("event loop stalled with the future still pending");
                    return Err(Error::Stalled);
                }
            }
        }
    }

    fn drive(&mut self, wait_remote: bool) -> Result<(), Error> {
        let mut tasks = 0;
        loop {
            match self.turn(wait_remote) {
                Turn::Task(task) => self.run_task(task, &mut tasks)?,
                Turn::Waited => (),
                Turn::Idle => {
                    debug!(tasks, "event loop idle");
                    return Ok(());
                }
            }
        }
    }

    fn run_task(&self, task: Task, tasks: &mut u64) -> Result<(), Error> {
        *tasks += 1;
        if let Some(max) = self.config.max_tasks {
            if *tasks > max {
                return Err(Error::TaskLimit(max));
            }
        }
        task();
        Ok(())
    }

    /// Picks the next due task, or waits for time or remote messages to
    /// produce one.
    fn turn(&mut self, wait_remote: bool) -> Turn {
        while let Ok(message) = self.receiver.try_recv() {
            self.deliver(message);
        }

        if let Some(task) = self.shared.pop_due() {
            return Turn::Task(task);
        }

        match (self.shared.next_due(), self.shared.clock) {
            (Some(due), Clock::Virtual) => {
                trace!(?due, "advancing virtual clock");
                self.shared.elapsed.set(due);
                Turn::Waited
            }
            (Some(due), Clock::Real) => {
                let wait = due.saturating_sub(self.shared.now());
                match self.receiver.recv_timeout(wait) {
                    Ok(message) => self.deliver(message),
                    Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => (),
                }
                Turn::Waited
            }
            (None, _) if wait_remote && !self.remotes.is_empty() => {
                debug!(outstanding = self.remotes.len(), "waiting on remote resolvers");
                match self.receiver.recv() {
                    Ok(message) => {
                        self.deliver(message);
                        Turn::Waited
                    }
                    Err(_) => Turn::Idle,
                }
            }
            (None, _) => Turn::Idle,
        }
    }

    fn deliver(&mut self, Message { id, outcome }: Message) {
        match (self.remotes.remove(&id), outcome) {
            (Some(resolver), Some(Ok(value))) => {
                debug!(id, "remote resolver fulfilled");
                resolver.fulfill(Value::from(value));
            }
            (Some(resolver), Some(Err(reason))) => {
                debug!(id, "remote resolver rejected");
                resolver.reject(Value::from(reason));
            }
            (Some(_), None) => debug!(id, "remote resolver dropped unsettled"),
            (None, _) => warn!(id, "message for unknown remote resolver"),
        }
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl Handle {
    /// Runs `task` once `delay` has elapsed on the loop's clock.
    pub fn set_timeout<F>(&self, delay: Duration, task: F)
    where
        F: FnOnce() + 'static,
    {
        self.shared.schedule(delay, Box::new(task));
    }

    pub fn host(&self) -> Host {
        self.shared.clone()
    }

    pub fn now(&self) -> Duration {
        self.shared.now()
    }
}

impl Defer for Handle {
    fn defer(&self, task: Task) {
        self.shared.defer(task)
    }
}

impl Shared {
    fn now(&self) -> Duration {
        match self.clock {
            Clock::Virtual => self.elapsed.get(),
            Clock::Real => self.started.elapsed(),
        }
    }

    fn schedule(&self, delay: Duration, task: Task) {
        let sequence = self.sequence.get();
        self.sequence.set(sequence + 1);
        self.timers.borrow_mut().push(Timer {
            due: self.now() + delay,
            sequence,
            task,
        });
    }

    fn pop_due(&self) -> Option<Task> {
        let mut timers = self.timers.borrow_mut();
        if timers.peek()?.due > self.now() {
            return None;
        }
        timers.pop().map(|timer| timer.task)
    }

    fn next_due(&self) -> Option<Duration> {
        self.timers.borrow().peek().map(|timer| timer.due)
    }
}

impl Defer for Shared {
    fn defer(&self, task: Task) {
        self.schedule(Duration::ZERO, task)
    }
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.sequence == other.sequence
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap and the earliest timer runs first.
        (other.due, other.sequence).cmp(&(self.due, self.sequence))
    }
}

struct Woken(AtomicBool);

impl ArcWake for Woken {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.0.store(true, atomic::Ordering::Release);
    }
}

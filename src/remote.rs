//! A remote resolver lets another thread settle a promise owned by an
//! [`EventLoop`](crate::EventLoop). The outcome travels as JSON over a
//! multi-producer channel and is applied on the loop's own thread.
use crossbeam_channel::Sender;
use serde_json::Value as Json;

#[derive(Debug)]
pub(crate) struct Message {
    pub(crate) id: u64,
    /// `None` when the resolver was dropped unsettled.
    pub(crate) outcome: Option<Result<Json, Json>>,
}

/// The `Send` half of [`EventLoop::remote`](crate::EventLoop::remote).
///
/// Settling consumes the resolver. Dropping it unsettled leaves the promise
/// pending but lets the loop stop waiting for it.
///
/// # Examples
///
/// ```
/// use deferred_promise::{EventLoop, Value};
/// use std::thread;
///
/// let mut rt = EventLoop::new();
/// let (promise, remote) = rt.remote();
/// let worker = thread::spawn(move || remote.fulfill(serde_json::json!("🍓")));
/// assert_eq!(rt.block_on(promise).unwrap(), Ok(Value::from("🍓")));
/// worker.join().expect("The worker thread has panicked");
/// ```
#[derive(Debug)]
pub struct RemoteResolver {
    id: u64,
    sender: Sender<Message>,
    settled: bool,
}

impl RemoteResolver {
    pub(crate) fn new(id: u64, sender: Sender<Message>) -> Self {
        Self {
            id,
            sender,
            settled: false,
        }
    }

    pub fn fulfill(mut self, value: Json) {
        self.send(Some(Ok(value)))
    }

    pub fn reject(mut self, reason: Json) {
        self.send(Some(Err(reason)))
    }

    fn send(&mut self, outcome: Option<Result<Json, Json>>) {
        self.settled = true;
        // The loop may be gone already; nobody is left to observe the outcome.
        let _ = self.sender.send(Message {
            id: self.id,
            outcome,
        });
    }
}

impl Drop for RemoteResolver {
    fn drop(&mut self) {
        if !self.settled {
            self.send(None);
        }
    }
}

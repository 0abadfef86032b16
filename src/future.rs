use std::cell::RefCell;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::thenable::Thenable;
use crate::{Promise, Value};

/// Awaits a [`Promise`]. Resolves to `Ok(value)` or `Err(reason)`.
///
/// The future only makes progress while the promise's host runs its tasks;
/// drive it with [`EventLoop::block_on`](crate::EventLoop::block_on).
///
/// # Examples
///
/// ```
/// use deferred_promise::{EventLoop, Promise, Value};
///
/// let mut rt = EventLoop::new();
/// let host = rt.host();
/// let result = rt.block_on(async move {
///     let first = Promise::resolve(&host, 1).await?;
///     let second = Promise::reject(&host, "nope").await;
///     Ok::<_, Value>((first, second))
/// });
/// assert_eq!(result.unwrap(), Ok((Value::from(1), Err(Value::from("nope")))));
/// ```
#[derive(Debug)]
pub struct Settled {
    promise: Promise,
    waker: Option<Rc<RefCell<Option<Waker>>>>,
}

impl Promise {
    pub fn settled(&self) -> Settled {
        Settled {
            promise: self.clone(),
            waker: None,
        }
    }
}

impl IntoFuture for Promise {
    type Output = Result<Value, Value>;
    type IntoFuture = Settled;

    fn into_future(self) -> Self::IntoFuture {
        self.settled()
    }
}

impl Future for Settled {
    type Output = Result<Value, Value>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(outcome) = this.promise.peek() {
            return Poll::Ready(outcome);
        }

        match &this.waker {
            Some(slot) => {
                slot.borrow_mut().replace(cx.waker().clone());
            }
            None => {
                let slot = Rc::new(RefCell::new(Some(cx.waker().clone())));
                let fulfilled = slot.clone();
                let rejected = slot.clone();
                this.promise.attach(
                    Box::new(move |_| wake(&fulfilled)),
                    Box::new(move |_| wake(&rejected)),
                );
                this.waker = Some(slot);
            }
        }
        Poll::Pending
    }
}

fn wake(slot: &RefCell<Option<Waker>>) {
    if let Some(waker) = slot.borrow_mut().take() {
        waker.wake()
    }
}

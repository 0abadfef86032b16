use std::rc::Rc;

/// Deferred work queued on a host.
pub type Task = Box<dyn FnOnce()>;

/// The deferred-execution primitive promises are built on: run a task after
/// the current synchronous execution completes.
///
/// Implementations must run deferred tasks in the order they were deferred.
pub trait Defer {
    fn defer(&self, task: Task);
}

/// The host every promise carries and schedules its settlement on.
pub type Host = Rc<dyn Defer>;

#[cfg(test)]
pub(crate) mod testing {
    use super::{Defer, Task};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// A bare FIFO host, drained by hand.
    #[derive(Default)]
    pub(crate) struct ManualQueue {
        tasks: RefCell<VecDeque<Task>>,
    }

    impl ManualQueue {
        pub(crate) fn new() -> Rc<Self> {
            Rc::new(Self::default())
        }

        /// Runs tasks until the queue is empty, returning how many ran.
        pub(crate) fn drain(&self) -> usize {
            let mut ran = 0;
            loop {
                let task = self.tasks.borrow_mut().pop_front();
                match task {
                    Some(task) => task(),
                    None => return ran,
                }
                ran += 1;
            }
        }

        pub(crate) fn len(&self) -> usize {
            self.tasks.borrow().len()
        }
    }

    impl Defer for ManualQueue {
        fn defer(&self, task: Task) {
            self.tasks.borrow_mut().push_back(task);
        }
    }
}

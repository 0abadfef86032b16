use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::host::Host;
use crate::{Error, Promise, Value};

impl Promise {
    /// A promise fulfilled with `value`, adopting it if it is a thenable.
    pub fn resolve(host: &Host, value: impl Into<Value>) -> Promise {
        let value = value.into();
        Promise::new(host, move |resolver| {
            resolver.fulfill(value);
            Ok(())
        })
    }

    /// A promise rejected with `reason`, stored as-is.
    pub fn reject(host: &Host, reason: impl Into<Value>) -> Promise {
        let reason = reason.into();
        Promise::new(host, move |resolver| {
            resolver.reject(reason);
            Ok(())
        })
    }

    /// Fulfills with every element's value, in input order, once all of them
    /// fulfilled; rejects with the first rejection.
    ///
    /// Elements may be promises, foreign thenables or plain values. Fails
    /// immediately when `values` is not an array.
    ///
    /// ```
    /// use deferred_promise::{EventLoop, Promise, Value};
    ///
    /// let mut rt = EventLoop::new();
    /// let host = rt.host();
    /// let values = vec![Promise::resolve(&host, 3).into(), Value::from(1337)];
    /// let all = Promise::all(&host, values).unwrap();
    /// let result = rt.block_on(all).unwrap();
    /// assert_eq!(result, Ok(Value::from(vec![Value::from(3), 1337.into()])));
    ///
    /// assert!(Promise::all(&host, Value::Object(Default::default())).is_err());
    /// ```
    pub fn all(host: &Host, values: impl Into<Value>) -> Result<Promise, Error> {
        let values = sequence(values.into())?;
        Ok(Promise::new(host, move |resolver| {
            if values.is_empty() {
                resolver.fulfill(Value::Array(Vec::new()));
                return Ok(());
            }

            let slots = Rc::new(RefCell::new(vec![None; values.len()]));
            let remaining = Rc::new(Cell::new(values.len()));

            for (index, value) in values.into_iter().enumerate() {
                let fulfilled = resolver.clone();
                let rejected = resolver.clone();
                let slots = slots.clone();
                let remaining = remaining.clone();

                Promise::resolve(host, value).then_else(
                    move |value| {
                        slots.borrow_mut()[index] = Some(value);
                        remaining.set(remaining.get() - 1);
                        if remaining.get() == 0 {
                            let values = slots.borrow_mut().drain(..).flatten().collect::<Vec<_>>();
                            fulfilled.fulfill(values);
                        }
                        Ok(Value::Undefined)
                    },
                    move |reason| {
                        rejected.reject(reason);
                        Ok(Value::Undefined)
                    },
                );
            }
            Ok(())
        }))
    }

    /// Settles like whichever element settles first, in either direction.
    ///
    /// Fails immediately when `values` is not an array. An empty array gives a
    /// promise that never settles.
    pub fn race(host: &Host, values: impl Into<Value>) -> Result<Promise, Error> {
        let values = sequence(values.into())?;
        Ok(Promise::new(host, move |resolver| {
            for value in values {
                let fulfilled = resolver.clone();
                let rejected = resolver.clone();
                Promise::resolve(host, value).then_else(
                    move |value| {
                        fulfilled.fulfill(value);
                        Ok(Value::Undefined)
                    },
                    move |reason| {
                        rejected.reject(reason);
                        Ok(Value::Undefined)
                    },
                );
            }
            Ok(())
        }))
    }
}

fn sequence(values: Value) -> Result<Vec<Value>, Error> {
    match values {
        Value::Array(values) => Ok(values),
        other => Err(Error::NotSequence(other.describe())),
    }
}

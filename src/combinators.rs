//! Combinators over several promises.
//!
//! Each one is written against the public promise contract only: a new
//! promise whose executor attaches `then` handlers to every input. The
//! bookkeeping (result slots, countdown, settled flag) lives in an `Rc`
//! shared by those handlers and nowhere else. Once the combined promise
//! has settled, later input settlements are ignored; the inputs themselves
//! keep running.

use crate::core::{Function, JSObject, Value, first_arg};
use crate::job_queue::SchedulerRef;
use crate::js_promise::Promise;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

struct Bookkeeping {
    slots: RefCell<Vec<Value>>,
    remaining: Cell<usize>,
    settled: Cell<bool>,
}

impl Bookkeeping {
    fn new(len: usize) -> Rc<Self> {
        Rc::new(Bookkeeping {
            slots: RefCell::new(vec![Value::Undefined; len]),
            remaining: Cell::new(len),
            settled: Cell::new(false),
        })
    }

    /// Store `value` at `index`; returns the full buffer when this was the
    /// last outstanding slot.
    fn fill(&self, index: usize, value: Value) -> Option<Vec<Value>> {
        self.slots.borrow_mut()[index] = value;
        self.remaining.set(self.remaining.get() - 1);
        if self.remaining.get() == 0 {
            self.settled.set(true);
            Some(std::mem::take(&mut *self.slots.borrow_mut()))
        } else {
            None
        }
    }

    /// Claim the right to settle the combined promise. Only the first
    /// caller gets `true`.
    fn claim(&self) -> bool {
        !self.settled.replace(true)
    }
}

impl Promise {
    /// Fulfil with every input's value, in input order, once all inputs
    /// have fulfilled; reject with the first rejection.
    pub fn all(scheduler: &SchedulerRef, promises: impl IntoIterator<Item = Promise>) -> Promise {
        let promises: Vec<Promise> = promises.into_iter().collect();
        Promise::new(scheduler, move |resolve, reject| {
            if promises.is_empty() {
                resolve.call1(Value::array(Vec::new()))?;
                return Ok(());
            }
            let state = Bookkeeping::new(promises.len());
            for (index, promise) in promises.iter().enumerate() {
                let (fulfilled_state, resolve) = (state.clone(), resolve.clone());
                let on_fulfilled = Function::new("Promise.all resolve", move |args| {
                    if fulfilled_state.settled.get() {
                        return Ok(Value::Undefined);
                    }
                    if let Some(values) = fulfilled_state.fill(index, first_arg(args)) {
                        log::debug!("Promise.all: all {} inputs fulfilled", values.len());
                        resolve.call1(Value::array(values))?;
                    }
                    Ok(Value::Undefined)
                });
                let (rejected_state, reject) = (state.clone(), reject.clone());
                let on_rejected = Function::new("Promise.all reject", move |args| {
                    if rejected_state.claim() {
                        log::debug!("Promise.all: input {index} rejected first");
                        reject.call(args)?;
                    }
                    Ok(Value::Undefined)
                });
                promise.then(Some(on_fulfilled), Some(on_rejected));
            }
            Ok(())
        })
    }

    /// Adopt the outcome of whichever input settles first. An empty input
    /// never settles.
    pub fn race(scheduler: &SchedulerRef, promises: impl IntoIterator<Item = Promise>) -> Promise {
        let promises: Vec<Promise> = promises.into_iter().collect();
        Promise::new(scheduler, move |resolve, reject| {
            let settled = Rc::new(Cell::new(false));
            for (index, promise) in promises.iter().enumerate() {
                let on_fulfilled = first_wins(&settled, &resolve, "Promise.race resolve", index);
                let on_rejected = first_wins(&settled, &reject, "Promise.race reject", index);
                promise.then(Some(on_fulfilled), Some(on_rejected));
            }
            Ok(())
        })
    }

    /// First success of two promises. Rejects with `[left_reason,
    /// right_reason]` when both reject.
    pub fn attempt(scheduler: &SchedulerRef, left: Promise, right: Promise) -> Promise {
        Promise::attempt_all(scheduler, [left, right])
    }

    /// Fulfil with the first input to fulfil; reject only when every input
    /// has rejected, with the reasons as an array in input order. An empty
    /// input rejects immediately with an empty array.
    pub fn attempt_all(scheduler: &SchedulerRef, promises: impl IntoIterator<Item = Promise>) -> Promise {
        let promises: Vec<Promise> = promises.into_iter().collect();
        Promise::new(scheduler, move |resolve, reject| {
            if promises.is_empty() {
                reject.call1(Value::array(Vec::new()))?;
                return Ok(());
            }
            let state = Bookkeeping::new(promises.len());
            for (index, promise) in promises.iter().enumerate() {
                let (fulfilled_state, resolve) = (state.clone(), resolve.clone());
                let on_fulfilled = Function::new("attempt resolve", move |args| {
                    if fulfilled_state.claim() {
                        log::debug!("attempt: input {index} fulfilled first");
                        resolve.call(args)?;
                    }
                    Ok(Value::Undefined)
                });
                let (rejected_state, reject) = (state.clone(), reject.clone());
                let on_rejected = Function::new("attempt reject", move |args| {
                    if rejected_state.settled.get() {
                        return Ok(Value::Undefined);
                    }
                    if let Some(reasons) = rejected_state.fill(index, first_arg(args)) {
                        log::debug!("attempt: all {} inputs rejected", reasons.len());
                        reject.call1(Value::array(reasons))?;
                    }
                    Ok(Value::Undefined)
                });
                promise.then(Some(on_fulfilled), Some(on_rejected));
            }
            Ok(())
        })
    }

    /// Same as [`Promise::attempt_all`].
    pub fn any(scheduler: &SchedulerRef, promises: impl IntoIterator<Item = Promise>) -> Promise {
        Promise::attempt_all(scheduler, promises)
    }

    /// Wait for every input to settle and fulfil with one
    /// `{status, value}` / `{status, reason}` record per input, in input
    /// order. Never rejects.
    pub fn all_settled(scheduler: &SchedulerRef, promises: impl IntoIterator<Item = Promise>) -> Promise {
        let promises: Vec<Promise> = promises.into_iter().collect();
        Promise::new(scheduler, move |resolve, _reject| {
            if promises.is_empty() {
                resolve.call1(Value::array(Vec::new()))?;
                return Ok(());
            }
            let state = Bookkeeping::new(promises.len());
            for (index, promise) in promises.iter().enumerate() {
                let on_fulfilled = record_settlement(&state, &resolve, index, "fulfilled", "value");
                let on_rejected = record_settlement(&state, &resolve, index, "rejected", "reason");
                promise.then(Some(on_fulfilled), Some(on_rejected));
            }
            Ok(())
        })
    }
}

fn first_wins(settled: &Rc<Cell<bool>>, settle: &Function, name: &str, index: usize) -> Function {
    let (settled, settle) = (settled.clone(), settle.clone());
    Function::new(name, move |args| {
        if settled.replace(true) {
            log::trace!("race: ignoring late settlement of input {index}");
        } else {
            settle.call(args)?;
        }
        Ok(Value::Undefined)
    })
}

fn record_settlement(state: &Rc<Bookkeeping>, resolve: &Function, index: usize, status: &'static str, key: &'static str) -> Function {
    let (state, resolve) = (state.clone(), resolve.clone());
    Function::new("Promise.allSettled record", move |args| {
        let mut record = JSObject::new();
        record.set("status", status);
        record.set(key, first_arg(args));
        if let Some(records) = state.fill(index, Value::Object(record.into_ptr())) {
            resolve.call1(Value::array(records))?;
        }
        Ok(Value::Undefined)
    })
}

//! # Promise cell
//!
//! A [`Promise`] is a shared handle to a [`PromiseCell`]: state, settled
//! value and two ordered reaction lists. The lifecycle is
//! pending → fulfilled/rejected, exactly once:
//!
//! 1. the executor runs synchronously inside [`Promise::new`];
//! 2. the resolving functions it receives drive the resolution procedure
//!    (see `resolution.rs`), which eventually settles the cell;
//! 3. settlement swaps the reaction lists out and queues every reaction
//!    of the matching list on the scheduler, in registration order.
//!
//! Reactions never run inline: `then` on an already settled promise still
//! goes through the scheduler.

use crate::core::{Function, Value, first_arg};
use crate::error::PromiseError;
use crate::job_queue::{Job, JobKind, SchedulerRef};
use crate::raise_type_error;
use crate::resolution::resolve_promise;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseState {
    Pending,
    Fulfilled,
    Rejected,
}

impl PromiseState {
    pub fn as_str(self) -> &'static str {
        match self {
            PromiseState::Pending => "pending",
            PromiseState::Fulfilled => "fulfilled",
            PromiseState::Rejected => "rejected",
        }
    }
}

/// A reaction consumes the settled value exactly once.
pub(crate) type Reaction = Box<dyn FnOnce(Value)>;

pub(crate) struct PromiseCell {
    id: usize,
    state: PromiseState,
    value: Option<Value>,
    fulfil_reactions: Vec<Reaction>,
    reject_reactions: Vec<Reaction>,
}

static UNIQUE_ID_SEED: AtomicUsize = AtomicUsize::new(1);

fn generate_unique_id() -> usize {
    UNIQUE_ID_SEED.fetch_add(1, Ordering::SeqCst)
}

impl PromiseCell {
    fn new() -> Self {
        Self {
            id: generate_unique_id(),
            state: PromiseState::Pending,
            value: None,
            fulfil_reactions: Vec::new(),
            reject_reactions: Vec::new(),
        }
    }
}

#[derive(Clone)]
pub struct Promise {
    cell: Rc<RefCell<PromiseCell>>,
    scheduler: SchedulerRef,
}

/// A promise together with the functions that settle it.
#[derive(Clone, Debug)]
pub struct Deferred {
    pub promise: Promise,
    pub resolve: Function,
    pub reject: Function,
}

impl Promise {
    pub(crate) fn pending(scheduler: &SchedulerRef) -> Promise {
        Promise {
            cell: Rc::new(RefCell::new(PromiseCell::new())),
            scheduler: scheduler.clone(),
        }
    }

    /// Create a promise and run `executor` synchronously with its resolving
    /// functions. An `Err` from the executor rejects the promise.
    pub fn new<F>(scheduler: &SchedulerRef, executor: F) -> Promise
    where
        F: FnOnce(Function, Function) -> Result<(), PromiseError>,
    {
        let promise = Promise::pending(scheduler);
        let (resolve, reject) = promise.resolving_functions();
        if let Err(err) = executor(resolve, reject) {
            log::debug!("promise #{}: executor failed: {err}", promise.id());
            promise.reject_with(err.into_reason());
        }
        promise
    }

    /// Dynamic constructor: `executor` must be a function, called with the
    /// resolving functions as its two arguments.
    pub fn construct(scheduler: &SchedulerRef, executor: &Value) -> Result<Promise, PromiseError> {
        let Value::Function(executor) = executor else {
            return Err(raise_type_error!("Promise executor must be a function, got {executor}"));
        };
        Ok(Promise::new(scheduler, |resolve, reject| {
            executor.call(&[Value::Function(resolve), Value::Function(reject)]).map(|_| ())
        }))
    }

    pub fn resolve(scheduler: &SchedulerRef, value: impl Into<Value>) -> Promise {
        let promise = Promise::pending(scheduler);
        resolve_promise(&promise, value.into());
        promise
    }

    pub fn reject(scheduler: &SchedulerRef, reason: impl Into<Value>) -> Promise {
        let promise = Promise::pending(scheduler);
        promise.reject_with(reason.into());
        promise
    }

    pub fn deferred(scheduler: &SchedulerRef) -> Deferred {
        let promise = Promise::pending(scheduler);
        let (resolve, reject) = promise.resolving_functions();
        Deferred { promise, resolve, reject }
    }

    /// The `(resolve, reject)` pair handed to executors. Calling either
    /// after settlement does nothing.
    pub fn resolving_functions(&self) -> (Function, Function) {
        let target = self.clone();
        let resolve = Function::new("resolve", move |args| {
            resolve_promise(&target, first_arg(args));
            Ok(Value::Undefined)
        });
        let target = self.clone();
        let reject = Function::new("reject", move |args| {
            target.reject_with(first_arg(args));
            Ok(Value::Undefined)
        });
        (resolve, reject)
    }

    pub fn id(&self) -> usize {
        self.cell.borrow().id
    }

    pub fn state(&self) -> PromiseState {
        self.cell.borrow().state
    }

    pub fn is_pending(&self) -> bool {
        self.state() == PromiseState::Pending
    }

    /// The settled value or reason; `None` while pending.
    pub fn value(&self) -> Option<Value> {
        self.cell.borrow().value.clone()
    }

    /// Number of queued `(fulfil, reject)` reactions. Both are zero once
    /// the promise has settled.
    pub fn reaction_counts(&self) -> (usize, usize) {
        let cell = self.cell.borrow();
        (cell.fulfil_reactions.len(), cell.reject_reactions.len())
    }

    pub fn scheduler(&self) -> &SchedulerRef {
        &self.scheduler
    }

    pub fn ptr_eq(&self, other: &Promise) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }

    /// Reject unless already settled. No thenable unwrapping happens for
    /// reasons.
    pub fn reject_with(&self, reason: Value) {
        self.settle(PromiseState::Rejected, reason);
    }

    pub(crate) fn fulfil_with(&self, value: Value) {
        self.settle(PromiseState::Fulfilled, value);
    }

    /// The one place a cell leaves `Pending`. Returns whether this call
    /// settled it.
    fn settle(&self, state: PromiseState, value: Value) -> bool {
        let (id, reactions) = {
            let mut cell = self.cell.borrow_mut();
            if cell.state != PromiseState::Pending {
                log::trace!("promise #{}: ignoring {} after {}", cell.id, state.as_str(), cell.state.as_str());
                return false;
            }
            cell.state = state;
            cell.value = Some(value.clone());
            let fulfil = std::mem::take(&mut cell.fulfil_reactions);
            let reject = std::mem::take(&mut cell.reject_reactions);
            (cell.id, if state == PromiseState::Rejected { reject } else { fulfil })
        };
        // values may refer back to this promise; format outside the borrow
        log::debug!("promise #{id}: {} with {value:?}, {} reactions", state.as_str(), reactions.len());
        for reaction in reactions {
            let value = value.clone();
            self.scheduler.enqueue(Job::new(JobKind::Reaction, move || reaction(value)));
        }
        true
    }

    /// Attach handlers; returns the derived promise. Absent handlers pass
    /// the outcome through unchanged.
    pub fn then(&self, on_fulfilled: Option<Function>, on_rejected: Option<Function>) -> Promise {
        let derived = Promise::pending(&self.scheduler);
        let on_fulfil = attempt(derived.clone(), on_fulfilled, PromiseState::Fulfilled);
        let on_reject = attempt(derived.clone(), on_rejected, PromiseState::Rejected);

        let mut cell = self.cell.borrow_mut();
        match cell.state {
            PromiseState::Pending => {
                cell.fulfil_reactions.push(on_fulfil);
                cell.reject_reactions.push(on_reject);
                log::trace!("promise #{}: queued reaction for #{}", cell.id, derived.id());
            }
            PromiseState::Fulfilled | PromiseState::Rejected => {
                let value = cell.value.clone().unwrap_or_default();
                let reaction = if cell.state == PromiseState::Fulfilled { on_fulfil } else { on_reject };
                drop(cell);
                self.scheduler.enqueue(Job::new(JobKind::Reaction, move || reaction(value)));
            }
        }
        derived
    }

    /// `then` for dynamically typed handlers: anything that is not a
    /// function counts as absent.
    pub fn then_value(&self, on_fulfilled: &Value, on_rejected: &Value) -> Promise {
        self.then(on_fulfilled.as_function().cloned(), on_rejected.as_function().cloned())
    }

    pub fn catch(&self, on_rejected: Function) -> Promise {
        self.then(None, Some(on_rejected))
    }

    pub fn then_with<F>(&self, on_fulfilled: F) -> Promise
    where
        F: Fn(Value) -> Result<Value, PromiseError> + 'static,
    {
        self.then(Some(Function::unary(on_fulfilled)), None)
    }

    pub fn catch_with<F>(&self, on_rejected: F) -> Promise
    where
        F: Fn(Value) -> Result<Value, PromiseError> + 'static,
    {
        self.catch(Function::unary(on_rejected))
    }

    /// Run `on_finally` on either outcome and pass the original outcome
    /// through. If `on_finally` fails, or returns a promise that rejects,
    /// that failure replaces the outcome.
    pub fn finally(&self, on_finally: Function) -> Promise {
        let cleanup = on_finally.clone();
        let after_fulfil = Function::new("finally resolve", move |args| {
            let value = first_arg(args);
            match cleanup.call(&[])? {
                Value::Promise(pending) => Ok(Value::Promise(pending.then_with(move |_| Ok(value.clone())))),
                _ => Ok(value),
            }
        });
        let after_reject = Function::new("finally reject", move |args| {
            let reason = first_arg(args);
            match on_finally.call(&[])? {
                Value::Promise(pending) => {
                    let rethrown = pending.then_with(move |_| Err(PromiseError::throw(reason.clone())));
                    Ok(Value::Promise(rethrown))
                }
                _ => Err(PromiseError::throw(reason)),
            }
        });
        self.then(Some(after_fulfil), Some(after_reject))
    }
}

/// Wrap a handler so that its return value resolves `downstream` and its
/// failure rejects it. Without a handler the outcome passes through in
/// kind: fulfilment resolves, rejection rejects.
fn attempt(downstream: Promise, handler: Option<Function>, passthrough: PromiseState) -> Reaction {
    Box::new(move |value| match handler {
        Some(handler) => match handler.call1(value) {
            Ok(result) => resolve_promise(&downstream, result),
            Err(err) => {
                log::trace!("promise #{}: handler failed: {err}", downstream.id());
                downstream.reject_with(err.into_reason());
            }
        },
        None if passthrough == PromiseState::Rejected => downstream.reject_with(value),
        None => resolve_promise(&downstream, value),
    })
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cell.try_borrow() {
            Ok(cell) => write!(f, "Promise #{} <{}>", cell.id, cell.state.as_str()),
            Err(_) => f.write_str("Promise <borrowed>"),
        }
    }
}

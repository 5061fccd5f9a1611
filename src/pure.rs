//! # Strict functional variant
//!
//! The same resolution semantics as [`crate::Promise`], expressed through
//! a single `depend` primitive: handlers return a *new* promise, and the
//! promise `depend` returns settles by depending on whatever the handler
//! produced. Dependencies run synchronously, in registration order, at the
//! moment their source settles; there is no scheduler. Settlement
//! therefore recurses once per link, so settling the root of a very long
//! `chain` can exhaust the stack.
//!
//! Unlike the mutable cell this variant is strict: settling a promise that
//! is no longer pending is a programmer error and `fulfil` / `reject`
//! report it as [`PromiseError::AlreadySettled`].
//!
//! The module exists as a second oracle: for the same settlement schedule
//! both variants must end in the same state with the same value.

use crate::core::Value;
use crate::error::PromiseError;
use crate::js_promise::PromiseState;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

struct Dependency {
    fulfilled: Box<dyn FnOnce(Value)>,
    rejected: Box<dyn FnOnce(Value)>,
}

struct PureCell {
    state: PromiseState,
    value: Option<Value>,
    dependencies: Vec<Dependency>,
}

#[derive(Clone)]
pub struct PurePromise {
    cell: Rc<RefCell<PureCell>>,
}

impl PurePromise {
    pub fn state(&self) -> PromiseState {
        self.cell.borrow().state
    }

    pub fn value(&self) -> Option<Value> {
        self.cell.borrow().value.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.state() == PromiseState::Pending
    }

    pub fn dependency_count(&self) -> usize {
        self.cell.borrow().dependencies.len()
    }
}

impl fmt::Debug for PurePromise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PurePromise <{}>", self.state().as_str())
    }
}

/// A new pending promise, settled later with [`fulfil`] or [`reject`].
pub fn create_promise() -> PurePromise {
    PurePromise {
        cell: Rc::new(RefCell::new(PureCell {
            state: PromiseState::Pending,
            value: None,
            dependencies: Vec::new(),
        })),
    }
}

/// An already fulfilled promise.
pub fn fulfilled(value: Value) -> PurePromise {
    let promise = create_promise();
    settle_quietly(&promise, PromiseState::Fulfilled, value);
    promise
}

/// An already rejected promise.
pub fn rejected(reason: Value) -> PurePromise {
    let promise = create_promise();
    settle_quietly(&promise, PromiseState::Rejected, reason);
    promise
}

pub fn fulfil(promise: &PurePromise, value: Value) -> Result<(), PromiseError> {
    settle(promise, PromiseState::Fulfilled, value)
}

pub fn reject(promise: &PurePromise, reason: Value) -> Result<(), PromiseError> {
    settle(promise, PromiseState::Rejected, reason)
}

fn settle(promise: &PurePromise, state: PromiseState, value: Value) -> Result<(), PromiseError> {
    let dependencies = {
        let mut cell = promise.cell.borrow_mut();
        if cell.state != PromiseState::Pending {
            return Err(PromiseError::AlreadySettled {
                action: if state == PromiseState::Fulfilled { "fulfil" } else { "reject" },
                state: cell.state.as_str(),
            });
        }
        cell.state = state;
        cell.value = Some(value.clone());
        std::mem::take(&mut cell.dependencies)
    };
    for dependency in dependencies {
        match state {
            PromiseState::Rejected => (dependency.rejected)(value.clone()),
            _ => (dependency.fulfilled)(value.clone()),
        }
    }
    Ok(())
}

/// Evaluate `on_success` or `on_failure` once `promise` settles; the
/// returned promise follows the promise the chosen handler returns.
pub fn depend<S, F>(promise: &PurePromise, on_success: S, on_failure: F) -> PurePromise
where
    S: FnOnce(Value) -> PurePromise + 'static,
    F: FnOnce(Value) -> PurePromise + 'static,
{
    let result = create_promise();
    let (on_fulfil_target, on_reject_target) = (result.clone(), result.clone());
    on_settle(
        promise,
        Dependency {
            fulfilled: Box::new(move |value| forward(&on_success(value), on_fulfil_target)),
            rejected: Box::new(move |reason| forward(&on_failure(reason), on_reject_target)),
        },
    );
    result
}

/// Register `dependency`, or run it now if `promise` already settled.
fn on_settle(promise: &PurePromise, dependency: Dependency) {
    let settled = {
        let mut cell = promise.cell.borrow_mut();
        match cell.state {
            PromiseState::Pending => {
                cell.dependencies.push(dependency);
                return;
            }
            state => (state, cell.value.clone().unwrap_or_default()),
        }
    };
    match settled {
        (PromiseState::Rejected, reason) => (dependency.rejected)(reason),
        (_, value) => (dependency.fulfilled)(value),
    }
}

/// Settle `target` the way `source` settles.
fn forward(source: &PurePromise, target: PurePromise) {
    let reject_target = target.clone();
    on_settle(
        source,
        Dependency {
            fulfilled: Box::new(move |value| settle_quietly(&target, PromiseState::Fulfilled, value)),
            rejected: Box::new(move |reason| settle_quietly(&reject_target, PromiseState::Rejected, reason)),
        },
    );
}

/// Depend on the success of `promise`; failures propagate.
pub fn chain<S>(promise: &PurePromise, on_success: S) -> PurePromise
where
    S: FnOnce(Value) -> PurePromise + 'static,
{
    depend(promise, on_success, rejected)
}

/// Depend on the failure of `promise`; successes propagate.
pub fn recover<F>(promise: &PurePromise, on_failure: F) -> PurePromise
where
    F: FnOnce(Value) -> PurePromise + 'static,
{
    depend(promise, fulfilled, on_failure)
}

/// Fulfil with all values in input order; reject with the first failure.
/// An empty input fulfils with an empty array.
pub fn wait_all(promises: &[PurePromise]) -> PurePromise {
    let result = create_promise();
    if promises.is_empty() {
        settle_quietly(&result, PromiseState::Fulfilled, Value::array(Vec::new()));
        return result;
    }
    let values = Rc::new(RefCell::new(vec![Value::Undefined; promises.len()]));
    let pending = Rc::new(Cell::new(promises.len()));
    let resolved = Rc::new(Cell::new(false));

    for (index, promise) in promises.iter().enumerate() {
        let (values, pending, on_success_flag, on_success_result) = (values.clone(), pending.clone(), resolved.clone(), result.clone());
        let (on_failure_flag, on_failure_result) = (resolved.clone(), result.clone());
        depend(
            promise,
            move |value| {
                if !on_success_flag.get() {
                    values.borrow_mut()[index] = value;
                    pending.set(pending.get() - 1);
                    if pending.get() == 0 {
                        on_success_flag.set(true);
                        let values = std::mem::take(&mut *values.borrow_mut());
                        settle_quietly(&on_success_result, PromiseState::Fulfilled, Value::array(values));
                    }
                }
                create_promise()
            },
            move |reason| {
                if !on_failure_flag.replace(true) {
                    settle_quietly(&on_failure_result, PromiseState::Rejected, reason);
                }
                create_promise()
            },
        );
    }
    result
}

/// The first of two promises to settle decides the result.
pub fn race(left: &PurePromise, right: &PurePromise) -> PurePromise {
    race_all(&[left.clone(), right.clone()])
}

/// The first promise to settle decides the result. An empty input never
/// settles.
pub fn race_all(promises: &[PurePromise]) -> PurePromise {
    let result = create_promise();
    for promise in promises {
        let (on_success_result, on_failure_result) = (result.clone(), result.clone());
        depend(
            promise,
            move |value| {
                if on_success_result.is_pending() {
                    settle_quietly(&on_success_result, PromiseState::Fulfilled, value);
                }
                create_promise()
            },
            move |reason| {
                if on_failure_result.is_pending() {
                    settle_quietly(&on_failure_result, PromiseState::Rejected, reason);
                }
                create_promise()
            },
        );
    }
    result
}

/// First success of two promises; rejects with `[left, right]` reasons
/// when both fail.
pub fn attempt(left: &PurePromise, right: &PurePromise) -> PurePromise {
    attempt_all(&[left.clone(), right.clone()])
}

/// First success among `promises`; rejects with every reason, in input
/// order, once all have failed. An empty input rejects with an empty array.
pub fn attempt_all(promises: &[PurePromise]) -> PurePromise {
    let result = create_promise();
    if promises.is_empty() {
        settle_quietly(&result, PromiseState::Rejected, Value::array(Vec::new()));
        return result;
    }
    let errors = Rc::new(RefCell::new(vec![Value::Undefined; promises.len()]));
    let failed = Rc::new(Cell::new(0usize));
    let total = promises.len();

    for (index, promise) in promises.iter().enumerate() {
        let on_success_result = result.clone();
        let (errors, failed, on_failure_result) = (errors.clone(), failed.clone(), result.clone());
        depend(
            promise,
            move |value| {
                if on_success_result.is_pending() {
                    settle_quietly(&on_success_result, PromiseState::Fulfilled, value);
                }
                create_promise()
            },
            move |reason| {
                if on_failure_result.is_pending() {
                    errors.borrow_mut()[index] = reason;
                    failed.set(failed.get() + 1);
                    if failed.get() == total {
                        let reasons = std::mem::take(&mut *errors.borrow_mut());
                        settle_quietly(&on_failure_result, PromiseState::Rejected, Value::array(reasons));
                    }
                }
                create_promise()
            },
        );
    }
    result
}

// Callers own `promise` or have just checked it is pending.
fn settle_quietly(promise: &PurePromise, state: PromiseState, value: Value) {
    if let Err(err) = settle(promise, state, value) {
        log::error!("pure promise invariant broken: {err}");
    }
}

//! The resolution procedure: settle a promise with a value that may itself
//! be a promise or a foreign thenable.
//!
//! A value is classified once per call into an [`Outcome`]. Only thenable
//! candidates are inspected for a `then` member, and a callable one is
//! adopted through a `ResolveThenable` job rather than by recursing here,
//! so nested thenables unwind through the scheduler instead of the stack.

use crate::core::{Function, Value, get_property};
use crate::error::PromiseError;
use crate::job_queue::{Job, JobKind};
use crate::js_promise::Promise;

#[derive(Debug)]
pub(crate) enum Outcome {
    /// The promise is being resolved with itself.
    SelfReference,
    /// A value with no `then` member to look at.
    Scalar(Value),
    /// A reference value that might expose a callable `then`.
    ThenableCandidate(Value),
}

impl Outcome {
    pub(crate) fn classify(promise: &Promise, value: Value) -> Outcome {
        match value {
            Value::Promise(ref other) if other.ptr_eq(promise) => Outcome::SelfReference,
            Value::Promise(_) | Value::Object(_) => Outcome::ThenableCandidate(value),
            scalar => Outcome::Scalar(scalar),
        }
    }
}

enum ThenMethod {
    Native(Promise),
    Foreign(Function),
}

/// Look up a callable `then`. Reading the member may run a getter, which
/// may fail.
fn inspect_then(candidate: &Value) -> Result<Option<ThenMethod>, PromiseError> {
    match candidate {
        Value::Promise(p) => Ok(Some(ThenMethod::Native(p.clone()))),
        Value::Object(obj) => match get_property(obj, "then")? {
            Value::Function(then) => Ok(Some(ThenMethod::Foreign(then))),
            _ => Ok(None),
        },
        _ => Ok(None),
    }
}

/// Resolve `promise` with `resolution`. A no-op once the promise has
/// settled.
pub(crate) fn resolve_promise(promise: &Promise, resolution: Value) {
    if !promise.is_pending() {
        log::trace!("resolve_promise: #{} already settled", promise.id());
        return;
    }

    match Outcome::classify(promise, resolution) {
        Outcome::SelfReference => {
            let err = PromiseError::ChainingCycle { id: promise.id() };
            log::debug!("resolve_promise: {err}");
            promise.reject_with(err.into_reason());
        }
        Outcome::Scalar(value) => promise.fulfil_with(value),
        Outcome::ThenableCandidate(candidate) => match inspect_then(&candidate) {
            Err(err) => {
                log::debug!("resolve_promise: reading `then` on #{} failed: {err}", promise.id());
                promise.reject_with(err.into_reason());
            }
            Ok(None) => promise.fulfil_with(candidate),
            Ok(Some(method)) => {
                let target = promise.clone();
                log::trace!("resolve_promise: #{} adopting a thenable", promise.id());
                promise
                    .scheduler()
                    .enqueue(Job::new(JobKind::ResolveThenable, move || resolve_thenable_job(target, method)));
            }
        },
    }
}

fn resolve_thenable_job(promise: Promise, method: ThenMethod) {
    let (resolve, reject) = promise.resolving_functions();
    match method {
        ThenMethod::Native(source) => {
            source.then(Some(resolve), Some(reject));
        }
        ThenMethod::Foreign(then) => {
            if let Err(err) = then.call(&[Value::Function(resolve), Value::Function(reject)]) {
                log::debug!("resolve_thenable_job: `then` of #{} threw: {err}", promise.id());
                promise.reject_with(err.into_reason());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{JSObject, new_object};
    use crate::job_queue::EventLoop;
    use crate::js_promise::PromiseState;

    #[test]
    fn classify_distinguishes_self_scalars_and_candidates() {
        let event_loop = EventLoop::new();
        let scheduler = event_loop.scheduler();
        let promise = Promise::pending(&scheduler);
        let other = Promise::pending(&scheduler);
        assert!(matches!(Outcome::classify(&promise, Value::Promise(promise.clone())), Outcome::SelfReference));
        assert!(matches!(Outcome::classify(&promise, Value::Promise(other)), Outcome::ThenableCandidate(_)));
        assert!(matches!(Outcome::classify(&promise, Value::from(3)), Outcome::Scalar(_)));
        assert!(matches!(
            Outcome::classify(&promise, Value::Object(JSObject::new().into_ptr())),
            Outcome::ThenableCandidate(_)
        ));
    }

    #[test]
    fn plain_object_fulfils_synchronously() {
        let event_loop = EventLoop::new();
        let scheduler = event_loop.scheduler();
        let promise = Promise::pending(&scheduler);
        let record = Value::Object(new_object([("then", 5)]));
        resolve_promise(&promise, record.clone());
        assert_eq!(promise.state(), PromiseState::Fulfilled);
        assert!(promise.value().unwrap().same_value(&record));
    }

    #[test]
    fn thenable_adoption_waits_for_a_job() {
        let event_loop = EventLoop::new();
        let scheduler = event_loop.scheduler();
        let promise = Promise::pending(&scheduler);
        let source = Promise::resolve(&scheduler, 7);
        resolve_promise(&promise, Value::Promise(source));
        assert!(promise.is_pending());
        assert_eq!(event_loop.pending_jobs(), 1);
        event_loop.run().unwrap();
        assert_eq!(promise.value(), Some(Value::from(7)));
    }
}

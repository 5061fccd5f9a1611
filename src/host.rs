//! Host-side helpers built on the event loop's timers.

use crate::core::Value;
use crate::error::PromiseError;
use crate::job_queue::{EventLoop, SchedulerRef};
use crate::js_promise::Promise;
use std::time::Duration;

/// A promise fulfilled with `Undefined` once `delay` has elapsed.
pub fn delay(event_loop: &EventLoop, delay: Duration) -> Promise {
    delayed(event_loop, delay, Value::Undefined)
}

/// A promise fulfilled with `value` once `delay` has elapsed.
pub fn delayed(event_loop: &EventLoop, delay: Duration, value: impl Into<Value>) -> Promise {
    let value = value.into();
    Promise::new(&event_loop.scheduler(), |resolve, _reject| {
        event_loop.set_timeout(delay, move || {
            if let Err(err) = resolve.call1(value) {
                log::error!("delayed: resolving failed: {err}");
            }
        })?;
        Ok(())
    })
}

/// A promise rejected with `reason` once `delay` has elapsed.
pub fn delayed_reject(event_loop: &EventLoop, delay: Duration, reason: impl Into<Value>) -> Promise {
    let reason = reason.into();
    Promise::new(&event_loop.scheduler(), |_resolve, reject| {
        event_loop.set_timeout(delay, move || {
            if let Err(err) = reject.call1(reason) {
                log::error!("delayed_reject: rejecting failed: {err}");
            }
        })?;
        Ok(())
    })
}

/// Run `f` for every item without waiting on the results. Each result is
/// coerced to a promise; rejections are logged, never propagated.
pub fn do_each<I, F>(scheduler: &SchedulerRef, items: I, mut f: F) -> Vec<Promise>
where
    I: IntoIterator,
    I::Item: Into<Value>,
    F: FnMut(Value) -> Result<Value, PromiseError>,
{
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let promise = match f(item.into()) {
                Ok(Value::Promise(promise)) => promise,
                Ok(value) => Promise::resolve(scheduler, value),
                Err(err) => Promise::reject(scheduler, err.into_reason()),
            };
            promise.catch_with(move |reason| {
                log::error!("do_each: item {index} failed: {reason}");
                Ok(Value::Undefined)
            });
            promise
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::js_promise::PromiseState;

    #[test]
    fn delay_settles_only_after_the_timer() {
        let event_loop = EventLoop::new();
        let promise = delayed(&event_loop, Duration::from_millis(5), "done");
        event_loop.run_until_idle().unwrap();
        assert!(promise.is_pending());
        assert_eq!(event_loop.pending_timers(), 1);
        event_loop.run().unwrap();
        assert_eq!(promise.value(), Some(Value::from("done")));
    }

    #[test]
    fn unrepresentable_delay_rejects() {
        let event_loop = EventLoop::new();
        let promise = delay(&event_loop, Duration::from_millis(u64::MAX));
        assert_eq!(promise.state(), PromiseState::Rejected);
        assert_eq!(promise.value().and_then(|v| v.as_error().map(|e| e.name().to_string())), Some("Error".to_string()));
    }

    #[test]
    fn do_each_coerces_results() {
        let event_loop = EventLoop::new();
        let scheduler = event_loop.scheduler();
        let promises = do_each(&scheduler, [1, 2, 3], |item| match item.as_number() {
            Some(n) if n == 2.0 => Err(PromiseError::throw("two")),
            _ => Ok(item),
        });
        event_loop.run().unwrap();
        let states: Vec<_> = promises.iter().map(Promise::state).collect();
        assert_eq!(states, [PromiseState::Fulfilled, PromiseState::Rejected, PromiseState::Fulfilled]);
    }
}

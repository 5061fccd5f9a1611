use promises::*;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

// Initialize logger for this integration test binary so `RUST_LOG` is honored.
// Using `ctor` ensures initialization runs before tests start.
#[ctor::ctor]
fn __init_test_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default()).is_test(true).try_init();
}

#[cfg(test)]
mod host_tests {
    use super::*;

    #[test]
    fn test_delay_waits_at_least_the_duration() {
        let event_loop = EventLoop::new();
        let started = Instant::now();
        let promise = delay(&event_loop, Duration::from_millis(20));
        event_loop.run().unwrap();
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert_eq!(promise.state(), PromiseState::Fulfilled);
        assert_eq!(promise.value(), Some(Value::Undefined));
    }

    #[test]
    fn test_timers_fire_in_deadline_order() {
        let event_loop = EventLoop::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for (label, ms) in [("slow", 40u64), ("fast", 5), ("medium", 20)] {
            let log = log.clone();
            delayed(&event_loop, Duration::from_millis(ms), label).then_with(move |v| {
                log.borrow_mut().push(v.to_string());
                Ok(Value::Undefined)
            });
        }
        event_loop.run().unwrap();
        assert_eq!(*log.borrow(), ["fast", "medium", "slow"]);
    }

    #[test]
    fn test_delayed_reject_rejects() {
        let event_loop = EventLoop::new();
        let promise = delayed_reject(&event_loop, Duration::from_millis(5), ErrorObject::new("Error", "image missing"));
        event_loop.run().unwrap();
        assert_eq!(promise.state(), PromiseState::Rejected);
        assert_eq!(value_to_string(&promise.value().unwrap()), "Error: image missing");
    }

    #[test]
    fn test_cleared_timer_never_fires() {
        let event_loop = EventLoop::new();
        let fired = Rc::new(RefCell::new(false));
        let flag = fired.clone();
        let id = event_loop
            .set_timeout(Duration::from_millis(10), move || *flag.borrow_mut() = true)
            .unwrap();
        assert!(event_loop.clear_timeout(id).unwrap());
        assert!(!event_loop.clear_timeout(id).unwrap());
        event_loop.run().unwrap();
        assert!(!*fired.borrow());
        assert_eq!(event_loop.pending_timers(), 0);
    }

    #[test]
    fn test_run_until_idle_does_not_block_on_timers() {
        let event_loop = EventLoop::new();
        let promise = delayed(&event_loop, Duration::from_secs(30), "never awaited");
        let started = Instant::now();
        event_loop.run_until_idle().unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(promise.is_pending());
        assert!(matches!(event_loop.poll(), PollResult::Wait(_)));
    }

    #[test]
    fn test_run_without_waiting_for_timers() {
        let event_loop = EventLoop::with_config(LoopConfig {
            task_budget: None,
            wait_for_timers: false,
        });
        let promise = delayed(&event_loop, Duration::from_secs(30), "never awaited");
        event_loop.run().unwrap();
        assert!(promise.is_pending());
        assert_eq!(event_loop.pending_timers(), 1);
    }

    #[test]
    fn test_do_each_is_fire_and_forget() {
        let event_loop = EventLoop::new();
        let scheduler = event_loop.scheduler();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let loop_handle = event_loop.clone();
        let loads = do_each(&scheduler, ["a.png", "missing.png", "c.png"], move |src| {
            sink.borrow_mut().push(src.to_string());
            if src.as_str() == Some("missing.png") {
                return Ok(Value::Promise(delayed_reject(&loop_handle, Duration::from_millis(5), "not found")));
            }
            Ok(Value::Promise(delayed(&loop_handle, Duration::from_millis(5), src)))
        });
        assert_eq!(*seen.borrow(), ["a.png", "missing.png", "c.png"]);
        event_loop.run().unwrap();
        let states: Vec<PromiseState> = loads.iter().map(Promise::state).collect();
        assert_eq!(states, [PromiseState::Fulfilled, PromiseState::Rejected, PromiseState::Fulfilled]);
    }

    #[test]
    fn test_custom_scheduler_drives_promises() {
        struct Manual {
            jobs: RefCell<Vec<Job>>,
        }
        impl Scheduler for Manual {
            fn enqueue(&self, job: Job) {
                self.jobs.borrow_mut().push(job);
            }
        }

        let manual = Rc::new(Manual { jobs: RefCell::new(Vec::new()) });
        let scheduler: SchedulerRef = manual.clone();
        let derived = Promise::resolve(&scheduler, 20).then_with(|v| Ok(Value::from(v.as_number().unwrap() + 1.0)));
        assert!(derived.is_pending());
        loop {
            let jobs = std::mem::take(&mut *manual.jobs.borrow_mut());
            if jobs.is_empty() {
                break;
            }
            for job in jobs {
                assert_eq!(job.kind(), JobKind::Reaction);
                job.run();
            }
        }
        assert_eq!(derived.value(), Some(Value::from(21)));
    }
}

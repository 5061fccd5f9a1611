use promises::pure::{self, PurePromise};
use promises::*;
use std::cell::RefCell;
use std::rc::Rc;

// Initialize logger for this integration test binary so `RUST_LOG` is honored.
// Using `ctor` ensures initialization runs before tests start.
#[ctor::ctor]
fn __init_test_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default()).is_test(true).try_init();
}

const ORDERS: [[usize; 3]; 6] = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];

/// One settlement schedule: the order inputs settle in, and which of them
/// reject (bit `i` of `failures` set means input `i` rejects).
#[derive(Debug, Clone, Copy)]
struct Schedule {
    order: [usize; 3],
    failures: u8,
}

impl Schedule {
    fn all() -> impl Iterator<Item = Schedule> {
        ORDERS
            .into_iter()
            .flat_map(|order| (0..8u8).map(move |failures| Schedule { order, failures }))
    }

    fn rejects(&self, index: usize) -> bool {
        self.failures & (1 << index) != 0
    }

    fn payload(&self, index: usize) -> Value {
        if self.rejects(index) {
            Value::from(format!("e{index}"))
        } else {
            Value::from(format!("v{index}"))
        }
    }
}

#[derive(Clone, Copy)]
enum Combinator {
    All,
    Race,
    AttemptAll,
}

fn run_mutable(combinator: Combinator, schedule: Schedule) -> (PromiseState, Option<Value>) {
    let event_loop = EventLoop::new();
    let scheduler = event_loop.scheduler();
    let inputs: Vec<Deferred> = (0..3).map(|_| Promise::deferred(&scheduler)).collect();
    let promises: Vec<Promise> = inputs.iter().map(|d| d.promise.clone()).collect();
    let combined = match combinator {
        Combinator::All => Promise::all(&scheduler, promises),
        Combinator::Race => Promise::race(&scheduler, promises),
        Combinator::AttemptAll => Promise::attempt_all(&scheduler, promises),
    };
    for index in schedule.order {
        let settle = if schedule.rejects(index) { &inputs[index].reject } else { &inputs[index].resolve };
        settle.call1(schedule.payload(index)).unwrap();
        event_loop.run_until_idle().unwrap();
    }
    (combined.state(), combined.value())
}

fn run_pure(combinator: Combinator, schedule: Schedule) -> (PromiseState, Option<Value>) {
    let inputs: Vec<PurePromise> = (0..3).map(|_| pure::create_promise()).collect();
    let combined = match combinator {
        Combinator::All => pure::wait_all(&inputs),
        Combinator::Race => pure::race_all(&inputs),
        Combinator::AttemptAll => pure::attempt_all(&inputs),
    };
    for index in schedule.order {
        let settled = if schedule.rejects(index) {
            pure::reject(&inputs[index], schedule.payload(index))
        } else {
            pure::fulfil(&inputs[index], schedule.payload(index))
        };
        settled.unwrap();
    }
    (combined.state(), combined.value())
}

#[cfg(test)]
mod pure_tests {
    use super::*;

    #[test]
    fn test_both_variants_agree_on_every_schedule() {
        for combinator in [Combinator::All, Combinator::Race, Combinator::AttemptAll] {
            for schedule in Schedule::all() {
                assert_eq!(run_mutable(combinator, schedule), run_pure(combinator, schedule), "schedule {schedule:?}");
            }
        }
    }

    #[test]
    fn test_double_settlement_fails_loudly() {
        let promise = pure::create_promise();
        pure::reject(&promise, Value::from("first")).unwrap();
        let err = pure::fulfil(&promise, Value::from("second")).unwrap_err();
        assert_eq!(
            err,
            PromiseError::AlreadySettled {
                action: "fulfil",
                state: "rejected"
            }
        );
        assert_eq!(promise.value(), Some(Value::from("first")));
    }

    #[test]
    fn test_dependencies_run_synchronously_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let promise = pure::create_promise();
        for tag in ["first", "second", "third"] {
            let log = log.clone();
            pure::chain(&promise, move |value| {
                log.borrow_mut().push(format!("{tag}:{value}"));
                pure::fulfilled(value)
            });
        }
        pure::fulfil(&promise, Value::from(1)).unwrap();
        assert_eq!(*log.borrow(), ["first:1", "second:1", "third:1"]);
    }

    #[test]
    fn test_depend_on_settled_promise_runs_immediately() {
        let promise = pure::fulfilled(Value::from(2));
        let doubled = pure::chain(&promise, |value| pure::fulfilled(Value::from(value.as_number().unwrap_or_default() * 2.0)));
        assert_eq!(doubled.value(), Some(Value::from(4)));
    }

    #[test]
    fn test_chain_propagates_failure() {
        let promise = pure::create_promise();
        let chained = pure::chain(&promise, |_| pure::fulfilled(Value::from("unreachable")));
        pure::reject(&promise, Value::from("broken")).unwrap();
        assert_eq!(chained.state(), PromiseState::Rejected);
        assert_eq!(chained.value(), Some(Value::from("broken")));
    }

    #[test]
    fn test_recover_turns_failure_into_success() {
        let promise = pure::create_promise();
        let recovered = pure::recover(&promise, |reason| pure::fulfilled(Value::from(format!("recovered from {reason}"))));
        let untouched = pure::recover(&pure::fulfilled(Value::from("ok")), |_| pure::rejected(Value::from("unreachable")));
        pure::reject(&promise, Value::from("oops")).unwrap();
        assert_eq!(recovered.value(), Some(Value::from("recovered from oops")));
        assert_eq!(untouched.value(), Some(Value::from("ok")));
    }

    #[test]
    fn test_handler_returning_pending_promise_waits() {
        let source = pure::create_promise();
        let later = pure::create_promise();
        let handle = later.clone();
        let result = pure::depend(&source, move |_| handle, pure::rejected);
        pure::fulfil(&source, Value::Undefined).unwrap();
        assert!(result.is_pending());
        pure::reject(&later, Value::from("late failure")).unwrap();
        assert_eq!(result.state(), PromiseState::Rejected);
        assert_eq!(result.value(), Some(Value::from("late failure")));
    }

    #[test]
    fn test_race_between_two() {
        let (left, right) = (pure::create_promise(), pure::create_promise());
        let race = pure::race(&left, &right);
        pure::fulfil(&right, Value::from("right")).unwrap();
        pure::reject(&left, Value::from("left")).unwrap();
        assert_eq!(race.value(), Some(Value::from("right")));
    }

    #[test]
    fn test_attempt_rejects_with_both_reasons() {
        let (left, right) = (pure::create_promise(), pure::create_promise());
        let attempt = pure::attempt(&left, &right);
        pure::reject(&right, Value::from("r")).unwrap();
        pure::reject(&left, Value::from("l")).unwrap();
        assert_eq!(attempt.state(), PromiseState::Rejected);
        assert_eq!(attempt.value(), Some(Value::from(vec![Value::from("l"), Value::from("r")])));
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(pure::wait_all(&[]).value(), Some(Value::array(Vec::new())));
        assert!(pure::race_all(&[]).is_pending());
        let attempt = pure::attempt_all(&[]);
        assert_eq!(attempt.state(), PromiseState::Rejected);
        assert_eq!(attempt.value(), Some(Value::array(Vec::new())));
    }
}

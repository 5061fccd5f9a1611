pub(crate) mod combinators;
pub(crate) mod core;
pub(crate) mod error;
pub(crate) mod host;
pub(crate) mod job_queue;
pub(crate) mod js_promise;
pub mod pure;
pub(crate) mod resolution;
pub(crate) mod timer_thread;

pub use crate::core::{ErrorObject, Function, JSObject, JSObjectPtr, Property, Value, first_arg, get_property, new_object, value_to_string};
pub use error::PromiseError;
pub use host::{delay, delayed, delayed_reject, do_each};
pub use job_queue::{EventLoop, Job, JobKind, LoopConfig, PollResult, Scheduler, SchedulerRef};
pub use js_promise::{Deferred, Promise, PromiseState};

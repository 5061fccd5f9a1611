//! # Reaction scheduling
//!
//! The engine needs exactly one thing from its host: a way to run a nullary
//! callback in a later turn, FIFO per caller. That is the [`Scheduler`]
//! trait. [`EventLoop`] is the bundled host: a FIFO job queue plus timers
//! backed by a background timer thread. Timer callbacks never leave the loop
//! thread; only timer ids cross the channel.

use crate::error::PromiseError;
use crate::timer_thread::TimerThread;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

pub trait Scheduler {
    /// Queue `job` to run after the current turn completes.
    fn enqueue(&self, job: Job);
}

pub type SchedulerRef = Rc<dyn Scheduler>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Runs one reaction of a settled promise.
    Reaction,
    /// Calls a thenable's `then` to adopt its state.
    ResolveThenable,
    /// A timer callback whose deadline has passed.
    Timeout(usize),
    /// Anything else the host queued.
    Host,
}

pub struct Job {
    kind: JobKind,
    run: Box<dyn FnOnce()>,
}

impl Job {
    pub fn new(kind: JobKind, run: impl FnOnce() + 'static) -> Self {
        Job { kind, run: Box::new(run) }
    }

    pub fn host(run: impl FnOnce() + 'static) -> Self {
        Job::new(JobKind::Host, run)
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn run(self) {
        (self.run)()
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Job({:?})", self.kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PollResult {
    /// A job was executed.
    Executed,
    /// No jobs are ready, but a timer is pending; it is due after the
    /// given duration.
    Wait(Duration),
    /// The queue is empty and there are no pending timers.
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopConfig {
    /// Maximum number of jobs a single `run` may execute. `None` means
    /// unbounded. A thenable that keeps yielding itself never settles; the
    /// budget lets a host notice that instead of spinning forever.
    pub task_budget: Option<usize>,
    /// Whether `run` blocks while timers are pending.
    pub wait_for_timers: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        LoopConfig {
            task_budget: None,
            wait_for_timers: true,
        }
    }
}

struct PendingTimer {
    when: Instant,
    callback: Job,
}

struct LoopState {
    config: LoopConfig,
    queue: RefCell<VecDeque<(usize, Job)>>,
    next_job_id: Cell<usize>,
    next_timer_id: Cell<usize>,
    timers: RefCell<HashMap<usize, PendingTimer>>,
    timer_thread: RefCell<Option<TimerThread>>,
}

impl Scheduler for LoopState {
    fn enqueue(&self, job: Job) {
        let id = self.next_job_id.get();
        self.next_job_id.set(id + 1);
        let mut queue = self.queue.borrow_mut();
        queue.push_back((id, job));
        log::debug!("enqueue: id={id} kind={:?} queue_len={}", queue.back().map(|(_, j)| j.kind()), queue.len());
    }
}

/// Single-threaded host event loop. Cloning yields another handle to the
/// same loop.
#[derive(Clone)]
pub struct EventLoop {
    state: Rc<LoopState>,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop {
    pub fn new() -> Self {
        Self::with_config(LoopConfig::default())
    }

    pub fn with_config(config: LoopConfig) -> Self {
        EventLoop {
            state: Rc::new(LoopState {
                config,
                queue: RefCell::new(VecDeque::new()),
                next_job_id: Cell::new(1),
                next_timer_id: Cell::new(1),
                timers: RefCell::new(HashMap::new()),
                timer_thread: RefCell::new(None),
            }),
        }
    }

    /// The scheduler handle promises are created with.
    pub fn scheduler(&self) -> SchedulerRef {
        self.state.clone()
    }

    pub fn enqueue(&self, job: Job) {
        self.state.enqueue(job);
    }

    pub fn pending_jobs(&self) -> usize {
        self.state.queue.borrow().len()
    }

    pub fn pending_timers(&self) -> usize {
        self.state.timers.borrow().len()
    }

    /// Run `callback` once `delay` has elapsed. Returns the timer id.
    pub fn set_timeout(&self, delay: Duration, callback: impl FnOnce() + 'static) -> Result<usize, PromiseError> {
        let id = self.state.next_timer_id.get();
        self.state.next_timer_id.set(id + 1);
        let when = Instant::now().checked_add(delay).ok_or(PromiseError::DelayOutOfRange { delay })?;

        {
            let mut thread = self.state.timer_thread.borrow_mut();
            if thread.is_none() {
                log::debug!("set_timeout: spawning timer thread");
                *thread = Some(TimerThread::spawn()?);
            }
            if let Some(timers) = thread.as_ref() {
                timers.schedule(id, when)?;
            }
        }

        self.state.timers.borrow_mut().insert(
            id,
            PendingTimer {
                when,
                callback: Job::new(JobKind::Timeout(id), callback),
            },
        );
        log::debug!("set_timeout: id={id} delay={delay:?}");
        Ok(id)
    }

    /// Cancel a pending timer. Returns whether the timer was still pending.
    pub fn clear_timeout(&self, id: usize) -> Result<bool, PromiseError> {
        let removed = self.state.timers.borrow_mut().remove(&id).is_some();
        if removed && let Some(timers) = self.state.timer_thread.borrow().as_ref() {
            timers.cancel(id)?;
        }
        Ok(removed)
    }

    /// Execute at most one ready job.
    pub fn poll(&self) -> PollResult {
        self.drain_expired_timers();

        let next = self.state.queue.borrow_mut().pop_front();
        if let Some((id, job)) = next {
            log::debug!("poll: executing job id={id} kind={:?}", job.kind());
            job.run();
            return PollResult::Executed;
        }

        let now = Instant::now();
        match self.state.timers.borrow().values().map(|t| t.when).min() {
            Some(when) => PollResult::Wait(when.saturating_duration_since(now)),
            None => PollResult::Empty,
        }
    }

    /// Run jobs until the queue is empty. With `wait_for_timers` set this
    /// also blocks for pending timers and runs their callbacks. Returns the
    /// number of executed jobs.
    pub fn run(&self) -> Result<usize, PromiseError> {
        self.run_inner(self.state.config.wait_for_timers)
    }

    /// Run ready jobs only; never blocks on timers.
    pub fn run_until_idle(&self) -> Result<usize, PromiseError> {
        self.run_inner(false)
    }

    fn run_inner(&self, wait_for_timers: bool) -> Result<usize, PromiseError> {
        let mut executed = 0usize;
        loop {
            match self.poll() {
                PollResult::Executed => {
                    executed += 1;
                    if let Some(budget) = self.state.config.task_budget
                        && executed > budget
                    {
                        log::warn!("run: task budget of {budget} exceeded");
                        return Err(PromiseError::TaskBudgetExceeded { executed });
                    }
                }
                PollResult::Wait(timeout) if wait_for_timers => self.wait_for_timer(timeout)?,
                PollResult::Wait(_) | PollResult::Empty => {
                    log::trace!("run: idle after {executed} jobs");
                    return Ok(executed);
                }
            }
        }
    }

    fn wait_for_timer(&self, timeout: Duration) -> Result<(), PromiseError> {
        let thread = self.state.timer_thread.borrow();
        let Some(timers) = thread.as_ref() else {
            return Err(PromiseError::TimerThread {
                message: "timers pending without a timer thread".to_string(),
            });
        };
        // allow the timer thread a little slack past the deadline
        let received = timers.expired().recv_timeout(timeout + Duration::from_millis(50));
        drop(thread);
        match received {
            Ok(id) => {
                self.accept_expired(id);
                Ok(())
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => Ok(()),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => Err(PromiseError::TimerThread {
                message: "timer thread exited".to_string(),
            }),
        }
    }

    fn drain_expired_timers(&self) {
        let expired: Vec<usize> = match self.state.timer_thread.borrow().as_ref() {
            Some(timers) => timers.expired().try_iter().collect(),
            None => return,
        };
        for id in expired {
            self.accept_expired(id);
        }
    }

    fn accept_expired(&self, id: usize) {
        let timer = self.state.timers.borrow_mut().remove(&id);
        match timer {
            Some(timer) => self.state.enqueue(timer.callback),
            None => log::trace!("timer {id} expired after being cleared"),
        }
    }
}

use crate::error::PromiseError;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::thread;
use std::time::Instant;

#[derive(Debug)]
pub enum TimerCommand {
    Schedule { id: usize, when: Instant },
    Cancel(usize),
}

/// Handle owned by the event loop. Dropping it closes the command channel,
/// which stops the thread.
pub struct TimerThread {
    cmd_tx: Sender<TimerCommand>,
    expired_rx: Receiver<usize>,
}

impl TimerThread {
    pub fn spawn() -> Result<Self, PromiseError> {
        let (cmd_tx, cmd_rx) = unbounded::<TimerCommand>();
        let (expired_tx, expired_rx) = unbounded::<usize>();

        thread::Builder::new()
            .name("promise-timer-thread".to_string())
            .spawn(move || timer_loop(cmd_rx, expired_tx))
            .map_err(|e| PromiseError::TimerThread { message: e.to_string() })?;

        Ok(TimerThread { cmd_tx, expired_rx })
    }

    pub fn schedule(&self, id: usize, when: Instant) -> Result<(), PromiseError> {
        self.send(TimerCommand::Schedule { id, when })
    }

    pub fn cancel(&self, id: usize) -> Result<(), PromiseError> {
        self.send(TimerCommand::Cancel(id))
    }

    pub fn expired(&self) -> &Receiver<usize> {
        &self.expired_rx
    }

    fn send(&self, cmd: TimerCommand) -> Result<(), PromiseError> {
        self.cmd_tx.send(cmd).map_err(|e| PromiseError::TimerThread { message: e.to_string() })
    }
}

fn timer_loop(cmd_rx: Receiver<TimerCommand>, expired_tx: Sender<usize>) {
    // min-heap of (deadline, id); ties fire in id (scheduling) order
    let mut heap: DeadlineHeap = BinaryHeap::new();
    let mut canceled: HashSet<usize> = HashSet::new();

    loop {
        let now = Instant::now();
        while let Some(Reverse((when, id))) = heap.peek().copied() {
            if when > now {
                break;
            }
            heap.pop();
            if canceled.remove(&id) {
                continue;
            }
            if let Err(e) = expired_tx.send(id) {
                log::warn!("timer thread: failed to report expired timer {id}: {e:?}");
                return;
            }
        }

        let cmd = match heap.peek() {
            Some(Reverse((when, _))) => match cmd_rx.recv_timeout(when.saturating_duration_since(Instant::now())) {
                Ok(cmd) => cmd,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match cmd_rx.recv() {
                Ok(cmd) => cmd,
                Err(_) => break,
            },
        };

        apply_command(cmd, &mut heap, &mut canceled);
    }
    log::trace!("timer thread: command channel closed, exiting");
}

type DeadlineHeap = BinaryHeap<Reverse<(Instant, usize)>>;

fn apply_command(cmd: TimerCommand, heap: &mut DeadlineHeap, canceled: &mut HashSet<usize>) {
    match cmd {
        TimerCommand::Schedule { id, when } => heap.push(Reverse((when, id))),
        // an id no longer on the heap has already been reported as expired
        TimerCommand::Cancel(id) if heap.iter().any(|Reverse((_, pending))| *pending == id) => {
            canceled.insert(id);
        }
        TimerCommand::Cancel(id) => log::trace!("timer thread: cancel of expired timer {id} ignored"),
    }
}

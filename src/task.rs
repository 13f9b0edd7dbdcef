//! The host deferred-callback facility.
//!
//! Futures never run "later" on their own: when a payload, a promise reaction
//! or a combinator step needs to run after the current turn, it is handed to a
//! [Scheduler](crate::scheduler::Scheduler). The default scheduler is the
//! per-thread [Executor] defined here. Pledge uses a per-thread model which
//! means that:
//!
//! 1. The thread upon which a callback is deferred is the same thread that
//!    will execute it.
//! 2. Each thread needs to call [Executor::run] for deferred work to happen.
//!
//! # Example
//!
//! ```
//! use pledge::task::Executor;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use std::time::Duration;
//!
//! let log = Rc::new(RefCell::new(Vec::new()));
//! {
//!     let log = log.clone();
//!     Executor::defer_after(Duration::from_millis(20), Box::new(move || log.borrow_mut().push("timer")));
//! }
//! {
//!     let log = log.clone();
//!     Executor::defer(Box::new(move || log.borrow_mut().push("turn")));
//! }
//! Executor::run();
//! assert_eq!(*log.borrow(), vec!["turn", "timer"]);
//! ```
//!
//! # Threading Model
//!
//! Since each thread has it's own queue, callbacks deferred on one thread are
//! never observed by another. This allows `!Send` state such as `Rc` and
//! `RefCell` to be captured freely, and is why none of the future types in
//! this crate need locks.
use std::{
    cell::RefCell,
    collections::VecDeque,
    time::{Duration, Instant},
};

use log::trace;

use crate::{scheduler::Scheduler, timer::TimerQueue};

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce()>;

struct Runtime {
    run_q: VecDeque<Task>,
    timers: TimerQueue<Instant>,
    next_id: u64,
}

thread_local! {
    static EXEC: RefCell<Runtime> = const { RefCell::new(
        Runtime {
            run_q: VecDeque::new(),
            timers: TimerQueue::new(),
            next_id: 0,
        }
    )}
}

/// The per-thread executor.
///
/// A handle to this thread's run queue and timers. It is zero sized; every
/// instance refers to the same per-thread state, which is why it also serves
/// as the default [Scheduler].
#[derive(Debug, Clone, Copy, Default)]
pub struct Executor;

impl Executor {
    /// Queue `task` to run after the current synchronous turn. Tasks run in
    /// the order they were deferred.
    pub fn defer(task: Task) {
        EXEC.with(|exec| exec.borrow_mut().run_q.push_back(task));
    }

    /// Queue `task` to run once `delay` has elapsed. It is guaranteed that the
    /// task will wait for *at least* the specified duration; it could wait for
    /// longer.
    pub fn defer_after(delay: Duration, task: Task) {
        let deadline = Instant::now() + delay;
        EXEC.with(|exec| exec.borrow_mut().timers.insert(deadline, task));
    }

    /// Whether there is any work left on this thread.
    pub fn is_idle() -> bool {
        EXEC.with(|exec| {
            let exec = exec.borrow();
            exec.run_q.is_empty() && exec.timers.is_empty()
        })
    }

    /// Run the executor for this thread.
    ///
    /// Runs every deferred task, sleeping whenever only timers are left, and
    /// returns once there is nothing left to do. Tasks deferred while running
    /// are picked up by the same call.
    pub fn run() {
        Self::executor_loop()
    }

    fn next_task() -> Result<Task, Option<Instant>> {
        EXEC.with(|exec| {
            let mut exec = exec.borrow_mut();

            if let Some(task) = exec.timers.pop_expired(Instant::now()) {
                return Ok(task);
            }

            match exec.run_q.pop_front() {
                Some(task) => Ok(task),
                None => Err(exec.timers.next_deadline()),
            }
        })
    }

    fn executor_loop() {
        loop {
            match Self::next_task() {
                Ok(task) => task(),
                Err(Some(deadline)) => {
                    let now = Instant::now();
                    if deadline > now {
                        trace!("executor idle, sleeping {:?}", deadline - now);
                        std::thread::sleep(deadline - now);
                    }
                }
                Err(None) => return,
            }
        }
    }
}

impl Scheduler for Executor {
    fn defer(&self, task: Task) {
        Executor::defer(task)
    }

    fn defer_after(&self, delay: Duration, task: Task) {
        Executor::defer_after(delay, task)
    }

    fn next_id(&self) -> u64 {
        EXEC.with(|exec| {
            let mut exec = exec.borrow_mut();
            exec.next_id += 1;
            exec.next_id
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::RefCell,
        rc::Rc,
        time::{Duration, Instant},
    };

    use super::Executor;

    #[test]
    fn defer_runs_fifo() {
        let log = Rc::new(RefCell::new(Vec::new()));

        for i in 0..3 {
            let log = log.clone();
            Executor::defer(Box::new(move || log.borrow_mut().push(i)));
        }

        assert!(!Executor::is_idle());
        Executor::run();
        assert!(Executor::is_idle());
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn tasks_can_defer_tasks() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let log2 = log.clone();

        Executor::defer(Box::new(move || {
            log2.borrow_mut().push("outer");
            let log3 = log2.clone();
            Executor::defer(Box::new(move || log3.borrow_mut().push("inner")));
        }));

        Executor::run();
        assert_eq!(*log.borrow(), vec!["outer", "inner"]);
    }

    #[test]
    fn timers_sleep() {
        let before = Instant::now();
        let log = Rc::new(RefCell::new(Vec::new()));

        for (ms, name) in [(110, "c"), (100, "a"), (104, "b")] {
            let log = log.clone();
            Executor::defer_after(
                Duration::from_millis(ms),
                Box::new(move || log.borrow_mut().push(name)),
            );
        }

        Executor::run();
        assert!(Instant::now() - before >= Duration::from_millis(110));
        assert!(Instant::now() - before < Duration::from_millis(1000));
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    }
}

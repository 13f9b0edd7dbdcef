//! Pluggable "run later" capability.
//!
//! Every future in this crate delegates deferred work to a [Scheduler]. The
//! default is the per-thread [Executor](crate::task::Executor); tests inject a
//! [ManualScheduler] so the exact interleaving of payloads, listeners and
//! timers can be driven step by step.
use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    fmt,
    rc::Rc,
    time::Duration,
};

use crate::{task::Task, timer::TimerQueue};

/// Something that can run a callback after the current synchronous turn.
pub trait Scheduler {
    /// Run `task` after the current turn, in FIFO order with other deferred
    /// tasks.
    fn defer(&self, task: Task);

    /// Run `task` once `delay` has elapsed on this scheduler's clock.
    fn defer_after(&self, delay: Duration, task: Task);

    /// Hand out an identifier for a new future. Used for logging only.
    fn next_id(&self) -> u64;
}

/// A shared handle to a scheduler.
pub type SchedulerRef = Rc<dyn Scheduler>;

struct Queues {
    run_q: VecDeque<Task>,
    timers: TimerQueue<Duration>,
}

/// A deterministic scheduler with a virtual clock.
///
/// Nothing runs until the owner asks for it: [ManualScheduler::tick] runs a
/// single task, [ManualScheduler::advance] moves the clock and fires any
/// timer that became due, and [ManualScheduler::run_until_idle] does both
/// until nothing is left.
pub struct ManualScheduler {
    queues: RefCell<Queues>,
    now: Cell<Duration>,
    executed: Cell<usize>,
    next_id: Cell<u64>,
}

impl ManualScheduler {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            queues: RefCell::new(Queues {
                run_q: VecDeque::new(),
                timers: TimerQueue::new(),
            }),
            now: Cell::new(Duration::ZERO),
            executed: Cell::new(0),
            next_id: Cell::new(0),
        })
    }

    /// Time elapsed on the virtual clock.
    pub fn now(&self) -> Duration {
        self.now.get()
    }

    /// Number of tasks waiting in the run queue.
    pub fn queued(&self) -> usize {
        self.queues.borrow().run_q.len()
    }

    /// Number of timers that have not fired yet.
    pub fn timers(&self) -> usize {
        self.queues.borrow().timers.len()
    }

    /// Total number of tasks run so far.
    pub fn executed(&self) -> usize {
        self.executed.get()
    }

    /// Run the task at the head of the queue. Returns false when the queue
    /// was empty.
    pub fn tick(&self) -> bool {
        let task = self.queues.borrow_mut().run_q.pop_front();

        match task {
            Some(task) => {
                self.executed.set(self.executed.get() + 1);
                task();
                true
            }
            None => false,
        }
    }

    /// Run queued tasks until the queue is empty, including tasks queued by
    /// the tasks themselves. Timers are left alone. Returns the number of
    /// tasks run.
    pub fn run_queued(&self) -> usize {
        let mut n = 0;
        while self.tick() {
            n += 1;
        }
        n
    }

    /// Move the clock forward by `by`, firing timers in deadline order. The
    /// run queue is drained after each timer, so work a timer defers happens
    /// before the next timer fires.
    pub fn advance(&self, by: Duration) {
        let target = self.now.get() + by;

        self.run_queued();

        loop {
            let next = self.queues.borrow().timers.next_deadline();
            match next {
                Some(deadline) if deadline <= target => {
                    self.now.set(self.now.get().max(deadline));
                    let task = self.queues.borrow_mut().timers.pop_expired(deadline);
                    if let Some(task) = task {
                        self.executed.set(self.executed.get() + 1);
                        task();
                    }
                    self.run_queued();
                }
                _ => break,
            }
        }

        self.now.set(target);
    }

    /// Run everything: queued tasks, then each timer in turn, jumping the
    /// clock straight to its deadline.
    pub fn run_until_idle(&self) {
        loop {
            self.run_queued();

            let next = self.queues.borrow().timers.next_deadline();
            match next {
                Some(deadline) => self.advance(deadline.saturating_sub(self.now.get())),
                None => return,
            }
        }
    }
}

impl Scheduler for ManualScheduler {
    fn defer(&self, task: Task) {
        self.queues.borrow_mut().run_q.push_back(task);
    }

    fn defer_after(&self, delay: Duration, task: Task) {
        let deadline = self.now.get() + delay;
        self.queues.borrow_mut().timers.insert(deadline, task);
    }

    fn next_id(&self) -> u64 {
        self.next_id.set(self.next_id.get() + 1);
        self.next_id.get()
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("now", &self.now())
            .field("queued", &self.queued())
            .field("timers", &self.timers())
            .field("executed", &self.executed())
            .finish()
    }
}

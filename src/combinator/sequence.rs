//! Run steps one after another.
//!
//! # Example
//!
//! ```
//! use pledge::combinator::{Sequence, Step};
//! use pledge::task::Executor;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let seq: Sequence<&str, String> = Sequence::new([
//!     Step::new(|s| { s.succeed("car"); Ok(()) }),
//!     Step::new(|s| { s.succeed("train"); Ok(()) }),
//!     Step::new(|s| { s.succeed("boat"); Ok(()) }),
//! ])
//! .unwrap();
//!
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let l = log.clone();
//! seq.progress(move |i, leg| l.borrow_mut().push(format!("{i}: {leg}")));
//!
//! Executor::run();
//! assert_eq!(*log.borrow(), vec!["0: car", "1: train", "2: boat"]);
//! assert_eq!(
//!     seq.future().outcome().unwrap().channel(),
//!     pledge::future::Channel::Ready
//! );
//! ```
use std::{cell::RefCell, mem, rc::Rc};

use log::debug;

use super::{Progress, Step};
use crate::{
    config::Config,
    error::Error,
    future::{Channel, Future, Outcome, Settler},
};

/// A combinator that runs its steps strictly one at a time.
///
/// Each successful step emits a progress event and starts the next one. Once
/// the last step succeeds, the sequence is ready with every step's value in
/// order. The first step to fail or abort settles the sequence on the same
/// channel with that step's error or reason, and later steps never run.
pub struct Sequence<T, E, R = String> {
    future: Future<Vec<T>, E, R>,
    progress: Rc<Progress<T>>,
}

struct Run<T, E, R> {
    steps: RefCell<Vec<Step<T, E, R>>>,
    results: RefCell<Vec<T>>,
    progress: Rc<Progress<T>>,
    step_config: Config,
    settler: Settler<Vec<T>, E, R>,
}

impl<T, E, R> Sequence<T, E, R>
where
    T: Clone + 'static,
    E: Clone + 'static,
    R: Clone + 'static,
{
    pub fn new(steps: impl IntoIterator<Item = Step<T, E, R>>) -> Result<Self, Error> {
        Self::with_config(&Config::default(), steps)
    }

    /// Create a sequence. `config` governs the sequence's own future; the
    /// steps always run deferred on the same scheduler.
    pub fn with_config(
        config: &Config,
        steps: impl IntoIterator<Item = Step<T, E, R>>,
    ) -> Result<Self, Error> {
        let steps: Vec<_> = steps.into_iter().collect();
        if steps.is_empty() {
            return Err(Error::NoSteps);
        }

        let progress = Rc::new(Progress::new());
        let step_config = config.clone().deferred();

        let p = progress.clone();
        let future = Future::with_config(config, move |settler| {
            let run = Rc::new(Run {
                steps: RefCell::new(steps),
                results: RefCell::new(Vec::new()),
                progress: p,
                step_config,
                settler,
            });
            run_step(run, 0);
            Ok(())
        });

        let p = progress.clone();
        future.settled(move |_| p.close());

        Ok(Self { future, progress })
    }
}

fn run_step<T, E, R>(run: Rc<Run<T, E, R>>, index: usize)
where
    T: Clone + 'static,
    E: Clone + 'static,
    R: Clone + 'static,
{
    let Some(future) = run.steps.borrow_mut()[index].run(&run.step_config) else {
        return;
    };

    debug!("sequence: step {index} started");

    future.settled(move |outcome| match outcome {
        Outcome::Ready(v) => {
            debug!("sequence: step {index} ready");
            run.results.borrow_mut().push(v.clone());
            run.progress.emit(index, v);

            let next = index + 1;
            if next < run.steps.borrow().len() {
                run_step(run, next);
            } else {
                let results = mem::take(&mut *run.results.borrow_mut());
                run.settler.succeed(results);
            }
        }
        Outcome::Error(e) => {
            debug!("sequence: step {index} failed, halting");
            run.settler.fail(e.clone());
        }
        Outcome::Abort(r) => {
            debug!("sequence: step {index} aborted, halting");
            run.settler.abort(r.clone());
        }
    });
}

impl<T: 'static, E: 'static, R: 'static> Sequence<T, E, R> {
    pub fn on(&self, channel: Channel, f: impl FnOnce(&Outcome<Vec<T>, E, R>) + 'static) -> &Self {
        self.future.on(channel, f);
        self
    }

    pub fn ready(&self, f: impl FnOnce(&Vec<T>) + 'static) -> &Self {
        self.future.ready(f);
        self
    }

    pub fn error(&self, f: impl FnOnce(&E) + 'static) -> &Self {
        self.future.error(f);
        self
    }

    pub fn abort(&self, f: impl FnOnce(&R) + 'static) -> &Self {
        self.future.abort(f);
        self
    }

    /// Register `f` to be called with `(index, value)` each time a step
    /// succeeds.
    pub fn progress(&self, f: impl FnMut(usize, &T) + 'static) -> &Self {
        self.progress.add(f);
        self
    }

    /// The future the sequence settles.
    pub fn future(&self) -> &Future<Vec<T>, E, R> {
        &self.future
    }
}

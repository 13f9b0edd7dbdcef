//! Run steps concurrently.
//!
//! # Example
//!
//! ```
//! use pledge::combinator::{Parallel, Step};
//! use pledge::task::Executor;
//! use pledge::Error;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let par: Parallel<&str, Error> = Parallel::new([
//!     Step::new(|s| { s.succeed("car"); Ok(()) }),
//!     Step::new(|s| { s.abort("strike".to_string()); Ok(()) }),
//!     Step::new(|s| { s.fail(Error::Aborted("engine".into())); Ok(()) }),
//! ])
//! .unwrap();
//!
//! let reasons = Rc::new(RefCell::new(Vec::new()));
//! let r = reasons.clone();
//! par.abort(move |why| *r.borrow_mut() = why.clone());
//!
//! Executor::run();
//! assert_eq!(*reasons.borrow(), vec!["strike".to_string()]);
//! ```
use std::{cell::RefCell, rc::Rc};

use log::{debug, warn};

use super::{Progress, Step};
use crate::{
    config::Config,
    error::Error,
    future::{Channel, Future, Outcome, Settler},
};

/// The aggregate outcome of a [Parallel].
pub type Aggregate<T, E, R> = Outcome<Vec<T>, Vec<E>, Vec<R>>;

/// A combinator that runs all of its steps at once.
///
/// Steps are launched in index order; they may complete in any order. Each
/// successful step emits a progress event. When the last step completes, the
/// outcome is decided over all steps in index order:
///
/// 1. if any step aborted, abort with the reasons of the aborted steps;
/// 2. else if any step failed, error with the errors of the failed steps;
/// 3. else ready with every step's value.
pub struct Parallel<T, E, R = String> {
    future: Future<Vec<T>, Vec<E>, Vec<R>>,
    progress: Rc<Progress<T>>,
}

/// Bookkeeping of completed steps.
struct Tally<T, E, R> {
    pending: usize,
    results: Vec<Option<Outcome<T, E, R>>>,
}

impl<T, E, R> Tally<T, E, R> {
    fn new(steps: usize) -> Self {
        Self {
            pending: steps,
            results: (0..steps).map(|_| None).collect(),
        }
    }

    /// Record the outcome of step `index`. Returns the aggregate once every
    /// step has completed.
    fn step_done(
        &mut self,
        index: usize,
        outcome: Outcome<T, E, R>,
    ) -> Result<Option<Aggregate<T, E, R>>, Error> {
        if self.pending == 0 {
            return Err(Error::NoPendingSteps);
        }

        self.results[index] = Some(outcome);
        self.pending -= 1;

        if self.pending == 0 {
            Ok(Some(self.aggregate()))
        } else {
            Ok(None)
        }
    }

    fn aggregate(&mut self) -> Aggregate<T, E, R> {
        let results: Vec<_> = self.results.drain(..).flatten().collect();

        if results.iter().any(|o| o.channel() == Channel::Abort) {
            Outcome::Abort(
                results
                    .into_iter()
                    .filter_map(|o| match o {
                        Outcome::Abort(r) => Some(r),
                        _ => None,
                    })
                    .collect(),
            )
        } else if results.iter().any(|o| o.channel() == Channel::Error) {
            Outcome::Error(
                results
                    .into_iter()
                    .filter_map(|o| match o {
                        Outcome::Error(e) => Some(e),
                        _ => None,
                    })
                    .collect(),
            )
        } else {
            Outcome::Ready(
                results
                    .into_iter()
                    .filter_map(|o| match o {
                        Outcome::Ready(v) => Some(v),
                        _ => None,
                    })
                    .collect(),
            )
        }
    }
}

struct Launch<T, E, R> {
    steps: RefCell<Vec<Step<T, E, R>>>,
    tally: RefCell<Tally<T, E, R>>,
    progress: Rc<Progress<T>>,
    settler: Settler<Vec<T>, Vec<E>, Vec<R>>,
}

impl<T, E, R> Launch<T, E, R>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
    R: Clone + 'static,
{
    fn step_done(&self, index: usize, outcome: &Outcome<T, E, R>) {
        debug!("parallel: step {index} {}", outcome.channel());

        if let Outcome::Ready(v) = outcome {
            self.progress.emit(index, v);
        }

        let done = self.tally.borrow_mut().step_done(index, outcome.clone());

        match done {
            Ok(None) => {}
            Ok(Some(Outcome::Ready(values))) => {
                self.settler.succeed(values);
            }
            Ok(Some(Outcome::Error(errors))) => {
                self.settler.fail(errors);
            }
            Ok(Some(Outcome::Abort(reasons))) => {
                self.settler.abort(reasons);
            }
            Err(e) => {
                // The first settlement of the aggregate stands.
                if !self.settler.fail(vec![E::from(e)]) {
                    warn!("parallel: step {index} completed after the aggregate settled");
                }
            }
        }
    }
}

impl<T, E, R> Parallel<T, E, R>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
    R: Clone + 'static,
{
    pub fn new(steps: impl IntoIterator<Item = Step<T, E, R>>) -> Result<Self, Error> {
        Self::with_config(&Config::default(), steps)
    }

    /// Create a parallel combinator. `config` governs the combinator's own
    /// future; the steps always run deferred on the same scheduler.
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
            let count = steps.len();
            let launch = Rc::new(Launch {
                steps: RefCell::new(steps),
                tally: RefCell::new(Tally::new(count)),
                progress: p,
                settler,
            });

            for index in 0..count {
                let future = launch.steps.borrow_mut()[index].run(&step_config);
                if let Some(future) = future {
                    debug!("parallel: step {index} launched");
                    let launch = launch.clone();
                    future.settled(move |outcome| launch.step_done(index, outcome));
                }
            }

            Ok(())
        });

        let p = progress.clone();
        future.settled(move |_| p.close());

        Ok(Self { future, progress })
    }
}

impl<T: 'static, E: 'static, R: 'static> Parallel<T, E, R> {
    pub fn on(&self, channel: Channel, f: impl FnOnce(&Aggregate<T, E, R>) + 'static) -> &Self {
        self.future.on(channel, f);
        self
    }

    pub fn ready(&self, f: impl FnOnce(&Vec<T>) + 'static) -> &Self {
        self.future.ready(f);
        self
    }

    pub fn error(&self, f: impl FnOnce(&Vec<E>) + 'static) -> &Self {
        self.future.error(f);
        self
    }

    pub fn abort(&self, f: impl FnOnce(&Vec<R>) + 'static) -> &Self {
        self.future.abort(f);
        self
    }

    /// Register `f` to be called with `(index, value)` each time a step
    /// succeeds.
    pub fn progress(&self, f: impl FnMut(usize, &T) + 'static) -> &Self {
        self.progress.add(f);
        self
    }

    pub fn future(&self) -> &Future<Vec<T>, Vec<E>, Vec<R>> {
        &self.future
    }
}

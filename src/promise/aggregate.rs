use std::{cell::RefCell, rc::Rc};

use super::{Promise, Resolution, Resolver};
use crate::{config::Config, error::Error, scheduler::SchedulerRef};

struct AllState<T> {
    values: Vec<Option<T>>,
    remaining: usize,
}

impl<T> AllState<T> {
    /// Record the value at `index`; returns every value, in input order,
    /// once the last one arrives.
    fn fulfilled(&mut self, index: usize, value: T) -> Option<Vec<T>> {
        self.values[index] = Some(value);
        self.remaining -= 1;

        if self.remaining == 0 {
            Some(self.values.drain(..).flatten().collect())
        } else {
            None
        }
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    /// Cast every input to a promise on a common scheduler: the scheduler of
    /// the first input that already is a promise, or the default one.
    fn cast_all(inputs: impl IntoIterator<Item = Resolution<T, E>>) -> (SchedulerRef, Vec<Self>) {
        let inputs: Vec<_> = inputs.into_iter().collect();

        let scheduler = inputs
            .iter()
            .find_map(|x| match x {
                Resolution::Promise(p) => Some(p.scheduler()),
                _ => None,
            })
            .unwrap_or_else(|| Config::default().get_scheduler().clone());

        let config = Config::new(scheduler.clone());
        let promises = inputs
            .into_iter()
            .map(|x| match x {
                Resolution::Promise(p) => p,
                x => Self::adopt(&config, x),
            })
            .collect();

        (scheduler, promises)
    }

    /// A promise fulfilled with every input's value, in input order, once all
    /// of them have fulfilled; or rejected with the first rejection.
    ///
    /// An empty input fulfills with an empty list.
    pub fn all(inputs: impl IntoIterator<Item = Resolution<T, E>>) -> Promise<Vec<T>, E> {
        let (scheduler, promises) = Self::cast_all(inputs);
        let aggregate = Promise::pending_on(scheduler);
        let resolver = Resolver::new(aggregate.clone());

        if promises.is_empty() {
            resolver.fulfill(Vec::new());
            return aggregate;
        }

        let state = Rc::new(RefCell::new(AllState {
            values: promises.iter().map(|_| None).collect(),
            remaining: promises.len(),
        }));

        for (index, promise) in promises.iter().enumerate() {
            let state = state.clone();
            let resolver = resolver.clone();

            promise.react(Box::new(move |result| match result {
                Ok(v) => {
                    let values = state.borrow_mut().fulfilled(index, v);
                    if let Some(values) = values {
                        resolver.fulfill(values);
                    }
                }
                Err(e) => {
                    resolver.reject(e);
                }
            }));
        }

        aggregate
    }

    /// A promise settled like the first input to settle. An empty input
    /// never settles.
    pub fn race(inputs: impl IntoIterator<Item = Resolution<T, E>>) -> Self {
        let (scheduler, promises) = Self::cast_all(inputs);
        let aggregate = Promise::pending_on(scheduler);
        let resolver = Resolver::new(aggregate.clone());

        for promise in promises {
            let resolver = resolver.clone();

            promise.react(Box::new(move |result| {
                match result {
                    Ok(v) => resolver.fulfill(v),
                    Err(e) => resolver.reject(e),
                };
            }));
        }

        aggregate
    }
}

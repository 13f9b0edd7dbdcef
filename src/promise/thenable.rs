use std::{cell::Cell, rc::Rc};

use log::trace;

use super::{
    resolution::{self, Entry},
    Promise, Resolution,
};
use crate::error::Error;

/// The outcome of looking up a thenable's `then` member.
pub enum Then<'a, T, E> {
    /// `then` is callable. Calling it hands over the resolving functions; an
    /// `Err` return models a `then` that throws.
    Callable(Box<dyn FnOnce(Resolver<T, E>) -> Result<(), E> + 'a>),
    /// `then` exists but is not callable, so the object is a plain value.
    NotCallable(T),
}

/// Any object exposing a `then` member that promises can adopt.
///
/// Implement this for foreign types that should interoperate with
/// [Promise]. Returning `Err` from [Thenable::then_member] models a `then`
/// accessor that throws: the adopting promise is rejected with that error.
///
/// Closures taking a [Resolver] are thenables whose `then` is always
/// callable:
///
/// ```
/// use pledge::promise::{Promise, Resolution, Resolver};
///
/// let p: Promise<u32> = Promise::adopt(
///     &Default::default(),
///     Resolution::thenable(|r: Resolver<u32, pledge::Error>| {
///         r.fulfill(5);
///         Ok(())
///     }),
/// );
/// assert_eq!(p.value(), Some(Ok(5)));
/// ```
pub trait Thenable<T, E> {
    fn then_member(&self) -> Result<Then<'_, T, E>, E>;
}

impl<T, E, F> Thenable<T, E> for F
where
    F: Fn(Resolver<T, E>) -> Result<(), E>,
{
    fn then_member(&self) -> Result<Then<'_, T, E>, E> {
        Ok(Then::Callable(Box::new(self)))
    }
}

/// The pair of resolving functions handed to an executor or to a thenable.
///
/// Both halves share one guard: whichever of [Resolver::resolve],
/// [Resolver::fulfill] or [Resolver::reject] is called first wins, and every
/// later call on any clone is ignored.
pub struct Resolver<T, E> {
    target: Promise<T, E>,
    fired: Rc<Cell<bool>>,
    entry: Entry,
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            fired: self.fired.clone(),
            entry: self.entry,
        }
    }
}

impl<T, E> Resolver<T, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    pub(crate) fn new(target: Promise<T, E>) -> Self {
        Self::with_entry(target, Entry::Direct)
    }

    /// A resolver handed to a thenable's `then`. Calls made while `then`
    /// runs are picked up by the resolution already in progress.
    pub(crate) fn nested(target: Promise<T, E>) -> Self {
        Self::with_entry(target, Entry::Nested)
    }

    fn with_entry(target: Promise<T, E>, entry: Entry) -> Self {
        Self {
            target,
            fired: Rc::new(Cell::new(false)),
            entry,
        }
    }

    fn fire(&self) -> bool {
        if self.fired.replace(true) {
            trace!("promise {}: resolver already used", self.target.id());
            false
        } else {
            true
        }
    }

    /// Resolve the target with `x`, adopting it if it is a promise or a
    /// thenable. Returns whether this call was the first.
    pub fn resolve(&self, x: Resolution<T, E>) -> bool {
        let first = self.fire();
        if first {
            resolution::submit(self.entry, resolution::resolve_job(&self.target, x));
        }
        first
    }

    /// Shorthand for `resolve(Resolution::Value(value))`.
    pub fn fulfill(&self, value: T) -> bool {
        self.resolve(Resolution::Value(value))
    }

    pub fn reject(&self, reason: E) -> bool {
        let first = self.fire();
        if first {
            resolution::submit(self.entry, resolution::reject_job(&self.target, reason));
        }
        first
    }

    pub fn has_fired(&self) -> bool {
        self.fired.get()
    }
}

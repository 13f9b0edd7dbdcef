//! Combinators that drive several [Step]s to completion.
//!
//! - [Sequence] runs its steps strictly one at a time and halts at the first
//!   step that fails or aborts.
//! - [Parallel] launches every step at once and settles when all of them
//!   have, mapping mixed outcomes to a single aggregate: abort outranks
//!   error, which outranks ready.
//!
//! Both report a *progress* event, `(index, &value)`, each time a step
//! completes successfully. Progress is a separate channel from the three
//! terminal ones: a progress listener only sees events emitted after it was
//! registered, and is dropped once the combinator settles.
//!
//! Every step runs with [Policy::Deferred](crate::config::Policy), even when
//! its payload settles synchronously, so progress always arrives after the
//! current turn.
use std::{
    cell::{Cell, RefCell},
    mem,
};

mod parallel;
mod sequence;
mod step;

pub use parallel::Parallel;
pub use sequence::Sequence;
pub use step::Step;

type ProgressFn<T> = Box<dyn FnMut(usize, &T)>;

/// Progress listeners of a combinator.
struct Progress<T> {
    listeners: RefCell<Vec<ProgressFn<T>>>,
    closed: Cell<bool>,
}

impl<T> Progress<T> {
    fn new() -> Self {
        Self {
            listeners: RefCell::new(Vec::new()),
            closed: Cell::new(false),
        }
    }

    fn add(&self, f: impl FnMut(usize, &T) + 'static) {
        if !self.closed.get() {
            self.listeners.borrow_mut().push(Box::new(f));
        }
    }

    /// Call every listener with `(index, value)`. Listeners added while
    /// emitting only see later events.
    fn emit(&self, index: usize, value: &T) {
        let mut current = mem::take(&mut *self.listeners.borrow_mut());

        for f in current.iter_mut() {
            f(index, value);
        }

        if self.closed.get() {
            return;
        }

        let mut listeners = self.listeners.borrow_mut();
        let added = mem::replace(&mut *listeners, current);
        listeners.extend(added);
    }

    /// Drop every listener and ignore later registrations.
    fn close(&self) {
        self.closed.set(true);
        self.listeners.borrow_mut().clear();
    }
}

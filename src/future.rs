//! Listener-style futures.
//!
//! A [Future] is a single-resolution container with three terminal outcomes:
//! *ready* (success), *error* (failure) and *abort* (the payload chose to give
//! up). It is armed at construction: the payload runs immediately, or on the
//! scheduler when the [Config] asks for [Policy::Deferred](crate::config::Policy).
//!
//! Listeners are registered per [Channel]. While the future is pending they
//! are queued in registration order; when it settles only the listeners of
//! the matching channel run, each exactly once, and the others are dropped. A
//! listener registered after settlement runs synchronously if, and only if,
//! its channel matches the outcome.
//!
//! # Example
//!
//! ```
//! use pledge::future::Future;
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let f: Future<Vec<&str>, String> = Future::new(|s| {
//!     let mut data = vec!["orange", "pear", "apple"];
//!     data.sort();
//!     s.succeed(data);
//!     Ok(())
//! });
//!
//! let seen = Rc::new(Cell::new(false));
//! let seen2 = seen.clone();
//! f.ready(move |data| {
//!     assert_eq!(data, &vec!["apple", "orange", "pear"]);
//!     seen2.set(true);
//! })
//! .error(|_| panic!("not reached"));
//!
//! assert!(seen.get());
//! ```
use std::{
    cell::{Cell, RefCell},
    fmt, mem,
    rc::Rc,
};

use log::trace;

use crate::{config::Config, scheduler::SchedulerRef};

/// The three terminal outcomes of a [Future].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Ready,
    Error,
    Abort,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Ready, Channel::Error, Channel::Abort];

    fn index(self) -> usize {
        match self {
            Channel::Ready => 0,
            Channel::Error => 1,
            Channel::Abort => 2,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Channel::Ready => "ready",
            Channel::Error => "error",
            Channel::Abort => "abort",
        })
    }
}

/// The value a [Future] settled with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T, E, R> {
    Ready(T),
    Error(E),
    Abort(R),
}

impl<T, E, R> Outcome<T, E, R> {
    pub fn channel(&self) -> Channel {
        match self {
            Outcome::Ready(_) => Channel::Ready,
            Outcome::Error(_) => Channel::Error,
            Outcome::Abort(_) => Channel::Abort,
        }
    }
}

type Listener<T, E, R> = Box<dyn FnOnce(&Outcome<T, E, R>)>;

/// The work a future performs. It receives the handle through which it
/// settles the future; returning `Err` fails the future if it is still
/// pending.
pub type Payload<T, E, R> = Box<dyn FnOnce(Settler<T, E, R>) -> Result<(), E>>;

struct Listeners<T, E, R>([Vec<Listener<T, E, R>>; 3]);

impl<T, E, R> Listeners<T, E, R> {
    fn new() -> Self {
        Self([Vec::new(), Vec::new(), Vec::new()])
    }

    fn push(&mut self, channel: Channel, listener: Listener<T, E, R>) {
        self.0[channel.index()].push(listener);
    }

    fn take(mut self, channel: Channel) -> Vec<Listener<T, E, R>> {
        mem::take(&mut self.0[channel.index()])
    }
}

enum State<T, E, R> {
    Pending(Listeners<T, E, R>),
    Settled(Rc<Outcome<T, E, R>>),
}

struct Inner<T, E, R> {
    id: u64,
    scheduler: SchedulerRef,
    state: State<T, E, R>,
}

/// A single-resolution asynchronous result.
///
/// See the [module-level documentation](self) for more information. Cloning
/// a `Future` yields another handle to the same state.
pub struct Future<T, E, R = String> {
    inner: Rc<RefCell<Inner<T, E, R>>>,
}

/// The handle a payload uses to settle its [Future].
///
/// Only the first call to [Settler::succeed], [Settler::fail] or
/// [Settler::abort] has any effect; later calls are ignored.
pub struct Settler<T, E, R> {
    inner: Rc<RefCell<Inner<T, E, R>>>,
}

impl<T, E, R> Clone for Settler<T, E, R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, E, R> Settler<T, E, R> {
    fn settle(&self, outcome: Outcome<T, E, R>) -> bool {
        let channel = outcome.channel();
        let outcome = Rc::new(outcome);

        let (id, listeners) = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.id;

            match mem::replace(&mut inner.state, State::Settled(outcome.clone())) {
                State::Pending(listeners) => (id, listeners),
                State::Settled(prev) => {
                    inner.state = State::Settled(prev);
                    trace!("future {id}: ignoring {channel}, already settled");
                    return false;
                }
            }
        };

        let listeners = listeners.take(channel);
        trace!("future {id}: {channel}, {} listener(s)", listeners.len());

        for listener in listeners {
            listener(&outcome);
        }

        true
    }

    /// Settle on the ready channel. Returns whether this call settled the
    /// future.
    pub fn succeed(&self, value: T) -> bool {
        self.settle(Outcome::Ready(value))
    }

    /// Settle on the error channel.
    pub fn fail(&self, err: E) -> bool {
        self.settle(Outcome::Error(err))
    }

    /// Settle on the abort channel.
    pub fn abort(&self, reason: R) -> bool {
        self.settle(Outcome::Abort(reason))
    }

    pub fn is_settled(&self) -> bool {
        matches!(self.inner.borrow().state, State::Settled(_))
    }
}

impl<T, E, R> Clone for Future<T, E, R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static, E: 'static, R: 'static> Future<T, E, R> {
    /// Create a future whose payload runs synchronously, before this function
    /// returns.
    pub fn new(payload: impl FnOnce(Settler<T, E, R>) -> Result<(), E> + 'static) -> Self {
        Self::with_config(&Config::default(), payload)
    }

    /// Create a future, running the payload according to `config`.
    pub fn with_config(
        config: &Config,
        payload: impl FnOnce(Settler<T, E, R>) -> Result<(), E> + 'static,
    ) -> Self {
        let future = Self {
            inner: Rc::new(RefCell::new(Inner {
                id: config.next_id(),
                scheduler: config.get_scheduler().clone(),
                state: State::Pending(Listeners::new()),
            })),
        };

        let settler = Settler {
            inner: future.inner.clone(),
        };

        trace!("future {}: created, {:?}", future.id(), config.get_policy());

        config.launch(move || {
            if let Err(e) = payload(settler.clone()) {
                settler.fail(e);
            }
        });

        future
    }

    /// Register `f` for `channel`.
    ///
    /// If the future is pending, `f` is queued. If it has settled on
    /// `channel`, `f` runs now. Otherwise `f` is dropped without being run.
    pub fn on(&self, channel: Channel, f: impl FnOnce(&Outcome<T, E, R>) + 'static) -> &Self {
        let outcome = {
            let mut inner = self.inner.borrow_mut();
            match &mut inner.state {
                State::Pending(listeners) => {
                    listeners.push(channel, Box::new(f));
                    return self;
                }
                State::Settled(outcome) => outcome.clone(),
            }
        };

        if outcome.channel() == channel {
            trace!("future {}: replaying {channel}", self.id());
            f(&outcome);
        }

        self
    }

    pub fn ready(&self, f: impl FnOnce(&T) + 'static) -> &Self {
        self.on(Channel::Ready, move |outcome| {
            if let Outcome::Ready(v) = outcome {
                f(v)
            }
        })
    }

    pub fn error(&self, f: impl FnOnce(&E) + 'static) -> &Self {
        self.on(Channel::Error, move |outcome| {
            if let Outcome::Error(e) = outcome {
                f(e)
            }
        })
    }

    pub fn abort(&self, f: impl FnOnce(&R) + 'static) -> &Self {
        self.on(Channel::Abort, move |outcome| {
            if let Outcome::Abort(r) = outcome {
                f(r)
            }
        })
    }

    /// Register `f` on every channel. It runs once, with whichever outcome
    /// the future settles on.
    pub fn settled(&self, f: impl FnOnce(&Outcome<T, E, R>) + 'static) -> &Self {
        let slot = Rc::new(Cell::new(Some(f)));

        for channel in Channel::ALL {
            let slot = slot.clone();
            self.on(channel, move |outcome| {
                if let Some(f) = slot.take() {
                    f(outcome)
                }
            });
        }

        self
    }
}

impl<T, E, R> Future<T, E, R> {
    pub fn is_pending(&self) -> bool {
        matches!(self.inner.borrow().state, State::Pending(_))
    }

    /// The channel this future settled on, if it has settled.
    pub fn channel(&self) -> Option<Channel> {
        self.outcome().map(|o| o.channel())
    }

    pub fn outcome(&self) -> Option<Rc<Outcome<T, E, R>>> {
        match &self.inner.borrow().state {
            State::Pending(_) => None,
            State::Settled(outcome) => Some(outcome.clone()),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.borrow().id
    }

    pub(crate) fn scheduler(&self) -> SchedulerRef {
        self.inner.borrow().scheduler.clone()
    }
}

impl<T, E, R> fmt::Debug for Future<T, E, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.channel() {
            Some(channel) => channel.to_string(),
            None => "pending".to_string(),
        };

        f.debug_struct("Future")
            .field("id", &self.id())
            .field("state", &state)
            .finish()
    }
}

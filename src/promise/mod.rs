//! Thenable-chaining promises.
//!
//! [Promise] is the chaining-capable sibling of [Future](crate::future::Future).
//! It has two outcomes only, fulfilled and rejected, and settles through the
//! standard resolution procedure: resolving with another promise or with a
//! [Thenable] adopts its eventual state, and resolving a promise with itself
//! rejects it with [Error::SelfResolution].
//!
//! Reactions registered with [Promise::then], [Promise::and_then] and
//! [Promise::catch] never run synchronously; they are handed to the
//! promise's scheduler once it settles. Each returns a new promise resolved
//! with whatever the handler produced, or rejected with the handler's `Err`.
//!
//! # Example
//!
//! ```
//! use pledge::promise::{Promise, PromiseState, Resolution};
//! use pledge::task::Executor;
//!
//! let p: Promise<u32> = Promise::resolve(20)
//!     .and_then(|v| Ok(Resolution::Value(v + 1)))
//!     .and_then(|v| Ok(Resolution::Value(v * 2)));
//!
//! assert!(p.is_pending());
//! Executor::run();
//! assert_eq!(p.state(), PromiseState::Fulfilled(42));
//! ```
use std::{cell::RefCell, fmt, rc::Rc};

use log::trace;

use crate::{
    config::Config,
    error::Error,
    future::{Future, Outcome},
    scheduler::SchedulerRef,
};

mod aggregate;
mod resolution;
mod thenable;

pub use thenable::{Resolver, Then, Thenable};

use resolution::{reject_with, resolve_handled, resolve_with};

/// The state of a [Promise].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromiseState<T, E> {
    Pending,
    Fulfilled(T),
    Rejected(E),
}

/// Something a promise can be resolved with.
pub enum Resolution<T, E> {
    /// A plain value: the promise is fulfilled with it.
    Value(T),
    /// Another promise, whose state is adopted.
    Promise(Promise<T, E>),
    /// A foreign thenable, whose `then` is consulted.
    Thenable(Rc<dyn Thenable<T, E>>),
}

impl<T, E> Resolution<T, E> {
    pub fn thenable(thenable: impl Thenable<T, E> + 'static) -> Self {
        Resolution::Thenable(Rc::new(thenable))
    }
}

impl<T, E> From<Promise<T, E>> for Resolution<T, E> {
    fn from(p: Promise<T, E>) -> Self {
        Resolution::Promise(p)
    }
}

impl<T: fmt::Debug, E> fmt::Debug for Resolution<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Resolution::Promise(p) => f.debug_tuple("Promise").field(&p.id()).finish(),
            Resolution::Thenable(_) => f.write_str("Thenable"),
        }
    }
}

type Reaction<T, E> = Box<dyn FnOnce(Result<T, E>)>;

struct Inner<T, E> {
    id: u64,
    scheduler: SchedulerRef,
    state: PromiseState<T, E>,
    reactions: Vec<Reaction<T, E>>,
}

/// A chaining-capable single-resolution result.
///
/// See the [module-level documentation](self) for more information. Cloning
/// a `Promise` yields another handle to the same promise.
pub struct Promise<T, E = Error> {
    inner: Rc<RefCell<Inner<T, E>>>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, E> Promise<T, E> {
    pub fn id(&self) -> u64 {
        self.inner.borrow().id
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.inner.borrow().state, PromiseState::Pending)
    }

    /// Whether both handles refer to the same promise.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn scheduler(&self) -> SchedulerRef {
        self.inner.borrow().scheduler.clone()
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    fn pending_on(scheduler: SchedulerRef) -> Self {
        let id = scheduler.next_id();
        trace!("promise {id}: created");

        Self {
            inner: Rc::new(RefCell::new(Inner {
                id,
                scheduler,
                state: PromiseState::Pending,
                reactions: Vec::new(),
            })),
        }
    }

    /// Create a promise and run `executor` synchronously with its resolving
    /// functions. An `Err` returned by the executor rejects the promise,
    /// unless the executor already resolved or rejected it.
    pub fn new(executor: impl FnOnce(Resolver<T, E>) -> Result<(), E> + 'static) -> Self {
        Self::with_config(&Config::default(), executor)
    }

    /// Create a promise, running `executor` according to `config`.
    pub fn with_config(
        config: &Config,
        executor: impl FnOnce(Resolver<T, E>) -> Result<(), E> + 'static,
    ) -> Self {
        let promise = Self::pending_on(config.get_scheduler().clone());
        let resolver = Resolver::new(promise.clone());

        config.launch(move || {
            if let Err(e) = executor(resolver.clone()) {
                resolver.reject(e);
            }
        });

        promise
    }

    /// Create a promise that adopts `x`, which may be a plain value, another
    /// promise or a thenable.
    pub fn adopt(config: &Config, x: Resolution<T, E>) -> Self {
        Self::with_config(config, move |r| {
            r.resolve(x);
            Ok(())
        })
    }

    /// A promise already fulfilled with `value`.
    pub fn resolve(value: T) -> Self {
        Self::adopt(&Config::default(), Resolution::Value(value))
    }

    /// A promise already rejected with `reason`.
    pub fn reject(reason: E) -> Self {
        Self::with_config(&Config::default(), move |r| {
            r.reject(reason);
            Ok(())
        })
    }

    /// Turn `x` into a promise. A promise is returned as is; anything else is
    /// adopted by a new promise.
    pub fn cast(x: Resolution<T, E>) -> Self {
        match x {
            Resolution::Promise(p) => p,
            x => Self::adopt(&Config::default(), x),
        }
    }

    /// Observe a listener-style future as a promise.
    ///
    /// Ready fulfills, error rejects with the error, and abort rejects with
    /// [Error::Aborted] carrying the abort reason.
    pub fn from_future<R: fmt::Display + 'static>(future: &Future<T, E, R>) -> Self {
        let promise = Self::pending_on(future.scheduler());
        let resolver = Resolver::new(promise.clone());

        future.settled(move |outcome| {
            match outcome {
                Outcome::Ready(v) => resolver.fulfill(v.clone()),
                Outcome::Error(e) => resolver.reject(e.clone()),
                Outcome::Abort(r) => resolver.reject(E::from(Error::Aborted(r.to_string()))),
            };
        });

        promise
    }

    /// The current state, cloned.
    pub fn state(&self) -> PromiseState<T, E> {
        self.inner.borrow().state.clone()
    }

    /// The settled result, if any.
    pub fn value(&self) -> Option<Result<T, E>> {
        match self.state() {
            PromiseState::Pending => None,
            PromiseState::Fulfilled(v) => Some(Ok(v)),
            PromiseState::Rejected(e) => Some(Err(e)),
        }
    }

    /// Register a reaction. It is queued while pending and scheduled right
    /// away otherwise; it never runs synchronously.
    fn react(&self, reaction: Reaction<T, E>) {
        let (result, scheduler) = {
            let mut inner = self.inner.borrow_mut();
            let result = match &inner.state {
                PromiseState::Pending => {
                    inner.reactions.push(reaction);
                    return;
                }
                PromiseState::Fulfilled(v) => Ok(v.clone()),
                PromiseState::Rejected(e) => Err(e.clone()),
            };
            (result, inner.scheduler.clone())
        };

        scheduler.defer(Box::new(move || reaction(result)));
    }

    /// React to both outcomes. The returned promise is resolved with the
    /// handler's result.
    pub fn then<U, F, G>(&self, on_fulfilled: F, on_rejected: G) -> Promise<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Result<Resolution<U, E>, E> + 'static,
        G: FnOnce(E) -> Result<Resolution<U, E>, E> + 'static,
    {
        let downstream = Promise::pending_on(self.scheduler());
        let d = downstream.clone();

        self.react(Box::new(move |result| {
            let handled = match result {
                Ok(v) => on_fulfilled(v),
                Err(e) => on_rejected(e),
            };
            resolve_handled(&d, handled);
        }));

        downstream
    }

    /// React to fulfilment only. A rejection passes through unchanged.
    pub fn and_then<U, F>(&self, on_fulfilled: F) -> Promise<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Result<Resolution<U, E>, E> + 'static,
    {
        let downstream = Promise::pending_on(self.scheduler());
        let d = downstream.clone();

        self.react(Box::new(move |result| match result {
            Ok(v) => resolve_handled(&d, on_fulfilled(v)),
            Err(e) => reject_with(&d, e),
        }));

        downstream
    }

    /// React to rejection only. A fulfilment passes through unchanged.
    pub fn catch<G>(&self, on_rejected: G) -> Promise<T, E>
    where
        G: FnOnce(E) -> Result<Resolution<T, E>, E> + 'static,
    {
        let downstream = Promise::pending_on(self.scheduler());
        let d = downstream.clone();

        self.react(Box::new(move |result| match result {
            Ok(v) => resolve_with(&d, Resolution::Value(v)),
            Err(e) => resolve_handled(&d, on_rejected(e)),
        }));

        downstream
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        let state = match inner.state {
            PromiseState::Pending => "pending",
            PromiseState::Fulfilled(_) => "fulfilled",
            PromiseState::Rejected(_) => "rejected",
        };

        f.debug_struct("Promise")
            .field("id", &inner.id)
            .field("state", &state)
            .field("reactions", &inner.reactions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc, time::Duration};

    use anyhow::Result;

    use super::{Promise, PromiseState, Resolution};
    use crate::{
        config::Config,
        error::Error,
        future::Future,
        scheduler::{ManualScheduler, Scheduler},
        task::Executor,
    };

    #[derive(Debug, Clone, PartialEq)]
    enum Fault {
        Pledge(Error),
        Failed(&'static str),
    }

    impl From<Error> for Fault {
        fn from(e: Error) -> Self {
            Fault::Pledge(e)
        }
    }

    #[test]
    fn reactions_never_run_synchronously() {
        let sched = ManualScheduler::new();
        let config = Config::new(sched.clone());
        let log = Rc::new(RefCell::new(Vec::new()));

        let p: Promise<u32, Fault> = Promise::adopt(&config, Resolution::Value(1));
        assert_eq!(p.state(), PromiseState::Fulfilled(1));

        let l = log.clone();
        p.and_then(move |v| {
            l.borrow_mut().push(v);
            Ok(Resolution::Value(()))
        });

        assert!(log.borrow().is_empty());
        sched.run_queued();
        assert_eq!(*log.borrow(), vec![1]);
    }

    #[test]
    fn handler_err_rejects_downstream() {
        let sched = ManualScheduler::new();
        let config = Config::new(sched.clone());

        let p: Promise<u32, Fault> = Promise::adopt(&config, Resolution::Value(1));
        let failed = p.and_then(|_| -> Result<Resolution<u32, Fault>, Fault> {
            Err(Fault::Failed("handler"))
        });
        let skipped = failed.and_then(|v| Ok(Resolution::Value(v + 100)));
        let recovered = skipped.catch(|e| {
            assert_eq!(e, Fault::Failed("handler"));
            Ok(Resolution::Value(7))
        });

        sched.run_until_idle();
        assert_eq!(failed.state(), PromiseState::Rejected(Fault::Failed("handler")));
        assert_eq!(skipped.state(), PromiseState::Rejected(Fault::Failed("handler")));
        assert_eq!(recovered.state(), PromiseState::Fulfilled(7));
    }

    #[test]
    fn catch_passes_fulfilment_through() {
        let sched = ManualScheduler::new();
        let config = Config::new(sched.clone());

        let p: Promise<&str, Fault> = Promise::adopt(&config, Resolution::Value("ok"));
        let c = p.catch(|_| Ok(Resolution::Value("caught")));

        sched.run_until_idle();
        assert_eq!(c.state(), PromiseState::Fulfilled("ok"));
    }

    #[test]
    fn then_picks_branch() {
        let sched = ManualScheduler::new();
        let config = Config::new(sched.clone());

        let ok: Promise<u32, Fault> = Promise::adopt(&config, Resolution::Value(2));
        let bad: Promise<u32, Fault> = Promise::with_config(&config, |_| Err(Fault::Failed("x")));

        let a = ok.then(
            |v| Ok(Resolution::Value(format!("ok {v}"))),
            |e| Ok(Resolution::Value(format!("err {e:?}"))),
        );
        let b = bad.then(
            |v| Ok(Resolution::Value(format!("ok {v}"))),
            |e| Ok(Resolution::Value(format!("err {e:?}"))),
        );

        sched.run_until_idle();
        assert_eq!(a.state(), PromiseState::Fulfilled("ok 2".to_string()));
        assert_eq!(b.state(), PromiseState::Fulfilled(r#"err Failed("x")"#.to_string()));
    }

    #[test]
    fn handler_returning_promise_is_chained() {
        let sched = ManualScheduler::new();
        let config = Config::new(sched.clone());

        let s = sched.clone();
        let c = config.clone();
        let p: Promise<u32, Fault> = Promise::adopt(&config, Resolution::Value(5));
        let chained = p.and_then(move |v| {
            let later = Promise::with_config(&c, move |r| {
                s.defer_after(
                    Duration::from_millis(50),
                    Box::new(move || {
                        r.fulfill(v * 10);
                    }),
                );
                Ok(())
            });
            Ok(later.into())
        });

        sched.run_queued();
        assert!(chained.is_pending());

        sched.advance(Duration::from_millis(50));
        sched.run_queued();
        assert_eq!(chained.state(), PromiseState::Fulfilled(50));
    }

    #[test]
    fn executor_err_after_resolve_is_ignored() {
        let p: Promise<u32> = Promise::new(|r| {
            r.fulfill(3);
            Err(Error::NoSteps)
        });
        assert_eq!(p.value(), Some(Ok(3)));
    }

    #[test]
    fn deferred_executor() {
        let sched = ManualScheduler::new();
        let config = Config::new(sched.clone()).deferred();

        let p: Promise<u32> = Promise::with_config(&config, |r| {
            r.fulfill(3);
            Ok(())
        });

        assert!(p.is_pending());
        sched.run_queued();
        assert_eq!(p.value(), Some(Ok(3)));
    }

    #[test]
    fn cast_returns_same_promise() {
        let p: Promise<&str> = Promise::resolve("dummy");
        let cast = Promise::cast(p.clone().into());
        assert!(cast.ptr_eq(&p));

        let other = Promise::cast(Resolution::Value("sentinel"));
        assert!(!other.ptr_eq(&p));
        assert_eq!(other.value(), Some(Ok("sentinel")));
    }

    #[test]
    fn resolve_and_reject_on_executor() -> Result<()> {
        let log = Rc::new(RefCell::new(Vec::new()));

        let l = log.clone();
        Promise::<&str>::resolve("sentinel").and_then(move |v| {
            l.borrow_mut().push(format!("resolved {v}"));
            Ok(Resolution::Value(()))
        });

        let l = log.clone();
        Promise::<&str>::reject(Error::NoSteps).catch(move |e| {
            l.borrow_mut().push(format!("rejected {e}"));
            Ok(Resolution::Value("recovered"))
        });

        Executor::run();
        assert_eq!(
            *log.borrow(),
            vec!["resolved sentinel", "rejected at least one step is required"]
        );

        Ok(())
    }

    #[test]
    fn from_future_maps_abort_to_rejection() {
        let ready: Future<u32, Error> = Future::new(|s| {
            s.succeed(1);
            Ok(())
        });
        let aborted: Future<u32, Error> = Future::new(|s| {
            s.abort("user cancelled".to_string());
            Ok(())
        });

        assert_eq!(Promise::from_future(&ready).value(), Some(Ok(1)));
        assert_eq!(
            Promise::from_future(&aborted).value(),
            Some(Err(Error::Aborted("user cancelled".into())))
        );
    }

    #[test]
    fn debug_output() {
        let sched = ManualScheduler::new();
        let config = Config::new(sched.clone()).deferred();
        let p: Promise<u32> = Promise::with_config(&config, |_| Ok(()));
        p.and_then(|v| Ok(Resolution::Value(v)));

        assert_eq!(
            format!("{p:?}"),
            "Promise { id: 1, state: \"pending\", reactions: 1 }"
        );
    }
}

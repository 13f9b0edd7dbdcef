//! The promise resolution procedure.
//!
//! Resolving a promise with a value `x` may require adopting the state of
//! another promise or of a foreign thenable, whose `then` may in turn resolve
//! with yet another thenable, synchronously. Rather than recursing, every
//! resolution is a job on a per-thread worklist.
//!
//! A request from outside the procedure ([Entry::Direct]) queues its job and
//! drains the worklist, so it has taken effect by the time it returns. A
//! request made by a thenable's `then` while it is being called
//! ([Entry::Nested]) only queues its job; the drain loop that called `then`
//! picks it up once `then` returns. A chain of nested thenables therefore runs
//! in constant stack depth, and jobs run in the order they were requested.
use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    mem,
    rc::Rc,
};

use log::trace;

use super::{Promise, PromiseState, Resolution, Resolver, Then};
use crate::{error::Error, task::Task};

/// How a resolution request enters the worklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Entry {
    /// Runs before the request returns.
    Direct,
    /// Runs once control is back in the enclosing drain loop, or right away
    /// when no drain is active.
    Nested,
}

thread_local! {
    static WORKLIST: RefCell<VecDeque<Task>> = const { RefCell::new(VecDeque::new()) };
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Marks an active drain loop for as long as it lives.
struct Draining;

impl Draining {
    fn enter() -> Self {
        DEPTH.with(|d| d.set(d.get() + 1));
        Draining
    }
}

impl Drop for Draining {
    fn drop(&mut self) {
        let depth = DEPTH.with(|d| {
            let depth = d.get() - 1;
            d.set(depth);
            depth
        });

        // Jobs left behind by a panicking drain belong to nobody.
        if depth == 0 && std::thread::panicking() {
            let stale = WORKLIST.with(|w| mem::take(&mut *w.borrow_mut()));
            trace!("resolution: dropping {} job(s) after panic", stale.len());
        }
    }
}

fn push(job: Task) {
    WORKLIST.with(|w| w.borrow_mut().push_back(job));
}

fn drain() {
    let _draining = Draining::enter();

    loop {
        let job = WORKLIST.with(|w| w.borrow_mut().pop_front());
        match job {
            Some(job) => job(),
            None => return,
        }
    }
}

pub(crate) fn submit(entry: Entry, job: Task) {
    push(job);

    if entry == Entry::Direct || DEPTH.with(Cell::get) == 0 {
        drain();
    }
}

pub(crate) fn resolve_job<T, E>(target: &Promise<T, E>, x: Resolution<T, E>) -> Task
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    let target = target.clone();
    Box::new(move || resolve_step(target, x))
}

pub(crate) fn reject_job<T, E>(target: &Promise<T, E>, reason: E) -> Task
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    let target = target.clone();
    Box::new(move || settle(&target, Err(reason)))
}

/// Resolve `target` with `x`.
pub(crate) fn resolve_with<T, E>(target: &Promise<T, E>, x: Resolution<T, E>)
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    submit(Entry::Direct, resolve_job(target, x));
}

/// Reject `target` with `reason`.
pub(crate) fn reject_with<T, E>(target: &Promise<T, E>, reason: E)
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    submit(Entry::Direct, reject_job(target, reason));
}

/// Resolve `target` with whatever a reaction handler produced.
pub(crate) fn resolve_handled<T, E>(target: &Promise<T, E>, handled: Result<Resolution<T, E>, E>)
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    match handled {
        Ok(x) => resolve_with(target, x),
        Err(e) => reject_with(target, e),
    }
}

fn resolve_step<T, E>(target: Promise<T, E>, x: Resolution<T, E>)
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    if !target.is_pending() {
        return;
    }

    match x {
        Resolution::Value(v) => settle(&target, Ok(v)),
        Resolution::Promise(p) if p.ptr_eq(&target) => {
            trace!("promise {}: resolved with itself", target.id());
            settle(&target, Err(E::from(Error::SelfResolution)));
        }
        Resolution::Promise(p) => {
            trace!("promise {}: adopting promise {}", target.id(), p.id());
            p.react(Box::new(move |result| match result {
                Ok(v) => resolve_with(&target, Resolution::Value(v)),
                Err(e) => reject_with(&target, e),
            }));
        }
        Resolution::Thenable(thenable) => match thenable.then_member() {
            Err(e) => settle(&target, Err(e)),
            Ok(Then::NotCallable(v)) => settle(&target, Ok(v)),
            Ok(Then::Callable(then)) => {
                trace!("promise {}: calling thenable", target.id());
                let resolver = Resolver::nested(target.clone());
                if let Err(e) = then(resolver.clone()) {
                    if !resolver.reject(e) {
                        trace!("promise {}: thenable threw after settling", target.id());
                    }
                }
            }
        },
    }
}

/// Move `target` out of pending and schedule every queued reaction.
pub(crate) fn settle<T, E>(target: &Promise<T, E>, result: Result<T, E>)
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    let (reactions, scheduler) = {
        let mut inner = target.inner.borrow_mut();
        if !matches!(inner.state, PromiseState::Pending) {
            return;
        }

        inner.state = match &result {
            Ok(v) => PromiseState::Fulfilled(v.clone()),
            Err(e) => PromiseState::Rejected(e.clone()),
        };

        (mem::take(&mut inner.reactions), inner.scheduler.clone())
    };

    trace!(
        "promise {}: {}, {} reaction(s)",
        target.id(),
        if result.is_ok() { "fulfilled" } else { "rejected" },
        reactions.len()
    );

    let result = Rc::new(result);
    for reaction in reactions {
        let result = result.clone();
        scheduler.defer(Box::new(move || reaction((*result).clone())));
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::RefCell,
        panic::{self, AssertUnwindSafe},
        rc::Rc,
    };

    use anyhow::Result;

    use super::super::{Promise, PromiseState, Resolution, Resolver, Then, Thenable};
    use crate::{config::Config, error::Error, scheduler::ManualScheduler};

    #[derive(Debug, Clone, PartialEq)]
    enum Fault {
        Pledge(Error),
        Thrown(&'static str),
    }

    impl From<Error> for Fault {
        fn from(e: Error) -> Self {
            Fault::Pledge(e)
        }
    }

    fn config() -> (Rc<ManualScheduler>, Config) {
        let sched = ManualScheduler::new();
        let config = Config::new(sched.clone());
        (sched, config)
    }

    fn capture<T: Clone + 'static>(
        config: &Config,
    ) -> (Promise<T, Fault>, Resolver<T, Fault>) {
        let slot = Rc::new(RefCell::new(None));
        let s = slot.clone();
        let p = Promise::with_config(config, move |r| {
            *s.borrow_mut() = Some(r);
            Ok(())
        });
        let r = slot.borrow_mut().take().unwrap();
        (p, r)
    }

    #[test]
    fn self_resolution_rejects() {
        let (_, config) = config();
        let (p, r) = capture::<u32>(&config);

        assert!(r.resolve(Resolution::Promise(p.clone())));
        assert_eq!(p.state(), PromiseState::Rejected(Fault::Pledge(Error::SelfResolution)));
    }

    #[test]
    fn handler_returning_own_promise_rejects() {
        let (sched, config) = config();
        let slot: Rc<RefCell<Option<Promise<u32, Fault>>>> = Rc::default();

        let s = slot.clone();
        let p2 = Promise::adopt(&config, Resolution::Value(1u32)).and_then(move |_| {
            Ok(Resolution::Promise(s.borrow().clone().unwrap()))
        });
        *slot.borrow_mut() = Some(p2.clone());

        sched.run_until_idle();
        assert_eq!(p2.state(), PromiseState::Rejected(Fault::Pledge(Error::SelfResolution)));
        slot.borrow_mut().take();
    }

    #[test]
    fn adopts_pending_promise() {
        let (sched, config) = config();
        let (inner, inner_r) = capture::<&str>(&config);
        let (outer, outer_r) = capture::<&str>(&config);

        outer_r.resolve(inner.into());
        assert!(outer.is_pending());

        // Adoption is locked in: a second resolve is ignored.
        assert!(!outer_r.fulfill("other"));

        inner_r.fulfill("inner");
        sched.run_until_idle();
        assert_eq!(outer.state(), PromiseState::Fulfilled("inner"));
    }

    #[test]
    fn adopts_rejected_promise() {
        let (sched, config) = config();
        let (inner, inner_r) = capture::<&str>(&config);
        let outer = Promise::adopt(&config, inner.into());

        inner_r.reject(Fault::Thrown("no"));
        sched.run_until_idle();
        assert_eq!(outer.state(), PromiseState::Rejected(Fault::Thrown("no")));
    }

    struct Throwing;

    impl Thenable<u32, Fault> for Throwing {
        fn then_member(&self) -> Result<Then<'_, u32, Fault>, Fault> {
            Err(Fault::Thrown("getter"))
        }
    }

    struct Plain(u32);

    impl Thenable<u32, Fault> for Plain {
        fn then_member(&self) -> Result<Then<'_, u32, Fault>, Fault> {
            Ok(Then::NotCallable(self.0))
        }
    }

    #[test]
    fn throwing_then_accessor_rejects() {
        let (_, config) = config();
        let p = Promise::adopt(&config, Resolution::thenable(Throwing));
        assert_eq!(p.state(), PromiseState::Rejected(Fault::Thrown("getter")));
    }

    #[test]
    fn non_callable_then_fulfills_with_object() {
        let (_, config) = config();
        let p = Promise::adopt(&config, Resolution::thenable(Plain(9)));
        assert_eq!(p.state(), PromiseState::Fulfilled(9));
    }

    #[test]
    fn thenable_first_call_wins_and_late_throw_is_swallowed() {
        let (_, config) = config();
        let p = Promise::adopt(
            &config,
            Resolution::thenable(|r: Resolver<u32, Fault>| {
                r.fulfill(1);
                r.reject(Fault::Thrown("second"));
                r.fulfill(3);
                Err(Fault::Thrown("after"))
            }),
        );
        assert_eq!(p.state(), PromiseState::Fulfilled(1));
    }

    #[test]
    fn thenable_throwing_before_calling_rejects() {
        let (_, config) = config();
        let p: Promise<u32, Fault> = Promise::adopt(
            &config,
            Resolution::thenable(|_: Resolver<u32, Fault>| Err(Fault::Thrown("early"))),
        );
        assert_eq!(p.state(), PromiseState::Rejected(Fault::Thrown("early")));
    }

    #[test]
    fn thenable_resolving_later() {
        let (sched, config) = config();
        let (gate, gate_r) = capture::<u32>(&config);

        let g = gate.clone();
        let p = Promise::adopt(
            &config,
            Resolution::thenable(move |r: Resolver<u32, Fault>| {
                let r2 = r.clone();
                g.and_then(move |v| {
                    r2.fulfill(v * 2);
                    Ok(Resolution::Value(()))
                });
                Ok(())
            }),
        );

        assert!(p.is_pending());
        gate_r.fulfill(21);
        sched.run_until_idle();
        assert_eq!(p.state(), PromiseState::Fulfilled(42));
    }

    struct Nested(u32);

    impl Thenable<u32, Fault> for Nested {
        fn then_member(&self) -> Result<Then<'_, u32, Fault>, Fault> {
            let depth = self.0;
            Ok(Then::Callable(Box::new(move |r| {
                if depth == 0 {
                    r.fulfill(42);
                } else {
                    r.resolve(Resolution::thenable(Nested(depth - 1)));
                }
                Ok(())
            })))
        }
    }

    #[test]
    fn adopt_inside_then_settles_before_returning() {
        let (_, config) = config();
        let seen = Rc::new(RefCell::new(None));

        let (c, s) = (config.clone(), seen.clone());
        let p = Promise::adopt(
            &config,
            Resolution::thenable(move |r: Resolver<u32, Fault>| {
                let inner: Promise<u32, Fault> = Promise::adopt(&c, Resolution::Value(7));
                *s.borrow_mut() = Some(inner.state());
                r.fulfill(1);
                Ok(())
            }),
        );

        assert_eq!(*seen.borrow(), Some(PromiseState::Fulfilled(7)));
        assert_eq!(p.state(), PromiseState::Fulfilled(1));
    }

    #[test]
    fn settlements_inside_then_keep_call_order() {
        let (sched, config) = config();
        let (a, ra) = capture::<u32>(&config);
        let (b, rb) = capture::<u32>(&config);

        let t: Promise<u32, Fault> = Promise::adopt(
            &config.clone().deferred(),
            Resolution::thenable(move |r: Resolver<u32, Fault>| {
                r.fulfill(0);
                ra.fulfill(1);
                rb.reject(Fault::Thrown("b"));
                Ok(())
            }),
        );

        let log = Rc::new(RefCell::new(Vec::new()));
        for (name, p) in [("t", &t), ("a", &a), ("b", &b)] {
            let (l1, l2) = (log.clone(), log.clone());
            p.then(
                move |_| {
                    l1.borrow_mut().push(name);
                    Ok(Resolution::Value(()))
                },
                move |_| {
                    l2.borrow_mut().push(name);
                    Ok(Resolution::Value(()))
                },
            );
        }

        sched.run_until_idle();
        assert_eq!(*log.borrow(), vec!["t", "a", "b"]);
        assert_eq!(b.state(), PromiseState::Rejected(Fault::Thrown("b")));
    }

    #[test]
    fn panic_in_then_leaves_resolution_usable() {
        let (_, config) = config();

        let c = config.clone();
        let outcome = panic::catch_unwind(AssertUnwindSafe(move || {
            Promise::adopt(
                &c,
                Resolution::thenable(|r: Resolver<u32, Fault>| -> Result<(), Fault> {
                    r.fulfill(5);
                    panic!("then panicked");
                }),
            )
        }));
        assert!(outcome.is_err());

        let p: Promise<u32, Fault> = Promise::adopt(&config, Resolution::Value(1));
        assert_eq!(p.state(), PromiseState::Fulfilled(1));
    }

    #[test]
    fn deep_thenable_chain_does_not_grow_stack() -> Result<()> {
        let (_, config) = config();
        let p = Promise::adopt(&config, Resolution::thenable(Nested(200_000)));
        assert_eq!(p.state(), PromiseState::Fulfilled(42));
        Ok(())
    }
}

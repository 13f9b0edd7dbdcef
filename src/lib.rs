//! # `pledge`: callback futures, thenable promises and step combinators
//!
//! This crate implements a small, single-threaded future library built on
//! callbacks rather than `async`/`await`. Work is handed to a [Scheduler]
//! which runs it later on the same thread; by default that is the
//! thread-local [Executor](task::Executor), and tests drive a
//! [ManualScheduler](scheduler::ManualScheduler) with a virtual clock
//! instead.
//!
//! It provides three layers:
//!
//! - [future::Future]: a one-shot result with three outcome channels,
//!   *ready*, *error* and *abort*. Listeners registered after settlement are
//!   replayed with the stored outcome.
//! - [promise::Promise]: a fulfilled/rejected promise that chains through
//!   `then` and adopts the state of other promises and thenables.
//! - [combinator]: [Sequence](combinator::Sequence) and
//!   [Parallel](combinator::Parallel) drive a list of
//!   [Step](combinator::Step)s and report progress as each one succeeds.
//!
//! ## Example
//!
//! ```
//! use pledge::future::Future;
//! use pledge::task::Executor;
//! use std::time::Duration;
//!
//! let f: Future<&str, String> = Future::new(|s| {
//!     Executor::defer_after(Duration::from_millis(10), Box::new(move || {
//!         s.succeed("Hello, world!");
//!     }));
//!     Ok(())
//! });
//!
//! f.ready(|msg| println!("{msg}"));
//! Executor::run();
//! ```
//!
//! [Scheduler]: scheduler::Scheduler
pub mod combinator;
pub mod config;
mod error;
pub mod future;
pub mod promise;
pub mod scheduler;
pub mod task;
mod timer;

pub use error::Error;

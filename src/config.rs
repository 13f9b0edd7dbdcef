use std::{fmt, rc::Rc};

use crate::{scheduler::SchedulerRef, task::Executor};

/// When a payload runs relative to the construction of its future.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Policy {
    /// Run the payload synchronously, inside the constructor.
    #[default]
    Immediate,
    /// Hand the payload to the scheduler; it runs after the current turn.
    Deferred,
}

/// Construction options shared by every future type in this crate.
///
/// ```
/// use pledge::config::{Config, Policy};
///
/// let config = Config::default().deferred();
/// assert_eq!(config.get_policy(), Policy::Deferred);
/// ```
#[derive(Clone)]
pub struct Config {
    policy: Policy,
    scheduler: SchedulerRef,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            policy: Policy::Immediate,
            scheduler: Rc::new(Executor),
        }
    }
}

impl Config {
    pub fn new(scheduler: SchedulerRef) -> Self {
        Self {
            policy: Policy::Immediate,
            scheduler,
        }
    }

    #[must_use]
    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Shorthand for `policy(Policy::Deferred)`.
    #[must_use]
    pub fn deferred(self) -> Self {
        self.policy(Policy::Deferred)
    }

    #[must_use]
    pub fn scheduler(mut self, scheduler: SchedulerRef) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn get_policy(&self) -> Policy {
        self.policy
    }

    pub fn get_scheduler(&self) -> &SchedulerRef {
        &self.scheduler
    }

    /// Run `f` now or later, according to the policy.
    pub(crate) fn launch(&self, f: impl FnOnce() + 'static) {
        match self.policy {
            Policy::Immediate => f(),
            Policy::Deferred => self.scheduler.defer(Box::new(f)),
        }
    }

    pub(crate) fn next_id(&self) -> u64 {
        self.scheduler.next_id()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

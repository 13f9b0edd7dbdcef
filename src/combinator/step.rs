use std::fmt;

use crate::{
    config::Config,
    future::{Future, Payload, Settler},
};

/// One unit of work in a [Sequence](super::Sequence) or a
/// [Parallel](super::Parallel).
///
/// A step holds its payload until the combinator runs it, at which point the
/// payload moves into a new [Future] owned by the step.
pub struct Step<T, E, R = String> {
    payload: Option<Payload<T, E, R>>,
    future: Option<Future<T, E, R>>,
}

impl<T: 'static, E: 'static, R: 'static> Step<T, E, R> {
    pub fn new(payload: impl FnOnce(Settler<T, E, R>) -> Result<(), E> + 'static) -> Self {
        Self {
            payload: Some(Box::new(payload)),
            future: None,
        }
    }

    /// Start the step, creating its future. Returns `None` if the step has
    /// already been started.
    pub(crate) fn run(&mut self, config: &Config) -> Option<Future<T, E, R>> {
        let payload = self.payload.take()?;
        let future = Future::with_config(config, payload);
        self.future = Some(future.clone());
        Some(future)
    }

    /// The step's future, once it has been started.
    pub fn future(&self) -> Option<&Future<T, E, R>> {
        self.future.as_ref()
    }
}

impl<T, E, R> fmt::Debug for Step<T, E, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("started", &self.payload.is_none())
            .field("future", &self.future)
            .finish()
    }
}

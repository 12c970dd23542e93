//! Retry configuration.

use crate::retry::Retry;
#[cfg(feature = "async")]
use crate::retry::{DeferredRetry, Origin};
use crate::strategy::BackoffStrategy;

/// Attempt budget used when none is given.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// How many times to try and how to back off in between.
///
/// Defaults to [`DEFAULT_MAX_ATTEMPTS`] attempts with
/// [`BackoffStrategy::Immediate`]. The terminal methods start an engine.
///
/// # Examples
///
/// ```rust
/// use steadfast::{BackoffStrategy, RetryOptions};
/// use std::cell::Cell;
/// use std::time::Duration;
///
/// let calls = Cell::new(0);
/// let failed = Cell::new(false);
///
/// RetryOptions::new()
///     .with_max_attempts(5)
///     .with_strategy(BackoffStrategy::fixed_delay(Duration::from_millis(1)))
///     .run(|| {
///         calls.set(calls.get() + 1);
///         Err::<(), _>("unreachable host")
///     })
///     .final_catch(|_| failed.set(true));
///
/// assert_eq!(calls.get(), 5);
/// assert!(failed.get());
/// ```
#[derive(Debug, Clone)]
pub struct RetryOptions {
    max_attempts: u32,
    strategy: BackoffStrategy,
}

impl RetryOptions {
    /// Options with the default budget and an immediate strategy.
    pub fn new() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            strategy: BackoffStrategy::Immediate,
        }
    }

    /// Set the total number of invocations allowed, the first one included.
    ///
    /// A budget of zero never invokes the operation and finishes without an
    /// error.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the backoff strategy consulted after each failed attempt.
    pub fn with_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Get the attempt budget.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Get the backoff strategy.
    pub fn strategy(&self) -> &BackoffStrategy {
        &self.strategy
    }

    pub(crate) fn into_parts(self) -> (u32, BackoffStrategy) {
        (self.max_attempts, self.strategy)
    }

    /// Run `operation` on the calling thread until it reaches a terminal
    /// outcome. See [`crate::retry()`].
    pub fn run<'a, E, F>(self, operation: F) -> Retry<'a, E>
    where
        F: FnMut() -> Result<(), E> + 'a,
    {
        Retry::run(operation, self)
    }

    /// Run `operation` without blocking a responsive caller. See
    /// [`crate::retry_deferred()`].
    #[cfg(feature = "async")]
    pub fn run_deferred<E, F>(self, operation: F) -> DeferredRetry<E>
    where
        E: 'static,
        F: FnMut() -> Result<(), E> + Send + 'static,
    {
        self.run_deferred_from(Origin::detect(), operation)
    }

    /// Like [`RetryOptions::run_deferred`], with the caller's context given
    /// explicitly instead of detected.
    #[cfg(feature = "async")]
    pub fn run_deferred_from<E, F>(self, origin: Origin, operation: F) -> DeferredRetry<E>
    where
        E: 'static,
        F: FnMut() -> Result<(), E> + Send + 'static,
    {
        DeferredRetry::run(origin, operation, self)
    }
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self::new()
    }
}

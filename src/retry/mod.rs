//! The retry engine and its entry points.
//!
//! An engine is started by [`retry`] (synchronous) or [`retry_deferred`]
//! (off the caller's context when the caller has to stay responsive). Both
//! return a handle for attaching the two terminal callbacks:
//!
//! - [`final_catch`](Retry::final_catch) fires once, only when the last
//!   attempt failed (budget exhausted or the strategy said stop).
//! - [`final_defer`](Retry::final_defer) fires once on any terminal outcome,
//!   after the error handler.
//!
//! Handlers may be attached before or after the engine finishes. A late
//! registration is replayed immediately, so the order of events is the same
//! either way.
//!
//! # Quick Start
//!
//! ```rust
//! use steadfast::retry;
//! use std::cell::RefCell;
//!
//! let output = RefCell::new(String::new());
//!
//! retry(|| {
//!     output.borrow_mut().push_str("try");
//!     Err::<(), _>("offline")
//! })
//! .final_catch(|e| output.borrow_mut().push_str(&format!("-{}", e)))
//! .final_defer(|| output.borrow_mut().push_str("-defer"));
//!
//! assert_eq!(*output.borrow(), "trytrytry-offline-defer");
//! ```

mod machine;
#[cfg(feature = "async")]
mod worker;

use std::fmt;

use self::machine::Core;
use crate::options::RetryOptions;
use crate::strategy::BackoffStrategy;

#[cfg(feature = "async")]
use self::worker::{Command, Worker};

/// A synchronous retry engine.
///
/// By the time a `Retry` is returned the loop has already reached its
/// terminal outcome, so registered handlers run immediately and inline.
/// The lifetime lets the operation and handlers borrow from the caller.
pub struct Retry<'a, E> {
    core: Core<'a, E>,
}

impl<'a, E> Retry<'a, E> {
    pub(crate) fn run<F>(operation: F, options: RetryOptions) -> Self
    where
        F: FnMut() -> Result<(), E> + 'a,
    {
        let mut core = Core::new(Box::new(operation), options);
        core.run_blocking();
        Self { core }
    }

    /// Handle the terminal error, if the run ended in one.
    ///
    /// Never called when the operation eventually succeeded.
    pub fn final_catch<H>(mut self, handler: H) -> Self
    where
        H: FnOnce(&E) + 'a,
    {
        self.core.on_error(Box::new(handler));
        self
    }

    /// Run `handler` once the engine has finished, whatever the outcome.
    pub fn final_defer<H>(mut self, handler: H) -> Self
    where
        H: FnOnce() + 'a,
    {
        self.core.on_finish(Box::new(handler));
        self
    }

    /// Returns true once the terminal outcome has been reached.
    pub fn is_finished(&self) -> bool {
        self.core.is_finished()
    }

    /// Number of times the operation was invoked.
    pub fn attempts(&self) -> u32 {
        self.core.invocations()
    }

    /// Get the error that ended the run, if it failed.
    pub fn last_error(&self) -> Option<&E> {
        self.core.last_error()
    }

    /// Get the attempt budget.
    pub fn max_attempts(&self) -> u32 {
        self.core.max_attempts()
    }

    /// Get the backoff strategy.
    pub fn strategy(&self) -> &BackoffStrategy {
        self.core.strategy()
    }
}

impl<E: fmt::Debug> fmt::Debug for Retry<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retry").field("core", &self.core).finish()
    }
}

/// Where a deferred retry request comes from.
#[cfg(feature = "async")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The caller may be occupied: run inline with blocking sleeps.
    Blocking,
    /// The caller must stay responsive: run on a dedicated worker.
    Responsive,
}

#[cfg(feature = "async")]
impl Origin {
    /// Classify the current thread.
    ///
    /// A thread driving a tokio runtime must not block, anything else may.
    ///
    /// ```rust
    /// use steadfast::Origin;
    ///
    /// assert_eq!(Origin::detect(), Origin::Blocking);
    ///
    /// # tokio_test::block_on(async {
    /// assert_eq!(Origin::detect(), Origin::Responsive);
    /// # });
    /// ```
    pub fn detect() -> Self {
        if tokio::runtime::Handle::try_current().is_ok() {
            Origin::Responsive
        } else {
            Origin::Blocking
        }
    }
}

/// A retry engine that may run on its own worker.
///
/// When placed on a worker, every step (attempts, waits, finalization and
/// the finished check behind each registration) runs on that single thread.
/// Registrations made from the caller are queued to it in order.
#[cfg(feature = "async")]
pub struct DeferredRetry<E: 'static> {
    placement: Placement<E>,
}

#[cfg(feature = "async")]
enum Placement<E: 'static> {
    Inline(Retry<'static, E>),
    Worker(Worker<E>),
}

#[cfg(feature = "async")]
impl<E: 'static> DeferredRetry<E> {
    pub(crate) fn run<F>(origin: Origin, operation: F, options: RetryOptions) -> Self
    where
        F: FnMut() -> Result<(), E> + Send + 'static,
    {
        let placement = match origin {
            Origin::Blocking => Placement::Inline(Retry::run(operation, options)),
            Origin::Responsive => match Worker::spawn(operation, options) {
                Ok(worker) => Placement::Worker(worker),
                Err((operation, options)) => Placement::Inline(Retry::run(operation, options)),
            },
        };
        Self { placement }
    }

    /// Handle the terminal error, if the run ends in one.
    ///
    /// The finished check happens on the engine's own context, so a handler
    /// registered while attempts are still running is kept, and one
    /// registered afterwards is replayed there.
    pub fn final_catch<H>(self, handler: H) -> Self
    where
        H: FnOnce(&E) + Send + 'static,
    {
        match self.placement {
            Placement::Inline(retry) => Self {
                placement: Placement::Inline(retry.final_catch(handler)),
            },
            Placement::Worker(worker) => {
                worker.send(Command::Catch(Box::new(handler)));
                Self {
                    placement: Placement::Worker(worker),
                }
            }
        }
    }

    /// Run `handler` once the engine has finished, whatever the outcome.
    pub fn final_defer<H>(self, handler: H) -> Self
    where
        H: FnOnce() + Send + 'static,
    {
        match self.placement {
            Placement::Inline(retry) => Self {
                placement: Placement::Inline(retry.final_defer(handler)),
            },
            Placement::Worker(worker) => {
                worker.send(Command::Defer(Box::new(handler)));
                Self {
                    placement: Placement::Worker(worker),
                }
            }
        }
    }

    /// Returns true when the engine was placed on a dedicated worker.
    pub fn is_on_worker(&self) -> bool {
        match &self.placement {
            Placement::Inline(_) => false,
            Placement::Worker(_) => true,
        }
    }
}

#[cfg(feature = "async")]
impl<E: 'static> fmt::Debug for DeferredRetry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredRetry")
            .field("on_worker", &self.is_on_worker())
            .finish()
    }
}

/// Retry `operation` on the calling thread with the default options.
///
/// Tries up to [`DEFAULT_MAX_ATTEMPTS`](crate::options::DEFAULT_MAX_ATTEMPTS)
/// times without waiting and returns once the run is over. Failures never
/// propagate; attach [`Retry::final_catch`] to see the last one. Use
/// [`RetryOptions`] to change the budget or the strategy.
///
/// Waits are blocking sleeps, so don't call this from an async task with a
/// non-immediate strategy; use [`retry_deferred`] there.
///
/// # Examples
///
/// ```rust
/// use steadfast::retry;
/// use std::cell::Cell;
///
/// let calls = Cell::new(0);
/// let caught = Cell::new(false);
///
/// let engine = retry(|| {
///     calls.set(calls.get() + 1);
///     if calls.get() < 2 { Err("flaky") } else { Ok(()) }
/// })
/// .final_catch(|_| caught.set(true));
///
/// assert_eq!(engine.attempts(), 2);
/// assert!(!caught.get());
/// ```
pub fn retry<'a, E, F>(operation: F) -> Retry<'a, E>
where
    F: FnMut() -> Result<(), E> + 'a,
{
    RetryOptions::new().run(operation)
}

/// Retry `operation` without blocking a caller that has to stay responsive.
///
/// Inside a tokio runtime the engine moves onto a dedicated worker thread
/// and this returns straight away; elsewhere it runs inline like [`retry`].
/// See [`Origin::detect`].
///
/// # Examples
///
/// ```rust
/// use steadfast::retry_deferred;
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let calls = Arc::new(AtomicU32::new(0));
/// let (done_tx, done_rx) = tokio::sync::oneshot::channel();
///
/// retry_deferred({
///     let calls = calls.clone();
///     move || {
///         calls.fetch_add(1, Ordering::SeqCst);
///         Err::<(), _>("still down")
///     }
/// })
/// .final_defer(move || {
///     let _ = done_tx.send(());
/// });
///
/// done_rx.await.unwrap();
/// assert_eq!(calls.load(Ordering::SeqCst), 3);
/// # });
/// ```
#[cfg(feature = "async")]
pub fn retry_deferred<E, F>(operation: F) -> DeferredRetry<E>
where
    E: 'static,
    F: FnMut() -> Result<(), E> + Send + 'static,
{
    RetryOptions::new().run_deferred(operation)
}

/// Like [`retry_deferred`], with the caller's context stated explicitly.
#[cfg(feature = "async")]
pub fn retry_deferred_from<E, F>(origin: Origin, operation: F) -> DeferredRetry<E>
where
    E: 'static,
    F: FnMut() -> Result<(), E> + Send + 'static,
{
    RetryOptions::new().run_deferred_from(origin, operation)
}

#[cfg(test)]
mod tests;

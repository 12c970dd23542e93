//! The retry state machine shared by every execution mode.
//!
//! `Core` only knows how to run one attempt and what to do next. Whoever owns
//! it decides how a wait is performed: a blocking sleep on the caller's thread
//! or a timer on a worker.

use std::fmt;
use std::time::Duration;

use crate::options::RetryOptions;
use crate::strategy::BackoffStrategy;

pub(crate) type Operation<'a, E> = Box<dyn FnMut() -> Result<(), E> + 'a>;
pub(crate) type ErrorHandler<'a, E> = Box<dyn FnOnce(&E) + 'a>;
pub(crate) type FinishHandler<'a> = Box<dyn FnOnce() + 'a>;

/// What the owner of a [`Core`] has to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// Wait this long, then call [`Core::resume`].
    Wait(Duration),
    /// The terminal outcome was reached and handlers were dispatched.
    Finished,
}

pub(crate) struct Core<'a, E> {
    operation: Operation<'a, E>,
    max_attempts: u32,
    strategy: BackoffStrategy,
    /// Retries made so far; the initial attempt is not counted.
    attempts_made: u32,
    invocations: u32,
    last_delay: Option<Duration>,
    last_error: Option<E>,
    finished: bool,
    error_handler: Option<ErrorHandler<'a, E>>,
    finish_handler: Option<FinishHandler<'a>>,
}

impl<'a, E> Core<'a, E> {
    pub(crate) fn new(operation: Operation<'a, E>, options: RetryOptions) -> Self {
        let (max_attempts, strategy) = options.into_parts();
        Self {
            operation,
            max_attempts,
            strategy,
            attempts_made: 0,
            invocations: 0,
            last_delay: None,
            last_error: None,
            finished: false,
            error_handler: None,
            finish_handler: None,
        }
    }

    /// Make the first attempt.
    ///
    /// A zero attempt budget finishes straight away without invoking the
    /// operation and without an error.
    pub(crate) fn start(&mut self) -> Step {
        if self.max_attempts == 0 {
            #[cfg(feature = "tracing")]
            tracing::debug!("attempt budget is zero, finishing without invoking");
            self.finalize(None);
            return Step::Finished;
        }
        self.attempt()
    }

    /// Make the next attempt once the requested wait is over.
    pub(crate) fn resume(&mut self) -> Step {
        self.attempts_made += 1;
        self.attempt()
    }

    /// Drive the whole loop on the current thread, sleeping between attempts.
    pub(crate) fn run_blocking(&mut self) {
        let mut step = self.start();
        while let Step::Wait(delay) = step {
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
            step = self.resume();
        }
    }

    fn attempt(&mut self) -> Step {
        self.invocations += 1;

        let error = match (self.operation)() {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(attempt = self.invocations, "operation succeeded");
                self.finalize(None);
                return Step::Finished;
            }
            Err(error) => error,
        };

        if self.attempts_made + 1 >= self.max_attempts {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                attempt = self.invocations,
                max_attempts = self.max_attempts,
                "operation failed, attempts exhausted"
            );
            self.finalize(Some(error));
            return Step::Finished;
        }

        match self.strategy.next_delay(self.attempts_made, self.last_delay) {
            Some(delay) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    attempt = self.invocations,
                    delay_ms = delay.as_millis() as u64,
                    "operation failed, retrying"
                );
                self.last_delay = Some(delay);
                Step::Wait(delay)
            }
            None => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    attempt = self.invocations,
                    "operation failed, backoff strategy stopped retrying"
                );
                self.finalize(Some(error));
                Step::Finished
            }
        }
    }

    fn finalize(&mut self, error: Option<E>) {
        if let Some(error) = error {
            if let Some(handler) = self.error_handler.take() {
                handler(&error);
            }
            self.last_error = Some(error);
        }
        if let Some(handler) = self.finish_handler.take() {
            handler();
        }
        self.finished = true;
    }

    /// Register the error handler, or replay the terminal error into it.
    ///
    /// Before completion the latest registration wins.
    pub(crate) fn on_error(&mut self, handler: ErrorHandler<'a, E>) {
        if !self.finished {
            self.error_handler = Some(handler);
        } else if let Some(error) = &self.last_error {
            handler(error);
        }
    }

    /// Register the finish handler, or run it now if already finished.
    pub(crate) fn on_finish(&mut self, handler: FinishHandler<'a>) {
        if !self.finished {
            self.finish_handler = Some(handler);
        } else {
            handler();
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished
    }

    pub(crate) fn invocations(&self) -> u32 {
        self.invocations
    }

    pub(crate) fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub(crate) fn strategy(&self) -> &BackoffStrategy {
        &self.strategy
    }

    pub(crate) fn last_error(&self) -> Option<&E> {
        self.last_error.as_ref()
    }
}

impl<E: fmt::Debug> fmt::Debug for Core<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Core")
            .field("max_attempts", &self.max_attempts)
            .field("strategy", &self.strategy)
            .field("attempts_made", &self.attempts_made)
            .field("invocations", &self.invocations)
            .field("last_delay", &self.last_delay)
            .field("last_error", &self.last_error)
            .field("finished", &self.finished)
            .field("error_handler", &self.error_handler.is_some())
            .field("finish_handler", &self.finish_handler.is_some())
            .finish()
    }
}

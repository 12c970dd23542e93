//! Testing utilities for code that retries
//!
//! The engine itself never measures time. These helpers record when (and on
//! which thread) an operation was invoked so tests can check backoff gaps and
//! placement without hand-rolling timestamps.
//!
//! # Examples
//!
//! ## AttemptLog
//!
//! ```rust
//! use steadfast::testing::AttemptLog;
//! use steadfast::{BackoffStrategy, RetryOptions};
//! use std::time::Duration;
//!
//! let log = AttemptLog::new();
//!
//! RetryOptions::new()
//!     .with_strategy(BackoffStrategy::fixed_delay(Duration::from_millis(20)))
//!     .run(|| {
//!         log.record();
//!         Err::<(), _>("nope")
//!     });
//!
//! assert_eq!(log.count(), 3);
//! assert!(log.gaps().iter().all(|gap| *gap >= Duration::from_millis(20)));
//! ```
//!
//! ## Assertion Macros
//!
//! ```rust
//! use steadfast::assert_gap_near;
//! use std::time::Duration;
//!
//! assert_gap_near!(Duration::from_millis(105), Duration::from_millis(100), 0.1);
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

/// One recorded invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    /// When the invocation started.
    pub at: Instant,
    /// The thread it ran on.
    pub thread: ThreadId,
}

/// A shareable, thread-safe record of invocations.
///
/// Clones share the same record, so one clone can move into an operation
/// running on a worker while the test keeps another.
///
/// # Example
///
/// ```rust
/// use steadfast::testing::AttemptLog;
///
/// let log = AttemptLog::new();
/// let inner = log.clone();
///
/// inner.record();
/// inner.record();
///
/// assert_eq!(log.count(), 2);
/// assert_eq!(log.gaps().len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct AttemptLog {
    attempts: Arc<Mutex<Vec<Attempt>>>,
}

impl AttemptLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an invocation happening now on the current thread.
    pub fn record(&self) {
        let attempt = Attempt {
            at: Instant::now(),
            thread: thread::current().id(),
        };
        self.lock().push(attempt);
    }

    /// Number of recorded invocations.
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// All recorded invocations, oldest first.
    pub fn attempts(&self) -> Vec<Attempt> {
        self.lock().clone()
    }

    /// Time between each pair of consecutive invocations.
    pub fn gaps(&self) -> Vec<Duration> {
        self.lock()
            .windows(2)
            .map(|pair| pair[1].at.duration_since(pair[0].at))
            .collect()
    }

    /// Threads the invocations ran on, oldest first.
    pub fn threads(&self) -> Vec<ThreadId> {
        self.lock().iter().map(|attempt| attempt.thread).collect()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Attempt>> {
        // A panicking assertion inside an operation must not hide the record.
        self.attempts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Measures elapsed time from a starting point.
///
/// # Example
///
/// ```rust
/// use steadfast::testing::StopWatch;
/// use std::time::Duration;
///
/// let (value, took) = StopWatch::time(|| {
///     std::thread::sleep(Duration::from_millis(5));
///     42
/// });
///
/// assert_eq!(value, 42);
/// assert!(took >= Duration::from_millis(5));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct StopWatch {
    started: Instant,
}

impl StopWatch {
    /// Start measuring now.
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Time elapsed since [`StopWatch::start`].
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Elapsed time in seconds.
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }

    /// Run `work` and return its result with how long it took.
    pub fn time<T>(work: impl FnOnce() -> T) -> (T, Duration) {
        let watch = Self::start();
        let value = work();
        (value, watch.elapsed())
    }
}

/// Slack allowed around an expected gap: `expected * tolerance`, but never
/// less than 15ms of scheduler noise.
#[doc(hidden)]
pub fn gap_slack(expected: Duration, tolerance: f64) -> Duration {
    expected
        .mul_f64(tolerance.max(0.0))
        .max(Duration::from_millis(15))
}

/// Assert that a measured gap is within a relative tolerance of the expected one.
///
/// This macro will panic if `gap` lies outside `expected ± expected * tolerance`
/// (with a 15ms floor on the slack).
///
/// # Example
///
/// ```rust
/// use steadfast::assert_gap_near;
/// use std::time::Duration;
///
/// assert_gap_near!(Duration::from_millis(980), Duration::from_secs(1), 0.1);
/// ```
#[macro_export]
macro_rules! assert_gap_near {
    ($gap:expr, $expected:expr, $tolerance:expr) => {{
        let gap: ::std::time::Duration = $gap;
        let expected: ::std::time::Duration = $expected;
        let slack = $crate::testing::gap_slack(expected, $tolerance);
        if gap + slack < expected || gap > expected + slack {
            panic!(
                "Expected gap of {:?} (±{:?}), measured {:?}",
                expected, slack, gap
            );
        }
    }};
}

/// Assert that every gap between recorded invocations is below `max`.
///
/// Handy for checking that an immediate strategy really didn't wait.
///
/// # Example
///
/// ```rust
/// use steadfast::{assert_gaps_below, testing::AttemptLog};
/// use std::time::Duration;
///
/// let log = AttemptLog::new();
/// log.record();
/// log.record();
/// assert_gaps_below!(log, Duration::from_millis(10));
/// ```
#[macro_export]
macro_rules! assert_gaps_below {
    ($log:expr, $max:expr) => {{
        let max: ::std::time::Duration = $max;
        for (index, gap) in $log.gaps().into_iter().enumerate() {
            if gap >= max {
                panic!(
                    "Expected every gap below {:?}, gap {} was {:?}",
                    max, index, gap
                );
            }
        }
    }};
}

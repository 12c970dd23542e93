//! # Steadfast
//!
//! > *"Try, wait, try again - and tell me once when it's over"*
//!
//! A small retry executor. Hand it a fallible operation, an attempt budget and
//! a backoff strategy; it runs the loop for you and reports back through two
//! terminal callbacks.
//!
//! ## Philosophy
//!
//! - **Strategies are data**: [`BackoffStrategy`] never sleeps and keeps no
//!   state. An adaptive strategy gets its own previous answer handed back.
//! - **Fire and forget**: failures never propagate to the caller. Attach
//!   [`final_catch`](Retry::final_catch) to see the last one.
//! - **Attach whenever**: handlers registered after the engine finished are
//!   replayed, so there is no race between finishing and registering.
//!
//! ## Quick Example
//!
//! ```rust
//! use steadfast::{BackoffStrategy, RetryOptions};
//! use std::cell::RefCell;
//! use std::time::Duration;
//!
//! let log = RefCell::new(Vec::new());
//!
//! RetryOptions::new()
//!     .with_max_attempts(4)
//!     .with_strategy(BackoffStrategy::adaptive(|attempt, previous| {
//!         // Double the wait every time, stop after the third failure
//!         (attempt < 2).then(|| previous.map_or(Duration::from_millis(1), |d| d * 2))
//!     }))
//!     .run(|| {
//!         log.borrow_mut().push("try");
//!         Err::<(), _>("timeout")
//!     })
//!     .final_catch(|e| log.borrow_mut().push(*e))
//!     .final_defer(|| log.borrow_mut().push("done"));
//!
//! assert_eq!(*log.borrow(), vec!["try", "try", "try", "timeout", "done"]);
//! ```
//!
//! ## Deferred execution
//!
//! [`retry_deferred`] keeps a responsive caller (a thread driving a tokio
//! runtime) free: the engine moves to its own worker thread and waits with
//! timers instead of sleeping. Called from an ordinary thread it runs inline.
//!
//! ## Features
//!
//! - `async` (default): [`retry_deferred`] and the worker context.
//! - `tracing`: debug events for attempts, delays and finalization.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod options;
pub mod retry;
pub mod strategy;
pub mod testing;

// Re-exports
pub use options::{RetryOptions, DEFAULT_MAX_ATTEMPTS};
pub use retry::{retry, Retry};
#[cfg(feature = "async")]
pub use retry::{retry_deferred, retry_deferred_from, DeferredRetry, Origin};
pub use strategy::BackoffStrategy;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::options::RetryOptions;
    pub use crate::retry::{retry, Retry};
    #[cfg(feature = "async")]
    pub use crate::retry::{retry_deferred, retry_deferred_from, DeferredRetry, Origin};
    pub use crate::strategy::BackoffStrategy;
}

//! Tests for the retry engine.

use super::*;
use crate::testing::AttemptLog;
use std::cell::{Cell, RefCell};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
enum TestError {
    Flaky,
    Down(u32),
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestError::Flaky => write!(f, "flaky"),
            TestError::Down(n) => write!(f, "down #{}", n),
        }
    }
}

#[test]
fn test_sync_defaults_try_three_times() {
    let output = RefCell::new(String::new());

    retry(|| {
        output.borrow_mut().push_str("try");
        Err::<(), _>(TestError::Flaky)
    });
    output.borrow_mut().push_str("-end");

    assert_eq!(*output.borrow(), "trytrytry-end");
}

#[test]
fn test_sync_max_five_with_catch_and_defer() {
    let output = RefCell::new(String::new());
    let calls = Cell::new(0);

    RetryOptions::new()
        .with_max_attempts(5)
        .run(|| {
            calls.set(calls.get() + 1);
            output.borrow_mut().push_str("try");
            Err::<(), _>(TestError::Down(calls.get()))
        })
        .final_catch(|e| output.borrow_mut().push_str(&format!("-{}", e)))
        .final_defer(|| output.borrow_mut().push_str("-defer"));
    output.borrow_mut().push_str("-end");

    assert_eq!(*output.borrow(), "trytrytrytrytry-down #5-defer-end");
}

#[test]
fn test_success_first_try_skips_catch() {
    let output = RefCell::new(String::new());

    let engine = retry(|| {
        output.borrow_mut().push_str("try");
        Ok::<(), TestError>(())
    })
    .final_catch(|_| output.borrow_mut().push_str("-catch"))
    .final_defer(|| output.borrow_mut().push_str("-defer"));

    assert_eq!(*output.borrow(), "try-defer");
    assert_eq!(engine.attempts(), 1);
    assert!(engine.is_finished());
    assert!(engine.last_error().is_none());
}

#[test]
fn test_success_second_try() {
    let output = RefCell::new(String::new());
    let succeed = Cell::new(false);

    retry(|| {
        output.borrow_mut().push_str("try");
        if !succeed.replace(true) {
            return Err(TestError::Flaky);
        }
        Ok(())
    })
    .final_catch(|_| output.borrow_mut().push_str("-catch"));

    assert_eq!(*output.borrow(), "trytry");
}

#[test]
fn test_success_second_try_after_adaptive_delay() {
    let log = AttemptLog::new();
    let succeed = Cell::new(false);
    let caught = Cell::new(false);

    let engine = RetryOptions::new()
        .with_strategy(BackoffStrategy::adaptive(|_, _| {
            Some(Duration::from_millis(100))
        }))
        .run(|| {
            log.record();
            if succeed.replace(true) {
                Ok(())
            } else {
                Err(TestError::Flaky)
            }
        })
        .final_catch(|_| caught.set(true));

    assert_eq!(engine.attempts(), 2);
    assert!(!caught.get());
    assert!(log.gaps()[0] >= Duration::from_millis(100));
}

#[test]
fn test_immediate_strategy_does_not_wait() {
    let log = AttemptLog::new();

    RetryOptions::new().with_max_attempts(5).run(|| {
        log.record();
        Err::<(), _>(TestError::Flaky)
    });

    assert_eq!(log.count(), 5);
    crate::assert_gaps_below!(log, Duration::from_millis(10));
}

#[test]
fn test_fixed_delay_spaces_attempts() {
    let log = AttemptLog::new();

    RetryOptions::new()
        .with_max_attempts(3)
        .with_strategy(BackoffStrategy::fixed_delay(Duration::from_millis(150)))
        .run(|| {
            log.record();
            Err::<(), _>(TestError::Flaky)
        });

    assert_eq!(log.count(), 3);
    for gap in log.gaps() {
        crate::assert_gap_near!(gap, Duration::from_millis(150), 0.3);
    }
}

#[test]
fn test_adaptive_cumulative_delays() {
    let log = AttemptLog::new();

    RetryOptions::new()
        .with_max_attempts(4)
        .with_strategy(BackoffStrategy::adaptive(|_, previous| {
            Some(previous.unwrap_or_default() + Duration::from_millis(100))
        }))
        .run(|| {
            log.record();
            Err::<(), _>(TestError::Flaky)
        });

    let gaps = log.gaps();
    assert_eq!(gaps.len(), 3);
    crate::assert_gap_near!(gaps[0], Duration::from_millis(100), 0.3);
    crate::assert_gap_near!(gaps[1], Duration::from_millis(200), 0.3);
    crate::assert_gap_near!(gaps[2], Duration::from_millis(300), 0.3);
}

#[test]
fn test_adaptive_stop_overrides_budget() {
    let output = RefCell::new(String::new());

    let engine = RetryOptions::new()
        .with_max_attempts(5)
        .with_strategy(BackoffStrategy::adaptive(|attempt, _| {
            if attempt == 2 {
                None
            } else {
                Some(Duration::ZERO)
            }
        }))
        .run(|| {
            output.borrow_mut().push_str("try");
            Err::<(), _>(TestError::Flaky)
        })
        .final_catch(|_| output.borrow_mut().push_str("-catch"));

    assert_eq!(*output.borrow(), "trytrytry-catch");
    assert_eq!(engine.attempts(), 3);
    assert_eq!(engine.last_error(), Some(&TestError::Flaky));
}

#[test]
fn test_catch_receives_last_error() {
    let calls = Cell::new(0);
    let caught = RefCell::new(None);

    RetryOptions::new()
        .with_max_attempts(4)
        .run(|| {
            calls.set(calls.get() + 1);
            Err::<(), _>(TestError::Down(calls.get()))
        })
        .final_catch(|e| *caught.borrow_mut() = Some(e.clone()));

    assert_eq!(*caught.borrow(), Some(TestError::Down(4)));
}

#[test]
fn test_late_registration_replays_every_time() {
    let catches = Cell::new(0);
    let defers = Cell::new(0);

    let engine = retry(|| Err::<(), _>(TestError::Flaky));
    assert!(engine.is_finished());

    engine
        .final_catch(|_| catches.set(catches.get() + 1))
        .final_catch(|_| catches.set(catches.get() + 1))
        .final_defer(|| defers.set(defers.get() + 1));

    assert_eq!(catches.get(), 2);
    assert_eq!(defers.get(), 1);
}

#[test]
fn test_defer_before_catch_keeps_call_order() {
    let output = RefCell::new(Vec::new());

    retry(|| Err::<(), _>(TestError::Flaky))
        .final_defer(|| output.borrow_mut().push("defer"))
        .final_catch(|_| output.borrow_mut().push("catch"));

    // Late registrations fire as they are made.
    assert_eq!(*output.borrow(), vec!["defer", "catch"]);
}

#[test]
fn test_zero_budget_finishes_without_invoking() {
    let calls = Cell::new(0);
    let output = RefCell::new(String::new());

    let engine = RetryOptions::new()
        .with_max_attempts(0)
        .run(|| {
            calls.set(calls.get() + 1);
            Err::<(), _>(TestError::Flaky)
        })
        .final_catch(|_| output.borrow_mut().push_str("catch"))
        .final_defer(|| output.borrow_mut().push_str("defer"));

    assert_eq!(calls.get(), 0);
    assert_eq!(*output.borrow(), "defer");
    assert_eq!(engine.attempts(), 0);
}

#[test]
fn test_single_attempt_budget_never_consults_strategy() {
    let consulted = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let strategy = {
        let consulted = consulted.clone();
        BackoffStrategy::adaptive(move |_, _| {
            consulted.store(true, std::sync::atomic::Ordering::SeqCst);
            Some(Duration::ZERO)
        })
    };

    let engine = RetryOptions::new()
        .with_max_attempts(1)
        .with_strategy(strategy)
        .run(|| Err::<(), _>(TestError::Flaky));

    assert_eq!(engine.attempts(), 1);
    assert!(!consulted.load(std::sync::atomic::Ordering::SeqCst));
}

#[test]
fn test_sync_stays_on_calling_thread() {
    let log = AttemptLog::new();
    let handler_threads = RefCell::new(Vec::new());

    RetryOptions::new()
        .with_strategy(BackoffStrategy::fixed_delay(Duration::from_millis(20)))
        .run(|| {
            log.record();
            Err::<(), _>(TestError::Flaky)
        })
        .final_catch(|_| handler_threads.borrow_mut().push(std::thread::current().id()))
        .final_defer(|| handler_threads.borrow_mut().push(std::thread::current().id()));

    let here = std::thread::current().id();
    assert!(log.threads().iter().all(|id| *id == here));
    assert_eq!(*handler_threads.borrow(), vec![here, here]);
}

#[test]
fn test_accessors() {
    let engine = RetryOptions::new()
        .with_max_attempts(2)
        .with_strategy(BackoffStrategy::fixed_delay(Duration::from_millis(1)))
        .run(|| Err::<(), _>(TestError::Down(9)));

    assert_eq!(engine.max_attempts(), 2);
    assert_eq!(engine.attempts(), 2);
    assert!(!engine.strategy().is_immediate());
    assert_eq!(engine.last_error(), Some(&TestError::Down(9)));

    let debug = format!("{:?}", engine);
    assert!(debug.contains("Retry"));
    assert!(debug.contains("Down(9)"));
}

#[cfg(feature = "async")]
mod deferred {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::sync::oneshot;

    #[test]
    fn test_blocking_origin_runs_inline() {
        let log = AttemptLog::new();
        let output = Arc::new(Mutex::new(String::new()));

        let engine = retry_deferred_from(Origin::Blocking, {
            let log = log.clone();
            move || {
                log.record();
                Err::<(), _>(TestError::Flaky)
            }
        })
        .final_catch({
            let output = output.clone();
            move |_| output.lock().unwrap().push_str("catch-")
        })
        .final_defer({
            let output = output.clone();
            move || output.lock().unwrap().push_str("defer")
        });

        // Already finished: everything ran before the handle came back.
        assert!(!engine.is_on_worker());
        assert_eq!(log.count(), 3);
        assert_eq!(*output.lock().unwrap(), "catch-defer");
        assert!(log.threads().iter().all(|id| *id == std::thread::current().id()));
    }

    #[test]
    fn test_detect_outside_runtime_is_blocking() {
        assert_eq!(Origin::detect(), Origin::Blocking);

        let engine = retry_deferred(|| Ok::<(), TestError>(()));
        assert!(!engine.is_on_worker());
    }

    #[tokio::test]
    async fn test_detect_inside_runtime_is_responsive() {
        assert_eq!(Origin::detect(), Origin::Responsive);
    }

    #[tokio::test]
    async fn test_responsive_origin_runs_on_worker() {
        let log = AttemptLog::new();
        let (done_tx, done_rx) = oneshot::channel();

        let engine = retry_deferred({
            let log = log.clone();
            move || {
                log.record();
                Err::<(), _>(TestError::Flaky)
            }
        })
        .final_defer(move || {
            let _ = done_tx.send(std::thread::current().id());
        });

        assert!(engine.is_on_worker());
        let defer_thread = done_rx.await.unwrap();

        let threads = log.threads();
        assert_eq!(threads.len(), 3);
        assert!(threads.iter().all(|id| *id == defer_thread));
        assert_ne!(defer_thread, std::thread::current().id());
    }

    #[tokio::test]
    async fn test_worker_catch_then_defer_order() {
        let output = Arc::new(Mutex::new(String::new()));
        let (done_tx, done_rx) = oneshot::channel();

        RetryOptions::new()
            .with_max_attempts(5)
            .run_deferred({
                let output = output.clone();
                move || {
                    output.lock().unwrap().push_str("try");
                    Err::<(), _>(TestError::Flaky)
                }
            })
            .final_catch({
                let output = output.clone();
                move |e| output.lock().unwrap().push_str(&format!("-{}", e))
            })
            .final_defer({
                let output = output.clone();
                move || {
                    output.lock().unwrap().push_str("-defer");
                    let _ = done_tx.send(());
                }
            });

        done_rx.await.unwrap();
        assert_eq!(*output.lock().unwrap(), "trytrytrytrytry-flaky-defer");
    }

    #[tokio::test]
    async fn test_worker_success_skips_catch() {
        let output = Arc::new(Mutex::new(String::new()));
        let (done_tx, done_rx) = oneshot::channel();

        retry_deferred({
            let output = output.clone();
            move || {
                output.lock().unwrap().push_str("try");
                Ok::<(), TestError>(())
            }
        })
        .final_catch({
            let output = output.clone();
            move |_| output.lock().unwrap().push_str("-catch")
        })
        .final_defer({
            let output = output.clone();
            move || {
                output.lock().unwrap().push_str("-defer");
                let _ = done_tx.send(());
            }
        });

        done_rx.await.unwrap();
        assert_eq!(*output.lock().unwrap(), "try-defer");
    }

    #[tokio::test]
    async fn test_worker_fixed_delay_does_not_block_caller() {
        let log = AttemptLog::new();
        let (done_tx, done_rx) = oneshot::channel();

        let engine = RetryOptions::new()
            .with_strategy(BackoffStrategy::fixed_delay(Duration::from_millis(150)))
            .run_deferred({
                let log = log.clone();
                move || {
                    log.record();
                    Err::<(), _>(TestError::Flaky)
                }
            });

        // The caller gets the handle back long before the 300ms of waits.
        assert!(log.count() < 3);

        engine.final_defer(move || {
            let _ = done_tx.send(());
        });
        done_rx.await.unwrap();

        assert_eq!(log.count(), 3);
        for gap in log.gaps() {
            crate::assert_gap_near!(gap, Duration::from_millis(150), 0.3);
        }
    }

    #[tokio::test]
    async fn test_worker_adaptive_stop() {
        let log = AttemptLog::new();
        let (done_tx, done_rx) = oneshot::channel();

        RetryOptions::new()
            .with_max_attempts(5)
            .with_strategy(BackoffStrategy::adaptive(|attempt, _| {
                (attempt != 2).then_some(Duration::from_millis(5))
            }))
            .run_deferred({
                let log = log.clone();
                move || {
                    log.record();
                    Err::<(), _>(TestError::Flaky)
                }
            })
            .final_catch(move |e| {
                let _ = done_tx.send(e.clone());
            });

        assert_eq!(done_rx.await.unwrap(), TestError::Flaky);
        assert_eq!(log.count(), 3);
    }

    #[tokio::test]
    async fn test_worker_late_registration_replays() {
        let (first_tx, first_rx) = oneshot::channel();

        let engine = retry_deferred(|| Err::<(), _>(TestError::Down(1))).final_defer(move || {
            let _ = first_tx.send(());
        });
        first_rx.await.unwrap();

        // Finished on the worker; this catch is replayed there.
        let (late_tx, late_rx) = oneshot::channel();
        let _engine = engine.final_catch(move |e| {
            let _ = late_tx.send((e.clone(), std::thread::current().name().map(str::to_string)));
        });

        let (error, thread_name) = late_rx.await.unwrap();
        assert_eq!(error, TestError::Down(1));
        assert_eq!(thread_name.as_deref(), Some("steadfast-worker"));
    }

    #[tokio::test]
    async fn test_dropped_handle_still_runs_to_completion() {
        let log = AttemptLog::new();
        let (done_tx, done_rx) = oneshot::channel();
        let mut done_tx = Some(done_tx);

        let engine = RetryOptions::new()
            .with_strategy(BackoffStrategy::fixed_delay(Duration::from_millis(20)))
            .run_deferred({
                let log = log.clone();
                move || {
                    log.record();
                    if log.count() == 3 {
                        if let Some(tx) = done_tx.take() {
                            let _ = tx.send(());
                        }
                    }
                    Err::<(), _>(TestError::Flaky)
                }
            });
        drop(engine);

        done_rx.await.unwrap();
        assert_eq!(log.count(), 3);
    }

    #[test]
    fn test_deferred_debug() {
        let engine = retry_deferred_from(Origin::Blocking, || Ok::<(), TestError>(()));
        assert!(format!("{:?}", engine).contains("on_worker: false"));
    }
}

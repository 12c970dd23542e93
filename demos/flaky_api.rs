//! Flaky API Demo
//!
//! Retries a call to an API that only answers on its fourth request, without
//! blocking the async task that started it. Shows:
//! - An adaptive strategy that grows its own delay
//! - Deferred execution on a worker while the caller keeps going
//! - Error and finish handlers attached after the engine started
//!
//! Run with `cargo run --example flaky_api --features tracing` to also see the
//! engine's debug events.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use steadfast::{BackoffStrategy, RetryOptions};

#[derive(Debug)]
enum WebError {
    CouldNotLoadData,
}

impl std::fmt::Display for WebError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebError::CouldNotLoadData => write!(f, "could not load data"),
        }
    }
}

struct Api {
    count: AtomicU32,
}

impl Api {
    fn load_web_data(&self) -> Result<(), WebError> {
        let count = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        if count < 4 {
            Err(WebError::CouldNotLoadData)
        } else {
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .init();

    println!("=== Flaky API ===");

    let api = Arc::new(Api {
        count: AtomicU32::new(0),
    });
    let tries = Arc::new(AtomicU32::new(0));
    let (done_tx, done_rx) = tokio::sync::oneshot::channel();

    let strategy = BackoffStrategy::adaptive(|_, previous| {
        Some(previous.unwrap_or_default() + Duration::from_millis(200))
    });

    let engine = RetryOptions::new()
        .with_max_attempts(5)
        .with_strategy(strategy)
        .run_deferred({
            let api = api.clone();
            let tries = tries.clone();
            move || {
                let n = tries.fetch_add(1, Ordering::SeqCst) + 1;
                println!("  Try #{}", n);
                api.load_web_data()
            }
        });

    println!("Caller is free while the worker retries (on worker: {})", engine.is_on_worker());

    engine
        .final_catch({
            let tries = tries.clone();
            move |error| {
                println!(
                    "Failed after {} tries with error: {}",
                    tries.load(Ordering::SeqCst),
                    error
                );
            }
        })
        .final_defer({
            let tries = tries.clone();
            move || {
                println!("Finished after {} tries.", tries.load(Ordering::SeqCst));
                let _ = done_tx.send(());
            }
        });

    let _ = done_rx.await;
    println!("\n=== Done ===");
}

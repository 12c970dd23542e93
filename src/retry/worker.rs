//! A dedicated, sequential execution context for one deferred engine.
//!
//! The engine's state is built on and never leaves the worker thread. The
//! caller's handle only holds the sending half of a FIFO command queue, so
//! the "finished yet?" check behind every registration runs on the same
//! thread as the loop and can't race with finalization.

use std::thread;

use tokio::sync::{mpsc, oneshot};

use super::machine::{Core, Step};
use crate::options::RetryOptions;

/// Name given to worker threads.
const WORKER_THREAD_NAME: &str = "steadfast-worker";

/// A registration marshaled onto the worker.
pub(crate) enum Command<E> {
    Catch(Box<dyn FnOnce(&E) + Send>),
    Defer(Box<dyn FnOnce() + Send>),
}

impl<E: 'static> Command<E> {
    fn apply(self, core: &mut Core<'static, E>) {
        match self {
            Command::Catch(handler) => core.on_error(handler),
            Command::Defer(handler) => core.on_finish(handler),
        }
    }
}

/// Caller-side handle to a running worker.
pub(crate) struct Worker<E> {
    commands: mpsc::UnboundedSender<Command<E>>,
}

impl<E: 'static> Worker<E> {
    /// Start `operation` on a fresh worker thread.
    ///
    /// Hands the operation back when no thread could be started, so the
    /// caller can still run it some other way.
    pub(crate) fn spawn<F>(
        operation: F,
        options: RetryOptions,
    ) -> Result<Self, (F, RetryOptions)>
    where
        F: FnMut() -> Result<(), E> + Send + 'static,
    {
        let (handoff_tx, handoff_rx) = oneshot::channel::<(F, RetryOptions)>();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let spawned = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                if let Ok((operation, options)) = handoff_rx.blocking_recv() {
                    host(Core::new(Box::new(operation), options), commands_rx);
                }
            });

        if let Err(err) = spawned {
            #[cfg(feature = "tracing")]
            tracing::warn!("Could not start retry worker, running inline: {}", err);
            #[cfg(not(feature = "tracing"))]
            eprintln!("Could not start retry worker, running inline: {}", err);
            // The closure, and with it the receiver, is gone: nothing was sent.
            return Err((operation, options));
        }

        handoff_tx.send((operation, options))?;

        Ok(Self {
            commands: commands_tx,
        })
    }

    /// Queue a registration behind everything sent before it.
    pub(crate) fn send(&self, command: Command<E>) {
        if self.commands.send(command).is_err() {
            #[cfg(feature = "tracing")]
            tracing::warn!("Retry worker is gone, dropping handler");
            #[cfg(not(feature = "tracing"))]
            eprintln!("Retry worker is gone, dropping handler");
        }
    }
}

/// Run the engine to completion on the current (worker) thread, then keep
/// serving late registrations until the caller's handle is dropped.
fn host<E: 'static>(core: Core<'static, E>, commands: mpsc::UnboundedReceiver<Command<E>>) {
    #[cfg(feature = "tracing")]
    tracing::debug!("retry worker started");

    match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime.block_on(drive(core, commands)),
        Err(err) => {
            #[cfg(feature = "tracing")]
            tracing::warn!("Could not build worker runtime, sleeping instead: {}", err);
            #[cfg(not(feature = "tracing"))]
            eprintln!("Could not build worker runtime, sleeping instead: {}", err);
            drive_blocking(core, commands);
        }
    }

    #[cfg(feature = "tracing")]
    tracing::debug!("retry worker stopped");
}

async fn drive<E: 'static>(
    mut core: Core<'static, E>,
    mut commands: mpsc::UnboundedReceiver<Command<E>>,
) {
    let mut step = core.start();

    while let Step::Wait(delay) = step {
        if delay.is_zero() {
            while let Ok(command) = commands.try_recv() {
                command.apply(&mut core);
            }
        } else {
            // The worker stays free for registrations until the timer fires.
            let timer = tokio::time::sleep(delay);
            tokio::pin!(timer);
            loop {
                tokio::select! {
                    biased;
                    Some(command) = commands.recv() => command.apply(&mut core),
                    () = &mut timer => break,
                }
            }
        }
        step = core.resume();
    }

    while let Some(command) = commands.recv().await {
        command.apply(&mut core);
    }
}

fn drive_blocking<E: 'static>(
    mut core: Core<'static, E>,
    mut commands: mpsc::UnboundedReceiver<Command<E>>,
) {
    let mut step = core.start();

    while let Step::Wait(delay) = step {
        while let Ok(command) = commands.try_recv() {
            command.apply(&mut core);
        }
        thread::sleep(delay);
        step = core.resume();
    }

    while let Some(command) = commands.blocking_recv() {
        command.apply(&mut core);
    }
}

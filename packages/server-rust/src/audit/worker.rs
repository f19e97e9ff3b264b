//! Background worker that drains a bounded task queue.
//!
//! Provides a generic `BackgroundWorker<R>` that processes tasks from an mpsc
//! channel via a `BackgroundRunnable` implementation. Producers keep the
//! sending half and enqueue with `try_send`, which never waits, so request
//! paths are never blocked by a slow consumer.

use std::marker::PhantomData;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

// ---------------------------------------------------------------------------
// BackgroundRunnable trait
// ---------------------------------------------------------------------------

/// Trait for task handlers executed by `BackgroundWorker`.
///
/// Implementors define how individual tasks are processed and how to clean
/// up on shutdown.
#[async_trait]
pub trait BackgroundRunnable: Send + 'static {
    /// The type of task this runnable processes.
    type Task: Send + 'static;

    /// Process a single task.
    async fn run(&mut self, task: Self::Task);

    /// Called once after the queue has been drained on shutdown. Default is a no-op.
    async fn shutdown(&mut self) {}
}

// ---------------------------------------------------------------------------
// BackgroundWorker
// ---------------------------------------------------------------------------

/// Generic background worker that processes tasks via an mpsc channel.
///
/// The worker spawns a tokio task that:
/// 1. Listens for tasks on the mpsc channel
/// 2. Calls `BackgroundRunnable::run()` for each task, one at a time
/// 3. On stop, closes the channel and runs every task already queued
/// 4. Calls `BackgroundRunnable::shutdown()` last
pub struct BackgroundWorker<R: BackgroundRunnable> {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
    _runnable: PhantomData<fn() -> R>,
}

impl<R: BackgroundRunnable> BackgroundWorker<R> {
    /// Start the worker on the receiving half of a channel. Producers hold
    /// their own clones of the sender.
    pub fn start(mut runnable: R, mut rx: mpsc::Receiver<R::Task>) -> Self {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    task = rx.recv() => {
                        match task {
                            Some(t) => runnable.run(t).await,
                            None => break, // All senders dropped.
                        }
                    }
                    _ = &mut shutdown_rx => {
                        // Refuse new tasks, then finish what is already queued.
                        rx.close();
                        while let Some(t) = rx.recv().await {
                            runnable.run(t).await;
                        }
                        break;
                    }
                }
            }

            runnable.shutdown().await;
        });

        Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
            _runnable: PhantomData,
        }
    }

    /// Stop the worker gracefully, waiting for queued tasks to be processed.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

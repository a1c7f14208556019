//! Shared client runtime resources: worker pool and event bus.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::events::EventBus;

/// Executor for background work, with an explicit shutdown state.
///
/// Thin wrapper over the tokio runtime the client runs on. Once `shutdown`
/// is called, new submissions are refused and periodic tasks stop at their
/// next tick boundary; work already running is left to finish.
pub struct WorkerPool {
    shutting_down: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new() -> Self {
        Self {
            shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns false once shutdown has begun.
    pub fn is_active(&self) -> bool {
        !self.shutting_down.load(Ordering::Acquire)
    }

    /// Submits a future for execution. Returns false (with a debug log)
    /// when the pool is shutting down.
    pub fn submit<F>(&self, future: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if !self.is_active() {
            debug!("worker pool is shut down, dropping submission");
            return false;
        }
        tokio::spawn(future);
        true
    }

    /// Runs `tick` every `period`, starting one period from now.
    ///
    /// Missed ticks are skipped rather than bursted, so a stalled runtime
    /// does not produce a tick flurry when it catches up. The loop exits on
    /// its own once the pool shuts down; [`ScheduledTask::cancel`] stops it
    /// earlier.
    pub fn schedule_at_fixed_rate<F>(&self, period: Duration, mut tick: F) -> ScheduledTask
    where
        F: FnMut() + Send + 'static,
    {
        let shutting_down = Arc::clone(&self.shutting_down);
        let handle = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if shutting_down.load(Ordering::Acquire) {
                    break;
                }
                tick();
            }
        });
        ScheduledTask { handle }
    }

    /// Begins shutdown: subsequent submissions are refused and periodic
    /// loops exit at their next tick.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a periodic task created by [`WorkerPool::schedule_at_fixed_rate`].
pub struct ScheduledTask {
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Stops the task at its next tick boundary. A tick body already
    /// running is not interrupted.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Returns true once the task has stopped (cancelled or exited).
    pub fn is_stopped(&self) -> bool {
        self.handle.is_finished()
    }
}

/// The injected resource bundle the coordination core runs on.
#[derive(Clone)]
pub struct ClientResources {
    worker_pool: Arc<WorkerPool>,
    event_bus: Arc<EventBus>,
}

impl ClientResources {
    pub fn new() -> Self {
        Self {
            worker_pool: Arc::new(WorkerPool::new()),
            event_bus: Arc::new(EventBus::new()),
        }
    }

    pub fn worker_pool(&self) -> &Arc<WorkerPool> {
        &self.worker_pool
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Shuts down the worker pool. Event-bus subscribers stay usable until
    /// dropped.
    pub fn shutdown(&self) {
        self.worker_pool.shutdown();
    }
}

impl Default for ClientResources {
    fn default() -> Self {
        Self::new()
    }
}

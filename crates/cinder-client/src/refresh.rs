//! Adaptive and periodic cluster topology refresh scheduling.
//!
//! Wire-level signals (MOVED/ASK redirects, persistent reconnects,
//! uncovered slots, unknown nodes) and a fixed-rate timer both funnel into
//! one single-flight refresh task. Adaptive signals are debounced, so a
//! redirect storm schedules one reload instead of thousands.
//!
//! Refresh is best-effort background work: reload failures are logged and
//! never surfaced to callers; the next tick or trigger simply tries again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::{debug, trace, warn};

use crate::error::BoxError;
use crate::events::{AdaptiveRefreshTriggeredEvent, ClusterEvent, EventBus, PartitionsSupplier};
use crate::options::{ClusterClientOptions, RefreshTrigger, TopologyRefreshOptions};
use crate::resources::{ClientResources, ScheduledTask, WorkerPool};
use crate::timeout::Timeout;
use crate::BoxFuture;

/// Supplier of the current client options. Re-read on every tick and
/// trigger, so live options swaps take effect immediately.
pub type OptionsSupplier = Arc<dyn Fn() -> ClusterClientOptions + Send + Sync>;

/// Performs one topology discovery round. Must be idempotent.
pub type ReloadTopology = Arc<dyn Fn() -> BoxFuture<Result<(), BoxError>> + Send + Sync>;

/// Wire-level signals observed by the cluster connection layer.
///
/// Implemented by [`TopologyRefreshScheduler`]; invoked from I/O paths, so
/// every method must stay non-blocking.
pub trait ClusterEventListener: Send + Sync {
    /// An `ASK` redirect was received.
    fn on_ask_redirection(&self);

    /// A `MOVED` redirect was received.
    fn on_moved_redirection(&self);

    /// A node connection finished its `attempt`-th consecutive reconnect.
    fn on_reconnect_attempt(&self, attempt: u32);

    /// A command hashed to a slot no known node serves.
    fn on_uncovered_slot(&self, slot: u16);

    /// A response referenced a node missing from the current topology.
    fn on_unknown_node(&self);
}

/// Single-flight wrapper around the injected reload step.
struct RefreshTask {
    in_progress: AtomicBool,
    reload: ReloadTopology,
}

impl RefreshTask {
    fn new(reload: ReloadTopology) -> Self {
        Self {
            in_progress: AtomicBool::new(false),
            reload,
        }
    }

    fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Runs one reload unless one is already in flight.
    async fn run(&self) {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("topology refresh already in progress");
            return;
        }

        // reset on every exit path, including a panicking reload future
        let _reset = ResetFlag(&self.in_progress);

        debug!("requesting topology refresh");
        if let Err(error) = (self.reload)().await {
            warn!("cannot refresh cluster topology: {error}");
        }
    }
}

struct ResetFlag<'a>(&'a AtomicBool);

impl Drop for ResetFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Schedules and initiates cluster topology refresh.
///
/// All state is atomic: the activation flag and the single-flight flag are
/// compare-exchanged booleans, the debounce window and the periodic handle
/// are swap-on-update references. No locks are held on any path.
pub struct TopologyRefreshScheduler {
    client_options: OptionsSupplier,
    partitions: PartitionsSupplier,
    worker_pool: Arc<WorkerPool>,
    event_bus: Arc<EventBus>,
    refresh_task: Arc<RefreshTask>,
    /// Debounce window for adaptive triggers.
    timeout_ref: ArcSwapOption<Timeout>,
    activated: AtomicBool,
    periodic_task: ArcSwapOption<ScheduledTask>,
}

impl TopologyRefreshScheduler {
    /// Creates a scheduler. Nothing runs until
    /// [`activate_periodic_if_needed`](Self::activate_periodic_if_needed)
    /// or an adaptive trigger fires.
    pub fn new(
        client_options: OptionsSupplier,
        partitions: PartitionsSupplier,
        reload: ReloadTopology,
        resources: &ClientResources,
    ) -> Self {
        Self {
            client_options,
            partitions,
            worker_pool: Arc::clone(resources.worker_pool()),
            event_bus: Arc::clone(resources.event_bus()),
            refresh_task: Arc::new(RefreshTask::new(reload)),
            timeout_ref: ArcSwapOption::empty(),
            activated: AtomicBool::new(false),
            periodic_task: ArcSwapOption::empty(),
        }
    }

    /// Starts the fixed-rate refresh timer if periodic refresh is enabled
    /// and no timer is running yet. Idempotent: any interleaving of calls
    /// schedules exactly one timer.
    pub fn activate_periodic_if_needed(&self) {
        let options = (self.client_options)();
        let refresh = options.topology_refresh;

        if !refresh.periodic_refresh_enabled || self.activated.load(Ordering::Acquire) {
            return;
        }

        if self
            .activated
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            debug!(period = ?refresh.refresh_period, "activating periodic topology refresh");

            let client_options = Arc::clone(&self.client_options);
            let worker_pool = Arc::clone(&self.worker_pool);
            let refresh_task = Arc::clone(&self.refresh_task);

            let task = self
                .worker_pool
                .schedule_at_fixed_rate(refresh.refresh_period, move || {
                    trace!("periodic topology refresh tick");
                    if !(client_options)().refresh_cluster_view {
                        debug!("periodic topology refresh is disabled");
                        return;
                    }
                    submit_refresh(&worker_pool, &refresh_task);
                });
            self.periodic_task.store(Some(Arc::new(task)));
        }
    }

    /// Cancels the periodic refresh timer. A refresh task already
    /// submitted still runs to completion.
    pub fn suspend_periodic(&self) {
        if self
            .activated
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            if let Some(task) = self.periodic_task.swap(None) {
                debug!("suspending periodic topology refresh");
                task.cancel();
            }
        }
    }

    /// Returns true while a topology reload is running.
    pub fn is_refresh_in_progress(&self) -> bool {
        self.refresh_task.is_in_progress()
    }

    fn refresh_options(&self) -> TopologyRefreshOptions {
        (self.client_options)().topology_refresh
    }

    fn is_enabled(&self, trigger: RefreshTrigger) -> bool {
        self.refresh_options()
            .adaptive_refresh_triggers
            .contains(&trigger)
    }

    /// Debounce plus submit. Returns true when this signal actually
    /// scheduled a refresh.
    fn indicate_refresh(&self) -> bool {
        if !self.acquire_timeout() {
            return false;
        }
        submit_refresh(&self.worker_pool, &self.refresh_task)
    }

    /// Claims the debounce window. Exactly one signal per window succeeds:
    /// the compare-and-swap on the timeout slot decides races, and the
    /// loser's signal is covered by the winner's refresh.
    fn acquire_timeout(&self) -> bool {
        let current = self.timeout_ref.load();
        if let Some(timeout) = current.as_ref() {
            if !timeout.is_expired() {
                return false;
            }
        }

        let next = Arc::new(Timeout::new(self.refresh_options().adaptive_refresh_timeout));
        let previous = self.timeout_ref.compare_and_swap(&*current, Some(next));
        // the swap took effect iff the slot still held what was observed
        ptr_eq_opt(previous.as_ref(), current.as_ref())
    }

    fn emit_event(&self, event: AdaptiveRefreshTriggeredEvent) {
        debug!(trigger = ?event.trigger(), "adaptive refresh event");
        self.event_bus
            .publish(ClusterEvent::AdaptiveRefreshTriggered(event));
    }

    /// Callable carried by adaptive events; re-enters the health-gated
    /// submit path.
    fn run_refresh_callable(&self) -> Arc<dyn Fn() -> bool + Send + Sync> {
        let worker_pool = Arc::clone(&self.worker_pool);
        let refresh_task = Arc::clone(&self.refresh_task);
        Arc::new(move || submit_refresh(&worker_pool, &refresh_task))
    }
}

impl ClusterEventListener for TopologyRefreshScheduler {
    fn on_ask_redirection(&self) {
        if self.is_enabled(RefreshTrigger::AskRedirect) && self.indicate_refresh() {
            self.emit_event(AdaptiveRefreshTriggeredEvent::generic(
                RefreshTrigger::AskRedirect,
                Arc::clone(&self.partitions),
                self.run_refresh_callable(),
            ));
        }
    }

    fn on_moved_redirection(&self) {
        if self.is_enabled(RefreshTrigger::MovedRedirect) && self.indicate_refresh() {
            self.emit_event(AdaptiveRefreshTriggeredEvent::generic(
                RefreshTrigger::MovedRedirect,
                Arc::clone(&self.partitions),
                self.run_refresh_callable(),
            ));
        }
    }

    fn on_reconnect_attempt(&self, attempt: u32) {
        if self.is_enabled(RefreshTrigger::PersistentReconnects)
            && attempt >= self.refresh_options().refresh_triggers_reconnect_attempts
            && self.indicate_refresh()
        {
            self.emit_event(AdaptiveRefreshTriggeredEvent::persistent_reconnects(
                attempt,
                Arc::clone(&self.partitions),
                self.run_refresh_callable(),
            ));
        }
    }

    fn on_uncovered_slot(&self, slot: u16) {
        if self.is_enabled(RefreshTrigger::UncoveredSlot) && self.indicate_refresh() {
            self.emit_event(AdaptiveRefreshTriggeredEvent::uncovered_slot(
                slot,
                Arc::clone(&self.partitions),
                self.run_refresh_callable(),
            ));
        }
    }

    fn on_unknown_node(&self) {
        if self.is_enabled(RefreshTrigger::UnknownNode) && self.indicate_refresh() {
            self.emit_event(AdaptiveRefreshTriggeredEvent::generic(
                RefreshTrigger::UnknownNode,
                Arc::clone(&self.partitions),
                self.run_refresh_callable(),
            ));
        }
    }
}

/// Submits the refresh task if the worker pool is still healthy.
fn submit_refresh(worker_pool: &WorkerPool, refresh_task: &Arc<RefreshTask>) -> bool {
    if !worker_pool.is_active() {
        debug!("cannot schedule topology refresh, worker pool is shut down");
        return false;
    }
    let task = Arc::clone(refresh_task);
    worker_pool.submit(async move { task.run().await })
}

fn ptr_eq_opt<T>(a: Option<&Arc<T>>, b: Option<&Arc<T>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        _ => false,
    }
}

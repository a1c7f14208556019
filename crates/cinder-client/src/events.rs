//! Event bus and the events the coordination core publishes on it.
//!
//! Fire-and-forget fan-out over a broadcast channel: publishers never
//! block, and events published with no subscriber are simply dropped.

use std::fmt;
use std::sync::Arc;

use cinder_cluster::Partitions;
use tokio::sync::broadcast;

use crate::options::RefreshTrigger;

/// Cheap accessor to the current topology snapshot.
pub type PartitionsSupplier = Arc<dyn Fn() -> Arc<Partitions> + Send + Sync>;

/// Buffered events per subscriber before slow consumers start missing
/// events.
const EVENT_BUS_CAPACITY: usize = 256;

/// Events emitted by the coordination core.
#[derive(Debug, Clone)]
pub enum ClusterEvent {
    /// A wire-level signal scheduled an adaptive topology refresh.
    AdaptiveRefreshTriggered(AdaptiveRefreshTriggeredEvent),
}

/// Fan-out of client events to any number of subscribers.
pub struct EventBus {
    tx: broadcast::Sender<ClusterEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_BUS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishes an event. Dropped silently when nobody subscribes.
    pub fn publish(&self, event: ClusterEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribes to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ClusterEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Published when an adaptive trigger actually scheduled a refresh (i.e.
/// it passed the debounce window and the executor accepted the task).
///
/// Carries the topology snapshot as seen at trigger time and a callable
/// that re-submits the refresh, letting subscribers force another round
/// after acting on the event.
#[derive(Clone)]
pub struct AdaptiveRefreshTriggeredEvent {
    trigger: RefreshTrigger,
    attempt: Option<u32>,
    slot: Option<u16>,
    partitions: PartitionsSupplier,
    run_refresh: Arc<dyn Fn() -> bool + Send + Sync>,
}

impl AdaptiveRefreshTriggeredEvent {
    pub(crate) fn generic(
        trigger: RefreshTrigger,
        partitions: PartitionsSupplier,
        run_refresh: Arc<dyn Fn() -> bool + Send + Sync>,
    ) -> Self {
        Self {
            trigger,
            attempt: None,
            slot: None,
            partitions,
            run_refresh,
        }
    }

    pub(crate) fn persistent_reconnects(
        attempt: u32,
        partitions: PartitionsSupplier,
        run_refresh: Arc<dyn Fn() -> bool + Send + Sync>,
    ) -> Self {
        Self {
            trigger: RefreshTrigger::PersistentReconnects,
            attempt: Some(attempt),
            slot: None,
            partitions,
            run_refresh,
        }
    }

    pub(crate) fn uncovered_slot(
        slot: u16,
        partitions: PartitionsSupplier,
        run_refresh: Arc<dyn Fn() -> bool + Send + Sync>,
    ) -> Self {
        Self {
            trigger: RefreshTrigger::UncoveredSlot,
            attempt: None,
            slot: Some(slot),
            partitions,
            run_refresh,
        }
    }

    /// The signal kind that fired.
    pub fn trigger(&self) -> RefreshTrigger {
        self.trigger
    }

    /// Reconnect attempt count, for `PersistentReconnects` events.
    pub fn attempt(&self) -> Option<u32> {
        self.attempt
    }

    /// The uncovered slot, for `UncoveredSlot` events.
    pub fn slot(&self) -> Option<u16> {
        self.slot
    }

    /// Topology snapshot as of the trigger.
    pub fn partitions(&self) -> Arc<Partitions> {
        (self.partitions)()
    }

    /// Re-submits the refresh task. Returns false when the executor is
    /// shut down.
    pub fn run_refresh(&self) -> bool {
        (self.run_refresh)()
    }
}

impl fmt::Debug for AdaptiveRefreshTriggeredEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptiveRefreshTriggeredEvent")
            .field("trigger", &self.trigger)
            .field("attempt", &self.attempt)
            .field("slot", &self.slot)
            .finish_non_exhaustive()
    }
}

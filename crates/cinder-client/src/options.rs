//! Client configuration for topology refresh behavior.

use std::collections::HashSet;
use std::time::Duration;

/// A wire-level signal kind that can trigger an adaptive topology refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshTrigger {
    /// A `MOVED` redirect was received.
    MovedRedirect,
    /// An `ASK` redirect was received.
    AskRedirect,
    /// A node connection keeps reconnecting without success.
    PersistentReconnects,
    /// A command hashed to a slot no known node serves.
    UncoveredSlot,
    /// A response referenced a node missing from the current topology.
    UnknownNode,
}

impl RefreshTrigger {
    /// All trigger kinds.
    pub const ALL: [RefreshTrigger; 5] = [
        RefreshTrigger::MovedRedirect,
        RefreshTrigger::AskRedirect,
        RefreshTrigger::PersistentReconnects,
        RefreshTrigger::UncoveredSlot,
        RefreshTrigger::UnknownNode,
    ];
}

/// Controls when and how often the client re-discovers cluster topology.
#[derive(Debug, Clone)]
pub struct TopologyRefreshOptions {
    /// Whether the fixed-rate refresh timer may be started at all.
    pub periodic_refresh_enabled: bool,
    /// Interval between periodic refresh ticks.
    pub refresh_period: Duration,
    /// Which wire-level signals trigger an adaptive refresh.
    pub adaptive_refresh_triggers: HashSet<RefreshTrigger>,
    /// Debounce window: within it, at most one adaptive trigger schedules
    /// a refresh.
    pub adaptive_refresh_timeout: Duration,
    /// Minimum consecutive reconnect attempts before the
    /// `PersistentReconnects` trigger fires.
    pub refresh_triggers_reconnect_attempts: u32,
}

impl Default for TopologyRefreshOptions {
    /// Conservative defaults: no periodic timer, no adaptive triggers.
    fn default() -> Self {
        Self {
            periodic_refresh_enabled: false,
            refresh_period: Duration::from_secs(60),
            adaptive_refresh_triggers: HashSet::new(),
            adaptive_refresh_timeout: Duration::from_secs(30),
            refresh_triggers_reconnect_attempts: 5,
        }
    }
}

impl TopologyRefreshOptions {
    /// Enables periodic refresh and every adaptive trigger, keeping the
    /// default period, debounce window, and reconnect threshold.
    pub fn enabled() -> Self {
        Self {
            periodic_refresh_enabled: true,
            adaptive_refresh_triggers: RefreshTrigger::ALL.into_iter().collect(),
            ..Self::default()
        }
    }
}

/// Top-level client options consumed by the coordination core.
///
/// Suppliers re-read these on every tick and trigger, so a live options
/// swap takes effect without restarting the scheduler.
#[derive(Debug, Clone, Default)]
pub struct ClusterClientOptions {
    /// Master enable for periodic refresh dispatch. A running timer whose
    /// ticks see this as `false` skips the reload but keeps ticking.
    pub refresh_cluster_view: bool,
    /// Topology refresh tuning.
    pub topology_refresh: TopologyRefreshOptions,
}

impl ClusterClientOptions {
    /// Options with periodic and adaptive refresh fully enabled.
    pub fn enabled() -> Self {
        Self {
            refresh_cluster_view: true,
            topology_refresh: TopologyRefreshOptions::enabled(),
        }
    }
}

//! Refresh scenarios: debounced adaptive triggers, gated single-flight
//! reloads, and a full storm-to-new-topology round trip.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cinder_client::{
    ClientResources, ClusterClientOptions, ClusterEvent, ClusterEventListener, ConnectionBroker,
    RefreshTrigger, ReloadTopology, TopologyRefreshOptions, TopologyRefreshScheduler,
};
use tokio::sync::watch;
use tokio::time::sleep;

use crate::helpers::{
    fake_factory, fixed_options, init_tracing, scripted_reload, single_node_topology,
    two_node_topology, PartitionsHolder,
};

fn adaptive_options(window: Duration) -> ClusterClientOptions {
    ClusterClientOptions {
        refresh_cluster_view: true,
        topology_refresh: TopologyRefreshOptions {
            adaptive_refresh_triggers: RefreshTrigger::ALL.into_iter().collect(),
            adaptive_refresh_timeout: window,
            ..TopologyRefreshOptions::default()
        },
    }
}

#[tokio::test]
async fn redirect_storm_collapses_into_one_reload_and_one_event() {
    init_tracing();
    let resources = ClientResources::new();
    let holder = PartitionsHolder::new(single_node_topology());
    let (reload, reload_calls) = scripted_reload(&holder, two_node_topology);

    let scheduler = TopologyRefreshScheduler::new(
        fixed_options(adaptive_options(Duration::from_millis(200))),
        holder.supplier(),
        reload,
        &resources,
    );
    let mut events = resources.event_bus().subscribe();

    for _ in 0..1000 {
        scheduler.on_moved_redirection();
    }
    sleep(Duration::from_millis(50)).await;

    assert_eq!(reload_calls.load(Ordering::SeqCst), 1);

    let ClusterEvent::AdaptiveRefreshTriggered(event) = events.recv().await.unwrap();
    assert_eq!(event.trigger(), RefreshTrigger::MovedRedirect);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn gated_reload_blocks_further_reloads_until_released() {
    init_tracing();
    let resources = ClientResources::new();
    let (gate_tx, gate_rx) = watch::channel(false);
    let reload_calls = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&reload_calls);
    let reload: ReloadTopology = Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        let mut gate = gate_rx.clone();
        Box::pin(async move {
            let _ = gate.wait_for(|open| *open).await;
            Ok(())
        })
    });

    let holder = PartitionsHolder::new(single_node_topology());
    let scheduler = TopologyRefreshScheduler::new(
        fixed_options(adaptive_options(Duration::from_millis(1))),
        holder.supplier(),
        reload,
        &resources,
    );

    scheduler.on_moved_redirection();
    sleep(Duration::from_millis(10)).await;
    assert!(scheduler.is_refresh_in_progress());

    // every trigger is past the debounce window, yet the gated reload
    // keeps the flight count at one
    for _ in 0..10 {
        scheduler.on_moved_redirection();
        sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(reload_calls.load(Ordering::SeqCst), 1);

    gate_tx.send_replace(true);
    sleep(Duration::from_millis(10)).await;
    assert!(!scheduler.is_refresh_in_progress());

    scheduler.on_moved_redirection();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(reload_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn storm_reload_swaps_topology_and_broker_follows() {
    init_tracing();
    let resources = ClientResources::new();
    let holder = PartitionsHolder::new(single_node_topology());
    let (reload, reload_calls) = scripted_reload(&holder, two_node_topology);

    let scheduler = TopologyRefreshScheduler::new(
        fixed_options(adaptive_options(Duration::from_secs(60))),
        holder.supplier(),
        reload,
        &resources,
    );
    let mut events = resources.event_bus().subscribe();

    let (factory, factory_handle) = fake_factory(Duration::ZERO);
    let broker = ConnectionBroker::new(factory);

    // initial topology: one node serves everything
    let owner = holder.get().node_for_slot(9000).unwrap().addr.unwrap();
    broker.get_connection(owner.to_string()).await.unwrap();

    // a slot moved: the server answers MOVED, the client signals it
    for _ in 0..100 {
        scheduler.on_moved_redirection();
    }
    sleep(Duration::from_millis(50)).await;
    assert_eq!(reload_calls.load(Ordering::SeqCst), 1);

    // the event's snapshot accessor sees the topology the reload installed
    let ClusterEvent::AdaptiveRefreshTriggered(event) = events.recv().await.unwrap();
    assert_eq!(event.partitions().len(), 2);

    // slot 9000 now lives on the second node; the broker opens exactly one
    // new connection for it
    let moved_owner = holder.get().node_for_slot(9000).unwrap().addr.unwrap();
    assert_ne!(owner, moved_owner);
    let connection = broker.get_connection(moved_owner.to_string()).await.unwrap();
    assert_eq!(connection.key, moved_owner.to_string());
    assert_eq!(factory_handle.calls.load(Ordering::SeqCst), 2);
    assert_eq!(broker.connection_count(), 2);

    broker.close().await;
}

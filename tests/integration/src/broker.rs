//! Broker scenarios: deduplicated establishment, retry after failure,
//! orderly shutdown.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use cinder_client::{BrokerError, ConnectionBroker};
use tokio::time::sleep;

use crate::helpers::{fake_factory, init_tracing};

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn burst_of_requests_shares_one_connect() {
    init_tracing();
    let (factory, handle) = fake_factory(Duration::from_millis(50));
    let broker = Arc::new(ConnectionBroker::new(factory));

    let mut waiters = Vec::new();
    for _ in 0..100 {
        let broker = Arc::clone(&broker);
        waiters.push(tokio::spawn(async move {
            broker.get_connection("127.0.0.1:7000".to_string()).await
        }));
    }

    let mut connections = Vec::new();
    for waiter in waiters {
        connections.push(waiter.await.unwrap().unwrap());
    }

    assert_eq!(handle.calls.load(Ordering::SeqCst), 1);
    for connection in &connections[1..] {
        assert!(Arc::ptr_eq(&connections[0], connection));
    }
    assert_eq!(broker.connection_count(), 1);
}

#[tokio::test]
async fn failed_connect_is_retried_with_a_fresh_attempt() {
    init_tracing();
    let (factory, handle) = fake_factory(Duration::ZERO);
    let broker = ConnectionBroker::new(factory);

    handle.fail_next.store(true, Ordering::SeqCst);
    let err = broker
        .get_connection("127.0.0.1:7001".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::Connect(_)));
    assert_eq!(broker.connection_count(), 0);

    let connection = broker
        .get_connection("127.0.0.1:7001".to_string())
        .await
        .unwrap();
    assert_eq!(handle.calls.load(Ordering::SeqCst), 2);
    assert!(!connection.is_closed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn close_tears_down_established_and_pending_connections() {
    init_tracing();
    let (factory, _handle) = fake_factory(Duration::from_millis(30));
    let broker = Arc::new(ConnectionBroker::new(factory));

    let a = broker.get_connection("127.0.0.1:7000".to_string()).await.unwrap();
    let b = broker.get_connection("127.0.0.1:7001".to_string()).await.unwrap();

    // leave one establishment in flight
    let pending = {
        let broker = Arc::clone(&broker);
        tokio::spawn(async move {
            broker.get_connection("127.0.0.1:7002".to_string()).await
        })
    };
    sleep(Duration::from_millis(5)).await;

    broker.close().await;

    assert!(a.is_closed());
    assert!(b.is_closed());
    assert!(matches!(
        pending.await.unwrap().unwrap_err(),
        BrokerError::Cancelled
    ));

    let err = broker
        .get_connection("127.0.0.1:7000".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::Closed));
}

//! Non-blocking, deduplicating provider of node connections.
//!
//! `get_connection` requests for the same key share one establishment
//! attempt: the first caller triggers the connection factory, every
//! concurrent caller awaits the same outcome. Establishment runs on its
//! own task, so it makes progress even when no caller is waiting, and a
//! caller dropping its future never cancels the shared attempt — only
//! [`ConnectionBroker::close`] and [`ConnectionBroker::close_key`] do.
//!
//! Failed attempts are evicted from the registry before the failure is
//! published, so the next request for the same key starts a fresh attempt.

use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::error::{BoxError, BrokerError};
use crate::BoxFuture;

/// Produces the connection for a key. Invoked at most once per key per
/// establishment cycle; must be callable from any thread.
pub type ConnectionFactory<K, T> =
    Arc<dyn Fn(&K) -> BoxFuture<Result<T, BoxError>> + Send + Sync>;

/// Capability bound for brokered connections: asynchronous close.
///
/// Dropping a connection also releases it (RAII); `close_async` exists so
/// the broker can wait for an orderly teardown.
pub trait AsyncClose: Send + Sync + 'static {
    /// Starts an orderly close and resolves when it finishes.
    fn close_async(&self) -> BoxFuture<()>;
}

/// Bound for broker keys: value-equatable endpoint identifiers.
pub trait ConnectionKey: Eq + Hash + Clone + Send + Sync + 'static {}

impl<K> ConnectionKey for K where K: Eq + Hash + Clone + Send + Sync + 'static {}

/// Establishment phase of a registry entry.
///
/// Monotonic: `InProgress` advances to exactly one terminal state, decided
/// by whichever of completion, failure, and cancellation wins the
/// compare-exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Phase {
    InProgress = 0,
    Complete = 1,
    Failed = 2,
    Canceled = 3,
}

type Outcome<T> = Result<Arc<T>, BrokerError>;

/// Per-key state tracking one connect-or-established slot.
struct ConnectionEntry<T> {
    phase: AtomicU8,
    /// Set exactly once, before the `Complete` outcome is published.
    connection: OnceLock<Arc<T>>,
    /// Outcome fan-out to every caller sharing this establishment.
    outcome: watch::Sender<Option<Outcome<T>>>,
    /// Driver task for a pending establishment; unset for connections
    /// installed via `register`.
    driver: OnceLock<JoinHandle<()>>,
}

impl<T: AsyncClose> ConnectionEntry<T> {
    fn pending() -> Arc<Self> {
        let (tx, _) = watch::channel(None);
        Arc::new(Self {
            phase: AtomicU8::new(Phase::InProgress as u8),
            connection: OnceLock::new(),
            outcome: tx,
            driver: OnceLock::new(),
        })
    }

    fn established(connection: Arc<T>) -> Arc<Self> {
        let (tx, _) = watch::channel(Some(Ok(Arc::clone(&connection))));
        let entry = Arc::new(Self {
            phase: AtomicU8::new(Phase::Complete as u8),
            connection: OnceLock::new(),
            outcome: tx,
            driver: OnceLock::new(),
        });
        let _ = entry.connection.set(connection);
        entry
    }

    fn phase(&self) -> Phase {
        match self.phase.load(Ordering::Acquire) {
            0 => Phase::InProgress,
            1 => Phase::Complete,
            2 => Phase::Failed,
            _ => Phase::Canceled,
        }
    }

    /// One-shot terminal transition; only the first writer wins.
    fn advance(&self, to: Phase) -> bool {
        self.phase
            .compare_exchange(
                Phase::InProgress as u8,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    fn is_complete(&self) -> bool {
        self.phase() == Phase::Complete
    }

    /// The established connection, once the entry reached `Complete`.
    fn connection(&self) -> Option<&Arc<T>> {
        if self.is_complete() {
            self.connection.get()
        } else {
            None
        }
    }

    /// Waits for the establishment outcome. Dropping the returned future
    /// only detaches this caller.
    async fn wait(&self) -> Outcome<T> {
        let mut rx = self.outcome.subscribe();
        let result = match rx.wait_for(|outcome| outcome.is_some()).await {
            Ok(outcome) => (*outcome).clone().unwrap_or(Err(BrokerError::Cancelled)),
            // sender dropped without publishing: the entry went away
            Err(_) => Err(BrokerError::Cancelled),
        };
        result
    }

    /// Cancels a pending establishment: aborts the driver (dropping the
    /// factory future) and publishes `Cancelled` to waiters. No-op if the
    /// entry is already terminal.
    fn cancel(&self) {
        if !self.advance(Phase::Canceled) {
            return;
        }
        if let Some(driver) = self.driver.get() {
            driver.abort();
        }
        self.outcome.send_replace(Some(Err(BrokerError::Cancelled)));
    }

    /// Cancels a pending establishment and closes the connection if one is
    /// established.
    async fn shutdown(&self) {
        self.cancel();
        if let Some(connection) = self.connection() {
            connection.close_async().await;
        }
    }
}

/// Keyed registry of in-flight and established connections.
///
/// Generic over the connection key `K` (host + port + role + intent, or
/// whatever the routing layer uses) and the connection type `T`.
pub struct ConnectionBroker<K, T> {
    factory: ConnectionFactory<K, T>,
    connections: Arc<DashMap<K, Arc<ConnectionEntry<T>>>>,
    closed: AtomicBool,
}

impl<K, T> ConnectionBroker<K, T>
where
    K: ConnectionKey,
    T: AsyncClose,
{
    /// Creates a broker that opens connections through `factory`.
    pub fn new(factory: ConnectionFactory<K, T>) -> Self {
        Self {
            factory,
            connections: Arc::new(DashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns true once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Requests the connection for `key`, starting establishment if none
    /// is in flight. Concurrent callers share one factory invocation.
    ///
    /// Fails with [`BrokerError::Closed`] after the broker was closed, with
    /// [`BrokerError::Connect`] when the factory fails (the entry is
    /// evicted, so a retry starts fresh), and with
    /// [`BrokerError::Cancelled`] when the attempt was cancelled by
    /// `close`/`close_key`.
    pub async fn get_connection(&self, key: K) -> Result<Arc<T>, BrokerError> {
        let entry = self.entry_for(key)?;
        entry.wait().await
    }

    fn entry_for(&self, key: K) -> Result<Arc<ConnectionEntry<T>>, BrokerError> {
        if self.is_closed() {
            return Err(BrokerError::Closed);
        }

        if let Some(existing) = self.connections.get(&key) {
            return Ok(Arc::clone(existing.value()));
        }

        let mut created = false;
        let entry = {
            let slot = self.connections.entry(key.clone()).or_insert_with(|| {
                created = true;
                self.connect(&key)
            });
            Arc::clone(slot.value())
        };

        // close() raced the insert: the new entry must not outlive it
        if created && self.is_closed() {
            if let Some((_, entry)) = self.connections.remove(&key) {
                tokio::spawn(async move { entry.shutdown().await });
            }
            return Err(BrokerError::Closed);
        }

        Ok(entry)
    }

    /// Creates a pending entry and spawns its driver task. The factory is
    /// invoked here, exactly once; the driver owns the resulting future
    /// and performs the single terminal phase transition.
    fn connect(&self, key: &K) -> Arc<ConnectionEntry<T>> {
        let entry = ConnectionEntry::pending();
        let future = (self.factory)(key);

        let driver = tokio::spawn({
            let entry = Arc::clone(&entry);
            let connections = Arc::clone(&self.connections);
            let key = key.clone();
            async move {
                match future.await {
                    Ok(connection) => {
                        let connection = Arc::new(connection);
                        if entry.advance(Phase::Complete) {
                            let _ = entry.connection.set(Arc::clone(&connection));
                            entry.outcome.send_replace(Some(Ok(connection)));
                        } else {
                            // lost to cancellation, but the socket opened
                            // anyway: release it
                            trace!("connection established after cancellation, closing");
                            connection.close_async().await;
                        }
                    }
                    Err(cause) => {
                        if entry.advance(Phase::Failed) {
                            // evict before publishing, so a caller seeing
                            // the failure retries against a fresh entry
                            connections
                                .remove_if(&key, |_, current| Arc::ptr_eq(current, &entry));
                            entry
                                .outcome
                                .send_replace(Some(Err(BrokerError::connect(cause))));
                        }
                    }
                }
            }
        });

        let _ = entry.driver.set(driver);
        // a concurrent cancel() may have run before the driver handle was
        // recorded and missed it; re-check
        if entry.phase() == Phase::Canceled {
            if let Some(driver) = entry.driver.get() {
                driver.abort();
            }
        }
        entry
    }

    /// Installs an already-established connection at `key`, overwriting
    /// any prior entry. The prior entry is not closed by this call; that
    /// stays the caller's responsibility.
    pub fn register(&self, key: K, connection: T) {
        self.connections
            .insert(key, ConnectionEntry::established(Arc::new(connection)));
    }

    /// Number of established connections. May briefly under-count while a
    /// completion is being published.
    pub fn connection_count(&self) -> usize {
        self.connections
            .iter()
            .filter(|entry| entry.value().is_complete())
            .count()
    }

    /// Removes the entry for `key` and asynchronously closes its
    /// connection (established) or cancels it (still pending).
    pub fn close_key(&self, key: &K) {
        if let Some((_, entry)) = self.connections.remove(key) {
            tokio::spawn(async move { entry.shutdown().await });
        }
    }

    /// Marks the broker closed and closes every connection, resolving when
    /// every per-entry close has finished. Subsequent `get_connection`
    /// calls fail with [`BrokerError::Closed`].
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);

        let keys: Vec<K> = self
            .connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        let mut closing = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some((_, entry)) = self.connections.remove(&key) {
                closing.push(tokio::spawn(async move { entry.shutdown().await }));
            }
        }
        for task in closing {
            let _ = task.await;
        }
    }

    /// Applies `action` to every established and pending connection. For
    /// entries still connecting, the action runs once establishment
    /// succeeds; it is skipped on failure or cancellation.
    pub fn for_each<F>(&self, action: F)
    where
        F: Fn(&K, &Arc<T>) + Send + Sync + 'static,
    {
        let action = Arc::new(action);
        for item in self.connections.iter() {
            let entry = Arc::clone(item.value());
            if let Some(connection) = entry.connection() {
                action(item.key(), connection);
            } else {
                let action = Arc::clone(&action);
                let key = item.key().clone();
                tokio::spawn(async move {
                    if let Ok(connection) = entry.wait().await {
                        action(&key, &connection);
                    }
                });
            }
        }
    }
}

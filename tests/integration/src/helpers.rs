//! Test fixtures: countable fake connections and scripted topology reloads.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cinder_client::{
    AsyncClose, BoxFuture, ClusterClientOptions, ConnectionFactory, OptionsSupplier,
    PartitionsSupplier, ReloadTopology,
};
use cinder_cluster::Partitions;

/// Installs a tracing subscriber once; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cinder=debug".into()),
        )
        .try_init();
}

/// Fake node connection with observable close state.
#[derive(Debug)]
pub struct FakeConnection {
    pub key: String,
    closed: Arc<AtomicBool>,
}

impl FakeConnection {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl AsyncClose for FakeConnection {
    fn close_async(&self) -> BoxFuture<()> {
        let closed = Arc::clone(&self.closed);
        Box::pin(async move {
            closed.store(true, Ordering::SeqCst);
        })
    }
}

/// Observability handle for [`fake_factory`].
pub struct FactoryHandle {
    /// Total factory invocations across all keys.
    pub calls: Arc<AtomicUsize>,
    /// When set, the next invocation fails (and clears the flag).
    pub fail_next: Arc<AtomicBool>,
}

/// Connection factory that counts invocations, optionally sleeps, and can
/// be scripted to fail.
pub fn fake_factory(delay: Duration) -> (ConnectionFactory<String, FakeConnection>, FactoryHandle) {
    let calls = Arc::new(AtomicUsize::new(0));
    let fail_next = Arc::new(AtomicBool::new(false));

    let handle = FactoryHandle {
        calls: Arc::clone(&calls),
        fail_next: Arc::clone(&fail_next),
    };

    let factory: ConnectionFactory<String, FakeConnection> = Arc::new(move |key| {
        calls.fetch_add(1, Ordering::SeqCst);
        let fail = fail_next.swap(false, Ordering::SeqCst);
        let key = key.clone();
        Box::pin(async move {
            if delay > Duration::ZERO {
                tokio::time::sleep(delay).await;
            }
            if fail {
                Err("connection refused".into())
            } else {
                Ok(FakeConnection::new(&key))
            }
        })
    });

    (factory, handle)
}

/// Swappable topology holder backing a [`PartitionsSupplier`].
#[derive(Clone)]
pub struct PartitionsHolder {
    current: Arc<Mutex<Arc<Partitions>>>,
}

impl PartitionsHolder {
    pub fn new(initial: Partitions) -> Self {
        Self {
            current: Arc::new(Mutex::new(Arc::new(initial))),
        }
    }

    pub fn supplier(&self) -> PartitionsSupplier {
        let current = Arc::clone(&self.current);
        Arc::new(move || Arc::clone(&current.lock().unwrap()))
    }

    pub fn swap(&self, next: Partitions) {
        *self.current.lock().unwrap() = Arc::new(next);
    }

    pub fn get(&self) -> Arc<Partitions> {
        Arc::clone(&self.current.lock().unwrap())
    }
}

/// Supplier returning a fixed set of options.
pub fn fixed_options(options: ClusterClientOptions) -> OptionsSupplier {
    Arc::new(move || options.clone())
}

/// Reload step that counts invocations and swaps `holder` to the topology
/// produced by `next`.
pub fn scripted_reload(
    holder: &PartitionsHolder,
    next: impl Fn() -> Partitions + Send + Sync + 'static,
) -> (ReloadTopology, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let holder = holder.clone();

    let reload: ReloadTopology = Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        holder.swap(next());
        Box::pin(async { Ok(()) })
    });

    (reload, calls)
}

/// One primary on 127.0.0.1:7000 covering every slot.
pub fn single_node_topology() -> Partitions {
    Partitions::from_cluster_nodes(
        "07c37dfeb235213a872192d90877d0cd55635b91 127.0.0.1:7000@17000 myself,master - 0 0 1 connected 0-16383\n",
    )
    .expect("static topology parses")
}

/// Two primaries splitting the slot space at 8192.
pub fn two_node_topology() -> Partitions {
    Partitions::from_cluster_nodes(
        "07c37dfeb235213a872192d90877d0cd55635b91 127.0.0.1:7000@17000 myself,master - 0 0 2 connected 0-8191\n\
         67ed2db8d677e59ec4a4cefb06858cf2a1a89fa1 127.0.0.1:7001@17001 master - 0 0 2 connected 8192-16383\n",
    )
    .expect("static topology parses")
}

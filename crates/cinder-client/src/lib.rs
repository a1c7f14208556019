//! cinder-client: the coordination core of a cluster-aware Redis driver.
//!
//! Two cooperating pieces keep the client's view of the cluster usable:
//!
//! - **Connection broker** ([`ConnectionBroker`]): a keyed registry of
//!   in-flight and established node connections. Concurrent requests for
//!   the same node share a single establishment attempt, failures are
//!   evicted so the next request retries, and shutdown closes everything
//!   in one sweep.
//! - **Topology refresh scheduler** ([`TopologyRefreshScheduler`]): turns
//!   wire-level signals (MOVED/ASK redirects, persistent reconnects,
//!   uncovered slots, unknown nodes) and a fixed-rate timer into topology
//!   reloads — debounced, suppressed while the executor shuts down, and
//!   limited to a single reload in flight.
//!
//! The core performs no wire I/O itself. The connection factory, the
//! topology reload step, and the current [`cinder_cluster::Partitions`]
//! snapshot are injected as closures, so the codec and routing layers stay
//! free to evolve independently.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use cinder_client::{ClientResources, ConnectionBroker, TopologyRefreshScheduler};
//!
//! let broker = ConnectionBroker::new(factory);
//! let connection = broker.get_connection(key).await?;
//!
//! let scheduler = TopologyRefreshScheduler::new(options, partitions, reload, &resources);
//! scheduler.activate_periodic_if_needed();
//! scheduler.on_moved_redirection(); // adaptive trigger, debounced
//! ```

use std::future::Future;
use std::pin::Pin;

mod broker;
mod error;
mod events;
mod options;
mod refresh;
mod resources;
mod timeout;

/// Boxed future used at the core's injected seams.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

pub use broker::{AsyncClose, ConnectionBroker, ConnectionFactory, ConnectionKey};
pub use error::{BoxError, BrokerError};
pub use events::{AdaptiveRefreshTriggeredEvent, ClusterEvent, EventBus, PartitionsSupplier};
pub use options::{ClusterClientOptions, RefreshTrigger, TopologyRefreshOptions};
pub use refresh::{ClusterEventListener, OptionsSupplier, ReloadTopology, TopologyRefreshScheduler};
pub use resources::{ClientResources, ScheduledTask, WorkerPool};
pub use timeout::Timeout;

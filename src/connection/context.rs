//! Network Context and Listeners
//!
//! A [`NetworkContext`] is the per-connection environment the engine and the
//! protocol handler share: heartbeat policy, threading strategy, and the
//! optional listeners that observe liveness and throughput.
//!
//! Wiring contexts up is the application's job; [`BasicContext`] covers the
//! common case.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// How the surrounding event loop wants to run this connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadingStrategy {
    /// One cooperative thread shares all connections
    #[default]
    SingleThreaded,
    /// Steps may run on a pool of threads
    Concurrent,
    /// A dedicated thread spins on this connection
    MultiThreadedBusyWaiting,
}

/// Scheduling class reported to the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerPriority {
    Medium,
    Concurrent,
    Blocking,
}

impl From<ThreadingStrategy> for HandlerPriority {
    fn from(strategy: ThreadingStrategy) -> Self {
        match strategy {
            ThreadingStrategy::SingleThreaded => HandlerPriority::Medium,
            ThreadingStrategy::Concurrent => HandlerPriority::Concurrent,
            ThreadingStrategy::MultiThreadedBusyWaiting => HandlerPriority::Blocking,
        }
    }
}

/// Told when a connection has gone quiet for too long or failed.
pub trait HeartbeatListener: Send + Sync {
    fn on_missed_heartbeat(&self);
}

/// Receives averaged throughput figures once per monitor window.
pub trait NetworkStatsListener: Send + Sync {
    /// Rates are per second: bytes written, bytes read, socket polls.
    fn on_network_stats(&self, write_rate: u64, read_rate: u64, poll_rate: u64);

    /// Called when the connection's socket side is torn down.
    fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// The environment of one connection.
pub trait NetworkContext: Send {
    /// Maximum silence before the connection is declared dead; zero disables.
    fn heartbeat_timeout(&self) -> Duration {
        Duration::ZERO
    }

    fn threading_strategy(&self) -> ThreadingStrategy {
        ThreadingStrategy::SingleThreaded
    }

    fn heartbeat_listener(&self) -> Option<Arc<dyn HeartbeatListener>> {
        None
    }

    fn network_stats_listener(&self) -> Option<Arc<dyn NetworkStatsListener>> {
        None
    }

    /// A new protocol handler is about to be attached.
    fn on_handler_changed(&mut self) {}

    /// Releases whatever the context holds for this connection.
    fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A plain [`NetworkContext`] assembled with builder methods.
///
/// # Example
///
/// ```
/// use flashwire::connection::{BasicContext, NetworkContext, ThreadingStrategy};
/// use std::time::Duration;
///
/// let ctx = BasicContext::new()
///     .with_heartbeat_timeout(Duration::from_secs(5))
///     .with_threading_strategy(ThreadingStrategy::Concurrent);
///
/// assert_eq!(ctx.heartbeat_timeout(), Duration::from_secs(5));
/// ```
#[derive(Default)]
pub struct BasicContext {
    heartbeat_timeout: Duration,
    threading_strategy: ThreadingStrategy,
    heartbeat_listener: Option<Arc<dyn HeartbeatListener>>,
    stats_listener: Option<Arc<dyn NetworkStatsListener>>,
    handler_changes: usize,
    closed: bool,
}

impl BasicContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    pub fn with_threading_strategy(mut self, strategy: ThreadingStrategy) -> Self {
        self.threading_strategy = strategy;
        self
    }

    pub fn with_heartbeat_listener(mut self, listener: Arc<dyn HeartbeatListener>) -> Self {
        self.heartbeat_listener = Some(listener);
        self
    }

    pub fn with_stats_listener(mut self, listener: Arc<dyn NetworkStatsListener>) -> Self {
        self.stats_listener = Some(listener);
        self
    }

    /// How many times a handler has been attached.
    pub fn handler_changes(&self) -> usize {
        self.handler_changes
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl fmt::Debug for BasicContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicContext")
            .field("heartbeat_timeout", &self.heartbeat_timeout)
            .field("threading_strategy", &self.threading_strategy)
            .field("heartbeat_listener", &self.heartbeat_listener.is_some())
            .field("stats_listener", &self.stats_listener.is_some())
            .field("closed", &self.closed)
            .finish()
    }
}

impl NetworkContext for BasicContext {
    fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_timeout
    }

    fn threading_strategy(&self) -> ThreadingStrategy {
        self.threading_strategy
    }

    fn heartbeat_listener(&self) -> Option<Arc<dyn HeartbeatListener>> {
        self.heartbeat_listener.clone()
    }

    fn network_stats_listener(&self) -> Option<Arc<dyn NetworkStatsListener>> {
        self.stats_listener.clone()
    }

    fn on_handler_changed(&mut self) {
        self.handler_changes += 1;
    }

    fn close(&mut self) -> anyhow::Result<()> {
        self.closed = true;
        Ok(())
    }
}

//! Connection Module
//!
//! Drives a single non-blocking TCP connection: reads into an elastic inbound
//! buffer, lets a protocol handler turn input into output, writes the output
//! back, and decides when the connection is dead.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 External scheduler                          │
//! │            (spins, yields or sleeps per step)               │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ step()
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionEngine                            │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ SocketChan. │───>│ TcpHandler  │───>│ Write back  │      │
//! │  └─────────────┘    └─────────────┘    └─────────────┘      │
//! │         │                                     │             │
//! │         ▼                                     ▼             │
//! │  ┌─────────────┐                       ┌─────────────┐      │
//! │  │  Heartbeat  │                       │    Stats    │      │
//! │  └─────────────┘                       └─────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Non-blocking**: every step does one read and at most a few writes
//! - **Fairness**: pending output is flushed at least every ninth step
//! - **Liveness**: silent peers are dropped after the heartbeat timeout
//! - **Statistics**: per-second throughput averages for a stats listener
//!
//! ## Example
//!
//! ```no_run
//! use flashwire::connection::{BasicContext, ConnectionEngine, EngineConfig, TcpChannel};
//! use flashwire::handlers::EchoHandler;
//! use std::net::TcpListener;
//!
//! # fn main() -> anyhow::Result<()> {
//! let listener = TcpListener::bind("127.0.0.1:7878")?;
//! let (stream, _addr) = listener.accept()?;
//!
//! let engine = ConnectionEngine::new(
//!     TcpChannel::new(stream)?,
//!     Box::new(BasicContext::new()),
//!     &EngineConfig::from_env()?,
//! );
//! engine.set_handler(Box::new(EchoHandler::new()));
//! while engine.step().is_ok() {}
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
mod flusher;
pub mod handler;
pub mod heartbeat;
pub mod network_log;
pub mod stats;

#[cfg(test)]
pub(crate) mod mock;

// Re-export commonly used types
pub use channel::{configure_socket, IoOutcome, SocketChannel, TcpChannel};
pub use config::{ConfigError, EngineConfig};
pub use context::{
    BasicContext, HandlerPriority, HeartbeatListener, NetworkContext, NetworkStatsListener,
    ThreadingStrategy,
};
pub use engine::{ConnectionEngine, ConnectionState, StepOutcome, StepResult, MIN_FRAME_SIZE};
pub use error::{FaultKind, HandlerInactive};
pub use handler::TcpHandler;
pub use heartbeat::{heartbeat_expired, HeartbeatMonitor};
pub use network_log::NetworkLog;
pub use stats::StatsMonitor;

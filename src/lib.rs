//! # flashwire - A Non-Blocking Per-Connection TCP Engine
//!
//! flashwire drives one TCP connection at a time on behalf of an external
//! scheduler. Each call to [`ConnectionEngine::step`] does a small, bounded
//! amount of work and never blocks, so a single thread can multiplex many
//! connections, or a pool can share them.
//!
//! ## Features
//!
//! - **Elastic Buffers**: growable inbound/outbound regions with in-place compaction
//! - **Pluggable Protocols**: a [`TcpHandler`] sees input as a `Buf` and output as a `BufMut`
//! - **Fair Writes**: pending output is flushed on a fixed cadence even under read load
//! - **Liveness**: heartbeat timeouts and error classification with listener callbacks
//! - **Statistics**: per-second read/write/poll averages over a monitor window
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          ConnectionEngine                               │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ SocketChan. │───>│   Inbound   │───>│ TcpHandler  │                  │
//! │  │  (read)     │    │   buffer    │    │  process()  │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               │                         │
//! │                                               ▼                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ SocketChan. │<───│   Write     │<───│  Outbound   │                  │
//! │  │  (write)    │    │   Flusher   │    │   buffer    │                  │
//! │  └─────────────┘    └─────────────┘    └─────────────┘                  │
//! │                                                                         │
//! │  ┌───────────────────┐  ┌───────────────────┐  ┌────────────────────┐   │
//! │  │ Heartbeat Monitor │  │ Statistics Monitor│  │ Error Classifier   │   │
//! │  └───────────────────┘  └───────────────────┘  └────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use flashwire::connection::{BasicContext, ConnectionEngine, EngineConfig, TcpChannel};
//! use flashwire::handlers::EchoHandler;
//! use std::net::TcpListener;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = EngineConfig::from_env()?;
//!     let listener = TcpListener::bind("127.0.0.1:7878")?;
//!
//!     for stream in listener.incoming() {
//!         let engine = ConnectionEngine::new(
//!             TcpChannel::new(stream?)?,
//!             Box::new(BasicContext::new()),
//!             &config,
//!         );
//!         engine.set_handler(Box::new(EchoHandler::new()));
//!
//!         std::thread::spawn(move || {
//!             while let Ok(outcome) = engine.step() {
//!                 if !outcome.is_busy() {
//!                     std::thread::yield_now();
//!                 }
//!             }
//!         });
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`buffer`]: Elastic byte buffers and the handler-facing views
//! - [`connection`]: The engine, its socket abstraction, context and monitors
//! - [`handlers`]: Reference protocol handlers
//!
//! ## Design Highlights
//!
//! ### One Lock Per Connection
//!
//! All mutable state of a connection sits behind one mutex, so any thread
//! may step any connection while steps on the same connection never
//! interleave. Connections share nothing with each other.
//!
//! ### Borrowed Buffers
//!
//! Handlers get [`Inbound`](buffer::Inbound) and [`Outbound`](buffer::Outbound)
//! views that borrow the engine's buffers for a single call. Keeping a
//! reference past the call does not compile.
//!
//! ### Errors End Connections
//!
//! A step either succeeds ([`StepOutcome`]) or tells the scheduler to drop
//! the connection for good ([`HandlerInactive`]). Nothing is retried.

pub mod buffer;
pub mod connection;
pub mod handlers;

// Re-export commonly used types for convenience
pub use buffer::{ElasticBuffer, Inbound, Outbound};
pub use connection::{
    BasicContext, ConnectionEngine, EngineConfig, HandlerInactive, NetworkContext, SocketChannel,
    StepOutcome, TcpChannel, TcpHandler,
};
pub use handlers::EchoHandler;

/// The default port the demo server listens on
pub const DEFAULT_PORT: u16 = 7878;

/// The default host the demo server binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of flashwire
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

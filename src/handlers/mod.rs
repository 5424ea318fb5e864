//! Protocol Handlers
//!
//! Ready-made [`TcpHandler`](crate::connection::TcpHandler) implementations.
//! Real protocols live with the applications that use the engine; the ones
//! here are small enough to serve as references and as test fixtures.

pub mod echo;

pub use echo::EchoHandler;

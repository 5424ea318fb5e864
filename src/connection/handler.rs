//! Protocol Handler Contract
//!
//! The engine moves bytes; a [`TcpHandler`] gives them meaning. Within one
//! step the engine may call [`process`](TcpHandler::process) several times,
//! as long as the handler keeps consuming input without producing output.
//!
//! ## Rules for implementations
//!
//! - Never block. Consume what is there, leave partial frames unread.
//! - Unread bytes stay in the inbound buffer and are offered again, after
//!   more data has arrived.
//! - Return `Err` to abort the connection. An error whose root cause is a
//!   `std::io::Error` is treated like a socket failure; anything else is
//!   logged as unexpected.

use crate::buffer::{Inbound, Outbound};
use crate::connection::NetworkContext;
use tokio::time::Instant;

/// Application protocol running on top of a connection engine.
pub trait TcpHandler: Send {
    /// Consumes bytes from `inbound` and/or appends bytes to `outbound`.
    fn process(
        &mut self,
        inbound: &mut Inbound<'_>,
        outbound: &mut Outbound<'_>,
        ctx: &mut dyn NetworkContext,
    ) -> anyhow::Result<()>;

    /// Bytes were just read from the socket.
    fn on_read_time(&mut self, _at: Instant) {}

    /// A socket write was attempted at `at`.
    fn on_write_time(&mut self, _at: Instant) {}

    /// The socket is gone; `graceful` is false when it was not closed by the
    /// protocol itself.
    fn on_end_of_connection(&mut self, _graceful: bool) {}

    /// Whether the client asked to close; suppresses error noise on teardown.
    fn has_client_closed(&self) -> bool {
        false
    }

    /// Releases handler resources when the socket side is torn down.
    fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

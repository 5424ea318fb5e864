//! Write Flusher
//!
//! Pushes pending output to the socket and, when nothing is pending, gives
//! the handler a chance to produce more. It runs from the fairness branch
//! of a step and from [`ConnectionEngine::flush`](super::ConnectionEngine::flush).

use crate::connection::channel::SocketChannel;
use crate::connection::engine::EngineCore;
use crate::connection::error::{is_closed_channel, Fault, HandlerInactive};
use tracing::debug;

impl<C: SocketChannel> EngineCore<C> {
    /// Returns whether any output moved or the handler did work.
    ///
    /// Socket failures tear the connection down but are reported as idle;
    /// only unexpected failures surface as errors.
    pub(crate) fn flush_outbound(&mut self) -> Result<bool, HandlerInactive> {
        if !self.channel.is_open() {
            return Err(HandlerInactive::SocketClosed);
        }
        if self.handler.is_none() {
            return Ok(false);
        }

        match self.drain_or_refill() {
            Ok(busy) => Ok(busy),
            Err(Fault::Io(e)) if is_closed_channel(&e) => {
                debug!(peer = ?self.channel.peer(), error = %e, "Flush on closed channel");
                self.close_socket_side();
                Ok(false)
            }
            Err(Fault::Io(e)) => {
                if !self.closed {
                    let client_closed = self
                        .handler
                        .as_ref()
                        .is_some_and(|handler| handler.has_client_closed());
                    self.handle_io_error(&e, client_closed);
                }
                Ok(false)
            }
            Err(Fault::Inactive(e)) => Err(e),
            Err(Fault::Unexpected(e)) => Err(HandlerInactive::Unexpected(e)),
        }
    }

    fn drain_or_refill(&mut self) -> Result<bool, Fault> {
        let pending = self.outbound.read_remaining();
        let mut busy = pending > 0;
        if busy {
            self.try_write()?;
        }

        if self.outbound.read_remaining() == pending {
            busy |= self.invoke_handler()?;
            if !busy {
                busy = self.try_write()?;
            }
        }
        Ok(busy)
    }
}

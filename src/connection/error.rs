//! Step Errors and Failure Classification
//!
//! Every fault ends the same way: the connection is closed and the step
//! returns [`HandlerInactive`], telling the scheduler to deregister it. What
//! differs is how loudly the fault is reported:
//!
//! | Fault                                         | Log level |
//! |-----------------------------------------------|-----------|
//! | Client closed on purpose                      | none      |
//! | Connection reset by peer                      | trace     |
//! | Connection forcibly closed by the OS          | debug     |
//! | Interrupted                                   | none      |
//! | Anything else                                 | warn      |

use std::io;
use thiserror::Error;

/// Broad category of a step failure.
///
/// A step that found nothing to do is not a failure; it returns
/// `Ok(StepOutcome::Idle)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The connection was closed, locally or by the peer
    GracefulEnd,
    /// A read, write or channel error
    SocketFault,
    /// No data arrived within the heartbeat timeout
    LivenessTimeout,
    /// The protocol handler failed in a way unrelated to I/O
    UnexpectedFault,
}

/// The connection can make no further progress; deregister it.
#[derive(Debug, Error)]
pub enum HandlerInactive {
    /// The connection had already been closed
    #[error("connection is closed")]
    Closed,

    /// The socket was closed while the connection was still marked open
    #[error("socket is closed")]
    SocketClosed,

    /// The peer ended the stream
    #[error("socket closed by peer")]
    EndOfStream,

    /// A read, write or channel error
    #[error("socket fault: {0}")]
    SocketFault(#[from] io::Error),

    /// Nothing was read within the heartbeat timeout
    #[error("heartbeat timeout")]
    HeartbeatTimeout,

    /// The protocol handler failed or panicked
    #[error("unexpected fault: {0:#}")]
    Unexpected(anyhow::Error),
}

impl HandlerInactive {
    pub fn kind(&self) -> FaultKind {
        match self {
            HandlerInactive::Closed | HandlerInactive::SocketClosed | HandlerInactive::EndOfStream => {
                FaultKind::GracefulEnd
            }
            HandlerInactive::SocketFault(_) => FaultKind::SocketFault,
            HandlerInactive::HeartbeatTimeout => FaultKind::LivenessTimeout,
            HandlerInactive::Unexpected(_) => FaultKind::UnexpectedFault,
        }
    }
}

/// Internal failure carried through the read/write paths before it is
/// turned into a [`HandlerInactive`].
#[derive(Debug)]
pub(crate) enum Fault {
    Io(io::Error),
    Inactive(HandlerInactive),
    Unexpected(anyhow::Error),
}

impl From<io::Error> for Fault {
    fn from(err: io::Error) -> Self {
        Fault::Io(err)
    }
}

impl From<HandlerInactive> for Fault {
    fn from(err: HandlerInactive) -> Self {
        Fault::Inactive(err)
    }
}

impl Fault {
    /// Splits a handler error into I/O and everything else.
    pub(crate) fn from_handler(err: anyhow::Error) -> Self {
        match err.downcast::<io::Error>() {
            Ok(io_err) => Fault::Io(io_err),
            Err(other) => Fault::Unexpected(other),
        }
    }
}

/// How loudly an I/O failure should be logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Severity {
    Silent,
    Trace,
    Debug,
    Warn,
}

const PEER_RESET: &str = "Connection reset by peer";
const FORCIBLY_CLOSED: &str = "An existing connection was forcibly closed";

pub(crate) fn io_severity(err: &io::Error) -> Severity {
    let message = err.to_string();
    match err.kind() {
        io::ErrorKind::Interrupted => Severity::Silent,
        io::ErrorKind::ConnectionReset => Severity::Trace,
        io::ErrorKind::ConnectionAborted => Severity::Debug,
        _ if message.starts_with(PEER_RESET) => Severity::Trace,
        _ if message.starts_with(FORCIBLY_CLOSED) => Severity::Debug,
        _ => Severity::Warn,
    }
}

/// A closed-channel error: the socket was already shut on our side.
pub(crate) fn is_closed_channel(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::NotConnected
}

//! Non-Blocking Socket Channel
//!
//! The engine talks to its socket through the [`SocketChannel`] trait, which
//! reports every transfer as one of three outcomes instead of a signed byte
//! count:
//!
//! | Outcome          | Meaning                                   |
//! |------------------|-------------------------------------------|
//! | `Transferred(n)` | `n > 0` bytes moved                       |
//! | `Idle`           | the call would have blocked               |
//! | `Closed`         | the peer ended the stream / pipe is gone  |
//!
//! Hard failures (resets, aborts) are returned as `io::Error` and handed to
//! the engine's error classifier.
//!
//! [`TcpChannel`] implements the trait for `std::net::TcpStream`, and
//! [`configure_socket`] applies the process-wide socket options when a
//! connection is wrapped.

use crate::connection::config::EngineConfig;
use socket2::SockRef;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use tracing::{debug, warn};

/// Result of a single non-blocking read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOutcome {
    /// A positive number of bytes was transferred
    Transferred(usize),
    /// Nothing was transferred; the call would have blocked
    Idle,
    /// The stream is finished (end of stream on read, broken on write)
    Closed,
}

/// A connected, non-blocking byte stream.
///
/// Implementations must never block: if the transport is not ready they
/// return [`IoOutcome::Idle`].
pub trait SocketChannel: Send {
    /// Reads into `buf`.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<IoOutcome>;

    /// Writes from `buf`.
    fn write(&mut self, buf: &[u8]) -> io::Result<IoOutcome>;

    /// Whether the channel has not been closed locally.
    fn is_open(&self) -> bool;

    /// Closes the channel. Closing twice is not an error.
    fn close(&mut self) -> io::Result<()>;

    /// Enables or disables TCP no-delay.
    fn set_nodelay(&self, _nodelay: bool) -> io::Result<()> {
        Ok(())
    }

    /// The underlying OS socket, when there is one.
    fn socket(&self) -> Option<SockRef<'_>> {
        None
    }

    /// Remote address, for logging.
    fn peer(&self) -> Option<SocketAddr> {
        None
    }
}

/// [`SocketChannel`] over a standard library TCP stream.
#[derive(Debug)]
pub struct TcpChannel {
    stream: Option<TcpStream>,
    peer: Option<SocketAddr>,
}

impl TcpChannel {
    /// Wraps a connected stream, switching it to non-blocking mode.
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        let peer = stream.peer_addr().ok();
        Ok(Self {
            stream: Some(stream),
            peer,
        })
    }

    /// The wrapped stream, until the channel is closed.
    pub fn stream(&self) -> Option<&TcpStream> {
        self.stream.as_ref()
    }

    fn stream_mut(&mut self) -> io::Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "channel is closed"))
    }
}

impl SocketChannel for TcpChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<IoOutcome> {
        if buf.is_empty() {
            return Ok(IoOutcome::Idle);
        }
        match self.stream_mut()?.read(buf) {
            Ok(0) => Ok(IoOutcome::Closed),
            Ok(n) => Ok(IoOutcome::Transferred(n)),
            Err(e) if is_transient(&e) => Ok(IoOutcome::Idle),
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<IoOutcome> {
        if buf.is_empty() {
            return Ok(IoOutcome::Idle);
        }
        match self.stream_mut()?.write(buf) {
            Ok(0) => Ok(IoOutcome::Closed),
            Ok(n) => Ok(IoOutcome::Transferred(n)),
            Err(e) if is_transient(&e) => Ok(IoOutcome::Idle),
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(IoOutcome::Closed),
            Err(e) => Err(e),
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn close(&mut self) -> io::Result<()> {
        let Some(stream) = self.stream.take() else {
            return Ok(());
        };
        match stream.shutdown(Shutdown::Both) {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e),
            _ => Ok(()),
        }
    }

    fn set_nodelay(&self, nodelay: bool) -> io::Result<()> {
        match &self.stream {
            Some(stream) => stream.set_nodelay(nodelay),
            None => Ok(()),
        }
    }

    fn socket(&self) -> Option<SockRef<'_>> {
        self.stream.as_ref().map(SockRef::from)
    }

    fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Applies the process-wide socket options to a freshly wrapped channel.
///
/// Failures are logged and otherwise ignored: a connection with default
/// socket options still works.
pub fn configure_socket<C: SocketChannel + ?Sized>(channel: &C, config: &EngineConfig) {
    if !config.disable_tcp_nodelay {
        if let Err(e) = channel.set_nodelay(true) {
            warn!(error = %e, "Failed to enable TCP no-delay");
        }
    }

    if !config.force_socket_buffers() {
        return;
    }
    let Some(socket) = channel.socket() else {
        return;
    };

    let requested = config.tcp_buffer_size;
    if let Err(e) = socket.set_recv_buffer_size(requested) {
        warn!(error = %e, requested, "Failed to set socket receive buffer");
    }
    if let Err(e) = socket.set_send_buffer_size(requested) {
        warn!(error = %e, requested, "Failed to set socket send buffer");
    }

    match (socket.recv_buffer_size(), socket.send_buffer_size()) {
        (Ok(recv), Ok(send)) => {
            check_buffer_size(recv, requested, "recv");
            check_buffer_size(send, requested, "send");
            debug!(recv, send, "Socket buffers configured");
        }
        (Err(e), _) | (_, Err(e)) => warn!(error = %e, "Failed to read socket buffer sizes"),
    }
}

fn check_buffer_size(granted: usize, requested: usize, name: &str) {
    if granted < requested {
        warn!(
            "Attempted to set {} tcp buffer to {} but kernel only allowed {}",
            name, requested, granted
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn loopback_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (server, client)
    }

    fn read_until(channel: &mut TcpChannel, buf: &mut [u8]) -> IoOutcome {
        for _ in 0..1000 {
            match channel.read(buf).unwrap() {
                IoOutcome::Idle => std::thread::sleep(std::time::Duration::from_millis(1)),
                other => return other,
            }
        }
        IoOutcome::Idle
    }

    #[test]
    fn test_read_would_block_is_idle() {
        let (server, _client) = loopback_pair();
        let mut channel = TcpChannel::new(server).unwrap();

        let mut buf = [0u8; 16];
        assert_eq!(channel.read(&mut buf).unwrap(), IoOutcome::Idle);
        assert!(channel.is_open());
        assert!(channel.peer().is_some());
    }

    #[test]
    fn test_read_and_write_transfer() {
        let (server, mut client) = loopback_pair();
        let mut channel = TcpChannel::new(server).unwrap();

        client.write_all(b"ping").unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(read_until(&mut channel, &mut buf), IoOutcome::Transferred(4));
        assert_eq!(&buf[..4], b"ping");

        assert_eq!(channel.write(b"pong").unwrap(), IoOutcome::Transferred(4));
        let mut reply = [0u8; 4];
        client.read_exact(&mut reply).unwrap();
        assert_eq!(&reply, b"pong");
    }

    #[test]
    fn test_peer_shutdown_is_closed() {
        let (server, client) = loopback_pair();
        let mut channel = TcpChannel::new(server).unwrap();

        drop(client);
        let mut buf = [0u8; 16];
        assert_eq!(read_until(&mut channel, &mut buf), IoOutcome::Closed);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (server, _client) = loopback_pair();
        let mut channel = TcpChannel::new(server).unwrap();

        channel.close().unwrap();
        assert!(!channel.is_open());
        channel.close().unwrap();

        let err = channel.read(&mut [0u8; 4]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[test]
    fn test_configure_socket_sets_nodelay() {
        let (server, _client) = loopback_pair();
        let channel = TcpChannel::new(server).unwrap();

        configure_socket(&channel, &EngineConfig::default());
        assert!(channel.stream().unwrap().nodelay().unwrap());
    }

    #[test]
    fn test_configure_socket_respects_disable_flag() {
        let (server, _client) = loopback_pair();
        let channel = TcpChannel::new(server).unwrap();

        let config = EngineConfig {
            disable_tcp_nodelay: true,
            ..Default::default()
        };
        configure_socket(&channel, &config);
        assert!(!channel.stream().unwrap().nodelay().unwrap());
    }
}

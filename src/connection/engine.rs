//! Connection Engine
//!
//! One [`ConnectionEngine`] drives one non-blocking socket. An external
//! scheduler calls [`step`](ConnectionEngine::step) over and over; each call
//! does a bounded amount of work and reports whether it was worth it.
//!
//! ## One Step
//!
//! ```text
//!   step()
//!     │
//!     ├─ no handler? ─────────────────────────────> Ok(Idle)
//!     ├─ closed? / socket gone? ──────────────────> Err(HandlerInactive)
//!     │
//!     ├─ every 9th step (or every step if fair): flush outbound first
//!     │
//!     ├─ read once ──┬─ n > 0 ──> handler ──> write ──> Ok(Busy)
//!     │              ├─ idle ───> handler if output pending, else stats
//!     │              └─ eof ────> close ──────────────> Err(EndOfStream)
//!     │
//!     └─ heartbeat check (always, even after a failure)
//! ```
//!
//! ## Concurrency
//!
//! Steps are serialized by a per-connection mutex, so the engine can be
//! shared across a thread pool. Different connections share nothing.

use crate::buffer::{ElasticBuffer, Inbound, Outbound};
use crate::connection::channel::{configure_socket, IoOutcome, SocketChannel};
use crate::connection::config::EngineConfig;
use crate::connection::context::{HandlerPriority, NetworkContext};
use crate::connection::error::{io_severity, is_closed_channel, Fault, HandlerInactive, Severity};
use crate::connection::handler::TcpHandler;
use crate::connection::heartbeat::HeartbeatMonitor;
use crate::connection::network_log::NetworkLog;
use crate::connection::stats::StatsMonitor;
use std::any::Any;
use std::io;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Output at or above this many bytes is written out immediately.
pub const MIN_FRAME_SIZE: usize = 4;

/// The write flusher runs when the fairness counter reaches this value.
pub(crate) const FLUSH_THRESHOLD: u32 = 8;

/// What a successful step achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Nothing to do; the scheduler may back off
    Idle,
    /// Useful work happened; step again soon
    Busy,
}

impl StepOutcome {
    pub fn is_busy(self) -> bool {
        self == StepOutcome::Busy
    }
}

impl From<bool> for StepOutcome {
    fn from(busy: bool) -> Self {
        if busy {
            StepOutcome::Busy
        } else {
            StepOutcome::Idle
        }
    }
}

/// Result of one step; `Err` means deregister the connection for good.
pub type StepResult = Result<StepOutcome, HandlerInactive>;

/// Where a connection is in its teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket open, connection usable
    Active,
    /// Socket released, connection not yet marked closed
    Closing,
    /// Marked closed
    Closed,
    /// Buffers released
    Cleaned,
}

/// Single-connection, non-blocking I/O engine.
///
/// # Example
///
/// ```no_run
/// use flashwire::connection::{BasicContext, ConnectionEngine, EngineConfig, TcpChannel};
/// use flashwire::handlers::EchoHandler;
/// use std::net::TcpStream;
///
/// # fn main() -> std::io::Result<()> {
/// let stream = TcpStream::connect("127.0.0.1:7878")?;
/// let engine = ConnectionEngine::new(
///     TcpChannel::new(stream)?,
///     Box::new(BasicContext::new()),
///     &EngineConfig::default(),
/// );
/// engine.set_handler(Box::new(EchoHandler::new()));
///
/// while let Ok(outcome) = engine.step() {
///     if !outcome.is_busy() {
///         std::thread::yield_now();
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct ConnectionEngine<C> {
    core: Mutex<EngineCore<C>>,
}

/// The engine's state, only ever touched under the engine's lock.
pub(crate) struct EngineCore<C> {
    pub(super) channel: C,
    pub(super) context: Box<dyn NetworkContext>,
    pub(super) handler: Option<Box<dyn TcpHandler>>,
    pub(super) inbound: ElasticBuffer,
    pub(super) outbound: ElasticBuffer,
    pub(super) closed: bool,
    fair: bool,
    fairness_counter: u32,
    heartbeat: HeartbeatMonitor,
    stats: StatsMonitor,
    read_log: NetworkLog,
    write_log: NetworkLog,
    cleaned: bool,
}

impl<C: SocketChannel> ConnectionEngine<C> {
    /// Wraps a connected channel, applying the socket options in `config`.
    pub fn new(channel: C, context: Box<dyn NetworkContext>, config: &EngineConfig) -> Self {
        Self::with_fairness(channel, context, config, false)
    }

    /// Like [`new`](Self::new); with `fair` set the write flusher runs on
    /// every step instead of every ninth.
    pub fn with_fairness(
        channel: C,
        context: Box<dyn NetworkContext>,
        config: &EngineConfig,
        fair: bool,
    ) -> Self {
        configure_socket(&channel, config);
        let peer = channel.peer();
        debug!(peer = ?peer, fair, "Connection engine created");

        let mut outbound = ElasticBuffer::with_capacity(config.outbound_capacity());
        outbound.limit_to_written();

        Self {
            core: Mutex::new(EngineCore {
                channel,
                context,
                handler: None,
                inbound: ElasticBuffer::with_capacity(config.inbound_capacity()),
                outbound,
                closed: false,
                fair,
                fairness_counter: FLUSH_THRESHOLD,
                heartbeat: HeartbeatMonitor::new(Instant::now()),
                stats: StatsMonitor::new(config.monitor_interval),
                read_log: NetworkLog::new(peer, "read"),
                write_log: NetworkLog::new(peer, "write"),
                cleaned: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EngineCore<C>> {
        // a panicking handler is caught inside the step, so a poisoned lock
        // still guards consistent cursors
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attaches (or replaces) the protocol handler.
    pub fn set_handler(&self, handler: Box<dyn TcpHandler>) {
        let mut core = self.lock();
        core.context.on_handler_changed();
        core.handler = Some(handler);
    }

    /// Runs one bounded, non-blocking unit of work.
    pub fn step(&self) -> StepResult {
        self.lock().step()
    }

    /// Runs the write flusher on its own.
    ///
    /// Drains pending output and, once it is drained, asks the handler for
    /// more. Returns whether anything moved.
    pub fn flush(&self) -> Result<bool, HandlerInactive> {
        self.lock().flush_outbound()
    }

    /// Closes the socket side and releases the buffers. Safe to call twice.
    pub fn close(&self) {
        self.lock().close();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state()
    }

    /// The scheduling class this connection asks for.
    pub fn priority(&self) -> HandlerPriority {
        self.lock().context.threading_strategy().into()
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.lock().channel.peer()
    }

    #[cfg(test)]
    pub(crate) fn inspect<R>(&self, f: impl FnOnce(&EngineCore<C>) -> R) -> R {
        f(&*self.lock())
    }
}

impl<C: SocketChannel> EngineCore<C> {
    fn step(&mut self) -> StepResult {
        if self.handler.is_none() {
            return Ok(StepOutcome::Idle);
        }

        if self.closed {
            self.close_context();
            return Err(HandlerInactive::Closed);
        }

        if !self.channel.is_open() {
            if let Some(handler) = self.handler.as_mut() {
                handler.on_end_of_connection(false);
            }
            self.close_context();
            return Err(HandlerInactive::SocketClosed);
        }

        self.stats.record_poll();

        let mut busy = false;
        if self.fair || self.fairness_counter >= FLUSH_THRESHOLD {
            self.fairness_counter = 0;
            match self.flush_outbound() {
                Ok(flushed) => busy = flushed,
                Err(e) => warn!(peer = ?self.channel.peer(), error = %e, "Write flush failed"),
            }
        } else {
            self.fairness_counter += 1;
        }

        let result = match self.read_and_process(busy) {
            Ok(outcome) => Ok(outcome),
            Err(fault) => Err(self.fail(fault)),
        };

        self.check_heartbeat()?;
        result
    }

    fn read_and_process(&mut self, busy: bool) -> Result<StepOutcome, Fault> {
        if self.inbound.spare_capacity() == 0 {
            trace!(peer = ?self.channel.peer(), "Inbound buffer full, skipping read");
            self.invoke_handler()?;
            return Ok(StepOutcome::Busy);
        }

        match self.channel.read(self.inbound.spare_mut())? {
            IoOutcome::Transferred(n) => {
                self.read_log.log(&self.inbound.spare_mut()[..n]);
                self.inbound.commit(n);

                let now = Instant::now();
                if let Some(handler) = self.handler.as_mut() {
                    handler.on_read_time(now);
                }
                self.heartbeat.record_read(now);

                if self.invoke_handler()? {
                    self.fairness_counter += 1;
                }
                Ok(StepOutcome::Busy)
            }
            IoOutcome::Idle => {
                if self.outbound.unconsumed() > 0 && self.invoke_handler()? {
                    return Ok(StepOutcome::Busy);
                }
                if !busy {
                    let listener = self.context.network_stats_listener();
                    self.stats.maybe_report(Instant::now(), listener.as_deref());
                }
                Ok(busy.into())
            }
            IoOutcome::Closed => Err(HandlerInactive::EndOfStream.into()),
        }
    }

    /// Lets the handler consume input and produce output, then writes what
    /// it produced and tidies the inbound buffer.
    pub(super) fn invoke_handler(&mut self) -> Result<bool, Fault> {
        let mut busy = false;
        self.inbound.limit_to_written();
        self.outbound.write_from_limit();

        loop {
            let before = self.inbound.read_position();
            self.call_handler()?;
            self.stats
                .record_read(self.inbound.read_position() - before);

            let produced = self.outbound.write_position();
            if produced > self.outbound.read_limit() || produced >= MIN_FRAME_SIZE {
                self.outbound.limit_to_written();
                busy |= self.try_write()?;
                break;
            }
            if self.inbound.read_position() == before {
                break;
            }
        }

        if self.inbound.read_remaining() == 0 {
            self.inbound.clear();
        } else if self.inbound.read_position() > 0 {
            self.inbound.compact();
            busy = true;
        }

        Ok(busy)
    }

    fn call_handler(&mut self) -> Result<(), Fault> {
        let EngineCore {
            handler,
            inbound,
            outbound,
            context,
            ..
        } = self;
        let Some(handler) = handler.as_mut() else {
            return Ok(());
        };

        let mut inbound = Inbound::new(inbound);
        let mut outbound = Outbound::new(outbound);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            handler.process(&mut inbound, &mut outbound, &mut **context)
        }));

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Fault::from_handler(e)),
            Err(payload) => Err(Fault::Unexpected(anyhow::anyhow!(
                "protocol handler panicked: {}",
                panic_message(payload.as_ref())
            ))),
        }
    }

    /// Writes the staged outbound bytes once.
    ///
    /// A broken pipe tears down the socket side and reports idle rather
    /// than failing.
    pub(super) fn try_write(&mut self) -> Result<bool, Fault> {
        if self.outbound.read_remaining() == 0 {
            return Ok(false);
        }

        let write_time = Instant::now();
        let outcome = self.channel.write(self.outbound.readable())?;
        if let Some(handler) = self.handler.as_mut() {
            handler.on_write_time(write_time);
        }

        match outcome {
            IoOutcome::Transferred(n) => {
                self.stats.record_written(n);
                self.write_log.log(&self.outbound.readable()[..n]);
                self.outbound.consume(n);
                self.outbound.compact();
                Ok(true)
            }
            IoOutcome::Idle => Ok(false),
            IoOutcome::Closed => {
                debug!(peer = ?self.channel.peer(), "Write side closed");
                self.close_socket_side();
                Ok(false)
            }
        }
    }

    /// Closes the connection and turns `fault` into the step's error.
    fn fail(&mut self, fault: Fault) -> HandlerInactive {
        match fault {
            Fault::Io(e) if is_closed_channel(&e) => {
                self.close();
                HandlerInactive::SocketFault(e)
            }
            Fault::Io(e) => {
                self.close();
                let client_closed = self
                    .handler
                    .as_ref()
                    .is_some_and(|handler| handler.has_client_closed());
                self.handle_io_error(&e, client_closed);
                HandlerInactive::SocketFault(e)
            }
            Fault::Inactive(e) => {
                self.close();
                e
            }
            Fault::Unexpected(e) => {
                self.close();
                warn!(peer = ?self.channel.peer(), error = %format!("{:#}", e), "Unexpected failure, connection closed");
                HandlerInactive::Unexpected(e)
            }
        }
    }

    /// Logs an I/O failure at a level matching how expected it is, reports a
    /// missed heartbeat, and tears down the socket side.
    pub(super) fn handle_io_error(&mut self, err: &io::Error, client_closed: bool) {
        if !client_closed {
            let peer = self.channel.peer();
            match io_severity(err) {
                Severity::Silent => {}
                Severity::Trace => trace!(peer = ?peer, error = %err, "Connection reset by peer"),
                Severity::Debug => debug!(peer = ?peer, error = %err, "Connection forcibly closed"),
                Severity::Warn => warn!(peer = ?peer, error = %err, "Socket error"),
            }
            if let Some(listener) = self.context.heartbeat_listener() {
                listener.on_missed_heartbeat();
            }
        }
        self.close_socket_side();
    }

    fn check_heartbeat(&mut self) -> Result<(), HandlerInactive> {
        let timeout = self.context.heartbeat_timeout();
        if !self.heartbeat.is_expired(Instant::now(), timeout) {
            return Ok(());
        }

        debug!(peer = ?self.channel.peer(), ?timeout, "Heartbeat timeout");
        if let Some(listener) = self.context.heartbeat_listener() {
            listener.on_missed_heartbeat();
        }
        self.close_socket_side();
        Err(HandlerInactive::HeartbeatTimeout)
    }

    pub(super) fn close(&mut self) {
        self.closed = true;
        self.close_socket_side();
        self.clean();
    }

    /// Closes handler, stats listener, socket and context; a failure on one
    /// does not stop the others.
    pub(super) fn close_socket_side(&mut self) {
        if let Some(handler) = self.handler.as_mut() {
            if let Err(e) = handler.close() {
                debug!(error = %e, "Failed to close protocol handler");
            }
        }
        if let Some(listener) = self.context.network_stats_listener() {
            if let Err(e) = listener.close() {
                debug!(error = %e, "Failed to close stats listener");
            }
        }
        if let Err(e) = self.channel.close() {
            debug!(error = %e, "Failed to close socket");
        }
        self.close_context();
    }

    fn close_context(&mut self) {
        if let Err(e) = self.context.close() {
            debug!(error = %e, "Failed to close network context");
        }
    }

    fn clean(&mut self) {
        if self.cleaned {
            return;
        }
        self.cleaned = true;

        let freed = self.inbound.release() + self.outbound.release();
        if freed == 0 {
            warn!("nothing cleaned");
        } else {
            debug!(freed, "Connection buffers released");
        }
    }

    fn state(&self) -> ConnectionState {
        if self.cleaned {
            ConnectionState::Cleaned
        } else if self.closed {
            ConnectionState::Closed
        } else if !self.channel.is_open() {
            ConnectionState::Closing
        } else {
            ConnectionState::Active
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

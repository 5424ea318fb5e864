//! Test doubles for the connection engine: a scripted socket, a scripted
//! protocol handler and recording listeners.

use crate::buffer::{Inbound, Outbound};
use crate::connection::{
    HeartbeatListener, IoOutcome, NetworkContext, NetworkStatsListener, SocketChannel, TcpHandler,
};
use bytes::{Buf, BufMut};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// What the next `read` call returns.
#[derive(Debug)]
pub(crate) enum ReadStep {
    Data(Vec<u8>),
    Eof,
    Fail(io::ErrorKind, &'static str),
}

/// What the next `write` call does; an empty script accepts everything.
#[derive(Debug)]
pub(crate) enum WriteStep {
    Accept(usize),
    Idle,
    Closed,
}

#[derive(Debug, Default)]
struct ChannelState {
    reads: VecDeque<ReadStep>,
    writes: VecDeque<WriteStep>,
    written: Vec<u8>,
    read_calls: usize,
    write_calls: usize,
    closed: bool,
}

/// Shared view of a [`ScriptedChannel`] for scripting and assertions.
#[derive(Debug, Clone, Default)]
pub(crate) struct ChannelProbe(Arc<Mutex<ChannelState>>);

impl ChannelProbe {
    fn state(&self) -> std::sync::MutexGuard<'_, ChannelState> {
        self.0.lock().unwrap()
    }

    pub(crate) fn push_data(&self, data: &[u8]) {
        self.state().reads.push_back(ReadStep::Data(data.to_vec()));
    }

    pub(crate) fn push_read(&self, step: ReadStep) {
        self.state().reads.push_back(step);
    }

    pub(crate) fn push_write(&self, step: WriteStep) {
        self.state().writes.push_back(step);
    }

    pub(crate) fn pending_reads(&self) -> usize {
        self.state().reads.len()
    }

    pub(crate) fn written(&self) -> Vec<u8> {
        self.state().written.clone()
    }

    pub(crate) fn read_calls(&self) -> usize {
        self.state().read_calls
    }

    pub(crate) fn write_calls(&self) -> usize {
        self.state().write_calls
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state().closed
    }
}

/// An in-memory [`SocketChannel`] driven by a script of reads and writes.
#[derive(Debug)]
pub(crate) struct ScriptedChannel {
    probe: ChannelProbe,
}

pub(crate) fn scripted_channel() -> (ScriptedChannel, ChannelProbe) {
    let probe = ChannelProbe::default();
    (
        ScriptedChannel {
            probe: probe.clone(),
        },
        probe,
    )
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "channel is closed")
}

impl SocketChannel for ScriptedChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<IoOutcome> {
        let mut state = self.probe.state();
        state.read_calls += 1;
        if state.closed {
            return Err(not_connected());
        }
        match state.reads.pop_front() {
            None => Ok(IoOutcome::Idle),
            Some(ReadStep::Data(mut data)) => {
                let n = data.len().min(buf.len());
                if n == 0 {
                    state.reads.push_front(ReadStep::Data(data));
                    return Ok(IoOutcome::Idle);
                }
                let rest = data.split_off(n);
                buf[..n].copy_from_slice(&data);
                if !rest.is_empty() {
                    state.reads.push_front(ReadStep::Data(rest));
                }
                Ok(IoOutcome::Transferred(n))
            }
            Some(ReadStep::Eof) => Ok(IoOutcome::Closed),
            Some(ReadStep::Fail(kind, message)) => Err(io::Error::new(kind, message)),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<IoOutcome> {
        let mut state = self.probe.state();
        state.write_calls += 1;
        if state.closed {
            return Err(not_connected());
        }
        let accepted = match state.writes.pop_front() {
            None => buf.len(),
            Some(WriteStep::Accept(max)) => buf.len().min(max),
            Some(WriteStep::Idle) => 0,
            Some(WriteStep::Closed) => return Ok(IoOutcome::Closed),
        };
        if accepted == 0 {
            return Ok(IoOutcome::Idle);
        }
        state.written.extend_from_slice(&buf[..accepted]);
        Ok(IoOutcome::Transferred(accepted))
    }

    fn is_open(&self) -> bool {
        !self.probe.state().closed
    }

    fn close(&mut self) -> io::Result<()> {
        self.probe.state().closed = true;
        Ok(())
    }
}

/// How a [`ScriptedHandler`] reacts to input.
#[derive(Debug, Clone)]
pub(crate) enum Behavior {
    /// Consume everything; answer each non-empty input with the bytes given
    Reply(Vec<u8>),
    /// Consume whole frames of the given size only, never answer
    Frames(usize),
    /// Copy input to output
    Echo,
    /// Fail with a protocol error once input arrives
    Fail(&'static str),
    /// Fail with an I/O error once input arrives
    FailIo(io::ErrorKind),
    /// Panic once input arrives
    Panic,
}

/// Everything a [`ScriptedHandler`] observed.
#[derive(Debug, Default)]
pub(crate) struct HandlerLog {
    pub process_calls: usize,
    pub calls_with_input: usize,
    pub received: Vec<u8>,
    pub end_of_connection: Vec<bool>,
    pub read_times: usize,
    pub write_times: usize,
    pub close_calls: usize,
}

pub(crate) type SharedLog = Arc<Mutex<HandlerLog>>;

#[derive(Debug)]
pub(crate) struct ScriptedHandler {
    behavior: Behavior,
    log: SharedLog,
    client_closed: bool,
}

impl ScriptedHandler {
    pub(crate) fn new(behavior: Behavior) -> (Self, SharedLog) {
        let log = SharedLog::default();
        (
            Self {
                behavior,
                log: Arc::clone(&log),
                client_closed: false,
            },
            log,
        )
    }

    pub(crate) fn client_closed(mut self) -> Self {
        self.client_closed = true;
        self
    }
}

impl TcpHandler for ScriptedHandler {
    fn process(
        &mut self,
        inbound: &mut Inbound<'_>,
        outbound: &mut Outbound<'_>,
        _ctx: &mut dyn NetworkContext,
    ) -> anyhow::Result<()> {
        let mut log = self.log.lock().unwrap();
        log.process_calls += 1;
        let available = inbound.remaining();
        if available > 0 {
            log.calls_with_input += 1;
        }

        match &self.behavior {
            Behavior::Reply(reply) => {
                if available > 0 {
                    log.received.extend_from_slice(inbound.chunk());
                    inbound.advance(available);
                    outbound.put_slice(reply);
                }
            }
            Behavior::Frames(size) => {
                let whole = available / size * size;
                log.received.extend_from_slice(&inbound.chunk()[..whole]);
                inbound.advance(whole);
            }
            Behavior::Echo => {
                log.received.extend_from_slice(inbound.chunk());
                outbound.put(&mut *inbound);
            }
            Behavior::Fail(message) => {
                if available > 0 {
                    anyhow::bail!(*message);
                }
            }
            Behavior::FailIo(kind) => {
                if available > 0 {
                    return Err(io::Error::from(*kind).into());
                }
            }
            Behavior::Panic => {
                if available > 0 {
                    drop(log);
                    panic!("handler exploded");
                }
            }
        }
        Ok(())
    }

    fn on_read_time(&mut self, _at: tokio::time::Instant) {
        self.log.lock().unwrap().read_times += 1;
    }

    fn on_write_time(&mut self, _at: tokio::time::Instant) {
        self.log.lock().unwrap().write_times += 1;
    }

    fn on_end_of_connection(&mut self, graceful: bool) {
        self.log.lock().unwrap().end_of_connection.push(graceful);
    }

    fn has_client_closed(&self) -> bool {
        self.client_closed
    }

    fn close(&mut self) -> anyhow::Result<()> {
        self.log.lock().unwrap().close_calls += 1;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(crate) struct CountingHeartbeatListener {
    missed: AtomicUsize,
}

impl CountingHeartbeatListener {
    pub(crate) fn count(&self) -> usize {
        self.missed.load(Ordering::SeqCst)
    }
}

impl HeartbeatListener for CountingHeartbeatListener {
    fn on_missed_heartbeat(&self) {
        self.missed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingStatsListener {
    reports: Mutex<Vec<(u64, u64, u64)>>,
    closes: AtomicUsize,
}

impl RecordingStatsListener {
    pub(crate) fn reports(&self) -> Vec<(u64, u64, u64)> {
        self.reports.lock().unwrap().clone()
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl NetworkStatsListener for RecordingStatsListener {
    fn on_network_stats(&self, write_rate: u64, read_rate: u64, poll_rate: u64) {
        self.reports
            .lock()
            .unwrap()
            .push((write_rate, read_rate, poll_rate));
    }

    fn close(&self) -> anyhow::Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

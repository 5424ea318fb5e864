//! Echo Handler
//!
//! Writes every received byte straight back to the peer. Partial input is
//! never an issue: whatever is buffered is echoed as is.

use crate::buffer::{Inbound, Outbound};
use crate::connection::{NetworkContext, TcpHandler};
use bytes::{Buf, BufMut};
use tracing::debug;

/// Echoes input to output.
#[derive(Debug, Default)]
pub struct EchoHandler {
    echoed: u64,
}

impl EchoHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes echoed so far.
    pub fn echoed(&self) -> u64 {
        self.echoed
    }
}

impl TcpHandler for EchoHandler {
    fn process(
        &mut self,
        inbound: &mut Inbound<'_>,
        outbound: &mut Outbound<'_>,
        _ctx: &mut dyn NetworkContext,
    ) -> anyhow::Result<()> {
        let available = inbound.remaining();
        if available > 0 {
            outbound.put(&mut *inbound);
            self.echoed += available as u64;
        }
        Ok(())
    }

    fn on_end_of_connection(&mut self, graceful: bool) {
        debug!(graceful, echoed = self.echoed, "Echo connection ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ElasticBuffer;
    use crate::connection::{
        BasicContext, ConnectionEngine, EngineConfig, HandlerInactive, StepOutcome, TcpChannel,
    };
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::time::{Duration, Instant};

    fn loopback() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    /// Steps until `done` holds or a second has passed.
    fn step_until(
        engine: &ConnectionEngine<TcpChannel>,
        mut done: impl FnMut() -> bool,
    ) -> Result<(), HandlerInactive> {
        let deadline = Instant::now() + Duration::from_secs(1);
        while !done() && Instant::now() < deadline {
            if engine.step()? == StepOutcome::Idle {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        Ok(())
    }

    #[test]
    fn test_echo_over_loopback() {
        let (mut client, server) = loopback();
        let engine = ConnectionEngine::new(
            TcpChannel::new(server).unwrap(),
            Box::new(BasicContext::new()),
            &EngineConfig::default(),
        );
        engine.set_handler(Box::new(EchoHandler::new()));

        client.write_all(b"hello, world").unwrap();
        client
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();

        let mut received = Vec::new();
        step_until(&engine, || {
            let mut chunk = [0u8; 64];
            if let Ok(n) = client.read(&mut chunk) {
                received.extend_from_slice(&chunk[..n]);
            }
            received.len() >= 12
        })
        .unwrap();

        assert_eq!(received, b"hello, world");
    }

    #[test]
    fn test_peer_close_ends_connection() {
        let (client, server) = loopback();
        let engine = ConnectionEngine::new(
            TcpChannel::new(server).unwrap(),
            Box::new(BasicContext::new()),
            &EngineConfig::default(),
        );
        engine.set_handler(Box::new(EchoHandler::new()));
        drop(client);

        let result = step_until(&engine, || false);

        assert!(matches!(
            result,
            Err(HandlerInactive::EndOfStream) | Err(HandlerInactive::SocketFault(_))
        ));
        assert!(engine.is_closed());
    }

    #[test]
    fn test_echo_across_reads() {
        let (channel, probe) = crate::connection::mock::scripted_channel();
        let engine =
            ConnectionEngine::new(channel, Box::new(BasicContext::new()), &EngineConfig::default());
        engine.set_handler(Box::new(EchoHandler::new()));

        probe.push_data(b"abc");
        probe.push_data(b"defg");
        engine.step().unwrap();
        engine.step().unwrap();

        assert_eq!(probe.written(), b"abcdefg");
    }

    #[test]
    fn test_echoed_counts_bytes() {
        let mut inbound = ElasticBuffer::with_capacity(16);
        let mut outbound = ElasticBuffer::with_capacity(16);
        let mut ctx = BasicContext::new();
        let mut handler = EchoHandler::new();

        inbound.write_slice(b"abc");
        inbound.limit_to_written();
        handler
            .process(
                &mut Inbound::new(&mut inbound),
                &mut Outbound::new(&mut outbound),
                &mut ctx,
            )
            .unwrap();
        assert_eq!(handler.echoed(), 3);

        inbound.write_slice(b"defg");
        inbound.limit_to_written();
        handler
            .process(
                &mut Inbound::new(&mut inbound),
                &mut Outbound::new(&mut outbound),
                &mut ctx,
            )
            .unwrap();

        assert_eq!(handler.echoed(), 7);
        assert_eq!(inbound.read_remaining(), 0);
        assert_eq!(outbound.unconsumed_bytes(), b"abcdefg");
    }
}

//! Per-Direction Wire Log
//!
//! Every span of bytes read from or written to the socket is logged at
//! `trace` level with a short hex preview. The preview is rendered lazily,
//! so nothing is formatted unless the target is enabled.

use std::fmt;
use std::net::SocketAddr;
use tracing::trace;

/// Bytes shown in a preview before it is truncated.
const PREVIEW_LEN: usize = 32;

/// Logs one direction ("read" or "write") of a connection.
#[derive(Debug, Clone)]
pub struct NetworkLog {
    peer: Option<SocketAddr>,
    direction: &'static str,
}

impl NetworkLog {
    pub fn new(peer: Option<SocketAddr>, direction: &'static str) -> Self {
        Self { peer, direction }
    }

    pub fn log(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        trace!(
            peer = ?self.peer,
            direction = self.direction,
            bytes = bytes.len(),
            data = %HexPreview(bytes),
            "Network I/O"
        );
    }
}

/// Hex rendering of at most [`PREVIEW_LEN`] bytes.
pub(crate) struct HexPreview<'a>(pub &'a [u8]);

impl fmt::Display for HexPreview<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().take(PREVIEW_LEN).enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        if self.0.len() > PREVIEW_LEN {
            write!(f, " .. (+{})", self.0.len() - PREVIEW_LEN)?;
        }
        Ok(())
    }
}

//! Handler-Facing Buffer Views
//!
//! Protocol handlers never see an [`ElasticBuffer`] directly. For the
//! duration of one `process` call they get:
//!
//! - [`Inbound`]: a [`bytes::Buf`] over the bytes received so far
//! - [`Outbound`]: a [`bytes::BufMut`] that appends to the pending output
//!
//! Both borrow the engine's buffer mutably, so the borrow checker stops a
//! handler from keeping a reference past the call.

use crate::buffer::ElasticBuffer;
use bytes::buf::UninitSlice;
use bytes::{Buf, BufMut};

/// Received bytes available to a protocol handler.
///
/// Reads are bounded by the inbound read limit, which the engine sets to
/// the end of the data received before the call.
#[derive(Debug)]
pub struct Inbound<'a> {
    buf: &'a mut ElasticBuffer,
}

impl<'a> Inbound<'a> {
    pub(crate) fn new(buf: &'a mut ElasticBuffer) -> Self {
        Self { buf }
    }

    /// Offset of the next unread byte within the backing region.
    pub fn read_position(&self) -> usize {
        self.buf.read_position()
    }

    /// Looks at the unread bytes without consuming them.
    pub fn peek(&self) -> &[u8] {
        self.buf.readable()
    }
}

impl Buf for Inbound<'_> {
    fn remaining(&self) -> usize {
        self.buf.read_remaining()
    }

    fn chunk(&self) -> &[u8] {
        self.buf.readable()
    }

    fn advance(&mut self, cnt: usize) {
        self.buf.consume(cnt);
    }
}

/// Output space for a protocol handler; grows as needed.
#[derive(Debug)]
pub struct Outbound<'a> {
    buf: &'a mut ElasticBuffer,
}

impl<'a> Outbound<'a> {
    pub(crate) fn new(buf: &'a mut ElasticBuffer) -> Self {
        Self { buf }
    }

    /// Bytes queued for the socket, including anything written in this call.
    pub fn pending(&self) -> usize {
        self.buf.unconsumed()
    }

    /// Offset at which the next byte will be written.
    pub fn write_position(&self) -> usize {
        self.buf.write_position()
    }
}

// SAFETY: `chunk_mut` always hands out the spare region of initialised
// storage, and `advance_mut` refuses to move past the capacity.
unsafe impl BufMut for Outbound<'_> {
    fn remaining_mut(&self) -> usize {
        isize::MAX as usize - self.buf.write_position()
    }

    unsafe fn advance_mut(&mut self, cnt: usize) {
        debug_assert!(
            cnt <= self.buf.spare_capacity(),
            "advance_mut({}) past spare capacity {}",
            cnt,
            self.buf.spare_capacity()
        );
        self.buf.commit(cnt);
    }

    fn chunk_mut(&mut self) -> &mut UninitSlice {
        if self.buf.spare_capacity() == 0 {
            self.buf.reserve(1);
        }
        UninitSlice::new(self.buf.spare_mut())
    }

    fn put_slice(&mut self, src: &[u8]) {
        self.buf.write_slice(src);
    }
}

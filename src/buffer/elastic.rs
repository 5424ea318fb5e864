//! Growable Byte Buffer with Independent Cursors
//!
//! An `ElasticBuffer` is a contiguous byte region with three cursors:
//!
//! ```text
//!  0            read_position       read_limit     write_position      capacity
//!  │ consumed   │   readable        │  staged      │   spare           │
//!  └────────────┴───────────────────┴──────────────┴───────────────────┘
//! ```
//!
//! - `read_position`: next byte a consumer will take
//! - `read_limit`: end of the region a consumer is allowed to see
//! - `write_position`: next byte a producer will fill
//!
//! The engine owns two of these per connection. The inbound buffer is
//! filled by the socket and drained by the protocol handler; the outbound
//! buffer is filled by the protocol handler and drained by the socket.
//!
//! ## Compaction
//!
//! TCP delivers a stream, so a read often ends in the middle of a frame.
//! Rather than allocating, the unread suffix is moved to the start of the
//! region (`copy_within`, which is overlap-safe) and the cursors are rebased.

use tracing::trace;

/// Smallest backing allocation made when a buffer has to grow.
const MIN_GROWTH: usize = 64;

/// A contiguous, growable byte buffer with read and write cursors.
///
/// Invariant: `read_position <= read_limit <= capacity` and
/// `read_limit <= write_position <= capacity` outside of handler calls.
#[derive(Debug, Default)]
pub struct ElasticBuffer {
    /// Backing storage; `storage.len()` is the capacity
    storage: Vec<u8>,
    read_position: usize,
    read_limit: usize,
    write_position: usize,
    /// Set once the backing storage has been handed back
    released: bool,
}

impl ElasticBuffer {
    /// Creates a buffer with `capacity` zeroed bytes of backing storage.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: vec![0; capacity],
            ..Default::default()
        }
    }

    /// Size of the backing region.
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    pub fn read_position(&self) -> usize {
        self.read_position
    }

    pub fn read_limit(&self) -> usize {
        self.read_limit
    }

    pub fn write_position(&self) -> usize {
        self.write_position
    }

    /// Bytes a consumer may still take: `read_limit - read_position`.
    pub fn read_remaining(&self) -> usize {
        self.read_limit - self.read_position
    }

    /// Bytes written but not yet consumed: `write_position - read_position`.
    pub fn unconsumed(&self) -> usize {
        self.write_position - self.read_position
    }

    /// Room left before the buffer has to grow.
    pub fn spare_capacity(&self) -> usize {
        self.capacity() - self.write_position
    }

    /// Whether [`release`](Self::release) has run.
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// The bytes between `read_position` and `read_limit`.
    pub fn readable(&self) -> &[u8] {
        &self.storage[self.read_position..self.read_limit]
    }

    /// The bytes between `read_position` and `write_position`.
    pub fn unconsumed_bytes(&self) -> &[u8] {
        &self.storage[self.read_position..self.write_position]
    }

    /// The writable region after `write_position`.
    pub(crate) fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.storage[self.write_position..]
    }

    /// Marks `count` bytes after `write_position` as written.
    ///
    /// # Panics
    ///
    /// Panics if that would move `write_position` past the capacity.
    pub(crate) fn commit(&mut self, count: usize) {
        let end = self.write_position + count;
        assert!(
            end <= self.capacity(),
            "commit of {} bytes overruns capacity {}",
            count,
            self.capacity()
        );
        self.write_position = end;
    }

    /// Marks `count` readable bytes as consumed.
    ///
    /// # Panics
    ///
    /// Panics if fewer than `count` bytes are readable.
    pub(crate) fn consume(&mut self, count: usize) {
        assert!(
            count <= self.read_remaining(),
            "cannot consume {} bytes, only {} readable",
            count,
            self.read_remaining()
        );
        self.read_position += count;
    }

    /// Exposes everything written so far to consumers.
    pub(crate) fn limit_to_written(&mut self) {
        self.read_limit = self.write_position;
    }

    /// Moves the write cursor back (or forward) to `read_limit`, so new
    /// output is appended right after what is already staged.
    pub(crate) fn write_from_limit(&mut self) {
        self.write_position = self.read_limit;
    }

    /// Appends `src`, growing the backing storage if needed.
    pub(crate) fn write_slice(&mut self, src: &[u8]) {
        self.reserve(src.len());
        let start = self.write_position;
        self.storage[start..start + src.len()].copy_from_slice(src);
        self.write_position += src.len();
    }

    /// Ensures at least `additional` bytes of spare capacity.
    ///
    /// Grows to at least double the current capacity so repeated small
    /// appends stay amortised.
    pub(crate) fn reserve(&mut self, additional: usize) {
        if self.spare_capacity() >= additional {
            return;
        }
        let needed = self.write_position + additional;
        let new_capacity = needed.max(self.capacity() * 2).max(MIN_GROWTH);
        trace!(
            from = self.capacity(),
            to = new_capacity,
            "Growing buffer"
        );
        self.storage.resize(new_capacity, 0);
    }

    /// Resets all cursors to zero, reclaiming the full backing region.
    pub fn clear(&mut self) {
        self.read_position = 0;
        self.read_limit = 0;
        self.write_position = 0;
    }

    /// Relocates the unconsumed suffix to the start of the region.
    ///
    /// Cursors are rebased so that `read_position` becomes 0 and
    /// `read_limit`/`write_position` keep their distance from it. Returns
    /// the number of bytes that were moved. Calling this again without new
    /// writes is a no-op.
    pub fn compact(&mut self) -> usize {
        let offset = self.read_position;
        let len = self.unconsumed();
        if offset == 0 {
            return len;
        }
        self.storage.copy_within(offset..self.write_position, 0);
        self.read_position = 0;
        self.read_limit -= offset;
        self.write_position = len;
        len
    }

    /// Frees the backing storage. Only the first call does anything; it
    /// returns the number of bytes freed.
    pub fn release(&mut self) -> usize {
        if self.released {
            return 0;
        }
        self.released = true;
        let freed = self.storage.capacity();
        self.storage = Vec::new();
        self.clear();
        freed
    }
}

//! Output buffering ahead of the transport.
//!
//! Before commit the aggregator holds everything up to the buffer size, which is what
//! lets a response that fits be sent with `Content-Length` and lets an error signal
//! discard content nobody has seen yet. After commit it only coalesces small writes.

use bytes::{Bytes, BytesMut};
use tracing::trace;

/// Outcome of an append.
#[derive(Debug, PartialEq, Eq)]
pub enum Aggregate {
    /// the bytes were buffered, nothing has to reach the transport yet
    Held,
    /// everything buffered so far plus the new bytes, in order, must be sent now
    Flush(Bytes),
}

#[derive(Debug)]
pub struct BufferAggregator {
    buffer: BytesMut,
    capacity: usize,
    aggregation_size: usize,
}

impl BufferAggregator {
    pub fn new(capacity: usize, aggregation_size: usize) -> Self {
        Self { buffer: BytesMut::with_capacity(capacity), capacity, aggregation_size }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Append while the response is still uncommitted.
    ///
    /// A write that does not fit flushes the held bytes together with itself, the caller
    /// then commits with chunked framing.
    pub fn append(&mut self, bytes: &[u8]) -> Aggregate {
        if self.buffer.len() + bytes.len() <= self.capacity {
            self.buffer.extend_from_slice(bytes);
            trace!(buffered = self.buffer.len(), capacity = self.capacity, "holding uncommitted output");
            return Aggregate::Held;
        }

        trace!(buffered = self.buffer.len(), incoming = bytes.len(), capacity = self.capacity, "output buffer overflow");
        Aggregate::Flush(self.drain_with(bytes))
    }

    /// Append once the response is committed.
    pub fn append_committed(&mut self, bytes: &[u8]) -> Aggregate {
        let len = bytes.len();
        if len < self.aggregation_size && self.buffer.len() + len <= self.capacity {
            self.buffer.extend_from_slice(bytes);
            if self.buffer.len() < self.capacity {
                return Aggregate::Held;
            }
            return Aggregate::Flush(self.take());
        }

        Aggregate::Flush(self.drain_with(bytes))
    }

    /// Removes and returns everything held.
    pub fn take(&mut self) -> Bytes {
        self.buffer.split().freeze()
    }

    /// Drops everything held, keeping the allocation.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    fn drain_with(&mut self, bytes: &[u8]) -> Bytes {
        if self.buffer.is_empty() {
            return Bytes::copy_from_slice(bytes);
        }
        self.buffer.extend_from_slice(bytes);
        self.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holds_until_capacity() {
        let mut aggregator = BufferAggregator::new(16, 4);

        assert_eq!(aggregator.append(b"hello"), Aggregate::Held);
        assert_eq!(aggregator.append(b"0123456789a"), Aggregate::Held);
        assert_eq!(aggregator.len(), 16);

        assert_eq!(aggregator.append(b"!"), Aggregate::Flush(Bytes::from_static(b"hello0123456789a!")));
        assert!(aggregator.is_empty());
    }

    #[test]
    fn oversized_first_write_flushes_alone() {
        let mut aggregator = BufferAggregator::new(4, 2);
        assert_eq!(aggregator.append(b"abcde"), Aggregate::Flush(Bytes::from_static(b"abcde")));
        assert!(aggregator.is_empty());
    }

    #[test]
    fn committed_aggregates_only_small_writes() {
        let mut aggregator = BufferAggregator::new(8, 4);

        assert_eq!(aggregator.append_committed(b"ab"), Aggregate::Held);
        assert_eq!(aggregator.append_committed(b"cde"), Aggregate::Held);
        // not below the aggregation size: goes out with what is held
        assert_eq!(aggregator.append_committed(b"fghi"), Aggregate::Flush(Bytes::from_static(b"abcdefghi")));

        assert_eq!(aggregator.append_committed(b"123"), Aggregate::Held);
        assert_eq!(aggregator.append_committed(b"456"), Aggregate::Held);
        // reaching capacity exactly flushes
        assert_eq!(aggregator.append_committed(b"78"), Aggregate::Flush(Bytes::from_static(b"12345678")));
    }

    #[test]
    fn clear_discards_held_bytes() {
        let mut aggregator = BufferAggregator::new(8, 4);
        assert_eq!(aggregator.append(b"hello"), Aggregate::Held);
        aggregator.clear();
        assert!(aggregator.is_empty());
        assert_eq!(aggregator.take(), Bytes::new());
    }
}

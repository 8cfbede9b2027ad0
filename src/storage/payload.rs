//! Generated test data and a discarding sink.

use bytes::{Bytes, BytesMut};

const PATTERN: [u8; 4] = [0xde, 0xad, 0xbe, 0xef];

/// Produces `total` bytes of the repeating `de ad be ef` pattern.
#[derive(Debug, Clone)]
pub struct DeadBeefSource {
    total: u64,
    produced: u64,
    chunk_size: usize,
}

impl DeadBeefSource {
    pub fn new(total: u64, chunk_size: usize) -> Self {
        Self {
            total,
            produced: 0,
            chunk_size: chunk_size.max(1),
        }
    }

    /// `blocks` storage blocks of `block_size` bytes each.
    pub fn blocks(blocks: u64, block_size: u64, chunk_size: usize) -> Self {
        Self::new(blocks.saturating_mul(block_size), chunk_size)
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn produced(&self) -> u64 {
        self.produced
    }

    /// Next chunk of at most `chunk_size` bytes, `None` when exhausted.
    pub fn next_chunk(&mut self) -> Option<Bytes> {
        let remaining = self.total - self.produced;
        if remaining == 0 {
            return None;
        }
        let len = remaining.min(self.chunk_size as u64) as usize;

        let mut buf = BytesMut::with_capacity(len);
        // Keep the pattern phase continuous across chunk boundaries.
        let phase = (self.produced % 4) as usize;
        buf.extend((0..len).map(|i| PATTERN[(phase + i) % 4]));

        self.produced += len as u64;
        Some(buf.freeze())
    }
}

impl Iterator for DeadBeefSource {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        self.next_chunk()
    }
}

/// Counts and drops everything written to it.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink {
    bytes: u64,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, data: &[u8]) {
        self.bytes += data.len() as u64;
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

//! Frame adapter for bridging variable-size packet payloads to fixed-size
//! engine frames.
//!
//! Payload bytes are accumulated FIFO; every complete `FRAME_BYTES` window is
//! split off in arrival order and the partial remainder waits for the next call.

use crate::constants::FRAME_BYTES;
use bytes::{Bytes, BytesMut};

/// Per-stream byte accumulator producing complete wire frames.
pub struct FrameAdapter {
    buffer: BytesMut,
}

impl Default for FrameAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAdapter {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(FRAME_BYTES * 2),
        }
    }

    /// Appends `payload` and drains every complete frame now available.
    ///
    /// After this returns, fewer than `FRAME_BYTES` bytes remain buffered.
    pub fn consume(&mut self, payload: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(payload);

        let mut frames = Vec::with_capacity(self.buffer.len() / FRAME_BYTES);
        while self.buffer.len() >= FRAME_BYTES {
            frames.push(self.buffer.split_to(FRAME_BYTES).freeze());
        }
        frames
    }

    /// Bytes waiting for the rest of their frame.
    pub fn remainder(&self) -> &[u8] {
        &self.buffer
    }

    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Removes and returns the buffered partial frame.
    pub fn take_remainder(&mut self) -> Bytes {
        self.buffer.split().freeze()
    }

    /// Replaces the buffered bytes, e.g. with the part of a fallback packet
    /// that did not fit the caller's buffer.
    pub fn restore(&mut self, remainder: &[u8]) {
        self.buffer.clear();
        self.buffer.extend_from_slice(remainder);
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

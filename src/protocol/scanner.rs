//! Incremental scanner for inbound response bytes.
//!
//! The notify path delivers bytes in whatever chunks the transport produces:
//! a response may arrive split across reads, or glued to other notification
//! traffic we do not understand. The scanner buffers partial input in a
//! `BytesMut`, resynchronizes on the response type byte, and yields complete
//! [`ResponseFrame`]s. Unrecognized bytes are counted and skipped, never
//! treated as fatal.

use bytes::BytesMut;

use super::wire::{ResponseFrame, RESPONSE_FRAME_SIZE, RESPONSE_FRAME_TYPE};

/// Buffer for accumulating inbound bytes and extracting complete responses.
#[derive(Debug, Default)]
pub struct ResponseScanner {
    buffer: BytesMut,
    skipped: u64,
}

impl ResponseScanner {
    /// Create an empty scanner.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(64),
            skipped: 0,
        }
    }

    /// Push raw bytes and extract every complete response frame.
    ///
    /// Returns the frames found; partial data stays buffered for the next
    /// push. Bytes that cannot start a response are dropped one at a time
    /// until the scanner resynchronizes.
    pub fn push(&mut self, data: &[u8]) -> Vec<ResponseFrame> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        loop {
            // Resynchronize on the type byte.
            while !self.buffer.is_empty() && self.buffer[0] != RESPONSE_FRAME_TYPE {
                let _ = self.buffer.split_to(1);
                self.skipped += 1;
            }

            if self.buffer.len() < RESPONSE_FRAME_SIZE {
                break;
            }

            let raw = self.buffer.split_to(RESPONSE_FRAME_SIZE);
            match ResponseFrame::decode(&raw) {
                Ok(frame) => frames.push(frame),
                // Unreachable with a matching type byte and exact length,
                // but a decode failure must never kill the stream.
                Err(_) => self.skipped += raw.len() as u64,
            }
        }
        frames
    }

    /// Total bytes discarded while resynchronizing.
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped
    }

    /// Bytes currently buffered awaiting completion.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}
